//! Transport contract between a [`Session`](super::connection::Session) and the socket beneath it.
//!
//! A [`Transport`] opens one physical connection per call and reports everything that
//! happens on it through the [`Listener`] it was handed. The listener is tagged with the
//! identity of the connection it belongs to, so signals from a handle that has since been
//! replaced are recognized and dropped by the session instead of being routed.

use std::fmt;

use tokio::sync::mpsc;

use crate::Error;
use crate::streaming::Endpoint;

/// Identity of one physical connection opened by a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    #[must_use]
    pub(crate) const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One discrete message as received from the transport.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl From<&str> for Frame {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for Frame {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

/// Something that happened on a transport handle.
#[non_exhaustive]
#[derive(Debug)]
pub enum Signal {
    /// The connection is established
    Open,
    /// A frame arrived
    Message(Frame),
    /// The server answered a liveness probe
    Pong,
    /// The connection is gone, with the RFC 6455 close code
    Close { code: u16, reason: String },
    /// A socket or network failure; closure, if any, is reported separately
    Error(Error),
}

/// Item flowing into a session task: either a transport signal or a fired timer.
#[derive(Debug)]
pub(crate) enum Input {
    Signal(ConnectionId, Signal),
    Timer(super::connection::Timer),
}

/// The single listener set bound to one transport handle.
///
/// Cloning is cheap; every clone reports as the same connection.
#[derive(Debug, Clone)]
pub struct Listener {
    connection: ConnectionId,
    tx: mpsc::UnboundedSender<Input>,
}

impl Listener {
    pub(crate) fn new(connection: ConnectionId, tx: mpsc::UnboundedSender<Input>) -> Self {
        Self { connection, tx }
    }

    /// The connection this listener reports for.
    #[must_use]
    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Deliver a signal to the owning session.
    ///
    /// Returns `false` once the session is gone; the transport should then wind down.
    pub fn emit(&self, signal: Signal) -> bool {
        self.tx.send(Input::Signal(self.connection, signal)).is_ok()
    }
}

/// Opens physical connections for a session.
pub trait Transport: Send + Sync + 'static {
    /// Start connecting to `endpoint` and return a handle immediately.
    ///
    /// Progress is reported asynchronously through `listener`: `Open` once connected,
    /// then any number of `Message`/`Pong`/`Error`, and finally one `Close`. A failed
    /// connection attempt reports `Error` followed by `Close`.
    fn open(&self, endpoint: &Endpoint, listener: Listener) -> Box<dyn TransportHandle>;
}

/// Control surface of one physical connection.
pub trait TransportHandle: Send + 'static {
    fn send(&self, text: String);

    /// Send a liveness probe; the answer arrives as [`Signal::Pong`].
    fn ping(&self);

    fn close(&self, code: u16);
}
