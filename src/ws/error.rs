#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;

use crate::error::{Error, Kind};

/// WebSocket error variants.
#[non_exhaustive]
#[derive(Debug)]
pub enum WsError {
    /// Error connecting to or communicating with the WebSocket server
    Connection(tokio_tungstenite::tungstenite::Error),
    /// The session task is gone and can no longer accept commands
    ConnectionClosed,
    /// The proxy refused or failed to establish a tunnel
    Proxy(String),
    /// The endpoint URL cannot be used to open a WebSocket
    InvalidEndpoint(String),
    /// The configured maximum number of reconnection attempts has been used up
    ReconnectExhausted {
        /// Attempts made since the last explicit start
        attempts: u32,
    },
    /// Event subscriber lagged and missed events
    Lagged {
        /// Number of events that were missed
        count: u64,
    },
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "WebSocket connection error: {e}"),
            Self::ConnectionClosed => write!(f, "WebSocket session closed"),
            Self::Proxy(reason) => write!(f, "Proxy tunnel failed: {reason}"),
            Self::InvalidEndpoint(reason) => write!(f, "Invalid streaming endpoint: {reason}"),
            Self::ReconnectExhausted { attempts } => {
                write!(f, "Gave up reconnecting after {attempts} attempts")
            }
            Self::Lagged { count } => write!(f, "Event subscriber lagged, missed {count} events"),
        }
    }
}

impl StdError for WsError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Connection(e) => Some(e),
            _ => None,
        }
    }
}

impl From<WsError> for Error {
    fn from(e: WsError) -> Self {
        Error::with_source(Kind::WebSocket, e)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::with_source(Kind::WebSocket, WsError::Connection(e))
    }
}
