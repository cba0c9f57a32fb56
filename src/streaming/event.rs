use std::sync::Arc;

use super::parser::{DecodedEvent, FrameError};
use super::types::response::{Conversation, Notification, Status};
use crate::error::Error;

/// Everything a session reports to its subscribers.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum Event {
    /// A transport connection opened, either initially or after a reconnect
    Connect,
    Update(Box<Status>),
    Notification(Box<Notification>),
    Conversation(Box<Conversation>),
    /// Id of a deleted status
    Delete(String),
    /// The server answered a liveness probe
    Pong,
    /// The server sent an empty or binary keepalive frame
    Heartbeat,
    /// The server closed the connection normally; no reconnection follows
    Close,
    /// Transport failure or exhausted reconnection
    Error(Arc<Error>),
    /// A frame could not be decoded; the connection stays open
    ParserError(FrameError),
}

impl Event {
    /// Surface name of the event, as used by listeners keyed on strings.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Update(_) => "update",
            Self::Notification(_) => "notification",
            Self::Conversation(_) => "conversation",
            Self::Delete(_) => "delete",
            Self::Pong => "pong",
            Self::Heartbeat => "heartbeat",
            Self::Close => "close",
            Self::Error(_) => "error",
            Self::ParserError(_) => "parser-error",
        }
    }
}

impl From<DecodedEvent> for Event {
    fn from(decoded: DecodedEvent) -> Self {
        match decoded {
            DecodedEvent::Update(status) => Self::Update(status),
            DecodedEvent::Notification(notification) => Self::Notification(notification),
            DecodedEvent::Conversation(conversation) => Self::Conversation(conversation),
            DecodedEvent::Delete(id) => Self::Delete(id),
            DecodedEvent::Heartbeat => Self::Heartbeat,
            DecodedEvent::ParseError(error) => Self::ParserError(error),
        }
    }
}

impl From<Error> for Event {
    fn from(error: Error) -> Self {
        Self::Error(Arc::new(error))
    }
}
