//! Frame decoding for the streaming protocol.
//!
//! Every text frame is an envelope `{"event": <tag>, "payload": <text>}` whose payload
//! is itself JSON-encoded, except for `delete` where it is a bare status id. Binary and
//! empty frames are keepalives.

use std::error::Error as StdError;
use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::types::response::{Conversation, Notification, Status};
use crate::error::{Error, Kind};
use crate::serde_helpers::decode_lenient;
use crate::ws::Frame;

const EVENT_UPDATE: &str = "update";
const EVENT_NOTIFICATION: &str = "notification";
const EVENT_CONVERSATION: &str = "conversation";
const EVENT_DELETE: &str = "delete";

/// Result of decoding one frame.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedEvent {
    Update(Box<Status>),
    Notification(Box<Notification>),
    Conversation(Box<Conversation>),
    /// Id of a deleted status
    Delete(String),
    /// Empty or binary keepalive frame
    Heartbeat,
    ParseError(FrameError),
}

/// A frame that could not be decoded, along with the text it was decoded from.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameError {
    pub raw: String,
    pub reason: FrameErrorReason,
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameErrorReason {
    /// The envelope or the embedded payload is not valid JSON, or the payload is missing
    Malformed(String),
    /// The event tag is not one this parser handles
    UnknownEvent(String),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            FrameErrorReason::Malformed(reason) => write!(f, "Malformed frame: {reason}"),
            FrameErrorReason::UnknownEvent(tag) => write!(f, "Unknown event: {tag:?}"),
        }
    }
}

impl StdError for FrameError {}

impl From<FrameError> for Error {
    fn from(e: FrameError) -> Self {
        Error::with_source(Kind::Protocol, e)
    }
}

/// Decode one frame as received from the transport.
///
/// Never fails: anything that cannot be decoded becomes [`DecodedEvent::ParseError`].
#[must_use]
pub fn parse(frame: &Frame) -> DecodedEvent {
    let text = match frame {
        Frame::Text(text) if !text.is_empty() => text,
        _ => return DecodedEvent::Heartbeat,
    };

    let error = |reason| {
        DecodedEvent::ParseError(FrameError {
            raw: text.clone(),
            reason,
        })
    };

    let envelope: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => return error(FrameErrorReason::Malformed(e.to_string())),
    };
    let tag = envelope
        .get("event")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let payload = envelope.get("payload");

    match tag {
        EVENT_DELETE => match payload {
            Some(Value::String(id)) => DecodedEvent::Delete(id.clone()),
            Some(Value::Number(id)) => DecodedEvent::Delete(id.to_string()),
            _ => error(FrameErrorReason::Malformed(
                "delete event without a status id".to_owned(),
            )),
        },
        EVENT_UPDATE => decode_body(payload)
            .map(|status| DecodedEvent::Update(Box::new(status)))
            .unwrap_or_else(error),
        EVENT_NOTIFICATION => decode_body(payload)
            .map(|notification| DecodedEvent::Notification(Box::new(notification)))
            .unwrap_or_else(error),
        EVENT_CONVERSATION => decode_body(payload)
            .map(|conversation| DecodedEvent::Conversation(Box::new(conversation)))
            .unwrap_or_else(error),
        other => error(FrameErrorReason::UnknownEvent(other.to_owned())),
    }
}

/// Second decoding pass over the embedded payload.
///
/// Only fails when the payload is not JSON; fields that do not fit the entity take
/// their defaults.
fn decode_body<T: DeserializeOwned + Default>(
    payload: Option<&Value>,
) -> Result<T, FrameErrorReason> {
    let body = match payload {
        Some(Value::String(encoded)) => serde_json::from_str::<Value>(encoded)
            .map_err(|e| FrameErrorReason::Malformed(format!("payload: {e}")))?,
        // Some servers embed the payload as an object rather than as text
        Some(value @ Value::Object(_)) => value.clone(),
        Some(_) | None => {
            return Err(FrameErrorReason::Malformed(
                "missing or non-text payload".to_owned(),
            ));
        }
    };

    Ok(decode_lenient(body))
}
