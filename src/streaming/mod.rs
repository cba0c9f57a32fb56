#![expect(
    clippy::module_name_repetitions,
    reason = "Re-exported names intentionally match their modules for API clarity"
)]

//! Fediverse streaming protocol on top of [`crate::ws`].
//!
//! A server pushes timeline activity over a WebSocket as `{"event", "payload"}`
//! envelopes. This module describes which stream to open ([`Endpoint`]), decodes
//! frames ([`parse`]) into the caller-facing [`Event`] surface, and provides a
//! [`Client`] that opens authenticated sockets.
//!
//! # Example
//!
//! ```rust, no_run
//! use fedi_streaming::streaming::{Client, Config, Event, StreamKind};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = Client::new(
//!         "https://example.social/api/v1",
//!         Config::builder().access_token("token").build(),
//!     )?;
//!     let session = client.socket(StreamKind::LocalTimeline, None)?;
//!     let mut events = session.subscribe();
//!
//!     while let Ok(event) = events.recv().await {
//!         match event {
//!             Event::Update(status) => println!("new: {}", status.id),
//!             Event::Delete(id) => println!("deleted: {id}"),
//!             Event::ParserError(e) => eprintln!("bad frame: {e}"),
//!             _ => {}
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod endpoint;
pub mod event;
pub mod parser;
pub mod types;

pub use client::{Client, Config};
pub use endpoint::{Endpoint, StreamKind};
pub use event::Event;
pub use parser::{DecodedEvent, FrameError, FrameErrorReason, parse};
pub use types::response::{
    Account, Application, Attachment, AttachmentType, Conversation, Emoji, Mention, Notification,
    NotificationType, Status, Tag, Visibility,
};
