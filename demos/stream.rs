//! Follow a timeline and log every event it produces.
//!
//! Run with tracing enabled:
//! ```sh
//! INSTANCE_URL=https://example.social/api/v1 ACCESS_TOKEN=... RUST_LOG=info cargo run --example stream --features tracing
//! ```
//!
//! `STREAM` selects the timeline (`user`, `localTimeline`, `hybridTimeline`,
//! `globalTimeline`, `conversation`, `list`); `LIST_ID` is needed for `list`.
//! `PROXY_URL` (`http://` or `socks5://`) routes the socket through a proxy.
//!
//! Optionally log to a file:
//! ```sh
//! LOG_FILE=stream.log RUST_LOG=info cargo run --example stream --features tracing
//! ```

use std::fs::File;

use fedi_streaming::streaming::{Client, Config, Event, StreamKind};
use fedi_streaming::ws::ProxyConfig;
use futures::StreamExt as _;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

fn stream_kind(name: &str) -> anyhow::Result<StreamKind> {
    Ok(match name {
        "user" => StreamKind::User,
        "localTimeline" => StreamKind::LocalTimeline,
        "hybridTimeline" => StreamKind::HybridTimeline,
        "globalTimeline" => StreamKind::GlobalTimeline,
        "conversation" => StreamKind::Conversation,
        "list" => StreamKind::List,
        other => anyhow::bail!("unknown stream {other}"),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Ok(path) = std::env::var("LOG_FILE") {
        let file = File::create(path)?;
        tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_ansi(false),
            )
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }

    let instance = std::env::var("INSTANCE_URL")?;
    let token = std::env::var("ACCESS_TOKEN")?;
    let stream = stream_kind(&std::env::var("STREAM").unwrap_or_else(|_| "user".to_owned()))?;
    let list_id = std::env::var("LIST_ID").ok();
    let proxy = std::env::var("PROXY_URL")
        .ok()
        .map(|url| ProxyConfig::from_url(&url))
        .transpose()?;

    let config = Config::builder()
        .access_token(token)
        .maybe_proxy(proxy)
        .build();
    let client = Client::new(&instance, config)?;
    let session = client.socket(stream, list_id)?;
    let mut events = Box::pin(session.events());

    info!(endpoint = %session.endpoint().base_url(), %stream, "following stream");

    while let Some(event) = events.next().await {
        match event {
            Ok(Event::Connect) => info!("connected"),
            Ok(Event::Update(status)) => info!(
                id = %status.id,
                account = %status.account.acct,
                created_at = %status.created_at,
                "update"
            ),
            Ok(Event::Notification(notification)) => info!(
                id = %notification.id,
                kind = ?notification.kind,
                from = %notification.account.acct,
                "notification"
            ),
            Ok(Event::Conversation(conversation)) => {
                info!(id = %conversation.id, unread = conversation.unread, "conversation");
            }
            Ok(Event::Delete(id)) => info!(%id, "delete"),
            Ok(Event::ParserError(e)) => warn!(error = %e, "undecodable frame"),
            Ok(Event::Error(e)) => error!(error = %e, "session error"),
            Ok(Event::Close) => {
                info!("stream closed by the server");
                break;
            }
            Ok(other) => info!(event = other.name()),
            Err(e) => warn!(error = %e, "event stream lagged"),
        }
    }

    Ok(())
}
