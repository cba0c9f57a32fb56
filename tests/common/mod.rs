#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests, and https://github.com/rust-lang/rust-clippy/issues/13981"
)]
#![allow(
    unused,
    reason = "Not every test binary uses every helper"
)]

use std::net::SocketAddr;
use std::time::Duration;

use fedi_streaming::streaming::{Config, Event};
use fedi_streaming::ws::{BackoffStrategy, Config as WsConfig};
use futures_util::{SinkExt as _, StreamExt as _};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::USER_AGENT;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;

pub const ACCESS_TOKEN: &str = "test-token";
pub const TEST_USER_AGENT: &str = "fedi-streaming-tests/1.0";

/// What the server saw in one opening handshake.
#[derive(Debug, Clone)]
pub struct Handshake {
    pub path: String,
    pub query: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone)]
enum ServerCommand {
    Text(String),
    Close(u16),
    /// Drop the TCP connection without a closing handshake
    Drop,
}

/// In-process streaming server.
pub struct MockStreamingServer {
    addr: SocketAddr,
    commands: broadcast::Sender<ServerCommand>,
    handshakes: mpsc::UnboundedReceiver<Handshake>,
    received: mpsc::UnboundedReceiver<String>,
}

impl MockStreamingServer {
    /// Start a server on a random port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (commands, _) = broadcast::channel::<ServerCommand>(100);
        let (handshake_tx, handshakes) = mpsc::unbounded_channel();
        let (received_tx, received) = mpsc::unbounded_channel();

        let server_commands = commands.clone();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };

                // Subscribe before the handshake completes so nothing sent after the
                // client sees the connection open is missed
                let mut command_rx = server_commands.subscribe();
                let handshake_tx = handshake_tx.clone();
                let received_tx = received_tx.clone();

                let callback = move |request: &Request, response: Response| {
                    let user_agent = request
                        .headers()
                        .get(USER_AGENT)
                        .and_then(|value| value.to_str().ok())
                        .map(str::to_owned);
                    drop(handshake_tx.send(Handshake {
                        path: request.uri().path().to_owned(),
                        query: request.uri().query().map(str::to_owned),
                        user_agent,
                    }));
                    Ok::<_, ErrorResponse>(response)
                };

                let Ok(ws_stream) = tokio_tungstenite::accept_hdr_async(stream, callback).await
                else {
                    continue;
                };

                let (mut write, mut read) = ws_stream.split();

                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            msg = read.next() => {
                                match msg {
                                    Some(Ok(Message::Text(text))) => {
                                        drop(received_tx.send(text.to_string()));
                                    }
                                    // Pings are answered by tungstenite on the next read
                                    Some(Ok(_)) => {}
                                    _ => break,
                                }
                            }
                            command = command_rx.recv() => {
                                match command {
                                    Ok(ServerCommand::Text(text)) => {
                                        if write.send(Message::Text(text.into())).await.is_err() {
                                            break;
                                        }
                                    }
                                    Ok(ServerCommand::Close(code)) => {
                                        let frame = CloseFrame {
                                            code: code.into(),
                                            reason: String::new().into(),
                                        };
                                        drop(write.send(Message::Close(Some(frame))).await);
                                        break;
                                    }
                                    Ok(ServerCommand::Drop) | Err(_) => break,
                                }
                            }
                        }
                    }
                });
            }
        });

        Self {
            addr,
            commands,
            handshakes,
            received,
        }
    }

    /// Base URL as a client would configure it.
    pub fn http_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Send a text frame to every connected client.
    pub fn send(&self, message: &str) {
        drop(self.commands.send(ServerCommand::Text(message.to_owned())));
    }

    pub fn close_all(&self, code: u16) {
        drop(self.commands.send(ServerCommand::Close(code)));
    }

    pub fn drop_all(&self) {
        drop(self.commands.send(ServerCommand::Drop));
    }

    /// Next opening handshake, if one happens within two seconds.
    pub async fn next_handshake(&mut self) -> Option<Handshake> {
        timeout(Duration::from_secs(2), self.handshakes.recv())
            .await
            .ok()
            .flatten()
    }

    /// Whether a client connects within `wait`.
    pub async fn handshake_within(&mut self, wait: Duration) -> bool {
        timeout(wait, self.handshakes.recv())
            .await
            .is_ok_and(|handshake| handshake.is_some())
    }

    /// Next text frame sent by a client.
    pub async fn next_received(&mut self) -> Option<String> {
        timeout(Duration::from_secs(2), self.received.recv())
            .await
            .ok()
            .flatten()
    }
}

/// Session settings with short delays so tests finish quickly.
pub fn fast_ws_config() -> WsConfig {
    let mut config = WsConfig::default();
    config.reconnect.strategy = BackoffStrategy::Fixed(Duration::from_millis(50));
    config
}

pub fn client_config(ws: WsConfig) -> Config {
    Config::builder()
        .access_token(ACCESS_TOKEN)
        .user_agent(TEST_USER_AGENT)
        .ws(ws)
        .build()
}

/// Wait for the next event with the given name, skipping any others.
pub async fn expect_event(events: &mut broadcast::Receiver<Event>, name: &str) -> Event {
    timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.unwrap();
            if event.name() == name {
                return event;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("no {name} event within 5s"))
}

/// Next event of any kind.
pub async fn next_event(events: &mut broadcast::Receiver<Event>) -> Event {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("no event within 5s")
        .unwrap()
}

pub mod payloads {
    use serde_json::{Value, json};

    pub fn status(id: &str) -> Value {
        json!({
            "id": id,
            "uri": format!("https://example.social/users/alice/statuses/{id}"),
            "url": format!("https://example.social/@alice/{id}"),
            "created_at": "2024-05-01T12:00:00.000Z",
            "content": "<p>hello from the timeline</p>",
            "visibility": "public",
            "sensitive": false,
            "spoiler_text": "",
            "media_attachments": [],
            "mentions": [],
            "tags": [{"name": "rust", "url": "https://example.social/tags/rust"}],
            "emojis": [],
            "account": {
                "id": "7",
                "username": "alice",
                "acct": "alice",
                "display_name": "Alice",
                "locked": false,
                "followers_count": 10,
                "following_count": 3,
                "statuses_count": 42,
            },
        })
    }

    pub fn notification(id: &str) -> Value {
        json!({
            "id": id,
            "type": "mention",
            "created_at": "2024-05-01T12:00:01.000Z",
            "account": {"id": "8", "username": "bob", "acct": "bob@remote.example"},
            "status": status("200"),
        })
    }

    /// Wrap a payload in the streaming envelope, JSON-encoding it as text.
    pub fn frame(event: &str, payload: &Value) -> String {
        json!({"event": event, "payload": payload.to_string()}).to_string()
    }

    pub fn delete(id: &str) -> String {
        json!({"event": "delete", "payload": id}).to_string()
    }
}
