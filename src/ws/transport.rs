//! [`Transport`] implementation on top of tokio-tungstenite.

use futures::{SinkExt as _, StreamExt as _};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest as _;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, USER_AGENT};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, client_async_tls_with_config, connect_async};
use tokio_util::sync::CancellationToken;

use super::error::WsError;
use super::traits::{Frame, Listener, Signal, Transport, TransportHandle};
use crate::Result;
use crate::streaming::Endpoint;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Close code reported when the peer closed without sending a status.
const NO_STATUS_RECEIVED: u16 = 1005;
/// Close code reported when the connection dropped without a close frame.
const ABNORMAL_CLOSURE: u16 = 1006;
const NORMAL_CLOSURE: u16 = 1000;

/// Opens one tokio task per connection, speaking WebSocket over TCP (optionally TLS,
/// optionally through the endpoint's proxy).
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteTransport;

impl Transport for TungsteniteTransport {
    fn open(&self, endpoint: &Endpoint, listener: Listener) -> Box<dyn TransportHandle> {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        tokio::spawn(run(endpoint.clone(), listener, commands_rx, cancel.clone()));

        Box::new(TungsteniteHandle {
            commands: commands_tx,
            cancel,
        })
    }
}

#[derive(Debug)]
enum Outgoing {
    Text(String),
    Ping,
    Close(u16),
}

struct TungsteniteHandle {
    commands: mpsc::UnboundedSender<Outgoing>,
    /// Aborts a connect that is still in progress
    cancel: CancellationToken,
}

impl TransportHandle for TungsteniteHandle {
    fn send(&self, text: String) {
        _ = self.commands.send(Outgoing::Text(text));
    }

    fn ping(&self) {
        _ = self.commands.send(Outgoing::Ping);
    }

    fn close(&self, code: u16) {
        _ = self.commands.send(Outgoing::Close(code));
        self.cancel.cancel();
    }
}

async fn run(
    endpoint: Endpoint,
    listener: Listener,
    mut commands: mpsc::UnboundedReceiver<Outgoing>,
    cancel: CancellationToken,
) {
    let connected = tokio::select! {
        () = cancel.cancelled() => {
            listener.emit(Signal::Close {
                code: NORMAL_CLOSURE,
                reason: "closed before the connection opened".to_owned(),
            });
            return;
        }
        result = connect(&endpoint) => result,
    };

    let mut ws_stream = match connected {
        Ok(ws_stream) => ws_stream,
        Err(e) => {
            #[cfg(feature = "tracing")]
            tracing::warn!(connection = %listener.connection(), "Unable to connect: {e:?}");

            fail(&listener, e);
            return;
        }
    };

    if !listener.emit(Signal::Open) {
        // Session gone before it saw the connection
        _ = ws_stream.send(close_message(NORMAL_CLOSURE)).await;
        return;
    }

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            incoming = read.next() => {
                let signal = match incoming {
                    Some(Ok(Message::Text(text))) => {
                        Signal::Message(Frame::Text(text.as_str().to_owned()))
                    }
                    Some(Ok(Message::Binary(bytes))) => Signal::Message(Frame::Binary(bytes.to_vec())),
                    Some(Ok(Message::Pong(_))) => Signal::Pong,
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame.map_or_else(
                            || (NO_STATUS_RECEIVED, String::new()),
                            |frame| (u16::from(frame.code), frame.reason.as_str().to_owned()),
                        );
                        listener.emit(Signal::Close { code, reason });
                        return;
                    }
                    // Pings are answered by tungstenite itself
                    Some(Ok(Message::Ping(_) | Message::Frame(_))) => continue,
                    Some(Err(e)) => {
                        fail(&listener, e.into());
                        return;
                    }
                    None => {
                        listener.emit(Signal::Close {
                            code: ABNORMAL_CLOSURE,
                            reason: "connection dropped".to_owned(),
                        });
                        return;
                    }
                };

                if !listener.emit(signal) {
                    // Session gone
                    _ = write.send(close_message(NORMAL_CLOSURE)).await;
                    return;
                }
            }

            outgoing = commands.recv() => {
                let (message, closing) = match outgoing {
                    Some(Outgoing::Text(text)) => (Message::Text(text.into()), None),
                    Some(Outgoing::Ping) => (Message::Ping(Vec::<u8>::new().into()), None),
                    Some(Outgoing::Close(code)) => (close_message(code), Some(code)),
                    None => (close_message(NORMAL_CLOSURE), Some(NORMAL_CLOSURE)),
                };

                if let Err(e) = write.send(message).await {
                    fail(&listener, e.into());
                    return;
                }

                if let Some(code) = closing {
                    listener.emit(Signal::Close { code, reason: String::new() });
                    return;
                }
            }
        }
    }
}

async fn connect(endpoint: &Endpoint) -> Result<WsStream> {
    let url = endpoint.request_url();
    let mut request = url.as_str().into_client_request()?;
    request
        .headers_mut()
        .insert(USER_AGENT, HeaderValue::from_str(endpoint.user_agent())?);

    let (ws_stream, _) = match endpoint.proxy() {
        None => connect_async(request).await?,
        Some(proxy) => {
            let host = url
                .host_str()
                .ok_or_else(|| WsError::InvalidEndpoint("missing host".to_owned()))?;
            let port = url
                .port_or_known_default()
                .ok_or_else(|| WsError::InvalidEndpoint("missing port".to_owned()))?;
            let stream = proxy.tunnel(host, port).await?;

            client_async_tls_with_config(request, stream, None, None).await?
        }
    };

    Ok(ws_stream)
}

fn close_message(code: u16) -> Message {
    Message::Close(Some(CloseFrame {
        code: CloseCode::from(code),
        reason: String::new().into(),
    }))
}

/// Report a failure followed by the abnormal closure it implies.
fn fail(listener: &Listener, error: crate::Error) {
    if listener.emit(Signal::Error(error)) {
        listener.emit(Signal::Close {
            code: ABNORMAL_CLOSURE,
            reason: String::new(),
        });
    }
}
