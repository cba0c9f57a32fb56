#![expect(
    clippy::module_name_repetitions,
    reason = "Session types expose their domain in the name for clarity"
)]

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_stream::try_stream;
use futures::Stream;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Instant, sleep};

use super::config::Config;
use super::error::WsError;
use super::heartbeat::HeartbeatMonitor;
use super::reconnect::ReconnectSupervisor;
use super::traits::{ConnectionId, Input, Listener, Signal, Transport, TransportHandle};
use super::transport::TungsteniteTransport;
use crate::Result;
use crate::streaming::{Endpoint, Event, parse};

/// RFC 6455 normal closure.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Lifecycle of a session.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No transport
    Idle,
    /// First connection attempt after `start` is in flight
    Connecting,
    /// Transport bound and open
    Open {
        /// When the transport reported it was open
        since: Instant,
    },
    /// Waiting for, or performing, a reconnection attempt
    Reconnecting {
        /// Attempt number since the last `start`
        attempt: u32,
    },
    /// Caller-initiated stop in progress
    Closing,
}

impl SessionState {
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open { .. })
    }
}

/// Observable state of a session.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: SessionState,
    /// Reconnection attempts made since the last `start`
    pub reconnect_attempts: u32,
}

/// Deferred callback scheduled by a session for one connection.
///
/// Timers are never cancelled; the session re-validates them against its current
/// connection and flags when they fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Timer {
    /// First probe after the transport opened
    InitialProbe(ConnectionId),
    /// Periodic probe check, scheduled one interval after every pong
    CheckAlive(ConnectionId),
    /// Deadline for the answer to an outstanding probe
    ProbeTimeout(ConnectionId),
    /// End of the reconnect backoff delay
    Reconnect(ConnectionId),
}

impl Timer {
    const fn connection(self) -> ConnectionId {
        match self {
            Self::InitialProbe(id)
            | Self::CheckAlive(id)
            | Self::ProbeTimeout(id)
            | Self::Reconnect(id) => id,
        }
    }
}

#[derive(Debug)]
enum Command {
    Start,
    Stop,
    Send(String),
}

/// A persistent, self-healing streaming connection.
///
/// All state lives in one background task; this handle only sends commands to it and
/// observes its output. Cloning is cheap and every clone controls the same session.
/// When the last clone is dropped the task closes its transport and exits.
///
/// # Example
///
/// ```rust, no_run
/// use fedi_streaming::streaming::{Endpoint, Event, StreamKind};
/// use fedi_streaming::types::{SecretString, Url};
/// use fedi_streaming::ws::{Config, Session};
///
/// # async fn run() -> fedi_streaming::Result<()> {
/// let url = Url::parse("wss://example.social/api/v1/streaming")?;
/// let endpoint = Endpoint::new(url, StreamKind::User, None)?
///     .with_access_token(SecretString::from("token"));
///
/// let session = Session::new(endpoint, Config::default());
/// let mut events = session.subscribe();
/// session.start()?;
///
/// while let Ok(event) = events.recv().await {
///     if let Event::Update(status) = event {
///         println!("{}: {}", status.account.acct, status.content);
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<Event>,
    status: watch::Receiver<SessionStatus>,
    endpoint: Endpoint,
}

impl Session {
    /// Create an idle session backed by a tokio-tungstenite transport.
    ///
    /// Must be called within a tokio runtime. Nothing connects until [`Session::start`].
    #[must_use]
    pub fn new(endpoint: Endpoint, config: Config) -> Self {
        Self::with_transport(endpoint, config, TungsteniteTransport::default())
    }

    /// Create an idle session that opens its connections through `transport`.
    #[must_use]
    pub fn with_transport<T: Transport>(endpoint: Endpoint, config: Config, transport: T) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let initial = SessionStatus {
            state: SessionState::Idle,
            reconnect_attempts: 0,
        };
        let (status_tx, status_rx) = watch::channel(initial);

        let actor = Actor {
            endpoint: endpoint.clone(),
            transport: Arc::new(transport),
            inputs: input_tx,
            events: events.clone(),
            status: status_tx,
            handle: None,
            connection: ConnectionId::default(),
            closed: true,
            heartbeat: HeartbeatMonitor::new(config.heartbeat_interval, Instant::now()),
            supervisor: ReconnectSupervisor::new(&config.reconnect),
            config,
        };
        tokio::spawn(actor.run(command_rx, input_rx));

        Self {
            inner: Arc::new(SessionInner {
                commands: command_tx,
                events,
                status: status_rx,
                endpoint,
            }),
        }
    }

    /// Connect, first tearing down any existing transport, and reset the attempt counter.
    pub fn start(&self) -> Result<()> {
        self.command(Command::Start)
    }

    /// Close the transport and suppress any reconnection until the next `start`.
    pub fn stop(&self) -> Result<()> {
        self.command(Command::Stop)
    }

    /// Send a message to the server over the current connection.
    ///
    /// Dropped if no connection is open; nothing is replayed after a reconnect.
    pub fn send<R: Serialize>(&self, request: &R) -> Result<()> {
        let json = serde_json::to_string(request)?;
        self.command(Command::Send(json))
    }

    fn command(&self, command: Command) -> Result<()> {
        self.inner
            .commands
            .send(command)
            .map_err(|_e| WsError::ConnectionClosed)?;
        Ok(())
    }

    /// Subscribe to session events.
    ///
    /// Each call returns an independent receiver that sees events emitted from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.events.subscribe()
    }

    /// Session events as a stream; a subscriber that falls behind gets [`WsError::Lagged`].
    pub fn events(&self) -> impl Stream<Item = Result<Event>> + use<> {
        let mut rx = self.subscribe();

        try_stream! {
            loop {
                match rx.recv().await {
                    Ok(event) => yield event,
                    Err(RecvError::Lagged(count)) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!("Session subscriber lagged, missed {count} events");
                        Err(WsError::Lagged { count })?;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        *self.inner.status.borrow()
    }

    /// Watch status changes, e.g. to detect reconnections.
    #[must_use]
    pub fn status_receiver(&self) -> watch::Receiver<SessionStatus> {
        self.inner.status.clone()
    }

    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.endpoint
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.inner.endpoint)
            .field("status", &self.status())
            .finish()
    }
}

/// The single owner of a session's mutable state.
struct Actor {
    endpoint: Endpoint,
    config: Config,
    transport: Arc<dyn Transport>,
    inputs: mpsc::UnboundedSender<Input>,
    events: broadcast::Sender<Event>,
    status: watch::Sender<SessionStatus>,
    handle: Option<Box<dyn TransportHandle>>,
    /// Identity of the current connection; signals and timers for any other are stale
    connection: ConnectionId,
    /// Set by `stop` (and initially); suppresses probes and reconnection
    closed: bool,
    heartbeat: HeartbeatMonitor,
    supervisor: ReconnectSupervisor,
}

impl Actor {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut inputs: mpsc::UnboundedReceiver<Input>,
    ) {
        loop {
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(Command::Start) => self.start(),
                    Some(Command::Stop) => self.stop(),
                    Some(Command::Send(text)) => self.send(text),
                    None => break,
                },

                Some(input) = inputs.recv() => match input {
                    Input::Signal(connection, signal) => self.on_signal(connection, signal),
                    Input::Timer(timer) => self.on_timer(timer),
                },
            }
        }

        // Every handle is gone
        self.closed = true;
        self.teardown();

        #[cfg(feature = "tracing")]
        tracing::debug!("Session task finished");
    }

    fn start(&mut self) {
        self.closed = false;
        self.supervisor.reset();
        self.connect(SessionState::Connecting);
    }

    fn stop(&mut self) {
        self.closed = true;
        self.set_state(SessionState::Closing);
        self.teardown();
        self.heartbeat.reset(Instant::now());
        self.supervisor.reset();
        self.set_state(SessionState::Idle);

        #[cfg(feature = "tracing")]
        tracing::debug!("Session stopped");
    }

    fn send(&self, text: String) {
        match &self.handle {
            Some(handle) => handle.send(text),
            None => {
                #[cfg(feature = "tracing")]
                tracing::debug!(%text, "No open connection, dropping outgoing message");
                #[cfg(not(feature = "tracing"))]
                let _ = &text;
            }
        }
    }

    /// Replace the current transport with a freshly opened one.
    fn connect(&mut self, state: SessionState) {
        self.teardown();

        #[cfg(feature = "tracing")]
        tracing::debug!(
            connection = %self.connection,
            url = %self.endpoint.base_url(),
            stream = %self.endpoint.stream(),
            authenticated = self.endpoint.has_access_token(),
            "Opening streaming connection"
        );

        let listener = Listener::new(self.connection, self.inputs.clone());
        self.handle = Some(self.transport.open(&self.endpoint, listener));
        self.heartbeat.reset(Instant::now());
        self.set_state(state);
    }

    /// Close the current handle, if any, and retire its connection id.
    fn teardown(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.close(NORMAL_CLOSURE);
        }
        self.connection = self.connection.next();
    }

    fn on_signal(&mut self, connection: ConnectionId, signal: Signal) {
        if connection != self.connection {
            #[cfg(feature = "tracing")]
            tracing::trace!(%connection, current = %self.connection, ?signal, "Dropping stale signal");
            return;
        }

        match signal {
            Signal::Open => {
                #[cfg(feature = "tracing")]
                tracing::debug!(%connection, "Streaming connection open");

                let now = Instant::now();
                self.heartbeat.reset(now);
                self.supervisor.connection_established();
                self.set_state(SessionState::Open { since: now });
                self.emit(Event::Connect);
                self.schedule(
                    self.config.initial_probe_delay,
                    Timer::InitialProbe(connection),
                );
            }
            Signal::Message(frame) => {
                #[cfg(feature = "tracing")]
                tracing::trace!(%connection, ?frame, "Received frame");

                let event = Event::from(parse(&frame));

                #[cfg(feature = "tracing")]
                if let Event::ParserError(e) = &event {
                    tracing::warn!(raw = %e.raw, error = %e, "Failed to decode frame");
                }

                self.emit(event);
            }
            Signal::Pong => {
                self.heartbeat.record_pong(Instant::now());
                self.emit(Event::Pong);
                self.schedule(
                    self.heartbeat.interval(),
                    Timer::CheckAlive(connection),
                );
            }
            Signal::Close { code, reason } => {
                self.handle = None;
                self.heartbeat.reset(Instant::now());

                if code == NORMAL_CLOSURE {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(%connection, %reason, "Streaming connection closed normally");
                    #[cfg(not(feature = "tracing"))]
                    let _ = &reason;

                    self.set_state(SessionState::Idle);
                    self.emit(Event::Close);
                } else {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(%connection, code, %reason, "Streaming connection closed abnormally");
                    #[cfg(not(feature = "tracing"))]
                    let _ = &reason;

                    self.schedule_reconnect();
                }
            }
            Signal::Error(e) => {
                #[cfg(feature = "tracing")]
                tracing::error!(%connection, error = %e, "Streaming transport error");

                self.emit(Event::from(e));
            }
        }
    }

    fn on_timer(&mut self, timer: Timer) {
        if timer.connection() != self.connection || self.closed {
            return;
        }

        match timer {
            Timer::InitialProbe(_) => {
                if self.handle.is_some() {
                    self.probe();
                }
            }
            Timer::CheckAlive(_) => {
                if self.handle.is_some()
                    && !self.heartbeat.is_awaiting_pong()
                    && self.heartbeat.probe_due(Instant::now())
                {
                    self.probe();
                }
            }
            Timer::ProbeTimeout(_) => {
                if self.heartbeat.expire_probe() {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        connection = %self.connection,
                        timeout = ?self.config.probe_timeout,
                        since_last_pong = ?self.heartbeat.last_pong().elapsed(),
                        "No pong received, connection considered dead"
                    );

                    // Anything the dead transport reports from here on is stale
                    self.teardown();
                    self.schedule_reconnect();
                }
            }
            Timer::Reconnect(_) => match self.supervisor.try_begin_attempt() {
                Some(attempt) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(attempt, "Reconnecting");

                    self.connect(SessionState::Reconnecting { attempt });
                }
                None => {
                    let attempts = self.supervisor.attempts();

                    #[cfg(feature = "tracing")]
                    tracing::error!(attempts, "Reconnection attempts exhausted");

                    self.teardown();
                    self.set_state(SessionState::Idle);
                    self.emit(Event::from(crate::Error::from(WsError::ReconnectExhausted {
                        attempts,
                    })));
                }
            },
        }
    }

    fn probe(&mut self) {
        let Some(handle) = &self.handle else {
            return;
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(connection = %self.connection, "Sending liveness probe");

        handle.ping();
        self.heartbeat.probe_sent();
        self.schedule(
            self.config.probe_timeout,
            Timer::ProbeTimeout(self.connection),
        );
    }

    fn schedule_reconnect(&mut self) {
        if self.closed {
            return;
        }

        let delay = self.supervisor.next_delay();
        let attempt = self.supervisor.attempts().saturating_add(1);

        #[cfg(feature = "tracing")]
        tracing::debug!(attempt, ?delay, "Scheduling reconnection");

        self.set_state(SessionState::Reconnecting { attempt });
        self.schedule(delay, Timer::Reconnect(self.connection));
    }

    fn schedule(&self, delay: Duration, timer: Timer) {
        let inputs = self.inputs.clone();
        tokio::spawn(async move {
            sleep(delay).await;
            // The session may be gone by now
            _ = inputs.send(Input::Timer(timer));
        });
    }

    fn emit(&self, event: Event) {
        // No subscribers is not an error
        _ = self.events.send(event);
    }

    fn set_state(&self, state: SessionState) {
        self.status.send_replace(SessionStatus {
            state,
            reconnect_attempts: self.supervisor.attempts(),
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;
    use crate::streaming::StreamKind;
    use crate::types::Url;
    use crate::ws::config::{BackoffStrategy, ReconnectConfig};
    use crate::ws::traits::Frame;

    #[derive(Debug, Default)]
    struct HandleState {
        pings: usize,
        sent: Vec<String>,
        closed: Option<u16>,
    }

    struct MockConnection {
        listener: Listener,
        state: Arc<Mutex<HandleState>>,
    }

    struct MockHandle(Arc<Mutex<HandleState>>);

    impl TransportHandle for MockHandle {
        fn send(&self, text: String) {
            self.0.lock().unwrap().sent.push(text);
        }

        fn ping(&self) {
            self.0.lock().unwrap().pings += 1;
        }

        fn close(&self, code: u16) {
            self.0.lock().unwrap().closed = Some(code);
        }
    }

    #[derive(Clone, Default)]
    struct MockTransport {
        connections: Arc<Mutex<Vec<MockConnection>>>,
    }

    impl MockTransport {
        fn count(&self) -> usize {
            self.connections.lock().unwrap().len()
        }

        fn emit(&self, index: usize, signal: Signal) {
            let connections = self.connections.lock().unwrap();
            assert!(connections[index].listener.emit(signal));
        }

        fn pings(&self, index: usize) -> usize {
            self.connections.lock().unwrap()[index].state.lock().unwrap().pings
        }

        fn sent(&self, index: usize) -> Vec<String> {
            self.connections.lock().unwrap()[index].state.lock().unwrap().sent.clone()
        }

        fn closed(&self, index: usize) -> Option<u16> {
            self.connections.lock().unwrap()[index].state.lock().unwrap().closed
        }
    }

    impl Transport for MockTransport {
        fn open(&self, _endpoint: &Endpoint, listener: Listener) -> Box<dyn TransportHandle> {
            let state = Arc::new(Mutex::new(HandleState::default()));
            self.connections.lock().unwrap().push(MockConnection {
                listener,
                state: Arc::clone(&state),
            });
            Box::new(MockHandle(state))
        }
    }

    fn endpoint() -> Endpoint {
        let url = Url::parse("wss://example.social/api/v1/streaming").unwrap();
        Endpoint::new(url, StreamKind::User, None).unwrap()
    }

    fn config(max_attempts: Option<u32>) -> Config {
        Config {
            reconnect: ReconnectConfig {
                max_attempts,
                strategy: BackoffStrategy::Fixed(Duration::from_secs(1)),
            },
            ..Config::default()
        }
    }

    fn session(config: Config) -> (Session, MockTransport, broadcast::Receiver<Event>) {
        let transport = MockTransport::default();
        let session = Session::with_transport(endpoint(), config, transport.clone());
        let events = session.subscribe();
        (session, transport, events)
    }

    /// Let the session task drain its queues without advancing past any timer.
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    fn drain(events: &mut broadcast::Receiver<Event>) -> Vec<&'static str> {
        let mut names = Vec::new();
        loop {
            match events.try_recv() {
                Ok(event) => names.push(event.name()),
                Err(TryRecvError::Empty | TryRecvError::Closed) => return names,
                Err(TryRecvError::Lagged(_)) => {}
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn abnormal_close_reconnects_once_after_backoff() {
        let (session, transport, mut events) = session(config(None));
        session.start().unwrap();
        settle().await;
        transport.emit(0, Signal::Open);
        settle().await;
        assert!(session.status().state.is_open());
        assert_eq!(drain(&mut events), ["connect"]);

        transport.emit(0, Signal::Close { code: 1006, reason: String::new() });
        settle().await;
        assert_eq!(
            session.status().state,
            SessionState::Reconnecting { attempt: 1 }
        );

        sleep(Duration::from_millis(900)).await;
        assert_eq!(transport.count(), 1);

        sleep(Duration::from_millis(200)).await;
        assert_eq!(transport.count(), 2);
        assert_eq!(session.status().reconnect_attempts, 1);

        sleep(Duration::from_secs(30)).await;
        assert_eq!(transport.count(), 2);
        assert_eq!(session.status().reconnect_attempts, 1);
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn normal_close_emits_close_without_reconnect() {
        let (session, transport, mut events) = session(config(None));
        session.start().unwrap();
        settle().await;
        transport.emit(0, Signal::Open);
        transport.emit(0, Signal::Close { code: 1000, reason: "bye".to_owned() });
        settle().await;

        sleep(Duration::from_secs(5)).await;
        assert_eq!(transport.count(), 1);
        assert_eq!(session.status().state, SessionState::Idle);
        assert_eq!(drain(&mut events), ["connect", "close"]);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_signals_after_stop_are_inert() {
        let (session, transport, mut events) = session(config(None));
        session.start().unwrap();
        settle().await;
        transport.emit(0, Signal::Open);
        settle().await;

        session.stop().unwrap();
        settle().await;
        assert_eq!(transport.closed(0), Some(NORMAL_CLOSURE));
        assert_eq!(session.status().state, SessionState::Idle);

        transport.emit(0, Signal::Pong);
        transport.emit(0, Signal::Close { code: 1006, reason: String::new() });
        sleep(Duration::from_secs(120)).await;

        assert_eq!(transport.count(), 1);
        assert_eq!(transport.pings(0), 0);
        assert_eq!(drain(&mut events), ["connect"]);
        assert_eq!(session.status().state, SessionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_timeout_reconnects_exactly_once() {
        let (session, transport, mut events) = session(config(None));
        session.start().unwrap();
        settle().await;
        transport.emit(0, Signal::Open);
        settle().await;

        sleep(Duration::from_millis(10_100)).await;
        assert_eq!(transport.pings(0), 1);

        // Probe timeout at 20s, reconnect 1s later
        sleep(Duration::from_secs(11)).await;
        assert_eq!(transport.count(), 2);
        assert_eq!(transport.closed(0), Some(NORMAL_CLOSURE));

        sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.count(), 2);
        assert_eq!(session.status().reconnect_attempts, 1);
        assert_eq!(drain(&mut events), ["connect"]);
    }

    #[tokio::test(start_paused = true)]
    async fn pong_keeps_connection_alive() {
        let (session, transport, mut events) = session(config(None));
        session.start().unwrap();
        settle().await;
        transport.emit(0, Signal::Open);
        settle().await;

        sleep(Duration::from_millis(10_100)).await;
        assert_eq!(transport.pings(0), 1);
        transport.emit(0, Signal::Pong);
        settle().await;

        sleep(Duration::from_secs(30)).await;
        assert_eq!(transport.count(), 1);
        assert!(session.status().state.is_open());

        // Next probe one interval after the pong
        sleep(Duration::from_secs(31)).await;
        assert_eq!(transport.pings(0), 2);
        transport.emit(0, Signal::Pong);
        settle().await;

        sleep(Duration::from_secs(20)).await;
        assert_eq!(transport.count(), 1);
        assert_eq!(drain(&mut events), ["connect", "pong", "pong"]);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_pongs_send_one_ping() {
        let (session, transport, mut events) = session(config(None));
        session.start().unwrap();
        settle().await;
        transport.emit(0, Signal::Open);
        settle().await;

        sleep(Duration::from_millis(10_100)).await;
        assert_eq!(transport.pings(0), 1);
        transport.emit(0, Signal::Pong);
        transport.emit(0, Signal::Pong);
        settle().await;
        sleep(Duration::from_millis(500)).await;
        transport.emit(0, Signal::Pong);
        settle().await;

        // Three checks fall due around 70s; only the first one pings
        sleep(Duration::from_secs(61)).await;
        assert_eq!(transport.pings(0), 2);
        assert_eq!(transport.count(), 1);

        // That ping goes unanswered and times out once
        sleep(Duration::from_secs(10)).await;
        assert_eq!(transport.count(), 2);
        sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.count(), 2);
        assert_eq!(transport.pings(0), 2);
        assert_eq!(session.status().reconnect_attempts, 1);
        assert_eq!(drain(&mut events), ["connect", "pong", "pong", "pong"]);
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_periodic_ping_reconnects_once() {
        let (session, transport, mut events) = session(config(None));
        session.start().unwrap();
        settle().await;
        transport.emit(0, Signal::Open);
        settle().await;

        sleep(Duration::from_millis(10_100)).await;
        transport.emit(0, Signal::Pong);
        settle().await;

        // Periodic ping at 70.1s
        sleep(Duration::from_millis(60_500)).await;
        assert_eq!(transport.pings(0), 2);

        // Timeout at 80.1s closes the dead connection, reconnect follows at 81.1s
        sleep(Duration::from_secs(10)).await;
        assert_eq!(transport.count(), 1);
        assert_eq!(transport.closed(0), Some(NORMAL_CLOSURE));
        assert_eq!(
            session.status().state,
            SessionState::Reconnecting { attempt: 1 }
        );

        // Late signals from the dead connection change nothing
        transport.emit(0, Signal::Close { code: 1006, reason: String::new() });
        sleep(Duration::from_secs(1)).await;
        assert_eq!(transport.count(), 2);

        sleep(Duration::from_secs(120)).await;
        assert_eq!(transport.count(), 2);
        assert_eq!(session.status().reconnect_attempts, 1);
        assert_eq!(drain(&mut events), ["connect", "pong"]);
    }

    #[tokio::test(start_paused = true)]
    async fn status_receiver_follows_reconnection() {
        let (session, transport, _events) = session(config(None));
        let mut status = session.status_receiver();
        assert_eq!(status.borrow_and_update().state, SessionState::Idle);

        session.start().unwrap();
        settle().await;
        transport.emit(0, Signal::Open);
        let state = status.wait_for(|s| s.state.is_open()).await.unwrap().state;
        assert!(state.is_open());

        transport.emit(0, Signal::Close { code: 1006, reason: String::new() });
        let state = status
            .wait_for(|s| !s.state.is_open())
            .await
            .unwrap()
            .state;
        assert_eq!(state, SessionState::Reconnecting { attempt: 1 });

        let current = *status.wait_for(|s| s.reconnect_attempts == 1).await.unwrap();
        assert_eq!(current.state, SessionState::Reconnecting { attempt: 1 });
        assert_eq!(transport.count(), 2);

        transport.emit(1, Signal::Open);
        let current = *status.wait_for(|s| s.state.is_open()).await.unwrap();
        assert_eq!(current.reconnect_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_attempts_surface_terminal_error() {
        let (session, transport, mut events) = session(config(Some(2)));
        session.start().unwrap();
        settle().await;

        for index in 0..3 {
            transport.emit(index, Signal::Close { code: 1006, reason: String::new() });
            sleep(Duration::from_millis(1_100)).await;
        }

        assert_eq!(transport.count(), 3);
        assert_eq!(session.status().state, SessionState::Idle);
        assert_eq!(session.status().reconnect_attempts, 2);

        let Ok(Event::Error(error)) = events.try_recv() else {
            panic!("expected the exhaustion error");
        };
        assert!(matches!(
            error.downcast_ref::<WsError>(),
            Some(WsError::ReconnectExhausted { attempts: 2 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn start_resets_attempts_and_replaces_transport() {
        let (session, transport, _events) = session(config(None));
        session.start().unwrap();
        settle().await;
        transport.emit(0, Signal::Close { code: 1006, reason: String::new() });
        sleep(Duration::from_millis(1_100)).await;
        assert_eq!(session.status().reconnect_attempts, 1);

        session.start().unwrap();
        settle().await;

        assert_eq!(transport.count(), 3);
        assert_eq!(transport.closed(1), Some(NORMAL_CLOSURE));
        assert_eq!(
            session.status(),
            SessionStatus {
                state: SessionState::Connecting,
                reconnect_attempts: 0,
            }
        );

        // The replaced connection no longer routes anything
        transport.emit(1, Signal::Close { code: 1006, reason: String::new() });
        sleep(Duration::from_secs(5)).await;
        assert_eq!(transport.count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn frames_are_routed_by_event_name() {
        let (session, transport, mut events) = session(config(None));
        session.start().unwrap();
        settle().await;
        transport.emit(0, Signal::Open);
        transport.emit(
            0,
            Signal::Message(Frame::from(r#"{"event":"delete","payload":"77"}"#)),
        );
        transport.emit(0, Signal::Message(Frame::from("")));
        transport.emit(0, Signal::Message(Frame::Binary(vec![0])));
        transport.emit(0, Signal::Message(Frame::from("{oops")));
        settle().await;

        assert_eq!(
            drain(&mut events),
            ["connect", "delete", "heartbeat", "heartbeat", "parser-error"]
        );
        assert!(session.status().state.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_is_forwarded_without_state_change() {
        let (session, transport, mut events) = session(config(None));
        session.start().unwrap();
        settle().await;
        transport.emit(0, Signal::Open);
        transport.emit(
            0,
            Signal::Error(std::io::Error::other("connection reset").into()),
        );
        settle().await;

        assert_eq!(drain(&mut events), ["connect", "error"]);
        assert!(session.status().state.is_open());
        assert_eq!(transport.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn outgoing_messages_reach_current_connection() {
        let (session, transport, _events) = session(config(None));
        session.send(&serde_json::json!({"type": "ignored"})).unwrap();
        session.start().unwrap();
        settle().await;

        session
            .send(&serde_json::json!({"type": "subscribe", "stream": "hashtag"}))
            .unwrap();
        settle().await;

        assert_eq!(
            transport.sent(0),
            [r#"{"stream":"hashtag","type":"subscribe"}"#]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_last_handle_closes_transport() {
        let (session, transport, _events) = session(config(None));
        session.start().unwrap();
        settle().await;
        transport.emit(0, Signal::Open);
        settle().await;

        let clone = session.clone();
        drop(session);
        settle().await;
        assert_eq!(transport.closed(0), None);

        drop(clone);
        settle().await;
        assert_eq!(transport.closed(0), Some(NORMAL_CLOSURE));
    }
}
