//! Core streaming-connection infrastructure.
//!
//! # Architecture
//!
//! - [`Session`]: one long-lived logical connection, run as a single task that owns all
//!   of its state; it binds transport signals to the frame parser, the heartbeat and the
//!   reconnection policy, and fans events out to any number of subscribers
//! - [`Transport`]: opens physical connections and reports what happens on them through a
//!   [`Listener`]; [`TungsteniteTransport`] is the production implementation
//! - [`HeartbeatMonitor`](heartbeat::HeartbeatMonitor): decides when to probe and when an
//!   unanswered probe means the connection is dead
//! - [`ReconnectSupervisor`](reconnect::ReconnectSupervisor): attempt accounting and delay
//!   policy for reconnection

pub mod config;
pub mod connection;
pub mod error;
pub mod heartbeat;
pub mod proxy;
pub mod reconnect;
pub mod traits;
pub mod transport;

pub use config::{BackoffStrategy, Config, ReconnectConfig};
pub use connection::{Session, SessionState, SessionStatus};
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use proxy::{ProxyAuth, ProxyConfig, ProxyProtocol};
pub use traits::*;
pub use transport::TungsteniteTransport;
