#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use backoff::backoff::{Backoff, Constant};
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};

const DEFAULT_HEARTBEAT_INTERVAL_DURATION: Duration = Duration::from_secs(60);
const DEFAULT_PROBE_TIMEOUT_DURATION: Duration = Duration::from_secs(10);
const DEFAULT_INITIAL_PROBE_DELAY_DURATION: Duration = Duration::from_secs(10);
const DEFAULT_RECONNECT_DELAY_DURATION: Duration = Duration::from_secs(1);
const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Configuration for session liveness and recovery behavior.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct Config {
    /// Cadence of liveness probes once the server has answered at least one of them
    pub heartbeat_interval: Duration,
    /// How long a probe may stay unanswered before the connection is considered dead
    pub probe_timeout: Duration,
    /// Delay between the transport opening and the first probe
    pub initial_probe_delay: Duration,
    /// Capacity of the broadcast buffer used to fan events out to subscribers
    pub event_capacity: usize,
    /// Reconnection strategy configuration
    pub reconnect: ReconnectConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL_DURATION,
            probe_timeout: DEFAULT_PROBE_TIMEOUT_DURATION,
            initial_probe_delay: DEFAULT_INITIAL_PROBE_DELAY_DURATION,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Configuration for automatic reconnection behavior.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of reconnection attempts between two explicit starts.
    /// `None` means infinite retries.
    pub max_attempts: Option<u32>,
    /// Delay policy applied before every reconnection attempt
    pub strategy: BackoffStrategy,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            strategy: BackoffStrategy::default(),
        }
    }
}

/// Delay policy between a connection loss and the next attempt.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffStrategy {
    /// Always wait the same amount of time
    Fixed(Duration),
    /// Exponential growth with randomized jitter, capped at `max`
    Exponential {
        /// Delay before the first attempt
        initial: Duration,
        /// Upper bound for any single delay
        max: Duration,
        /// Growth factor applied after every attempt
        multiplier: f64,
    },
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::Fixed(DEFAULT_RECONNECT_DELAY_DURATION)
    }
}

impl BackoffStrategy {
    /// Build the stateful delay generator for this policy.
    pub(crate) fn build(&self) -> Box<dyn Backoff + Send> {
        match self {
            Self::Fixed(delay) => Box::new(Constant::new(*delay)),
            Self::Exponential {
                initial,
                max,
                multiplier,
            } => {
                let backoff: ExponentialBackoff = ExponentialBackoffBuilder::default()
                    .with_initial_interval(*initial)
                    .with_max_interval(*max)
                    .with_multiplier(*multiplier)
                    .with_max_elapsed_time(None) // We handle max attempts separately
                    .build();
                Box::new(backoff)
            }
        }
    }
}
