//! Liveness tracking for a transport that may be open but unresponsive.
//!
//! The monitor holds no timers itself. The session schedules a probe check one
//! heartbeat interval after every pong and asks the monitor whether a probe is due;
//! after sending one it schedules a probe-response timeout and asks the monitor
//! whether the probe is still outstanding when it fires. Clearing the outstanding
//! flag on the first pong, or on the first timeout, is what keeps stale or
//! overlapping timers from acting twice.

use std::time::Duration;

use tokio::time::Instant;

/// Slack subtracted from the interval so a check scheduled exactly one interval
/// after a pong still finds the probe due.
const PROBE_SLACK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    interval: Duration,
    last_pong: Instant,
    awaiting_pong: bool,
}

impl HeartbeatMonitor {
    #[must_use]
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            last_pong: now,
            awaiting_pong: false,
        }
    }

    /// Forget any outstanding probe and treat `now` as the last sign of life.
    pub fn reset(&mut self, now: Instant) {
        self.last_pong = now;
        self.awaiting_pong = false;
    }

    pub fn record_pong(&mut self, now: Instant) {
        self.last_pong = now;
        self.awaiting_pong = false;
    }

    /// Whether enough time has passed since the last pong to warrant a new probe.
    #[must_use]
    pub fn probe_due(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_pong) > self.interval.saturating_sub(PROBE_SLACK)
    }

    pub fn probe_sent(&mut self) {
        self.awaiting_pong = true;
    }

    /// Called when a probe-response timeout fires.
    ///
    /// Returns `true` exactly once per unanswered probe; the flag is cleared so a
    /// second timeout for the same probe is inert.
    pub fn expire_probe(&mut self) -> bool {
        std::mem::replace(&mut self.awaiting_pong, false)
    }

    #[must_use]
    pub fn is_awaiting_pong(&self) -> bool {
        self.awaiting_pong
    }

    #[must_use]
    pub fn last_pong(&self) -> Instant {
        self.last_pong
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }
}
