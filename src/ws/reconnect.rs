use std::fmt;
use std::time::Duration;

use backoff::backoff::Backoff;

use super::config::ReconnectConfig;

/// Attempt accounting and delay policy for re-establishing a dropped connection.
///
/// The attempt counter only goes back to zero through [`ReconnectSupervisor::reset`],
/// which the session calls on an explicit start. Successive reconnects keep counting
/// even when they succeed; only the delay growth is rewound when a connection opens.
pub struct ReconnectSupervisor {
    max_attempts: Option<u32>,
    attempts: u32,
    backoff: Box<dyn Backoff + Send>,
}

impl ReconnectSupervisor {
    #[must_use]
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            attempts: 0,
            backoff: config.strategy.build(),
        }
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
        self.backoff.reset();
    }

    /// Rewind the delay policy after a connection opened.
    pub fn connection_established(&mut self) {
        self.backoff.reset();
    }

    /// Delay to wait before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        // Neither strategy gives up on its own; attempts are bounded by `try_begin_attempt`
        self.backoff.next_backoff().unwrap_or_default()
    }

    /// Account for a new attempt, or return `None` if the configured maximum is reached.
    pub fn try_begin_attempt(&mut self) -> Option<u32> {
        if let Some(max) = self.max_attempts
            && self.attempts >= max
        {
            return None;
        }

        self.attempts = self.attempts.saturating_add(1);
        Some(self.attempts)
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl fmt::Debug for ReconnectSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconnectSupervisor")
            .field("max_attempts", &self.max_attempts)
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}
