//! Timing and retry limits for a swap sequence.

use std::time::Duration;

use crate::config::PollerSettings;

#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Upper bound on status checks for one job.
    pub max_attempts: u32,
    /// Pause between consecutive status checks.
    pub interval: Duration,
    /// Optional wall-clock budget, measured from a successful submission.
    pub deadline: Option<Duration>,
    /// Extra detection attempts after a transient failure or rejected token.
    pub detect_retries: u32,
    pub retry_delay: Duration,
}

impl PollPolicy {
    pub fn from_settings(settings: &PollerSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            interval: Duration::from_secs(settings.interval_secs),
            deadline: settings.deadline_secs.map(Duration::from_secs),
            detect_retries: settings.detect_retries,
            retry_delay: Duration::from_millis(settings.retry_delay_ms),
        }
    }

    /// Longest time the polling phase can take when nothing goes wrong,
    /// ignoring the duration of the status calls themselves.
    pub fn max_polling_time(&self) -> Duration {
        let by_attempts = self
            .interval
            .checked_mul(self.max_attempts.saturating_sub(1))
            .unwrap_or(Duration::MAX);
        match self.deadline {
            Some(deadline) => by_attempts.min(deadline),
            None => by_attempts,
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from_settings(&PollerSettings::default())
    }
}
