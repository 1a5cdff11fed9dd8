use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::time::Duration;

/// Exponential delay between restarts of a long-running session.
pub struct RestartPolicy {
    backoff: ExponentialBackoff,
    max_interval: Duration,
}

impl RestartPolicy {
    pub fn new(initial_interval: Duration, max_interval: Duration) -> Self {
        Self::from_backoff(ExponentialBackoff {
            current_interval: initial_interval,
            initial_interval,
            max_interval,
            max_elapsed_time: None,
            ..Default::default()
        })
    }

    pub fn from_backoff(backoff: ExponentialBackoff) -> Self {
        let max_interval = backoff.max_interval;
        Self { backoff, max_interval }
    }

    /// Delay before the next restart. A session that handled events starts the schedule over.
    pub fn next_delay(&mut self, made_progress: bool) -> Duration {
        if made_progress {
            self.backoff.reset();
        }
        self.backoff.next_backoff().unwrap_or(self.max_interval)
    }
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}
