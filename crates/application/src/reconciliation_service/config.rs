use std::time::Duration;

/// Tunables of the bank feed polling loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationConfig {
    /// Pause between reconciliation cycles.
    pub poll_interval: Duration,
    /// Upper bound on one feed request.
    pub fetch_timeout: Duration,
    /// Fetch attempts per cycle before giving up.
    pub max_fetch_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Ceiling of the exponential retry delay.
    pub max_backoff: Duration,
    /// Transactions requested per fetch.
    pub batch_limit: usize,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            fetch_timeout: Duration::from_secs(10),
            max_fetch_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            batch_limit: 100,
        }
    }
}

impl ReconciliationConfig {
    /// Returns the delay before retry number `attempt`, starting at 1.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_backoff
            .checked_mul(1_u32 << exponent)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}
