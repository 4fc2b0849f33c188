use chrono::Duration;

/// Tunables of the session lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Time a pending session waits for payment.
    pub session_timeout: Duration,
    /// Reference issuance attempts before creation fails.
    pub reference_max_attempts: u32,
    /// Lowest accepted amount in minor units.
    pub min_amount_minor: i64,
    /// Highest accepted amount in minor units.
    pub max_amount_minor: i64,
    /// Attempts for status writes failing with transient store errors.
    pub store_retry_attempts: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_timeout: Duration::minutes(15),
            reference_max_attempts: 8,
            min_amount_minor: 1,
            max_amount_minor: 999_999,
            store_retry_attempts: 3,
        }
    }
}

impl SessionConfig {
    /// Returns a copy with a different payment timeout.
    #[must_use]
    pub fn with_session_timeout(mut self, session_timeout: Duration) -> Self {
        self.session_timeout = session_timeout;
        self
    }
}
