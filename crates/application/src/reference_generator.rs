use std::sync::Arc;

use chrono::{DateTime, Utc};
use paygate_core::{AppError, AppResult};
use paygate_domain::{PaymentReference, RANDOM_COMPONENT_LENGTH};
use tracing::debug;

use crate::payment_ports::PaymentSessionRepository;

/// Issues payment references that are unique across all stored sessions.
#[derive(Clone)]
pub struct ReferenceGenerator {
    repository: Arc<dyn PaymentSessionRepository>,
    max_attempts: u32,
}

impl ReferenceGenerator {
    /// Creates a generator checking candidates against the session store.
    #[must_use]
    pub fn new(repository: Arc<dyn PaymentSessionRepository>, max_attempts: u32) -> Self {
        Self {
            repository,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Generates a reference not used by any stored session.
    ///
    /// Fails with `AppError::Conflict` when every attempt collided.
    pub async fn generate(&self, issued_at: DateTime<Utc>) -> AppResult<PaymentReference> {
        for attempt in 1..=self.max_attempts {
            if let Some(reference) = self.draw(issued_at, attempt).await? {
                return Ok(reference);
            }
        }

        Err(reference_exhausted(self.max_attempts))
    }

    /// Draws one candidate and returns it when no stored session uses it.
    pub(crate) async fn draw(
        &self,
        issued_at: DateTime<Utc>,
        attempt: u32,
    ) -> AppResult<Option<PaymentReference>> {
        let candidate = PaymentReference::compose(issued_at.timestamp(), &random_component()?);
        if !self.repository.reference_exists(&candidate).await? {
            return Ok(Some(candidate));
        }

        debug!(attempt, reference = %candidate, "payment reference collision");
        Ok(None)
    }

    pub(crate) fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

pub(crate) fn reference_exhausted(attempts: u32) -> AppError {
    AppError::Conflict(format!(
        "could not issue a unique payment reference after {attempts} attempts"
    ))
}

fn random_component() -> AppResult<[u8; RANDOM_COMPONENT_LENGTH]> {
    let mut bytes = [0_u8; RANDOM_COMPONENT_LENGTH];
    getrandom::fill(&mut bytes).map_err(|error| {
        AppError::Internal(format!("failed to read random reference bytes: {error}"))
    })?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use chrono::Utc;
    use paygate_core::AppError;
    use paygate_domain::PaymentReference;

    use super::ReferenceGenerator;
    use crate::test_fakes::FakeSessionRepository;

    #[tokio::test]
    async fn generated_references_parse_and_differ() {
        let repository = Arc::new(FakeSessionRepository::default());
        let generator = ReferenceGenerator::new(repository, 4);
        let now = Utc::now();

        let mut seen = HashSet::new();
        for _ in 0..50 {
            let reference = generator
                .generate(now)
                .await
                .unwrap_or_else(|_| unreachable!());
            assert!(PaymentReference::parse(reference.as_str()).is_ok());
            assert!(seen.insert(reference));
        }
    }

    #[tokio::test]
    async fn exhausts_after_bounded_collisions() {
        let repository = Arc::new(FakeSessionRepository::default());
        repository.report_every_reference_taken().await;
        let generator = ReferenceGenerator::new(repository.clone(), 3);

        let result = generator.generate(Utc::now()).await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert_eq!(repository.reference_lookups().await, 3);
    }
}
