use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use paygate_core::AppResult;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::access_service::AccessService;
use crate::clock::Clock;
use crate::session_service::{ExpiryReport, SessionService};

/// Tunables of the periodic expiry sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpirySweepConfig {
    /// Pause between sweeps.
    pub interval: Duration,
    /// Sessions handled per sweep step.
    pub batch_limit: usize,
}

impl Default for ExpirySweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            batch_limit: 500,
        }
    }
}

/// Counters of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Expiry pass counters.
    pub expiry: ExpiryReport,
    /// Paid sessions whose access grant was completed.
    pub grants_recovered: usize,
    /// Grants deactivated because their window ended.
    pub grants_deactivated: u64,
}

/// Periodic housekeeping of sessions and grants.
#[derive(Clone)]
pub struct ExpirySweeper {
    session_service: SessionService,
    access_service: AccessService,
    clock: Arc<dyn Clock>,
    config: ExpirySweepConfig,
}

impl ExpirySweeper {
    /// Creates an expiry sweeper.
    #[must_use]
    pub fn new(
        session_service: SessionService,
        access_service: AccessService,
        clock: Arc<dyn Clock>,
        config: ExpirySweepConfig,
    ) -> Self {
        Self {
            session_service,
            access_service,
            clock,
            config,
        }
    }

    /// Expires stale sessions, completes stuck grants and deactivates ended grants.
    pub async fn sweep_once(&self) -> AppResult<SweepReport> {
        let now = self.clock.now();
        let expiry = self.expire_backlog(now).await?;
        let grants_recovered = self
            .session_service
            .complete_paid_sessions(self.config.batch_limit)
            .await?;
        let grants_deactivated = self.access_service.deactivate_expired_grants(now).await?;

        Ok(SweepReport {
            expiry,
            grants_recovered,
            grants_deactivated,
        })
    }

    /// Runs expiry passes until the stale backlog is drained.
    ///
    /// Stops early when a full pass expires nothing, so sessions whose writes
    /// keep failing are left for the next sweep.
    async fn expire_backlog(&self, now: DateTime<Utc>) -> AppResult<ExpiryReport> {
        let mut total = ExpiryReport::default();
        loop {
            let pass = self
                .session_service
                .expire_stale_sessions(now, self.config.batch_limit)
                .await?;
            total.examined += pass.examined;
            total.expired += pass.expired;
            total.skipped += pass.skipped;
            total.failed += pass.failed;

            if pass.examined < self.config.batch_limit || pass.expired == 0 {
                return Ok(total);
            }
        }
    }

    /// Sweeps every interval until `shutdown` flips to `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("expiry sweeper started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.sweep_once().await {
                Ok(report) => {
                    if report.expiry.expired > 0
                        || report.grants_recovered > 0
                        || report.grants_deactivated > 0
                    {
                        info!(
                            expired = report.expiry.expired,
                            skipped = report.expiry.skipped,
                            grants_recovered = report.grants_recovered,
                            grants_deactivated = report.grants_deactivated,
                            "expiry sweep completed"
                        );
                    }
                }
                Err(error) => warn!(error = %error, "expiry sweep failed"),
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                () = tokio::time::sleep(self.config.interval) => {}
            }
        }

        info!("expiry sweeper stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use paygate_domain::PaymentStatus;

    use super::{ExpirySweepConfig, ExpirySweeper};
    use crate::test_fakes::Fixture;

    #[tokio::test]
    async fn sweep_expires_stale_pending_sessions() {
        let fixture = Fixture::new();
        let stale = fixture.create_session().await;
        fixture.clock.advance(Duration::minutes(16));

        let sweeper = ExpirySweeper::new(
            fixture.session_service.clone(),
            fixture.access_service.clone(),
            Arc::new(fixture.clock.clone()),
            ExpirySweepConfig::default(),
        );
        let report = sweeper
            .sweep_once()
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(report.expiry.expired, 1);
        assert_eq!(
            fixture.stored_status(stale.session_id()).await,
            Some(PaymentStatus::Expired)
        );
    }

    #[tokio::test]
    async fn one_sweep_drains_more_than_a_batch() {
        let fixture = Fixture::new();
        let mut stale = Vec::new();
        for _ in 0..5 {
            stale.push(fixture.create_session().await);
        }
        fixture.clock.advance(Duration::minutes(16));

        let sweeper = ExpirySweeper::new(
            fixture.session_service.clone(),
            fixture.access_service.clone(),
            Arc::new(fixture.clock.clone()),
            ExpirySweepConfig {
                interval: std::time::Duration::from_secs(60),
                batch_limit: 2,
            },
        );
        let report = sweeper
            .sweep_once()
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(report.expiry.expired, 5);
        for session in &stale {
            assert_eq!(
                fixture.stored_status(session.session_id()).await,
                Some(PaymentStatus::Expired)
            );
        }
    }

    #[tokio::test]
    async fn sweep_recovers_paid_session_without_grant() {
        let fixture = Fixture::new();
        let session = fixture.create_session().await;
        fixture.mark_paid_without_grant(&session).await;

        let sweeper = ExpirySweeper::new(
            fixture.session_service.clone(),
            fixture.access_service.clone(),
            Arc::new(fixture.clock.clone()),
            ExpirySweepConfig::default(),
        );
        let report = sweeper
            .sweep_once()
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(report.grants_recovered, 1);
        assert_eq!(
            fixture.stored_status(session.session_id()).await,
            Some(PaymentStatus::AccessGranted)
        );
        assert!(fixture.grant_for(session.session_id()).await.is_some());
    }

    #[tokio::test]
    async fn run_stops_when_shutdown_is_signalled() {
        let fixture = Fixture::new();
        let sweeper = ExpirySweeper::new(
            fixture.session_service.clone(),
            fixture.access_service.clone(),
            Arc::new(fixture.clock.clone()),
            ExpirySweepConfig {
                interval: std::time::Duration::from_secs(3600),
                batch_limit: 10,
            },
        );
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

        let handle = tokio::spawn(async move { sweeper.run(shutdown_rx).await });
        let _ = shutdown_tx.send(true);

        let joined = tokio::time::timeout(std::time::Duration::from_secs(5), handle).await;
        assert!(matches!(joined, Ok(Ok(()))));
    }
}
