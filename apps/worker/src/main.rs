//! Paygate worker runtime: bank reconciliation and session expiry.

#![forbid(unsafe_code)]

mod worker_config;

use std::sync::Arc;
use std::time::Duration;

use paygate_application::{
    AccessService, ExpirySweeper, ReconciliationService, SessionService, SystemClock,
    TransactionMatcher,
};
use paygate_core::{AppError, AppResult};
use paygate_infrastructure::{
    EpcQrPayloadBuilder, HttpBankFeed, PostgresAccessGrantRepository, PostgresContentCatalog,
    PostgresPaymentSessionRepository, PostgresReconciliationStore,
};

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::worker_config::WorkerConfig;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let pool = connect_and_migrate(config.database_url.as_str()).await?;

    if config.migrate_only {
        info!("database migrations applied successfully");
        return Ok(());
    }

    let http_client = reqwest::Client::builder()
        .timeout(config.reconciliation.fetch_timeout)
        .build()
        .map_err(|error| AppError::Internal(format!("failed to build HTTP client: {error}")))?;
    let runtime = build_runtime(pool, http_client, &config)?;

    info!(
        bank_feed_base_url = %config.bank_feed_base_url,
        connections = config.bank_connections.len(),
        poll_interval_ms = config.reconciliation.poll_interval.as_millis(),
        sweep_interval_ms = config.expiry_sweep.interval.as_millis(),
        "paygate-worker started"
    );

    let (shutdown_sender, shutdown_receiver) = watch::channel(false);
    let mut tasks = JoinSet::new();

    for connection_id in config.bank_connections.iter().cloned() {
        let reconciliation = runtime.reconciliation.clone();
        let shutdown = shutdown_receiver.clone();
        tasks.spawn(async move { reconciliation.run(connection_id, shutdown).await });
    }

    let sweeper = runtime.sweeper.clone();
    tasks.spawn(async move { sweeper.run(shutdown_receiver).await });

    if config.bank_connections.is_empty() {
        warn!("BANK_CONNECTIONS is empty; only the expiry sweeper is running");
    }

    tokio::signal::ctrl_c()
        .await
        .map_err(|error| AppError::Internal(format!("failed to listen for shutdown: {error}")))?;
    info!("shutdown requested");
    let _ = shutdown_sender.send(true);

    drain_tasks(&mut tasks, config.shutdown_grace).await;
    info!("paygate-worker stopped");

    Ok(())
}

struct WorkerRuntime {
    reconciliation: ReconciliationService,
    sweeper: ExpirySweeper,
}

fn build_runtime(
    pool: PgPool,
    http_client: reqwest::Client,
    config: &WorkerConfig,
) -> AppResult<WorkerRuntime> {
    let session_repository = Arc::new(PostgresPaymentSessionRepository::new(pool.clone()));
    let grant_repository = Arc::new(PostgresAccessGrantRepository::new(pool.clone()));
    let content_catalog = Arc::new(PostgresContentCatalog::new(pool.clone()));
    let reconciliation_store = Arc::new(PostgresReconciliationStore::new(pool));
    let clock = Arc::new(SystemClock);
    let bank_feed = Arc::new(HttpBankFeed::new(
        http_client,
        config.bank_feed_base_url.as_str(),
        config.bank_feed_api_token.clone(),
    )?);

    let access_service = AccessService::new(grant_repository);
    let session_service = SessionService::new(
        session_repository.clone(),
        content_catalog,
        Arc::new(EpcQrPayloadBuilder::new()),
        access_service.clone(),
        clock.clone(),
        config.session.clone(),
    );
    let matcher = TransactionMatcher::new(
        session_repository,
        session_service.clone(),
        reconciliation_store.clone(),
        reconciliation_store.clone(),
        clock.clone(),
    );

    Ok(WorkerRuntime {
        reconciliation: ReconciliationService::new(
            bank_feed,
            reconciliation_store,
            matcher,
            config.reconciliation.clone(),
        ),
        sweeper: ExpirySweeper::new(
            session_service,
            access_service,
            clock,
            config.expiry_sweep.clone(),
        ),
    })
}

async fn drain_tasks(tasks: &mut JoinSet<()>, grace: Duration) {
    let drained = tokio::time::timeout(grace, async {
        while let Some(result) = tasks.join_next().await {
            if let Err(error) = result {
                warn!(error = %error, "worker task ended abnormally");
            }
        }
    })
    .await;

    if drained.is_err() {
        warn!(
            remaining = tasks.len(),
            "shutdown grace period elapsed; aborting remaining tasks"
        );
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
    }
}

async fn connect_and_migrate(database_url: &str) -> AppResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))?;

    sqlx::migrate!("../../crates/infrastructure/migrations")
        .run(&pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

    Ok(pool)
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
