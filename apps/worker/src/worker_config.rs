use std::env;
use std::time::Duration;

use paygate_application::{ExpirySweepConfig, ReconciliationConfig, SessionConfig};
use paygate_core::{AppError, AppResult};
use paygate_domain::BankConnectionId;

/// Worker settings read from the process environment.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub migrate_only: bool,
    pub bank_feed_base_url: String,
    pub bank_feed_api_token: Option<String>,
    pub bank_connections: Vec<BankConnectionId>,
    pub reconciliation: ReconciliationConfig,
    pub expiry_sweep: ExpirySweepConfig,
    pub session: SessionConfig,
    pub shutdown_grace: Duration,
}

impl WorkerConfig {
    pub fn load() -> AppResult<Self> {
        let database_url = required_env("DATABASE_URL")?;
        let migrate_only = env::args().nth(1).as_deref() == Some("migrate");
        let bank_feed_base_url = env::var("BANK_FEED_BASE_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8080".to_owned())
            .trim_end_matches('/')
            .to_owned();
        let bank_feed_api_token = env::var("BANK_FEED_API_TOKEN")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());
        let bank_connections = parse_connections(
            env::var("BANK_CONNECTIONS")
                .unwrap_or_default()
                .as_str(),
        )?;

        let defaults = ReconciliationConfig::default();
        let reconciliation = ReconciliationConfig {
            poll_interval: parse_env_duration_ms(
                "RECONCILIATION_POLL_INTERVAL_MS",
                defaults.poll_interval,
            )?,
            fetch_timeout: parse_env_duration_ms("BANK_FETCH_TIMEOUT_MS", defaults.fetch_timeout)?,
            max_fetch_attempts: parse_env_u32(
                "BANK_FETCH_MAX_ATTEMPTS",
                defaults.max_fetch_attempts,
            )?,
            initial_backoff: parse_env_duration_ms(
                "BANK_FETCH_INITIAL_BACKOFF_MS",
                defaults.initial_backoff,
            )?,
            max_backoff: parse_env_duration_ms("BANK_FETCH_MAX_BACKOFF_MS", defaults.max_backoff)?,
            batch_limit: parse_env_usize("RECONCILIATION_BATCH_LIMIT", defaults.batch_limit)?,
        };

        let sweep_defaults = ExpirySweepConfig::default();
        let expiry_sweep = ExpirySweepConfig {
            interval: parse_env_duration_ms("EXPIRY_SWEEP_INTERVAL_MS", sweep_defaults.interval)?,
            batch_limit: parse_env_usize("EXPIRY_SWEEP_BATCH_LIMIT", sweep_defaults.batch_limit)?,
        };

        let session_defaults = SessionConfig::default();
        let session_timeout = parse_session_timeout(
            env::var("SESSION_TIMEOUT_SECONDS").ok().as_deref(),
            session_defaults.session_timeout,
        )?;
        let session = session_defaults.with_session_timeout(session_timeout);
        let shutdown_grace = parse_env_duration_ms("SHUTDOWN_GRACE_MS", Duration::from_secs(10))?;

        require_positive("RECONCILIATION_POLL_INTERVAL_MS", reconciliation.poll_interval)?;
        require_positive("BANK_FETCH_TIMEOUT_MS", reconciliation.fetch_timeout)?;
        require_positive("EXPIRY_SWEEP_INTERVAL_MS", expiry_sweep.interval)?;

        if reconciliation.max_fetch_attempts == 0 {
            return Err(AppError::Validation(
                "BANK_FETCH_MAX_ATTEMPTS must be greater than zero".to_owned(),
            ));
        }

        if reconciliation.batch_limit == 0 || expiry_sweep.batch_limit == 0 {
            return Err(AppError::Validation(
                "batch limits must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            database_url,
            migrate_only,
            bank_feed_base_url,
            bank_feed_api_token,
            bank_connections,
            reconciliation,
            expiry_sweep,
            session,
            shutdown_grace,
        })
    }
}

fn parse_connections(raw: &str) -> AppResult<Vec<BankConnectionId>> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(BankConnectionId::new)
        .collect()
}

fn parse_session_timeout(
    raw: Option<&str>,
    default: chrono::Duration,
) -> AppResult<chrono::Duration> {
    let Some(raw) = raw else {
        return Ok(default);
    };

    let seconds = raw.trim().parse::<i64>().map_err(|error| {
        AppError::Validation(format!(
            "invalid SESSION_TIMEOUT_SECONDS value '{raw}': {error}"
        ))
    })?;
    if seconds <= 0 {
        return Err(AppError::Validation(
            "SESSION_TIMEOUT_SECONDS must be greater than zero".to_owned(),
        ));
    }

    chrono::Duration::try_seconds(seconds).ok_or_else(|| {
        AppError::Validation(format!(
            "SESSION_TIMEOUT_SECONDS value '{raw}' is out of range"
        ))
    })
}

fn require_positive(name: &str, value: Duration) -> AppResult<()> {
    if value.is_zero() {
        return Err(AppError::Validation(format!(
            "{name} must be greater than zero"
        )));
    }

    Ok(())
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn parse_env_duration_ms(name: &str, default: Duration) -> AppResult<Duration> {
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    parse_env_u64(name, default_ms).map(Duration::from_millis)
}

fn parse_env_usize(name: &str, default: usize) -> AppResult<usize> {
    match env::var(name) {
        Ok(value) => value.parse::<usize>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> AppResult<u32> {
    match env::var(name) {
        Ok(value) => value.parse::<u32>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}
