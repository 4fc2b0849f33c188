use paygate_core::AppError;

const UNIQUE_VIOLATION: &str = "23505";
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

/// Returns whether the error is a unique constraint violation.
pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(database_error)
        if database_error.code().as_deref() == Some(UNIQUE_VIOLATION))
}

/// Maps a storage failure, marking pool exhaustion, I/O and contention as transient.
pub(crate) fn storage_error(context: &str, error: sqlx::Error) -> AppError {
    let transient = match &error {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(database_error) => matches!(
            database_error.code().as_deref(),
            Some(SERIALIZATION_FAILURE | DEADLOCK_DETECTED)
        ),
        _ => false,
    };

    if transient {
        AppError::Unavailable(format!("failed to {context}: {error}"))
    } else {
        AppError::Internal(format!("failed to {context}: {error}"))
    }
}
