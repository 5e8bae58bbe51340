//! PostgreSQL driver error types.

use thiserror::Error;
use tidemark_core::CoreError;

/// Result type alias for PostgreSQL driver operations.
pub type PgResult<T> = Result<T, PgError>;

/// Errors raised by the PostgreSQL driver.
#[derive(Debug, Error)]
pub enum PgError {
    /// Connection establishment failed.
    #[error("failed to connect to PostgreSQL: {0}")]
    Connect(#[source] tokio_postgres::Error),

    /// A query or statement failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// A statement exceeded the configured command timeout.
    #[error("statement timed out after {0} seconds")]
    Timeout(u64),
}

impl From<PgError> for CoreError {
    fn from(err: PgError) -> Self {
        CoreError::driver_source(err.to_string(), err)
    }
}
