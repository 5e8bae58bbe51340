//! SQLite driver error types.

use thiserror::Error;
use tidemark_core::CoreError;

/// Result type alias for SQLite driver operations.
pub type SqliteResult<T> = Result<T, SqliteError>;

/// Errors raised by the SQLite driver.
#[derive(Debug, Error)]
pub enum SqliteError {
    /// The database file could not be opened.
    #[error("failed to open SQLite database: {0}")]
    Open(#[source] tokio_rusqlite::Error),

    /// A query or statement failed.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),

    /// A statement exceeded the configured command timeout.
    #[error("statement timed out after {0} seconds")]
    Timeout(u64),

    /// The operation does not exist on SQLite.
    #[error("unsupported on SQLite: {0}")]
    Unsupported(&'static str),
}

impl From<SqliteError> for CoreError {
    fn from(err: SqliteError) -> Self {
        CoreError::driver_source(err.to_string(), err)
    }
}
