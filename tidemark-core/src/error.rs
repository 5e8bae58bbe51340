//! Error types for the migration engine.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by the migration engine.
#[derive(Debug, Error)]
pub enum CoreError {
    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or contradictory configuration. Reported before any write.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Reconciliation found inconsistencies between the history table and
    /// the source scripts.
    #[error("validation error: {0}")]
    Validation(String),

    /// A script failed while being applied.
    #[error("error executing {script} after {elapsed_ms} ms")]
    Execution {
        /// Name of the failing script.
        script: String,
        /// Time spent before the failure.
        elapsed_ms: i64,
        /// Underlying driver failure.
        #[source]
        source: Box<CoreError>,
    },

    /// A lock could not be acquired before the configured deadline.
    #[error("could not acquire the {0} lock before the deadline")]
    LockTimeout(&'static str),

    /// Failure reported by the database driver.
    #[error("database error: {message}")]
    Driver {
        /// Driver-provided description.
        message: String,
        /// Underlying error, when one is available.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A migration script could not be read or decoded.
    #[error("invalid migration script '{name}': {message}")]
    Script {
        /// Script name.
        name: String,
        /// What went wrong.
        message: String,
    },
}

impl CoreError {
    /// Create a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a driver error from a message only.
    pub fn driver(msg: impl Into<String>) -> Self {
        Self::Driver {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a driver error wrapping the underlying cause.
    pub fn driver_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Driver {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a script error.
    pub fn script(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Script {
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Whether this error came out of the validation walk.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
