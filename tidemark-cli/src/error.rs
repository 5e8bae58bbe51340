//! CLI error types and result alias.

use miette::Diagnostic;
use thiserror::Error;

use tidemark_core::CoreError;

/// Result type alias for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// CLI error types
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// IO error
    #[error("IO error: {0}")]
    #[diagnostic(code(tidemark::io))]
    Io(#[from] std::io::Error),

    /// Configuration file or flag error
    #[error("configuration error: {0}")]
    #[diagnostic(code(tidemark::config))]
    Config(String),

    /// Connection establishment error
    #[error("connection error: {0}")]
    #[diagnostic(code(tidemark::connect))]
    Connect(String),

    /// Engine error (validation, execution, locking)
    #[error(transparent)]
    #[diagnostic(code(tidemark::engine))]
    Engine(#[from] CoreError),

    /// Command was aborted by the user
    #[error("aborted")]
    #[diagnostic(code(tidemark::aborted))]
    Aborted,
}

impl From<toml::de::Error> for CliError {
    fn from(err: toml::de::Error) -> Self {
        CliError::Config(format!("failed to parse TOML: {err}"))
    }
}
