//! One module per subcommand.

pub mod erase;
pub mod info;
pub mod migrate;
pub mod repair;
pub mod validate;

use std::path::Path;

use tidemark_core::{DatabaseDriver, Engine, EngineConfig, FileLoader};
use tidemark_postgres::PostgresDriver;
use tidemark_sqlite::SqliteDriver;

use crate::cli::Cli;
use crate::config::{build_engine_config, resolve_url, FileConfig};
use crate::error::{CliError, CliResult};

/// Resolve the connection URL and the merged engine configuration.
pub(crate) fn prepare(cli: &Cli) -> CliResult<(String, EngineConfig)> {
    let file = FileConfig::discover(cli.config.as_deref())?;
    let url = resolve_url(cli, &file)?;
    let config = build_engine_config(cli, &file)?;
    Ok((url, config))
}

/// Connect to the database named by the URL and build the engine.
pub(crate) async fn build_engine(url: &str, config: EngineConfig) -> CliResult<Engine> {
    let driver = connect(url).await?;
    let loader = FileLoader::from_config(&config);
    Ok(Engine::new(config, driver, Box::new(loader)))
}

async fn connect(url: &str) -> CliResult<Box<dyn DatabaseDriver>> {
    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        let driver = PostgresDriver::connect(url)
            .await
            .map_err(|e| CliError::Connect(e.to_string()))?;
        return Ok(Box::new(driver));
    }

    if let Some(path) = url.strip_prefix("sqlite://") {
        let driver = if path == ":memory:" {
            SqliteDriver::open_in_memory().await
        } else {
            SqliteDriver::open(path).await
        }
        .map_err(|e| CliError::Connect(e.to_string()))?;
        return Ok(Box::new(driver));
    }

    // A bare path is treated as a SQLite database file.
    if looks_like_sqlite_path(url) {
        let driver = SqliteDriver::open(url)
            .await
            .map_err(|e| CliError::Connect(e.to_string()))?;
        return Ok(Box::new(driver));
    }

    Err(CliError::Connect(format!(
        "unrecognized database URL '{url}': expected postgres://, sqlite:// or a SQLite file path"
    )))
}

fn looks_like_sqlite_path(url: &str) -> bool {
    url.ends_with(".db")
        || url.ends_with(".sqlite")
        || url.ends_with(".sqlite3")
        || Path::new(url).exists()
}

/// Connection URL with any password replaced for display.
pub(crate) fn redact(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let Some((userinfo, host)) = rest.split_once('@') else {
        return url.to_string();
    };
    match userinfo.split_once(':') {
        Some((user, _password)) => format!("{scheme}://{user}:****@{host}"),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact() {
        assert_eq!(
            redact("postgres://app:hunter2@db:5432/prod"),
            "postgres://app:****@db:5432/prod"
        );
        assert_eq!(redact("postgres://db/prod"), "postgres://db/prod");
        assert_eq!(redact("./app.db"), "./app.db");
    }

    #[test]
    fn test_looks_like_sqlite_path() {
        assert!(looks_like_sqlite_path("app.db"));
        assert!(looks_like_sqlite_path("data/state.sqlite3"));
        assert!(!looks_like_sqlite_path("mysql://db/prod"));
    }
}
