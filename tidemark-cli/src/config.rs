//! CLI configuration: `tidemark.toml` merged with command-line flags.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use tidemark_core::{EngineConfig, NamingConvention, TransactionMode, Version};

use crate::cli::{Cli, TransactionModeArg};
use crate::error::{CliError, CliResult};

/// Default config file name (lives in the project root)
pub const CONFIG_FILE_NAME: &str = "tidemark.toml";

/// Default migrations directory
pub const MIGRATIONS_DIR: &str = "migrations";

/// `tidemark.toml` contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Database connection
    pub database: DatabaseSection,

    /// Migration behaviour
    pub migrations: MigrationsSection,

    /// Script file-name convention overrides
    pub naming: NamingConvention,

    /// Placeholder values substituted into scripts
    pub placeholders: BTreeMap<String, String>,
}

/// `[database]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    /// Connection URL
    pub url: Option<String>,
}

/// `[migrations]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationsSection {
    /// Script directories
    pub locations: Vec<PathBuf>,
    /// Managed schemas
    pub schemas: Vec<String>,
    /// History table name
    pub table: Option<String>,
    /// Schema holding the history table
    pub table_schema: Option<String>,
    /// Upper version bound (inclusive)
    pub target: Option<String>,
    /// Lower version bound (inclusive)
    pub start: Option<String>,
    /// Permit gap-filling behind the last applied version
    pub out_of_order: bool,
    /// Transaction policy
    pub transaction_mode: TransactionMode,
    /// Cluster-mode locking
    pub cluster: bool,
    /// Refuse to erase managed schemas
    pub erase_disabled: bool,
    /// Per-statement timeout in seconds
    pub command_timeout: Option<u64>,
    /// Ambient transaction timeout in seconds
    pub ambient_transaction_timeout: Option<u64>,
}

impl Default for MigrationsSection {
    fn default() -> Self {
        Self {
            locations: vec![PathBuf::from(MIGRATIONS_DIR)],
            schemas: Vec::new(),
            table: None,
            table_schema: None,
            target: None,
            start: None,
            out_of_order: false,
            transaction_mode: TransactionMode::CommitEach,
            cluster: true,
            erase_disabled: false,
            command_timeout: None,
            ambient_transaction_timeout: None,
        }
    }
}

impl FileConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load the file named by `--config`, or `tidemark.toml` when present,
    /// or defaults.
    pub fn discover(explicit: Option<&Path>) -> CliResult<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let default = PathBuf::from(CONFIG_FILE_NAME);
        if default.exists() {
            return Self::load(&default);
        }
        Ok(Self::default())
    }
}

/// The database URL from flags or the config file.
pub fn resolve_url(cli: &Cli, file: &FileConfig) -> CliResult<String> {
    cli.url
        .clone()
        .or_else(|| file.database.url.clone())
        .ok_or_else(|| {
            CliError::Config(
                "no database URL: pass --url, set TIDEMARK_DATABASE_URL or add [database] url to tidemark.toml"
                    .to_string(),
            )
        })
}

/// Merge the config file and the command-line flags into an engine
/// configuration. Flags win over the file.
pub fn build_engine_config(cli: &Cli, file: &FileConfig) -> CliResult<EngineConfig> {
    let mut config = EngineConfig::new();

    config.locations = if cli.locations.is_empty() {
        file.migrations.locations.clone()
    } else {
        cli.locations.clone()
    };
    config.schemas = if cli.schemas.is_empty() {
        file.migrations.schemas.clone()
    } else {
        cli.schemas.clone()
    };
    if let Some(table) = cli.table.clone().or_else(|| file.migrations.table.clone()) {
        config.metadata_table_name = table;
    }
    config.metadata_table_schema = file.migrations.table_schema.clone();

    if let Some(target) = cli.target.as_deref().or(file.migrations.target.as_deref()) {
        config.target_version = parse_version(target, "target")?;
    }
    if let Some(start) = cli.start.as_deref().or(file.migrations.start.as_deref()) {
        config.start_version = parse_version(start, "start")?;
    }

    config.out_of_order = cli.out_of_order || file.migrations.out_of_order;
    config.transaction_mode = match cli.transaction_mode {
        Some(TransactionModeArg::CommitEach) => TransactionMode::CommitEach,
        Some(TransactionModeArg::CommitAll) => TransactionMode::CommitAll,
        Some(TransactionModeArg::RollbackAll) => TransactionMode::RollbackAll,
        None => file.migrations.transaction_mode,
    };
    config.enable_cluster_mode = !cli.no_cluster && file.migrations.cluster;
    config.erase_disabled = file.migrations.erase_disabled;

    if let Some(seconds) = cli.command_timeout.or(file.migrations.command_timeout) {
        config.command_timeout = Some(Duration::from_secs(seconds));
    }
    if let Some(seconds) = file.migrations.ambient_transaction_timeout {
        config.ambient_transaction_timeout = Some(Duration::from_secs(seconds));
    }

    config.naming = file.naming.clone();
    config.placeholders = file.placeholders.clone();
    for pair in &cli.placeholders {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            CliError::Config(format!("invalid placeholder '{pair}', expected key=value"))
        })?;
        config.placeholders.insert(key.to_string(), value.to_string());
    }

    Ok(config)
}

fn parse_version(text: &str, what: &str) -> CliResult<Version> {
    Version::parse(text).map_err(|e| CliError::Config(format!("invalid {what} version: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("tidemark").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let config = build_engine_config(&cli(&["info"]), &FileConfig::default()).unwrap();
        assert_eq!(config.locations, vec![PathBuf::from("migrations")]);
        assert_eq!(config.metadata_table_name, "changelog");
        assert!(config.enable_cluster_mode);
        assert_eq!(config.transaction_mode, TransactionMode::CommitEach);
    }

    #[test]
    fn test_flags_win_over_file() {
        let mut file = FileConfig::default();
        file.migrations.locations = vec![PathBuf::from("sql")];
        file.migrations.out_of_order = false;
        file.migrations.target = Some("9".to_string());

        let cli = cli(&[
            "--location",
            "other",
            "--out-of-order",
            "--target",
            "3",
            "--no-cluster",
            "migrate",
        ]);
        let config = build_engine_config(&cli, &file).unwrap();
        assert_eq!(config.locations, vec![PathBuf::from("other")]);
        assert!(config.out_of_order);
        assert_eq!(config.target_version, Version::parse("3").unwrap());
        assert!(!config.enable_cluster_mode);
    }

    #[test]
    fn test_placeholder_parsing() {
        let cli_ok = cli(&["--placeholder", "env=prod", "migrate"]);
        let config = build_engine_config(&cli_ok, &FileConfig::default()).unwrap();
        assert_eq!(config.placeholders["env"], "prod");

        let cli_err = cli(&["--placeholder", "missing-equals", "migrate"]);
        assert!(build_engine_config(&cli_err, &FileConfig::default()).is_err());
    }

    #[test]
    fn test_file_round_trip() {
        let text = r#"
[database]
url = "postgres://localhost/app"

[migrations]
locations = ["db/migrations"]
schemas = ["app"]
out_of_order = true
transaction_mode = "rollback-all"

[placeholders]
env = "staging"
"#;
        let file: FileConfig = toml::from_str(text).unwrap();
        assert_eq!(file.database.url.as_deref(), Some("postgres://localhost/app"));
        assert!(file.migrations.out_of_order);
        assert_eq!(
            file.migrations.transaction_mode,
            TransactionMode::RollbackAll
        );
        assert_eq!(file.placeholders["env"], "staging");
    }
}
