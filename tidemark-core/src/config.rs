//! Engine configuration.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::lock::LockRetryPolicy;
use crate::version::Version;

/// Default name of the migration history table.
pub const DEFAULT_METADATA_TABLE: &str = "changelog";

/// Transaction policy for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionMode {
    /// Each script commits independently (the default).
    #[default]
    CommitEach,
    /// All scripts share a single transaction, committed at the end.
    CommitAll,
    /// All scripts share a single transaction, rolled back at the end.
    /// Nothing persists; the run is a rehearsal.
    RollbackAll,
}

impl TransactionMode {
    /// Whether this mode wraps the whole run in one ambient transaction.
    pub fn is_ambient(&self) -> bool {
        !matches!(self, Self::CommitEach)
    }
}

/// Script text encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Encoding {
    /// Strict UTF-8 (the default). Invalid bytes fail the script.
    #[default]
    Utf8,
    /// UTF-8 with invalid sequences replaced by U+FFFD.
    Utf8Lossy,
    /// ISO-8859-1, each byte mapped to the matching code point.
    Latin1,
}

impl Encoding {
    /// Decode raw script bytes to text.
    pub fn decode(&self, bytes: &[u8]) -> Result<String, std::str::Utf8Error> {
        match self {
            Self::Utf8 => std::str::from_utf8(bytes).map(str::to_owned),
            Self::Utf8Lossy => Ok(String::from_utf8_lossy(bytes).into_owned()),
            Self::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
        }
    }
}

/// File-name convention for migration scripts.
///
/// Versioned scripts are named
/// `<prefix><version><separator><description><suffix>`
/// (`V1.2__add_users.sql`), repeatable scripts
/// `<repeatable_prefix><separator><description><suffix>`
/// (`R__views.sql`). A repeatable description ending in the
/// `repeat_always_marker` requests re-application on every run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConvention {
    /// Versioned script prefix.
    pub prefix: String,
    /// Repeatable script prefix.
    pub repeatable_prefix: String,
    /// Separator between the version (or repeatable prefix) and description.
    pub separator: String,
    /// Script file suffix.
    pub suffix: String,
    /// Description suffix marking a repeatable script as always-run.
    pub repeat_always_marker: String,
}

impl Default for NamingConvention {
    fn default() -> Self {
        Self {
            prefix: "V".to_string(),
            repeatable_prefix: "R".to_string(),
            separator: "__".to_string(),
            suffix: ".sql".to_string(),
            repeat_always_marker: "!".to_string(),
        }
    }
}

/// Configuration for the migration engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Schemas to manage. When empty, the connection's current schema.
    pub schemas: Vec<String>,
    /// Name of the migration history table.
    pub metadata_table_name: String,
    /// Schema holding the history table. Defaults to the first managed schema.
    pub metadata_table_schema: Option<String>,
    /// Directories scanned for migration scripts.
    pub locations: Vec<PathBuf>,
    /// Inclusive lower bound: versions below are ignored.
    pub start_version: Version,
    /// Inclusive upper bound: versions above are ignored.
    pub target_version: Version,
    /// Permit applying scripts whose version is behind the last applied one.
    pub out_of_order: bool,
    /// Script text encoding.
    pub encoding: Encoding,
    /// Transaction policy.
    pub transaction_mode: TransactionMode,
    /// Serialize concurrent runners with database-side locks.
    pub enable_cluster_mode: bool,
    /// Refuse to erase managed schemas.
    pub erase_disabled: bool,
    /// On validation failure during migrate, erase and rebuild from scratch.
    pub erase_on_validation_error: bool,
    /// Keep retrying failed repeatable scripts while progress is made.
    pub retry_repeatable_migrations_until_no_error: bool,
    /// Mark pending forward scripts as applied without executing them.
    pub skip_next_migrations: bool,
    /// Per-statement execution timeout.
    pub command_timeout: Option<Duration>,
    /// Timeout for the ambient transaction in commit-all / rollback-all mode.
    pub ambient_transaction_timeout: Option<Duration>,
    /// Script file-name convention.
    pub naming: NamingConvention,
    /// Placeholder opening token.
    pub placeholder_prefix: String,
    /// Placeholder closing token.
    pub placeholder_suffix: String,
    /// Placeholder values substituted into every statement.
    pub placeholders: BTreeMap<String, String>,
    /// Identity recorded in the `installed_by` history column.
    pub installed_by: String,
    /// Lock acquisition retry policy.
    pub lock_retry: LockRetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            schemas: Vec::new(),
            metadata_table_name: DEFAULT_METADATA_TABLE.to_string(),
            metadata_table_schema: None,
            locations: Vec::new(),
            start_version: Version::Min,
            target_version: Version::Max,
            out_of_order: false,
            encoding: Encoding::Utf8,
            transaction_mode: TransactionMode::CommitEach,
            enable_cluster_mode: true,
            erase_disabled: false,
            erase_on_validation_error: false,
            retry_repeatable_migrations_until_no_error: false,
            skip_next_migrations: false,
            command_timeout: None,
            ambient_transaction_timeout: None,
            naming: NamingConvention::default(),
            placeholder_prefix: "${".to_string(),
            placeholder_suffix: "}".to_string(),
            placeholders: BTreeMap::new(),
            installed_by: default_installed_by(),
            lock_retry: LockRetryPolicy::default(),
        }
    }
}

fn default_installed_by() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "tidemark".to_string())
}

impl EngineConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a managed schema.
    pub fn schema(mut self, name: impl Into<String>) -> Self {
        self.schemas.push(name.into());
        self
    }

    /// Set the history table name.
    pub fn metadata_table(mut self, name: impl Into<String>) -> Self {
        self.metadata_table_name = name.into();
        self
    }

    /// Set the schema holding the history table.
    pub fn metadata_table_schema(mut self, schema: impl Into<String>) -> Self {
        self.metadata_table_schema = Some(schema.into());
        self
    }

    /// Add a script directory.
    pub fn location(mut self, dir: impl Into<PathBuf>) -> Self {
        self.locations.push(dir.into());
        self
    }

    /// Set the start version.
    pub fn start_version(mut self, version: Version) -> Self {
        self.start_version = version;
        self
    }

    /// Set the target version.
    pub fn target_version(mut self, version: Version) -> Self {
        self.target_version = version;
        self
    }

    /// Permit out-of-order application.
    pub fn out_of_order(mut self, enabled: bool) -> Self {
        self.out_of_order = enabled;
        self
    }

    /// Set the transaction mode.
    pub fn transaction_mode(mut self, mode: TransactionMode) -> Self {
        self.transaction_mode = mode;
        self
    }

    /// Enable or disable cluster-mode locking.
    pub fn cluster_mode(mut self, enabled: bool) -> Self {
        self.enable_cluster_mode = enabled;
        self
    }

    /// Forbid erasing managed schemas.
    pub fn disable_erase(mut self) -> Self {
        self.erase_disabled = true;
        self
    }

    /// Erase and rebuild when migrate hits a validation failure.
    pub fn erase_on_validation_error(mut self, enabled: bool) -> Self {
        self.erase_on_validation_error = enabled;
        self
    }

    /// Retry failed repeatable scripts while progress is made.
    pub fn retry_repeatable_migrations(mut self, enabled: bool) -> Self {
        self.retry_repeatable_migrations_until_no_error = enabled;
        self
    }

    /// Mark pending forward scripts as applied without executing them.
    pub fn skip_next_migrations(mut self, enabled: bool) -> Self {
        self.skip_next_migrations = enabled;
        self
    }

    /// Set the per-statement timeout.
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// Set the ambient transaction timeout.
    pub fn ambient_transaction_timeout(mut self, timeout: Duration) -> Self {
        self.ambient_transaction_timeout = Some(timeout);
        self
    }

    /// Add a placeholder value.
    pub fn placeholder(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.placeholders.insert(key.into(), value.into());
        self
    }

    /// Set the identity recorded in the history table.
    pub fn installed_by(mut self, identity: impl Into<String>) -> Self {
        self.installed_by = identity.into();
        self
    }

    /// Set the lock retry policy.
    pub fn lock_retry(mut self, policy: LockRetryPolicy) -> Self {
        self.lock_retry = policy;
        self
    }

    /// The schema that holds the history table, given the managed schemas.
    pub fn resolved_metadata_schema<'a>(&'a self, managed: &'a [String]) -> CoreResult<&'a str> {
        if let Some(schema) = &self.metadata_table_schema {
            return Ok(schema);
        }
        managed
            .first()
            .map(String::as_str)
            .ok_or_else(|| CoreError::configuration("no schema to manage was found"))
    }

    /// Substitute configured placeholders into a statement.
    pub fn substitute_placeholders(&self, sql: &str) -> String {
        let mut out = sql.to_string();
        for (key, value) in &self.placeholders {
            let token = format!("{}{}{}", self.placeholder_prefix, key, self.placeholder_suffix);
            out = out.replace(&token, value);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.metadata_table_name, "changelog");
        assert_eq!(config.start_version, Version::Min);
        assert_eq!(config.target_version, Version::Max);
        assert_eq!(config.transaction_mode, TransactionMode::CommitEach);
        assert!(config.enable_cluster_mode);
        assert!(!config.out_of_order);
        assert_eq!(config.naming.prefix, "V");
        assert_eq!(config.naming.separator, "__");
        assert_eq!(config.placeholder_prefix, "${");
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::new()
            .schema("app")
            .schema("audit")
            .metadata_table("history")
            .location("./sql")
            .out_of_order(true)
            .transaction_mode(TransactionMode::RollbackAll)
            .placeholder("env", "prod");

        assert_eq!(config.schemas, vec!["app", "audit"]);
        assert_eq!(config.metadata_table_name, "history");
        assert!(config.out_of_order);
        assert!(config.transaction_mode.is_ambient());
        assert_eq!(config.placeholders["env"], "prod");
    }

    #[test]
    fn test_substitute_placeholders() {
        let config = EngineConfig::new()
            .placeholder("schema", "app")
            .placeholder("owner", "svc");
        let sql = "CREATE TABLE ${schema}.t OWNER ${owner}; -- ${missing}";
        assert_eq!(
            config.substitute_placeholders(sql),
            "CREATE TABLE app.t OWNER svc; -- ${missing}"
        );
    }

    #[test]
    fn test_resolved_metadata_schema() {
        let managed = vec!["app".to_string(), "audit".to_string()];
        let config = EngineConfig::new();
        assert_eq!(config.resolved_metadata_schema(&managed).unwrap(), "app");

        let config = EngineConfig::new().metadata_table_schema("meta");
        assert_eq!(config.resolved_metadata_schema(&managed).unwrap(), "meta");

        let config = EngineConfig::new();
        assert!(config.resolved_metadata_schema(&[]).is_err());
    }

    #[test]
    fn test_encoding_decode() {
        assert_eq!(Encoding::Utf8.decode(b"select 1").unwrap(), "select 1");
        assert!(Encoding::Utf8.decode(&[0xff, 0xfe]).is_err());
        assert_eq!(Encoding::Latin1.decode(&[0xe9]).unwrap(), "\u{e9}");
    }
}
