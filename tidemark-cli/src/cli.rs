//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Tidemark - database schema migrations
#[derive(Parser, Debug)]
#[command(name = "tidemark")]
#[command(version)]
#[command(about = "Tidemark - database schema migrations", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Database connection URL (postgres://... or a SQLite file path)
    #[arg(short, long, env = "TIDEMARK_DATABASE_URL", global = true)]
    pub url: Option<String>,

    /// Path to the tidemark.toml configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory containing migration scripts (repeatable)
    #[arg(short, long = "location", global = true)]
    pub locations: Vec<PathBuf>,

    /// Schema to manage (repeatable); defaults to the connection's schema
    #[arg(short, long = "schema", global = true)]
    pub schemas: Vec<String>,

    /// Name of the migration history table
    #[arg(long, global = true)]
    pub table: Option<String>,

    /// Only apply versions up to this one (inclusive)
    #[arg(long, global = true)]
    pub target: Option<String>,

    /// Ignore versions below this one (recorded on first run)
    #[arg(long, global = true)]
    pub start: Option<String>,

    /// Apply scripts whose version is behind the last applied one
    #[arg(long, global = true)]
    pub out_of_order: bool,

    /// Transaction policy for the run
    #[arg(long, value_enum, global = true)]
    pub transaction_mode: Option<TransactionModeArg>,

    /// Skip the cluster-mode locks (single-runner deployments)
    #[arg(long, global = true)]
    pub no_cluster: bool,

    /// Placeholder substituted into scripts, as key=value (repeatable)
    #[arg(short, long = "placeholder", global = true)]
    pub placeholders: Vec<String>,

    /// Per-statement timeout in seconds
    #[arg(long, global = true)]
    pub command_timeout: Option<u64>,

    /// Only print warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Print engine debug logs
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply pending migrations up to the target version
    Migrate(MigrateArgs),

    /// Check applied migrations against the scripts without writing
    Validate,

    /// Overwrite drifted checksums in the history table
    Repair,

    /// Erase every schema the engine owns
    Erase(EraseArgs),

    /// List schema actions, history and pending scripts
    Info,
}

/// Transaction policy flag values
#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum TransactionModeArg {
    /// Commit after every script (default)
    CommitEach,
    /// One transaction around the whole run
    CommitAll,
    /// One transaction, rolled back at the end (rehearsal)
    RollbackAll,
}

/// Arguments for the `migrate` command
#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Record pending forward scripts as applied without executing them
    #[arg(long)]
    pub skip_next: bool,

    /// On validation failure, erase the managed schemas and rebuild
    #[arg(long)]
    pub erase_on_validation_error: bool,

    /// Keep retrying failed repeatable scripts while progress is made
    #[arg(long)]
    pub retry_repeatable: bool,
}

/// Arguments for the `erase` command
#[derive(Args, Debug)]
pub struct EraseArgs {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub force: bool,
}
