//! # Tidemark - Database Schema Migrations for Rust
//!
//! Tidemark brings a database schema from its current state to a declared
//! target version by discovering SQL migration scripts, reconciling them
//! against a persisted history table, and applying pending scripts in a
//! strictly defined order under configurable transactional and locking
//! policies. It runs interactively from a workstation and unattended on
//! multi-instance application clusters.
//!
//! ## Features
//!
//! - **Versioned and repeatable migrations**: `V1.2__add_users.sql` runs
//!   once; `R__views.sql` reruns whenever its checksum changes
//! - **Checksum validation**: drift between applied history and on-disk
//!   scripts fails fast, or is repaired in place with `repair`
//! - **Cluster-safe**: an application-level advisory lock plus a history
//!   table lock serialize concurrent runners
//! - **Transaction modes**: commit each script, commit everything at the
//!   end, or roll everything back for a dry run
//! - **Multi-database**: PostgreSQL and SQLite drivers, with a capability
//!   trait for adding more
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tidemark::{Engine, EngineConfig, FileLoader};
//! use tidemark::postgres::PostgresDriver;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let driver = PostgresDriver::connect("postgres://localhost/app").await?;
//!     let config = EngineConfig::new().location("./migrations");
//!     let loader = FileLoader::from_config(&config);
//!
//!     let mut engine = Engine::new(config, Box::new(driver), Box::new(loader));
//!     let report = engine.migrate().await?;
//!     println!("{} migrations applied", report.migrations_applied);
//!     Ok(())
//! }
//! ```
//!
//! ## Workspace Crates
//!
//! - `tidemark-core` - the migration orchestrator
//! - `tidemark-postgres` - PostgreSQL driver
//! - `tidemark-sqlite` - SQLite driver
//! - `tidemark-cli` - the `tidemark` command-line binary

pub use tidemark_core::{
    Category, CoreError, CoreResult, DatabaseDriver, EmbeddedLoader, Engine, EngineConfig,
    EntryDraft, EntryKind, FileLoader, InfoRow, LockRetryPolicy, MetadataEntry, MetadataStore,
    MigrationLoader, MigrationReport, MigrationScript, RowState, SqlStatement, TransactionMode,
    Version,
};

#[cfg(feature = "postgres")]
pub use tidemark_postgres as postgres;

#[cfg(feature = "sqlite")]
pub use tidemark_sqlite as sqlite;
