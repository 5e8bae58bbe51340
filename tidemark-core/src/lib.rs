//! # tidemark-core
//!
//! The migration orchestrator behind Tidemark.
//!
//! This crate provides:
//! - Script discovery from directories or embedded bundles, following the
//!   `V<version>__<description>.sql` / `R__<description>.sql` convention
//! - Reconciliation of source scripts against the persisted history table
//!   (pending, out-of-order, off-target and ignored sets)
//! - Checksum validation and in-place repair
//! - Transactional script execution: per-script commits, one shared
//!   commit, or a full-rollback rehearsal
//! - Cluster-safe locking so concurrent runners serialize
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌────────────────┐     ┌──────────────┐
//! │ Loader       │────▶│ Reconciler     │────▶│ Executor     │
//! │ (scripts)    │     │ (pending sets) │     │ (statements) │
//! └──────────────┘     └────────────────┘     └──────────────┘
//!          ▲                   ▲                      │
//!          │                   │                      ▼
//!          │            ┌────────────────┐     ┌──────────────┐
//!          └────────────│ Engine         │────▶│ History Tbl  │
//!                       │ (commands)     │     │ (metadata)   │
//!                       └────────────────┘     └──────────────┘
//! ```
//!
//! The [`Engine`] drives five commands - migrate, validate, repair, erase
//! and info - over two capability traits: [`DatabaseDriver`], implemented
//! per DBMS dialect, and [`MigrationLoader`], implemented per script
//! source. Everything dialect-specific (DDL, statement splitting, locks)
//! lives behind the driver; the core never parses SQL.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tidemark_core::{Engine, EngineConfig, FileLoader};
//!
//! let config = EngineConfig::new()
//!     .location("./migrations")
//!     .schema("app");
//! let loader = FileLoader::from_config(&config);
//! let driver = /* a DatabaseDriver implementation */;
//!
//! let mut engine = Engine::new(config, Box::new(driver), Box::new(loader));
//! let report = engine.migrate().await?;
//! println!("{}", report.summary());
//! ```

pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod execute;
pub mod info;
pub mod loader;
pub mod lock;
pub mod metadata;
pub mod reconcile;
pub mod script;
pub mod validate;
pub mod version;

// Re-exports
pub use config::{Encoding, EngineConfig, NamingConvention, TransactionMode};
pub use driver::{DatabaseDriver, SqlStatement};
pub use engine::{Engine, MigrationReport};
pub use error::{CoreError, CoreResult};
pub use execute::Executor;
pub use info::{info_rows, InfoRow, RowState, SchemaAction};
pub use loader::{verify_unique, EmbeddedLoader, FileLoader, MigrationLoader};
pub use lock::{LockRetryPolicy, LockSet};
pub use metadata::{EntryDraft, EntryKind, MetadataEntry, MetadataSnapshot, MetadataStore};
pub use reconcile::{reconcile, Reconciliation};
pub use script::{Category, MigrationScript, ScriptBody};
pub use validate::{validate_and_repair, validation_issues, RepairMode};
pub use version::Version;
