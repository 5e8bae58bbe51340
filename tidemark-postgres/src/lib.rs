//! # tidemark-postgres
//!
//! PostgreSQL driver for the Tidemark migration engine.
//!
//! Holds one long-lived [`tokio_postgres`] session for the whole run:
//! schema management through `information_schema`, the application lock
//! through `pg_try_advisory_lock`, the history table with a `BIGSERIAL`
//! id, and a statement splitter aware of dollar-quoted bodies, comments
//! and the statements PostgreSQL refuses to run inside a transaction
//! (`CREATE INDEX CONCURRENTLY`, `VACUUM`, ...).
//!
//! ## Example
//!
//! ```rust,ignore
//! use tidemark_core::{Engine, EngineConfig, FileLoader};
//! use tidemark_postgres::PostgresDriver;
//!
//! let driver = PostgresDriver::connect("postgres://localhost/app").await?;
//! let config = EngineConfig::new().location("./migrations");
//! let loader = FileLoader::from_config(&config);
//! let mut engine = Engine::new(config, Box::new(driver), Box::new(loader));
//! engine.migrate().await?;
//! ```

pub mod driver;
pub mod error;
pub mod statement;
pub mod store;

pub use driver::{PostgresDriver, APPLICATION_LOCK_KEY};
pub use error::{PgError, PgResult};
pub use store::PgMetadataStore;
