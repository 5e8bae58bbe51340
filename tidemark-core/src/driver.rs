//! The database driver capability set consumed by the engine.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::CoreResult;
use crate::metadata::MetadataStore;

/// One executable statement produced by a driver's statement builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlStatement {
    /// The statement text.
    pub sql: String,
    /// Whether the statement must run inside a transaction. Statements such
    /// as `CREATE INDEX CONCURRENTLY` refuse to, and force a commit first.
    pub must_run_in_transaction: bool,
}

impl SqlStatement {
    /// A statement that runs inside a transaction.
    pub fn transactional(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            must_run_in_transaction: true,
        }
    }

    /// A statement that must run outside any transaction.
    pub fn autonomous(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            must_run_in_transaction: false,
        }
    }
}

/// Dialect-specific operations over one long-lived database session.
///
/// The engine is generic over this capability set; each supported DBMS
/// provides a variant. Dialect quirks are expressed through the capability
/// flags rather than type checks: a dialect without transactions reports
/// `supports_transactions() == false` and the engine skips transaction
/// boundaries, and a dialect without a monotonic history id reports
/// `has_monotonic_id() == false` and the engine orders repeatable history
/// rows by `(installed_on, name)` instead.
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Short dialect name for logs ("postgresql", "sqlite", ...).
    fn dialect(&self) -> &'static str;

    /// Whether the dialect supports transactions at all.
    fn supports_transactions(&self) -> bool {
        true
    }

    /// Whether history row ids are assigned monotonically.
    fn has_monotonic_id(&self) -> bool {
        true
    }

    /// The schema the session is connected to, when the dialect has one.
    async fn current_schema(&self) -> CoreResult<Option<String>>;

    /// Whether the schema exists.
    async fn schema_exists(&self, schema: &str) -> CoreResult<bool>;

    /// Whether the schema contains no user objects.
    async fn schema_is_empty(&self, schema: &str) -> CoreResult<bool>;

    /// Create the schema.
    async fn create_schema(&self, schema: &str) -> CoreResult<()>;

    /// Drop the schema and everything in it.
    async fn drop_schema(&self, schema: &str) -> CoreResult<()>;

    /// Drop every user object in the schema, keeping the schema itself.
    async fn erase_schema(&self, schema: &str) -> CoreResult<()>;

    /// The history table store for `schema.table`.
    fn metadata_store(&self, schema: &str, table: &str) -> Arc<dyn MetadataStore>;

    /// Try to take the server-side application lock. `false` on contention.
    async fn try_acquire_application_lock(&self) -> CoreResult<bool>;

    /// Release the server-side application lock.
    async fn release_application_lock(&self) -> CoreResult<()>;

    /// Split a script body into executable statements.
    fn split_statements(&self, body: &str) -> CoreResult<Vec<SqlStatement>>;

    /// Open a transaction on the session.
    async fn begin(&self) -> CoreResult<()>;

    /// Commit the session's open transaction.
    async fn commit(&self) -> CoreResult<()>;

    /// Roll back the session's open transaction.
    async fn rollback(&self) -> CoreResult<()>;

    /// Execute one statement, returning the affected row count.
    async fn execute(&self, sql: &str, timeout: Option<Duration>) -> CoreResult<u64>;

    /// Constrain the ambient transaction opened by commit-all /
    /// rollback-all mode. Dialects without such a knob ignore it.
    async fn set_ambient_timeout(&self, _timeout: Duration) -> CoreResult<()> {
        Ok(())
    }
}
