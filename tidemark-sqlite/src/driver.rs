//! SQLite implementation of the driver capability set.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_rusqlite::Connection;
use tracing::{debug, info};

use tidemark_core::{CoreResult, DatabaseDriver, MetadataStore, SqlStatement};

use crate::error::{SqliteError, SqliteResult};
use crate::statement;
use crate::store::SqliteMetadataStore;

/// The only schema SQLite exposes to the engine.
pub const MAIN_SCHEMA: &str = "main";

/// SQLite driver over a single database file.
///
/// SQLite has no server to hold an advisory lock on, so the application
/// lock is a no-op and the history table lock row carries cluster mode
/// alone; the write-ahead file lock already serializes writers.
pub struct SqliteDriver {
    conn: Connection,
}

impl SqliteDriver {
    /// Open (or create) the database file.
    pub async fn open(path: impl AsRef<Path>) -> SqliteResult<Self> {
        let conn = Connection::open(path.as_ref())
            .await
            .map_err(SqliteError::Open)?;
        info!(path = %path.as_ref().display(), "opened SQLite database");
        Ok(Self { conn })
    }

    /// Open an in-memory database.
    pub async fn open_in_memory() -> SqliteResult<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(SqliteError::Open)?;
        Ok(Self { conn })
    }

    async fn batch(&self, sql: &str) -> SqliteResult<()> {
        debug!(sql = %sql, "executing");
        let sql = sql.to_string();
        self.conn
            .call(move |conn| {
                conn.execute_batch(&sql)?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DatabaseDriver for SqliteDriver {
    fn dialect(&self) -> &'static str {
        "sqlite"
    }

    async fn current_schema(&self) -> CoreResult<Option<String>> {
        Ok(Some(MAIN_SCHEMA.to_string()))
    }

    async fn schema_exists(&self, schema: &str) -> CoreResult<bool> {
        Ok(schema == MAIN_SCHEMA)
    }

    async fn schema_is_empty(&self, schema: &str) -> CoreResult<bool> {
        if schema != MAIN_SCHEMA {
            return Ok(false);
        }
        let count: i64 = self
            .conn
            .call(|conn| {
                let n = conn.query_row(
                    "SELECT count(*) FROM sqlite_master \
                     WHERE name NOT LIKE 'sqlite_%'",
                    [],
                    |row| row.get(0),
                )?;
                Ok(n)
            })
            .await
            .map_err(SqliteError::from)?;
        Ok(count == 0)
    }

    async fn create_schema(&self, _schema: &str) -> CoreResult<()> {
        Err(SqliteError::Unsupported("creating schemas").into())
    }

    async fn drop_schema(&self, _schema: &str) -> CoreResult<()> {
        Err(SqliteError::Unsupported("dropping schemas").into())
    }

    async fn erase_schema(&self, schema: &str) -> CoreResult<()> {
        if schema != MAIN_SCHEMA {
            return Err(SqliteError::Unsupported("erasing attached schemas").into());
        }
        self.conn
            .call(|conn| {
                // Drop dependents before the tables that carry them.
                for object_type in ["trigger", "view", "index", "table"] {
                    let names: Vec<String> = {
                        let mut stmt = conn.prepare(
                            "SELECT name FROM sqlite_master WHERE type = ?1 \
                             AND name NOT LIKE 'sqlite_%'",
                        )?;
                        let rows = stmt.query_map([object_type], |row| row.get(0))?;
                        rows.collect::<Result<_, _>>()?
                    };
                    for name in names {
                        conn.execute_batch(&format!(
                            "DROP {} IF EXISTS {}",
                            object_type.to_uppercase(),
                            quote_ident(&name)
                        ))?;
                    }
                }
                Ok(())
            })
            .await
            .map_err(SqliteError::from)?;
        info!("database contents erased");
        Ok(())
    }

    fn metadata_store(&self, _schema: &str, table: &str) -> Arc<dyn MetadataStore> {
        Arc::new(SqliteMetadataStore::new(self.conn.clone(), table))
    }

    async fn try_acquire_application_lock(&self) -> CoreResult<bool> {
        // No server to hold an advisory lock on; the history lock row is
        // the cluster-mode serialization point.
        Ok(true)
    }

    async fn release_application_lock(&self) -> CoreResult<()> {
        Ok(())
    }

    fn split_statements(&self, body: &str) -> CoreResult<Vec<SqlStatement>> {
        Ok(statement::split(body))
    }

    async fn begin(&self) -> CoreResult<()> {
        Ok(self.batch("BEGIN").await?)
    }

    async fn commit(&self) -> CoreResult<()> {
        Ok(self.batch("COMMIT").await?)
    }

    async fn rollback(&self) -> CoreResult<()> {
        Ok(self.batch("ROLLBACK").await?)
    }

    async fn execute(&self, sql: &str, timeout: Option<Duration>) -> CoreResult<u64> {
        debug!(sql = %sql, "executing statement");
        let owned = sql.to_string();
        let run = self.conn.call(move |conn| {
            conn.execute_batch(&owned)?;
            Ok(conn.changes())
        });
        let affected = match timeout {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .map_err(|_| SqliteError::Timeout(limit.as_secs()))?
                .map_err(SqliteError::from)?,
            None => run.await.map_err(SqliteError::from)?,
        };
        Ok(affected)
    }
}

/// Quote an identifier for inclusion in DDL.
pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
