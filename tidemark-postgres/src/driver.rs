//! PostgreSQL implementation of the driver capability set.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_postgres::{Client, NoTls, SimpleQueryMessage};
use tracing::{debug, error, info};

use tidemark_core::{CoreResult, DatabaseDriver, MetadataStore, SqlStatement};

use crate::error::{PgError, PgResult};
use crate::statement;
use crate::store::PgMetadataStore;

/// Advisory lock key for the application lock. One runner fleet per
/// database serializes on this key.
pub const APPLICATION_LOCK_KEY: i64 = 0x7469_6465_6d61_726b;

/// PostgreSQL driver over one long-lived session.
pub struct PostgresDriver {
    client: Arc<Client>,
    lock_key: i64,
}

impl PostgresDriver {
    /// Connect to the database. The connection task is spawned onto the
    /// current Tokio runtime and lives as long as the driver.
    pub async fn connect(url: &str) -> PgResult<Self> {
        let (client, connection) = tokio_postgres::connect(url, NoTls)
            .await
            .map_err(PgError::Connect)?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "PostgreSQL connection task ended");
            }
        });
        info!("connected to PostgreSQL");
        Ok(Self {
            client: Arc::new(client),
            lock_key: APPLICATION_LOCK_KEY,
        })
    }

    /// Use a custom advisory lock key instead of the default.
    pub fn with_lock_key(mut self, key: i64) -> Self {
        self.lock_key = key;
        self
    }

    async fn query_bool(
        &self,
        sql: &str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    ) -> PgResult<bool> {
        let row = self.client.query_one(sql, params).await?;
        Ok(row.get(0))
    }

    async fn batch(&self, sql: &str) -> PgResult<()> {
        debug!(sql = %sql, "executing");
        self.client.batch_execute(sql).await?;
        Ok(())
    }
}

#[async_trait]
impl DatabaseDriver for PostgresDriver {
    fn dialect(&self) -> &'static str {
        "postgresql"
    }

    async fn current_schema(&self) -> CoreResult<Option<String>> {
        let row = self
            .client
            .query_one("SELECT current_schema()", &[])
            .await
            .map_err(PgError::from)?;
        Ok(row.get(0))
    }

    async fn schema_exists(&self, schema: &str) -> CoreResult<bool> {
        Ok(self
            .query_bool(
                "SELECT EXISTS (SELECT 1 FROM information_schema.schemata WHERE schema_name = $1)",
                &[&schema],
            )
            .await?)
    }

    async fn schema_is_empty(&self, schema: &str) -> CoreResult<bool> {
        Ok(self
            .query_bool(
                "SELECT NOT EXISTS (\
                 SELECT 1 FROM information_schema.tables WHERE table_schema = $1 \
                 UNION ALL \
                 SELECT 1 FROM information_schema.sequences WHERE sequence_schema = $1 \
                 UNION ALL \
                 SELECT 1 FROM information_schema.routines WHERE routine_schema = $1)",
                &[&schema],
            )
            .await?)
    }

    async fn create_schema(&self, schema: &str) -> CoreResult<()> {
        Ok(self
            .batch(&format!("CREATE SCHEMA {}", quote_ident(schema)))
            .await?)
    }

    async fn drop_schema(&self, schema: &str) -> CoreResult<()> {
        Ok(self
            .batch(&format!("DROP SCHEMA {} CASCADE", quote_ident(schema)))
            .await?)
    }

    async fn erase_schema(&self, schema: &str) -> CoreResult<()> {
        // The catalog produces the drop statements so quoting and function
        // signatures are handled server-side.
        let rows = self
            .client
            .query(
                "SELECT format('DROP VIEW IF EXISTS %I.%I CASCADE', table_schema, table_name) \
                 FROM information_schema.views WHERE table_schema = $1 \
                 UNION ALL \
                 SELECT format('DROP TABLE IF EXISTS %I.%I CASCADE', table_schema, table_name) \
                 FROM information_schema.tables \
                 WHERE table_schema = $1 AND table_type = 'BASE TABLE' \
                 UNION ALL \
                 SELECT format('DROP SEQUENCE IF EXISTS %I.%I CASCADE', sequence_schema, sequence_name) \
                 FROM information_schema.sequences WHERE sequence_schema = $1 \
                 UNION ALL \
                 SELECT format('DROP %s IF EXISTS %I.%I(%s) CASCADE', \
                        CASE WHEN p.prokind = 'p' THEN 'PROCEDURE' ELSE 'FUNCTION' END, \
                        n.nspname, p.proname, pg_get_function_identity_arguments(p.oid)) \
                 FROM pg_proc p JOIN pg_namespace n ON n.oid = p.pronamespace \
                 WHERE n.nspname = $1",
                &[&schema],
            )
            .await
            .map_err(PgError::from)?;

        for row in rows {
            let drop_sql: String = row.get(0);
            self.batch(&drop_sql).await?;
        }
        info!(schema, "schema contents erased");
        Ok(())
    }

    fn metadata_store(&self, schema: &str, table: &str) -> Arc<dyn MetadataStore> {
        Arc::new(PgMetadataStore::new(self.client.clone(), schema, table))
    }

    async fn try_acquire_application_lock(&self) -> CoreResult<bool> {
        Ok(self
            .query_bool("SELECT pg_try_advisory_lock($1)", &[&self.lock_key])
            .await?)
    }

    async fn release_application_lock(&self) -> CoreResult<()> {
        self.query_bool("SELECT pg_advisory_unlock($1)", &[&self.lock_key])
            .await?;
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
        let run = self.client.simple_query(sql);
        let messages = match timeout {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .map_err(|_| PgError::Timeout(limit.as_secs()))?
                .map_err(PgError::from)?,
            None => run.await.map_err(PgError::from)?,
        };
        let affected = messages
            .iter()
            .rev()
            .find_map(|m| match m {
                SimpleQueryMessage::CommandComplete(n) => Some(*n),
                _ => None,
            })
            .unwrap_or(0);
        Ok(affected)
    }

    async fn set_ambient_timeout(&self, timeout: Duration) -> CoreResult<()> {
        // transaction_timeout needs PostgreSQL 17; older servers reject
        // the parameter and the run fails before any script executes.
        Ok(self
            .batch(&format!(
                "SET LOCAL transaction_timeout = '{}s'",
                timeout.as_secs()
            ))
            .await?)
    }
}

/// Quote an identifier for inclusion in DDL.
pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
