//! The migration history table on PostgreSQL.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::Client;
use tracing::debug;

use tidemark_core::{
    CoreError, CoreResult, EntryDraft, EntryKind, MetadataEntry, MetadataStore, Version,
};

use crate::driver::quote_ident;
use crate::error::PgError;

/// `MetadataStore` over a PostgreSQL table.
pub struct PgMetadataStore {
    client: Arc<Client>,
    schema: String,
    table: String,
}

impl PgMetadataStore {
    pub(crate) fn new(client: Arc<Client>, schema: &str, table: &str) -> Self {
        Self {
            client,
            schema: schema.to_string(),
            table: table.to_string(),
        }
    }

    fn qualified(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }
}

/// DDL for the history table.
pub fn create_table_sql(schema: &str, table: &str) -> String {
    let q = format!("{}.{}", quote_ident(schema), quote_ident(table));
    format!(
        r#"CREATE TABLE IF NOT EXISTS {q} (
    id BIGSERIAL PRIMARY KEY,
    type VARCHAR(32) NOT NULL,
    version VARCHAR(50),
    name VARCHAR(300) NOT NULL,
    description VARCHAR(1000) NOT NULL,
    checksum VARCHAR(64),
    installed_on TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
    installed_by VARCHAR(128) NOT NULL,
    success BOOLEAN,
    execution_time_ms BIGINT
);
CREATE INDEX IF NOT EXISTS {index} ON {q} (installed_on DESC);"#,
        index = quote_ident(&format!("{table}_installed_on_idx")),
    )
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    async fn table_exists(&self) -> CoreResult<bool> {
        let row = self
            .client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
                 WHERE table_schema = $1 AND table_name = $2)",
                &[&self.schema, &self.table],
            )
            .await
            .map_err(PgError::from)?;
        Ok(row.get(0))
    }

    async fn ensure_table(&self) -> CoreResult<()> {
        self.client
            .batch_execute(&format!(
                "CREATE SCHEMA IF NOT EXISTS {}",
                quote_ident(&self.schema)
            ))
            .await
            .map_err(PgError::from)?;
        self.client
            .batch_execute(&create_table_sql(&self.schema, &self.table))
            .await
            .map_err(PgError::from)?;
        debug!(table = %self.qualified(), "history table ready");
        Ok(())
    }

    async fn all_entries(&self) -> CoreResult<Vec<MetadataEntry>> {
        let rows = self
            .client
            .query(
                &format!(
                    "SELECT id, type, version, name, description, checksum, \
                     installed_on, installed_by, success, execution_time_ms \
                     FROM {} ORDER BY id",
                    self.qualified()
                ),
                &[],
            )
            .await
            .map_err(PgError::from)?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let kind_text: String = row.get(1);
            let version_text: Option<String> = row.get(2);
            let version = match version_text {
                Some(text) => Some(Version::parse(&text).map_err(|e| {
                    CoreError::driver(format!("corrupt version label in history: {e}"))
                })?),
                None => None,
            };
            entries.push(MetadataEntry {
                id: row.get(0),
                kind: EntryKind::from_str(&kind_text)?,
                version,
                name: row.get(3),
                description: row.get(4),
                checksum: row.get(5),
                installed_on: row.get::<_, DateTime<Utc>>(6),
                installed_by: row.get(7),
                success: row.get(8),
                execution_time_ms: row.get(9),
            });
        }
        Ok(entries)
    }

    async fn append(&self, draft: EntryDraft) -> CoreResult<MetadataEntry> {
        let version_text = draft.version.as_ref().map(ToString::to_string);
        let row = self
            .client
            .query_one(
                &format!(
                    "INSERT INTO {} (type, version, name, description, checksum, \
                     installed_by, success, execution_time_ms) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                     RETURNING id, installed_on",
                    self.qualified()
                ),
                &[
                    &draft.kind.to_string(),
                    &version_text,
                    &draft.name,
                    &draft.description,
                    &draft.checksum,
                    &draft.installed_by,
                    &draft.success,
                    &draft.execution_time_ms,
                ],
            )
            .await
            .map_err(PgError::from)?;

        Ok(MetadataEntry {
            id: row.get(0),
            kind: draft.kind,
            version: draft.version,
            name: draft.name,
            description: draft.description,
            checksum: draft.checksum,
            installed_on: row.get::<_, DateTime<Utc>>(1),
            installed_by: draft.installed_by,
            success: draft.success,
            execution_time_ms: draft.execution_time_ms,
        })
    }

    async fn update_checksum(&self, id: i64, checksum: &str) -> CoreResult<()> {
        let updated = self
            .client
            .execute(
                &format!("UPDATE {} SET checksum = $1 WHERE id = $2", self.qualified()),
                &[&checksum, &id],
            )
            .await
            .map_err(PgError::from)?;
        if updated == 0 {
            return Err(CoreError::driver(format!("no history row with id {id}")));
        }
        Ok(())
    }

    async fn try_lock(&self) -> CoreResult<bool> {
        // Single INSERT so two runners cannot both pass the existence
        // check; the application lock serializes the rest.
        let inserted = self
            .client
            .execute(
                &format!(
                    "INSERT INTO {q} (type, name, description, installed_by) \
                     SELECT 'Lock', 'lock', 'locked by a runner', 'tidemark' \
                     WHERE NOT EXISTS (SELECT 1 FROM {q} WHERE type = 'Lock')",
                    q = self.qualified()
                ),
                &[],
            )
            .await
            .map_err(PgError::from)?;
        Ok(inserted == 1)
    }

    async fn release_lock(&self) -> CoreResult<()> {
        self.client
            .execute(
                &format!("DELETE FROM {} WHERE type = 'Lock'", self.qualified()),
                &[],
            )
            .await
            .map_err(PgError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_table_sql_shape() {
        let sql = create_table_sql("app", "changelog");
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS \"app\".\"changelog\""));
        assert!(sql.contains("id BIGSERIAL PRIMARY KEY"));
        assert!(sql.contains("checksum VARCHAR(64)"));
        assert!(sql.contains("installed_on TIMESTAMP WITH TIME ZONE"));
        assert!(sql.contains("\"changelog_installed_on_idx\""));
    }

    #[test]
    fn test_create_table_sql_quotes_odd_names() {
        let sql = create_table_sql("my schema", "change\"log");
        assert!(sql.contains("\"my schema\".\"change\"\"log\""));
    }
}
