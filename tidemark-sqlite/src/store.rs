//! The migration history table on SQLite.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_rusqlite::Connection;
use tracing::debug;

use tidemark_core::{
    CoreError, CoreResult, EntryDraft, EntryKind, MetadataEntry, MetadataStore, Version,
};

use crate::driver::quote_ident;
use crate::error::SqliteError;

/// `MetadataStore` over a SQLite table in the main database.
pub struct SqliteMetadataStore {
    conn: Connection,
    table: String,
}

impl SqliteMetadataStore {
    pub(crate) fn new(conn: Connection, table: &str) -> Self {
        Self {
            conn,
            table: table.to_string(),
        }
    }
}

/// DDL for the history table.
pub fn create_table_sql(table: &str) -> String {
    format!(
        r#"CREATE TABLE IF NOT EXISTS {q} (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    type TEXT NOT NULL,
    version TEXT,
    name TEXT NOT NULL,
    description TEXT NOT NULL,
    checksum TEXT,
    installed_on TEXT NOT NULL,
    installed_by TEXT NOT NULL,
    success INTEGER,
    execution_time_ms INTEGER
)"#,
        q = quote_ident(table),
    )
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn table_exists(&self) -> CoreResult<bool> {
        let table = self.table.clone();
        let exists: bool = self
            .conn
            .call(move |conn| {
                let n: i64 = conn.query_row(
                    "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [&table],
                    |row| row.get(0),
                )?;
                Ok(n > 0)
            })
            .await
            .map_err(SqliteError::from)?;
        Ok(exists)
    }

    async fn ensure_table(&self) -> CoreResult<()> {
        let ddl = create_table_sql(&self.table);
        self.conn
            .call(move |conn| {
                conn.execute_batch(&ddl)?;
                Ok(())
            })
            .await
            .map_err(SqliteError::from)?;
        debug!(table = %self.table, "history table ready");
        Ok(())
    }

    async fn all_entries(&self) -> CoreResult<Vec<MetadataEntry>> {
        let table = quote_ident(&self.table);
        let raw: Vec<RawEntry> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT id, type, version, name, description, checksum, \
                     installed_on, installed_by, success, execution_time_ms \
                     FROM {table} ORDER BY id"
                ))?;
                let rows = stmt.query_map([], |row| {
                    Ok(RawEntry {
                        id: row.get(0)?,
                        kind: row.get(1)?,
                        version: row.get(2)?,
                        name: row.get(3)?,
                        description: row.get(4)?,
                        checksum: row.get(5)?,
                        installed_on: row.get(6)?,
                        installed_by: row.get(7)?,
                        success: row.get(8)?,
                        execution_time_ms: row.get(9)?,
                    })
                })?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
            .map_err(SqliteError::from)?;

        raw.into_iter().map(RawEntry::into_entry).collect()
    }

    async fn append(&self, draft: EntryDraft) -> CoreResult<MetadataEntry> {
        let table = quote_ident(&self.table);
        let installed_on = Utc::now();
        let row = (
            draft.kind.to_string(),
            draft.version.as_ref().map(ToString::to_string),
            draft.name.clone(),
            draft.description.clone(),
            draft.checksum.clone(),
            installed_on.to_rfc3339(),
            draft.installed_by.clone(),
            draft.success,
            draft.execution_time_ms,
        );
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    &format!(
                        "INSERT INTO {table} (type, version, name, description, checksum, \
                         installed_on, installed_by, success, execution_time_ms) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                    ),
                    rusqlite::params![
                        row.0, row.1, row.2, row.3, row.4, row.5, row.6, row.7, row.8
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(SqliteError::from)?;

        Ok(MetadataEntry {
            id,
            kind: draft.kind,
            version: draft.version,
            name: draft.name,
            description: draft.description,
            checksum: draft.checksum,
            installed_on,
            installed_by: draft.installed_by,
            success: draft.success,
            execution_time_ms: draft.execution_time_ms,
        })
    }

    async fn update_checksum(&self, id: i64, checksum: &str) -> CoreResult<()> {
        let table = quote_ident(&self.table);
        let checksum = checksum.to_string();
        let updated = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    &format!("UPDATE {table} SET checksum = ?1 WHERE id = ?2"),
                    rusqlite::params![checksum, id],
                )?;
                Ok(n)
            })
            .await
            .map_err(SqliteError::from)?;
        if updated == 0 {
            return Err(CoreError::driver(format!("no history row with id {id}")));
        }
        Ok(())
    }

    async fn try_lock(&self) -> CoreResult<bool> {
        let table = quote_ident(&self.table);
        let now = Utc::now().to_rfc3339();
        let inserted = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    &format!(
                        "INSERT INTO {table} (type, name, description, installed_on, installed_by) \
                         SELECT 'Lock', 'lock', 'locked by a runner', ?1, 'tidemark' \
                         WHERE NOT EXISTS (SELECT 1 FROM {table} WHERE type = 'Lock')"
                    ),
                    rusqlite::params![now],
                )?;
                Ok(n)
            })
            .await
            .map_err(SqliteError::from)?;
        Ok(inserted == 1)
    }

    async fn release_lock(&self) -> CoreResult<()> {
        let table = quote_ident(&self.table);
        self.conn
            .call(move |conn| {
                conn.execute(&format!("DELETE FROM {table} WHERE type = 'Lock'"), [])?;
                Ok(())
            })
            .await
            .map_err(SqliteError::from)?;
        Ok(())
    }
}

struct RawEntry {
    id: i64,
    kind: String,
    version: Option<String>,
    name: String,
    description: String,
    checksum: Option<String>,
    installed_on: String,
    installed_by: String,
    success: Option<bool>,
    execution_time_ms: Option<i64>,
}

impl RawEntry {
    fn into_entry(self) -> CoreResult<MetadataEntry> {
        let version = match self.version {
            Some(text) => Some(Version::parse(&text).map_err(|e| {
                CoreError::driver(format!("corrupt version label in history: {e}"))
            })?),
            None => None,
        };
        let installed_on = DateTime::parse_from_rfc3339(&self.installed_on)
            .map_err(|e| CoreError::driver(format!("corrupt timestamp in history: {e}")))?
            .with_timezone(&Utc);
        Ok(MetadataEntry {
            id: self.id,
            kind: EntryKind::from_str(&self.kind)?,
            version,
            name: self.name,
            description: self.description,
            checksum: self.checksum,
            installed_on,
            installed_by: self.installed_by,
            success: self.success,
            execution_time_ms: self.execution_time_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_table_sql_shape() {
        let sql = create_table_sql("changelog");
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS \"changelog\""));
        assert!(sql.contains("id INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(sql.contains("checksum TEXT"));
    }

    #[tokio::test]
    async fn test_round_trip_append_and_read() {
        let conn = Connection::open_in_memory().await.unwrap();
        let store = SqliteMetadataStore::new(conn, "changelog");
        store.ensure_table().await.unwrap();
        assert!(store.table_exists().await.unwrap());

        let entry = store
            .append(EntryDraft::marker(
                EntryKind::StartVersion,
                Some(Version::parse("2").unwrap()),
                "",
                "version 2 as a starting point",
                "test",
            ))
            .await
            .unwrap();
        assert_eq!(entry.id, 1);

        let entries = store.all_entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, EntryKind::StartVersion);
        assert_eq!(entries[0].version, Some(Version::parse("2").unwrap()));
    }

    #[tokio::test]
    async fn test_lock_row_round_trip() {
        let conn = Connection::open_in_memory().await.unwrap();
        let store = SqliteMetadataStore::new(conn, "changelog");
        store.ensure_table().await.unwrap();

        assert!(store.try_lock().await.unwrap());
        assert!(!store.try_lock().await.unwrap(), "second take is refused");
        store.release_lock().await.unwrap();
        assert!(store.try_lock().await.unwrap());
    }

    #[tokio::test]
    async fn test_update_checksum() {
        let conn = Connection::open_in_memory().await.unwrap();
        let store = SqliteMetadataStore::new(conn, "changelog");
        store.ensure_table().await.unwrap();

        let draft = EntryDraft {
            kind: EntryKind::Migration,
            version: Some(Version::parse("1").unwrap()),
            name: "V1__a.sql".to_string(),
            description: "a".to_string(),
            checksum: Some("old".to_string()),
            installed_by: "test".to_string(),
            success: Some(true),
            execution_time_ms: Some(3),
        };
        let entry = store.append(draft).await.unwrap();

        store.update_checksum(entry.id, "new").await.unwrap();
        let entries = store.all_entries().await.unwrap();
        assert_eq!(entries[0].checksum.as_deref(), Some("new"));

        assert!(store.update_checksum(999, "x").await.is_err());
    }
}
