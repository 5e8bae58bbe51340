//! In-memory driver, store and loader doubles for engine tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use tidemark_core::{
    Category, CoreError, CoreResult, DatabaseDriver, Encoding, Engine, EngineConfig, EntryDraft,
    MetadataEntry, MetadataStore, MigrationLoader, MigrationScript, ScriptBody, SqlStatement,
};

/// Shared state behind one simulated database.
#[derive(Default)]
pub struct MemoryDb {
    schemas: Mutex<BTreeMap<String, Vec<String>>>,
    entries: Mutex<Vec<MetadataEntry>>,
    table_exists: Mutex<bool>,
    metadata_schema: Mutex<Option<String>>,
    metadata_locked: Mutex<bool>,
    app_locked: Mutex<bool>,
    txn_entries: Mutex<Option<Vec<i64>>>,
    executed: Mutex<Vec<String>>,
    fail_counts: Mutex<HashMap<String, i64>>,
    next_id: AtomicI64,
}

/// Handle over the simulated database shared by driver and store.
#[derive(Clone)]
pub struct TestDb(pub Arc<MemoryDb>);

impl TestDb {
    pub fn new() -> Self {
        let db = MemoryDb {
            next_id: AtomicI64::new(1),
            ..MemoryDb::default()
        };
        db.schemas
            .lock()
            .unwrap()
            .insert("public".to_string(), Vec::new());
        Self(Arc::new(db))
    }

    pub fn entries(&self) -> Vec<MetadataEntry> {
        self.0.entries.lock().unwrap().clone()
    }

    pub fn migration_entries(&self) -> Vec<MetadataEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.kind.is_migration())
            .collect()
    }

    pub fn executed(&self) -> Vec<String> {
        self.0.executed.lock().unwrap().clone()
    }

    pub fn schema_exists(&self, name: &str) -> bool {
        self.0.schemas.lock().unwrap().contains_key(name)
    }

    pub fn table_exists(&self) -> bool {
        *self.0.table_exists.lock().unwrap()
    }

    pub fn locks_held(&self) -> (bool, bool) {
        (
            *self.0.app_locked.lock().unwrap(),
            *self.0.metadata_locked.lock().unwrap(),
        )
    }

    pub fn hold_app_lock(&self) {
        *self.0.app_locked.lock().unwrap() = true;
    }

    /// Every statement containing `fragment` fails forever.
    pub fn fail_always(&self, fragment: &str) {
        self.0
            .fail_counts
            .lock()
            .unwrap()
            .insert(fragment.to_string(), -1);
    }

    /// The next `times` statements containing `fragment` fail.
    pub fn fail_times(&self, fragment: &str, times: i64) {
        self.0
            .fail_counts
            .lock()
            .unwrap()
            .insert(fragment.to_string(), times);
    }

    pub fn driver(&self) -> MemoryDriver {
        MemoryDriver {
            db: self.0.clone(),
            supports_transactions: true,
            monotonic_id: true,
        }
    }
}

/// `DatabaseDriver` double over [`MemoryDb`].
pub struct MemoryDriver {
    db: Arc<MemoryDb>,
    pub supports_transactions: bool,
    pub monotonic_id: bool,
}

impl MemoryDriver {
    fn reset_metadata_if_housed(&self, schema: &str) {
        let housed = self
            .db
            .metadata_schema
            .lock()
            .unwrap()
            .as_deref()
            .map(|s| s == schema)
            .unwrap_or(false);
        if housed {
            self.db.entries.lock().unwrap().clear();
            *self.db.table_exists.lock().unwrap() = false;
            *self.db.metadata_locked.lock().unwrap() = false;
        }
    }
}

#[async_trait]
impl DatabaseDriver for MemoryDriver {
    fn dialect(&self) -> &'static str {
        "memory"
    }

    fn supports_transactions(&self) -> bool {
        self.supports_transactions
    }

    fn has_monotonic_id(&self) -> bool {
        self.monotonic_id
    }

    async fn current_schema(&self) -> CoreResult<Option<String>> {
        Ok(Some("public".to_string()))
    }

    async fn schema_exists(&self, schema: &str) -> CoreResult<bool> {
        Ok(self.db.schemas.lock().unwrap().contains_key(schema))
    }

    async fn schema_is_empty(&self, schema: &str) -> CoreResult<bool> {
        Ok(self
            .db
            .schemas
            .lock()
            .unwrap()
            .get(schema)
            .map(|objects| objects.is_empty())
            .unwrap_or(false))
    }

    async fn create_schema(&self, schema: &str) -> CoreResult<()> {
        self.db
            .schemas
            .lock()
            .unwrap()
            .insert(schema.to_string(), Vec::new());
        Ok(())
    }

    async fn drop_schema(&self, schema: &str) -> CoreResult<()> {
        self.db.schemas.lock().unwrap().remove(schema);
        self.reset_metadata_if_housed(schema);
        Ok(())
    }

    async fn erase_schema(&self, schema: &str) -> CoreResult<()> {
        if let Some(objects) = self.db.schemas.lock().unwrap().get_mut(schema) {
            objects.clear();
        }
        self.reset_metadata_if_housed(schema);
        Ok(())
    }

    fn metadata_store(&self, schema: &str, _table: &str) -> Arc<dyn MetadataStore> {
        *self.db.metadata_schema.lock().unwrap() = Some(schema.to_string());
        Arc::new(MemoryStore {
            db: self.db.clone(),
        })
    }

    async fn try_acquire_application_lock(&self) -> CoreResult<bool> {
        let mut held = self.db.app_locked.lock().unwrap();
        if *held {
            return Ok(false);
        }
        *held = true;
        Ok(true)
    }

    async fn release_application_lock(&self) -> CoreResult<()> {
        *self.db.app_locked.lock().unwrap() = false;
        Ok(())
    }

    fn split_statements(&self, body: &str) -> CoreResult<Vec<SqlStatement>> {
        Ok(body
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| SqlStatement {
                sql: s.to_string(),
                must_run_in_transaction: !s.contains("NO_TXN"),
            })
            .collect())
    }

    async fn begin(&self) -> CoreResult<()> {
        let mut txn = self.db.txn_entries.lock().unwrap();
        if txn.is_some() {
            return Err(CoreError::driver("transaction already open"));
        }
        *txn = Some(Vec::new());
        Ok(())
    }

    async fn commit(&self) -> CoreResult<()> {
        let mut txn = self.db.txn_entries.lock().unwrap();
        if txn.take().is_none() {
            return Err(CoreError::driver("no transaction to commit"));
        }
        Ok(())
    }

    async fn rollback(&self) -> CoreResult<()> {
        let mut txn = self.db.txn_entries.lock().unwrap();
        let Some(ids) = txn.take() else {
            return Err(CoreError::driver("no transaction to roll back"));
        };
        self.db
            .entries
            .lock()
            .unwrap()
            .retain(|e| !ids.contains(&e.id));
        Ok(())
    }

    async fn execute(&self, sql: &str, _timeout: Option<Duration>) -> CoreResult<u64> {
        let should_fail = {
            let mut plans = self.db.fail_counts.lock().unwrap();
            let mut hit = false;
            for (fragment, remaining) in plans.iter_mut() {
                if sql.contains(fragment.as_str()) && *remaining != 0 {
                    if *remaining > 0 {
                        *remaining -= 1;
                    }
                    hit = true;
                    break;
                }
            }
            hit
        };
        self.db.executed.lock().unwrap().push(sql.to_string());
        if should_fail {
            return Err(CoreError::driver(format!("statement failed: {sql}")));
        }
        Ok(0)
    }
}

/// `MetadataStore` double over [`MemoryDb`].
pub struct MemoryStore {
    db: Arc<MemoryDb>,
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn table_exists(&self) -> CoreResult<bool> {
        Ok(*self.db.table_exists.lock().unwrap())
    }

    async fn ensure_table(&self) -> CoreResult<()> {
        *self.db.table_exists.lock().unwrap() = true;
        Ok(())
    }

    async fn all_entries(&self) -> CoreResult<Vec<MetadataEntry>> {
        Ok(self.db.entries.lock().unwrap().clone())
    }

    async fn append(&self, draft: EntryDraft) -> CoreResult<MetadataEntry> {
        if !*self.db.table_exists.lock().unwrap() {
            return Err(CoreError::driver("history table does not exist"));
        }
        let id = self.db.next_id.fetch_add(1, Ordering::SeqCst);
        let entry = MetadataEntry {
            id,
            kind: draft.kind,
            version: draft.version,
            name: draft.name,
            description: draft.description,
            checksum: draft.checksum,
            installed_on: Utc::now(),
            installed_by: draft.installed_by,
            success: draft.success,
            execution_time_ms: draft.execution_time_ms,
        };
        if let Some(ids) = self.db.txn_entries.lock().unwrap().as_mut() {
            ids.push(id);
        }
        self.db.entries.lock().unwrap().push(entry.clone());
        Ok(entry)
    }

    async fn update_checksum(&self, id: i64, checksum: &str) -> CoreResult<()> {
        let mut entries = self.db.entries.lock().unwrap();
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| CoreError::driver(format!("no history row with id {id}")))?;
        entry.checksum = Some(checksum.to_string());
        Ok(())
    }

    async fn try_lock(&self) -> CoreResult<bool> {
        let mut held = self.db.metadata_locked.lock().unwrap();
        if *held {
            return Ok(false);
        }
        *held = true;
        Ok(true)
    }

    async fn release_lock(&self) -> CoreResult<()> {
        *self.db.metadata_locked.lock().unwrap() = false;
        Ok(())
    }
}

/// Loader double over in-memory script bodies.
pub struct MemoryLoader {
    versioned: Vec<MigrationScript>,
    repeatable: Vec<MigrationScript>,
}

impl MemoryLoader {
    /// Build scripts from `(file name, body)` pairs.
    pub fn new(scripts: &[(&str, &str)]) -> Self {
        let naming = Default::default();
        let mut versioned = Vec::new();
        let mut repeatable = Vec::new();
        for (name, body) in scripts {
            let script = MigrationScript::from_file_name(
                name,
                ScriptBody::Inline(Arc::from(*body)),
                &naming,
                Encoding::Utf8,
            )
            .unwrap()
            .unwrap_or_else(|| panic!("{name} does not follow the naming convention"));
            match script.category() {
                Category::Versioned => versioned.push(script),
                Category::Repeatable => repeatable.push(script),
            }
        }
        versioned.sort_by(|a, b| a.version().cmp(&b.version()));
        Self {
            versioned,
            repeatable,
        }
    }
}

impl MigrationLoader for MemoryLoader {
    fn versioned_migrations(&self) -> CoreResult<Vec<MigrationScript>> {
        Ok(self.versioned.clone())
    }

    fn repeatable_migrations(&self) -> CoreResult<Vec<MigrationScript>> {
        Ok(self.repeatable.clone())
    }
}

/// Engine over the shared test database and the given scripts.
pub fn engine(db: &TestDb, config: EngineConfig, scripts: &[(&str, &str)]) -> Engine {
    Engine::new(
        config,
        Box::new(db.driver()),
        Box::new(MemoryLoader::new(scripts)),
    )
}
