//! The migration history table: entries, drafts and the store capability.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;
use crate::script::MigrationScript;
use crate::version::Version;

/// Kind of a history table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    /// A schema created by the engine (erasable by dropping it).
    NewSchema,
    /// A pre-existing schema adopted while empty (erasable in place).
    EmptySchema,
    /// The one-time marker declaring versions below it intentionally skipped.
    StartVersion,
    /// A versioned script application.
    Migration,
    /// A repeatable script application.
    RepeatableMigration,
    /// The cluster-mode history table lock row.
    Lock,
}

impl EntryKind {
    /// Whether this entry records a script application.
    pub fn is_migration(&self) -> bool {
        matches!(self, Self::Migration | Self::RepeatableMigration)
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NewSchema => "NewSchema",
            Self::EmptySchema => "EmptySchema",
            Self::StartVersion => "StartVersion",
            Self::Migration => "Migration",
            Self::RepeatableMigration => "RepeatableMigration",
            Self::Lock => "Lock",
        };
        write!(f, "{text}")
    }
}

impl std::str::FromStr for EntryKind {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NewSchema" => Ok(Self::NewSchema),
            "EmptySchema" => Ok(Self::EmptySchema),
            "StartVersion" => Ok(Self::StartVersion),
            "Migration" => Ok(Self::Migration),
            "RepeatableMigration" => Ok(Self::RepeatableMigration),
            "Lock" => Ok(Self::Lock),
            other => Err(crate::error::CoreError::driver(format!(
                "unknown history entry kind: {other}"
            ))),
        }
    }
}

/// A persisted history table row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    /// Monotonically assigned identifier (except on dialects without one).
    pub id: i64,
    /// Entry kind.
    pub kind: EntryKind,
    /// Version label; set for Migration and StartVersion entries.
    pub version: Option<Version>,
    /// Script name for migration entries, schema name for schema entries.
    pub name: String,
    /// Free text.
    pub description: String,
    /// Script checksum; set for migration entries.
    pub checksum: Option<String>,
    /// When the entry was appended.
    pub installed_on: DateTime<Utc>,
    /// Identity of the runner.
    pub installed_by: String,
    /// Outcome; set for migration entries.
    pub success: Option<bool>,
    /// Execution time in milliseconds, recorded with the outcome.
    pub execution_time_ms: Option<i64>,
}

impl MetadataEntry {
    /// Whether this entry records a successful script application.
    pub fn is_applied(&self) -> bool {
        self.kind.is_migration() && self.success == Some(true)
    }
}

/// A history row to be appended. The store assigns `id` and `installed_on`.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryDraft {
    /// Entry kind.
    pub kind: EntryKind,
    /// Version label.
    pub version: Option<Version>,
    /// Script or schema name.
    pub name: String,
    /// Free text.
    pub description: String,
    /// Script checksum.
    pub checksum: Option<String>,
    /// Identity of the runner.
    pub installed_by: String,
    /// Outcome, for migration entries.
    pub success: Option<bool>,
    /// Execution time in milliseconds.
    pub execution_time_ms: Option<i64>,
}

impl EntryDraft {
    /// A non-migration marker entry (schema lifecycle, start version).
    pub fn marker(
        kind: EntryKind,
        version: Option<Version>,
        name: impl Into<String>,
        description: impl Into<String>,
        installed_by: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            version,
            name: name.into(),
            description: description.into(),
            checksum: None,
            installed_by: installed_by.into(),
            success: None,
            execution_time_ms: None,
        }
    }

    /// A migration outcome entry for the given script.
    pub fn migration(
        script: &MigrationScript,
        success: bool,
        execution_time_ms: i64,
        installed_by: impl Into<String>,
    ) -> Self {
        let kind = match script.category() {
            crate::script::Category::Versioned => EntryKind::Migration,
            crate::script::Category::Repeatable => EntryKind::RepeatableMigration,
        };
        Self {
            kind,
            version: script.version().cloned(),
            name: script.name().to_string(),
            description: script.description().to_string(),
            checksum: Some(script.checksum().to_string()),
            installed_by: installed_by.into(),
            success: Some(success),
            execution_time_ms: Some(execution_time_ms),
        }
    }
}

/// Capability over the persisted history table.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Whether the history table exists.
    async fn table_exists(&self) -> CoreResult<bool>;

    /// Create the history table when missing.
    async fn ensure_table(&self) -> CoreResult<()>;

    /// All rows, ordered by `id` ascending.
    async fn all_entries(&self) -> CoreResult<Vec<MetadataEntry>>;

    /// Append a row, returning it with `id` and `installed_on` assigned.
    async fn append(&self, draft: EntryDraft) -> CoreResult<MetadataEntry>;

    /// Overwrite the checksum of an existing row.
    async fn update_checksum(&self, id: i64, checksum: &str) -> CoreResult<()>;

    /// Try to take the history table lock. `false` on contention.
    async fn try_lock(&self) -> CoreResult<bool>;

    /// Release the history table lock.
    async fn release_lock(&self) -> CoreResult<()>;
}

/// An in-memory view over the history rows with the derived queries the
/// reconciler and validator need. Pure, so every rule is unit-testable.
#[derive(Debug, Clone, Default)]
pub struct MetadataSnapshot {
    entries: Vec<MetadataEntry>,
    monotonic_id: bool,
}

impl MetadataSnapshot {
    /// Build a snapshot from history rows.
    pub fn new(entries: Vec<MetadataEntry>, monotonic_id: bool) -> Self {
        Self {
            entries,
            monotonic_id,
        }
    }

    /// An empty snapshot (no history table yet).
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            monotonic_id: true,
        }
    }

    /// All rows, by `id` ascending.
    pub fn entries(&self) -> &[MetadataEntry] {
        &self.entries
    }

    /// Successful versioned migration entries.
    pub fn applied_migrations(&self) -> impl Iterator<Item = &MetadataEntry> {
        self.entries
            .iter()
            .filter(|e| e.kind == EntryKind::Migration && e.success == Some(true))
    }

    /// Successful repeatable migration entries.
    pub fn applied_repeatable_migrations(&self) -> impl Iterator<Item = &MetadataEntry> {
        self.entries
            .iter()
            .filter(|e| e.kind == EntryKind::RepeatableMigration && e.success == Some(true))
    }

    /// Whether at least one migration has ever been applied.
    pub fn is_initialized(&self) -> bool {
        self.entries.iter().any(MetadataEntry::is_applied)
    }

    /// Highest version among successful migrations, `Min` when none.
    pub fn last_applied_version(&self) -> Version {
        self.applied_migrations()
            .filter_map(|e| e.version.clone())
            .max()
            .unwrap_or(Version::Min)
    }

    /// The persisted start version marker, when one exists.
    pub fn start_version(&self) -> Option<&Version> {
        self.entries
            .iter()
            .find(|e| e.kind == EntryKind::StartVersion)
            .and_then(|e| e.version.as_ref())
    }

    /// Whether the given version has a successful migration entry.
    pub fn has_succeeded(&self, version: &Version) -> bool {
        self.applied_migrations()
            .any(|e| e.version.as_ref() == Some(version))
    }

    /// The successful migration entry for a version, when one exists.
    pub fn applied_entry(&self, version: &Version) -> Option<&MetadataEntry> {
        self.applied_migrations()
            .find(|e| e.version.as_ref() == Some(version))
    }

    /// Most recent successful entry for a repeatable script name.
    pub fn latest_repeatable(&self, name: &str) -> Option<&MetadataEntry> {
        self.applied_repeatable_migrations()
            .filter(|e| e.name == name)
            .max_by_key(|e| e.installed_on)
    }

    /// Whether the schema was created by the engine and can be dropped.
    pub fn can_drop_schema(&self, schema: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.kind == EntryKind::NewSchema && e.name == schema)
    }

    /// Whether the schema was adopted empty and can be erased in place.
    pub fn can_erase_schema(&self, schema: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.kind == EntryKind::EmptySchema && e.name == schema)
    }

    /// Every migration entry (successful or not) in execution order:
    /// by `id` on dialects with a monotonic id, otherwise versioned
    /// migrations by `id` followed by repeatables by `(installed_on, name)`.
    pub fn executed_migrations(&self) -> Vec<&MetadataEntry> {
        let mut rows: Vec<&MetadataEntry> = self
            .entries
            .iter()
            .filter(|e| e.kind.is_migration())
            .collect();
        if !self.monotonic_id {
            rows.sort_by(|a, b| {
                let rank = |e: &MetadataEntry| e.kind == EntryKind::RepeatableMigration;
                rank(a).cmp(&rank(b)).then_with(|| {
                    if rank(a) {
                        (a.installed_on, a.name.as_str()).cmp(&(b.installed_on, b.name.as_str()))
                    } else {
                        a.id.cmp(&b.id)
                    }
                })
            });
        }
        rows
    }

    /// Rows appended before the first migration entry, ordered by
    /// `(version, installed_on)`. Schema and start-version markers.
    pub fn pre_migration_entries(&self) -> Vec<&MetadataEntry> {
        let mut rows: Vec<&MetadataEntry> = self
            .entries
            .iter()
            .take_while(|e| !e.kind.is_migration())
            .filter(|e| e.kind != EntryKind::Lock)
            .collect();
        rows.sort_by(|a, b| {
            (a.version.as_ref(), a.installed_on).cmp(&(b.version.as_ref(), b.installed_on))
        });
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(
        id: i64,
        kind: EntryKind,
        version: Option<&str>,
        name: &str,
        success: Option<bool>,
    ) -> MetadataEntry {
        MetadataEntry {
            id,
            kind,
            version: version.map(|v| Version::parse(v).unwrap()),
            name: name.to_string(),
            description: String::new(),
            checksum: None,
            installed_on: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, id as u32).unwrap(),
            installed_by: "test".to_string(),
            success,
            execution_time_ms: None,
        }
    }

    #[test]
    fn test_last_applied_version_ignores_failures() {
        let snapshot = MetadataSnapshot::new(
            vec![
                entry(1, EntryKind::Migration, Some("1"), "V1__a.sql", Some(true)),
                entry(2, EntryKind::Migration, Some("3"), "V3__c.sql", Some(false)),
                entry(3, EntryKind::Migration, Some("2"), "V2__b.sql", Some(true)),
            ],
            true,
        );
        assert_eq!(snapshot.last_applied_version(), Version::parse("2").unwrap());
    }

    #[test]
    fn test_last_applied_version_empty() {
        assert_eq!(MetadataSnapshot::empty().last_applied_version(), Version::Min);
        assert!(!MetadataSnapshot::empty().is_initialized());
    }

    #[test]
    fn test_failed_then_successful_rerun() {
        let snapshot = MetadataSnapshot::new(
            vec![
                entry(1, EntryKind::Migration, Some("1"), "V1__a.sql", Some(false)),
                entry(2, EntryKind::Migration, Some("1"), "V1__a.sql", Some(true)),
            ],
            true,
        );
        let version = Version::parse("1").unwrap();
        assert!(snapshot.has_succeeded(&version));
        assert_eq!(snapshot.applied_entry(&version).unwrap().id, 2);
    }

    #[test]
    fn test_latest_repeatable_by_installed_on() {
        let snapshot = MetadataSnapshot::new(
            vec![
                entry(1, EntryKind::RepeatableMigration, None, "R__v.sql", Some(true)),
                entry(5, EntryKind::RepeatableMigration, None, "R__v.sql", Some(true)),
                entry(3, EntryKind::RepeatableMigration, None, "R__w.sql", Some(true)),
            ],
            true,
        );
        assert_eq!(snapshot.latest_repeatable("R__v.sql").unwrap().id, 5);
        assert!(snapshot.latest_repeatable("R__missing.sql").is_none());
    }

    #[test]
    fn test_schema_lifecycle_flags() {
        let snapshot = MetadataSnapshot::new(
            vec![
                entry(1, EntryKind::NewSchema, None, "app", None),
                entry(2, EntryKind::EmptySchema, None, "audit", None),
            ],
            true,
        );
        assert!(snapshot.can_drop_schema("app"));
        assert!(!snapshot.can_drop_schema("audit"));
        assert!(snapshot.can_erase_schema("audit"));
        assert!(!snapshot.can_erase_schema("legacy"));
    }

    #[test]
    fn test_executed_migrations_non_monotonic_ordering() {
        let mut repeatable_late = entry(
            2,
            EntryKind::RepeatableMigration,
            None,
            "R__b.sql",
            Some(true),
        );
        repeatable_late.installed_on = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let mut repeatable_early = entry(
            9,
            EntryKind::RepeatableMigration,
            None,
            "R__a.sql",
            Some(true),
        );
        repeatable_early.installed_on = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let snapshot = MetadataSnapshot::new(
            vec![
                repeatable_late,
                entry(7, EntryKind::Migration, Some("2"), "V2__b.sql", Some(true)),
                entry(4, EntryKind::Migration, Some("1"), "V1__a.sql", Some(true)),
                repeatable_early,
            ],
            false,
        );
        let names: Vec<&str> = snapshot
            .executed_migrations()
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(names, vec!["V1__a.sql", "V2__b.sql", "R__a.sql", "R__b.sql"]);
    }

    #[test]
    fn test_pre_migration_entries_stop_at_first_migration() {
        let snapshot = MetadataSnapshot::new(
            vec![
                entry(1, EntryKind::NewSchema, None, "app", None),
                entry(2, EntryKind::StartVersion, Some("2"), "", None),
                entry(3, EntryKind::Migration, Some("2"), "V2__b.sql", Some(true)),
                entry(4, EntryKind::EmptySchema, None, "late", None),
            ],
            true,
        );
        let kinds: Vec<EntryKind> = snapshot
            .pre_migration_entries()
            .iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(kinds, vec![EntryKind::NewSchema, EntryKind::StartVersion]);
    }
}
