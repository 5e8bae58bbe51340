//! Reconciliation of source scripts against the persisted history.

use crate::config::EngineConfig;
use crate::metadata::MetadataSnapshot;
use crate::script::MigrationScript;
use crate::version::Version;

/// The disjoint script sets a run works from, computed purely from the
/// source scripts, a history snapshot and the configured window.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    /// Versioned scripts below the effective start version.
    pub ignored_before_start: Vec<MigrationScript>,
    /// Versioned scripts above the target version.
    pub off_target: Vec<MigrationScript>,
    /// Versioned scripts ahead of the last applied version, ascending.
    pub pending_forward: Vec<MigrationScript>,
    /// Versioned scripts at or behind the last applied version that never
    /// succeeded, ascending. Applied only when out-of-order mode is on;
    /// always computed so info can surface them either way.
    pub out_of_order_pending: Vec<MigrationScript>,
    /// Repeatable scripts due for (re-)application, in enumeration order.
    pub pending_repeatable: Vec<MigrationScript>,
    /// The start version in force: the persisted marker when one exists,
    /// the configured start version otherwise.
    pub effective_start_version: Version,
    /// Highest successfully applied version, `Min` when none.
    pub last_applied_version: Version,
}

impl Reconciliation {
    /// Whether a migrate run would change nothing.
    pub fn is_settled(&self) -> bool {
        self.pending_forward.is_empty()
            && self.out_of_order_pending.is_empty()
            && self.pending_repeatable.is_empty()
    }
}

/// Compute the reconciliation sets.
///
/// Versioned scripts are bucketed by their position relative to the
/// `[effective start, target]` window and the last applied version; a
/// repeatable script is pending when it has never succeeded, when it is
/// marked always-run, or when its most recent history checksum differs
/// from the current one.
pub fn reconcile(
    versioned: &[MigrationScript],
    repeatable: &[MigrationScript],
    snapshot: &MetadataSnapshot,
    config: &EngineConfig,
) -> Reconciliation {
    let effective_start_version = snapshot
        .start_version()
        .cloned()
        .unwrap_or_else(|| config.start_version.clone());
    let last_applied_version = snapshot.last_applied_version();

    let mut recon = Reconciliation {
        effective_start_version: effective_start_version.clone(),
        last_applied_version: last_applied_version.clone(),
        ..Reconciliation::default()
    };

    let mut ordered: Vec<&MigrationScript> = versioned.iter().collect();
    ordered.sort_by(|a, b| a.version().cmp(&b.version()));

    for script in ordered {
        let version = script
            .version()
            .expect("versioned script carries a version");
        if *version < effective_start_version {
            recon.ignored_before_start.push(script.clone());
        } else if *version > config.target_version {
            recon.off_target.push(script.clone());
        } else if *version > last_applied_version {
            recon.pending_forward.push(script.clone());
        } else if !snapshot.has_succeeded(version) {
            recon.out_of_order_pending.push(script.clone());
        }
    }

    for script in repeatable {
        let due = match snapshot.latest_repeatable(script.name()) {
            None => true,
            Some(entry) => {
                script.must_repeat_always()
                    || entry.checksum.as_deref() != Some(script.checksum())
            }
        };
        if due {
            recon.pending_repeatable.push(script.clone());
        }
    }

    recon
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Encoding;
    use crate::metadata::{EntryKind, MetadataEntry};
    use crate::script::ScriptBody;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn versioned(version: &str, body: &str) -> MigrationScript {
        MigrationScript::versioned(
            Version::parse(version).unwrap(),
            format!("V{version}__s.sql"),
            "s",
            ScriptBody::Inline(Arc::from(body)),
            Encoding::Utf8,
        )
        .unwrap()
    }

    fn repeatable_script(name: &str, always: bool, body: &str) -> MigrationScript {
        MigrationScript::repeatable(
            name,
            "r",
            always,
            ScriptBody::Inline(Arc::from(body)),
            Encoding::Utf8,
        )
        .unwrap()
    }

    fn applied(id: i64, version: &str) -> MetadataEntry {
        MetadataEntry {
            id,
            kind: EntryKind::Migration,
            version: Some(Version::parse(version).unwrap()),
            name: format!("V{version}__s.sql"),
            description: "s".to_string(),
            checksum: Some("abc".to_string()),
            installed_on: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, id as u32).unwrap(),
            installed_by: "test".to_string(),
            success: Some(true),
            execution_time_ms: Some(1),
        }
    }

    fn applied_repeatable(id: i64, name: &str, checksum: &str) -> MetadataEntry {
        MetadataEntry {
            id,
            kind: EntryKind::RepeatableMigration,
            version: None,
            name: name.to_string(),
            description: "r".to_string(),
            checksum: Some(checksum.to_string()),
            installed_on: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, id as u32).unwrap(),
            installed_by: "test".to_string(),
            success: Some(true),
            execution_time_ms: Some(1),
        }
    }

    fn names(scripts: &[MigrationScript]) -> Vec<&str> {
        scripts.iter().map(|s| s.name()).collect()
    }

    #[test]
    fn test_fresh_database_everything_forward() {
        let scripts = vec![versioned("1", "a"), versioned("2", "b")];
        let recon = reconcile(
            &scripts,
            &[],
            &MetadataSnapshot::empty(),
            &EngineConfig::new(),
        );
        assert_eq!(names(&recon.pending_forward), vec!["V1__s.sql", "V2__s.sql"]);
        assert!(recon.out_of_order_pending.is_empty());
        assert_eq!(recon.last_applied_version, Version::Min);
    }

    #[test]
    fn test_gap_is_out_of_order_pending() {
        let scripts = vec![versioned("1", "a"), versioned("2", "b"), versioned("3", "c")];
        let snapshot = MetadataSnapshot::new(vec![applied(1, "1"), applied(2, "3")], true);
        let recon = reconcile(&scripts, &[], &snapshot, &EngineConfig::new());
        assert!(recon.pending_forward.is_empty());
        assert_eq!(names(&recon.out_of_order_pending), vec!["V2__s.sql"]);
        assert_eq!(recon.last_applied_version, Version::parse("3").unwrap());
    }

    #[test]
    fn test_target_version_bounds_forward() {
        let scripts: Vec<_> = ["1", "2", "3", "4", "5"]
            .iter()
            .map(|v| versioned(v, "x"))
            .collect();
        let config = EngineConfig::new().target_version(Version::parse("3").unwrap());
        let recon = reconcile(&scripts, &[], &MetadataSnapshot::empty(), &config);
        assert_eq!(
            names(&recon.pending_forward),
            vec!["V1__s.sql", "V2__s.sql", "V3__s.sql"]
        );
        assert_eq!(names(&recon.off_target), vec!["V4__s.sql", "V5__s.sql"]);
    }

    #[test]
    fn test_start_version_ignores_older_scripts() {
        let scripts = vec![versioned("1", "a"), versioned("2", "b"), versioned("3", "c")];
        let config = EngineConfig::new().start_version(Version::parse("2").unwrap());
        let recon = reconcile(&scripts, &[], &MetadataSnapshot::empty(), &config);
        assert_eq!(names(&recon.ignored_before_start), vec!["V1__s.sql"]);
        assert_eq!(names(&recon.pending_forward), vec!["V2__s.sql", "V3__s.sql"]);
    }

    #[test]
    fn test_persisted_start_version_wins_over_config() {
        let scripts = vec![versioned("1", "a"), versioned("2", "b")];
        let marker = MetadataEntry {
            id: 1,
            kind: EntryKind::StartVersion,
            version: Some(Version::parse("2").unwrap()),
            name: String::new(),
            description: "start version".to_string(),
            checksum: None,
            installed_on: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            installed_by: "test".to_string(),
            success: None,
            execution_time_ms: None,
        };
        let snapshot = MetadataSnapshot::new(vec![marker], true);
        let recon = reconcile(&scripts, &[], &snapshot, &EngineConfig::new());
        assert_eq!(names(&recon.ignored_before_start), vec!["V1__s.sql"]);
        assert_eq!(
            recon.effective_start_version,
            Version::parse("2").unwrap()
        );
    }

    #[test]
    fn test_failed_migration_is_still_pending() {
        let scripts = vec![versioned("1", "a"), versioned("2", "b")];
        let mut failed = applied(2, "2");
        failed.success = Some(false);
        let snapshot = MetadataSnapshot::new(vec![applied(1, "1"), failed], true);
        let recon = reconcile(&scripts, &[], &snapshot, &EngineConfig::new());
        // V2 failed, so the last applied version is still 1 and V2 is forward.
        assert_eq!(names(&recon.pending_forward), vec!["V2__s.sql"]);
    }

    #[test]
    fn test_repeatable_pending_rules() {
        let fresh = repeatable_script("R__new.sql", false, "a");
        let always = repeatable_script("R__always.sql", true, "b");
        let unchanged = repeatable_script("R__same.sql", false, "c");
        let drifted = repeatable_script("R__drift.sql", false, "d");

        let snapshot = MetadataSnapshot::new(
            vec![
                applied_repeatable(1, "R__always.sql", always.checksum()),
                applied_repeatable(2, "R__same.sql", unchanged.checksum()),
                applied_repeatable(3, "R__drift.sql", "stale"),
            ],
            true,
        );
        let recon = reconcile(
            &[],
            &[fresh, always, unchanged, drifted],
            &snapshot,
            &EngineConfig::new(),
        );
        assert_eq!(
            names(&recon.pending_repeatable),
            vec!["R__new.sql", "R__always.sql", "R__drift.sql"]
        );
    }

    #[test]
    fn test_repeatable_uses_most_recent_entry() {
        let script = repeatable_script("R__v.sql", false, "current");
        // Older entry drifted, newest one matches: not pending.
        let mut old = applied_repeatable(1, "R__v.sql", "stale");
        old.installed_on = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut newest = applied_repeatable(2, "R__v.sql", script.checksum());
        newest.installed_on = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let snapshot = MetadataSnapshot::new(vec![old, newest], true);
        let recon = reconcile(
            &[],
            std::slice::from_ref(&script),
            &snapshot,
            &EngineConfig::new(),
        );
        assert!(recon.pending_repeatable.is_empty());
    }

    #[test]
    fn test_settled_state() {
        let scripts = vec![versioned("1", "a")];
        let snapshot = MetadataSnapshot::new(vec![applied(1, "1")], true);
        let recon = reconcile(&scripts, &[], &snapshot, &EngineConfig::new());
        assert!(recon.is_settled());
    }
}
