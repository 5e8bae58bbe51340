//! Checksum validation and repair.

use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::engine::MigrationReport;
use crate::error::{CoreError, CoreResult};
use crate::metadata::{MetadataSnapshot, MetadataStore};
use crate::reconcile::Reconciliation;
use crate::script::MigrationScript;

/// What to do when the walk finds a checksum mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairMode {
    /// Fail the run naming the drifted script.
    Raise,
    /// Overwrite the stored checksum with the current one.
    Fix,
}

/// Walk the applied history against the source scripts inside the
/// `[effective start, last applied]` window.
///
/// Shared by migrate (Raise mode, as its preamble) and repair (Fix mode).
/// Returns silently when the history table is absent or nothing has been
/// applied yet. A script in the window without a successful entry is a
/// gap: tolerated when out-of-order mode is on (the out-of-order phase
/// will apply it), fatal otherwise.
pub async fn validate_and_repair(
    versioned: &[MigrationScript],
    snapshot: &MetadataSnapshot,
    store: &dyn MetadataStore,
    config: &EngineConfig,
    mode: RepairMode,
    report: &mut MigrationReport,
) -> CoreResult<()> {
    if !store.table_exists().await? || !snapshot.is_initialized() {
        debug!("no applied migrations, nothing to validate");
        return Ok(());
    }

    let effective_start = snapshot
        .start_version()
        .cloned()
        .unwrap_or_else(|| config.start_version.clone());
    let last_applied = snapshot.last_applied_version();

    for script in versioned {
        let version = script
            .version()
            .expect("versioned script carries a version");
        if *version < effective_start || *version > last_applied {
            continue;
        }

        let Some(entry) = snapshot.applied_entry(version) else {
            if config.out_of_order {
                continue;
            }
            return Err(CoreError::validation(format!(
                "out-of-order script found: {} (version {}); enable out-of-order mode to apply it",
                script.name(),
                version
            )));
        };

        if entry.checksum.as_deref() != Some(script.checksum()) {
            match mode {
                RepairMode::Fix => {
                    store.update_checksum(entry.id, script.checksum()).await?;
                    report.repairs += 1;
                    info!(script = script.name(), "checksum repaired");
                }
                RepairMode::Raise => {
                    return Err(CoreError::validation(format!(
                        "invalid checksum for: {}",
                        script.name()
                    )));
                }
            }
        }
    }

    Ok(())
}

/// Collect everything the validate command complains about: applied
/// migrations with no local script, checksum drift on applied versioned
/// scripts, and any script a migrate run would still apply (always-run
/// repeatables excepted, since those are pending by construction).
pub fn validation_issues(
    versioned: &[MigrationScript],
    repeatable: &[MigrationScript],
    snapshot: &MetadataSnapshot,
    recon: &Reconciliation,
) -> Vec<String> {
    let mut issues = Vec::new();

    for entry in snapshot.applied_migrations() {
        let found = versioned
            .iter()
            .any(|s| s.version() == entry.version.as_ref());
        if !found {
            issues.push(format!("applied migration not found locally: {}", entry.name));
        }
    }
    for entry in snapshot.applied_repeatable_migrations() {
        if !repeatable.iter().any(|s| s.name() == entry.name) {
            issues.push(format!("applied migration not found locally: {}", entry.name));
        }
    }

    for script in versioned {
        let Some(version) = script.version() else {
            continue;
        };
        if let Some(entry) = snapshot.applied_entry(version) {
            if entry.checksum.as_deref() != Some(script.checksum()) {
                issues.push(format!("invalid checksum for: {}", script.name()));
            }
        }
    }

    for script in recon
        .pending_forward
        .iter()
        .chain(recon.out_of_order_pending.iter())
    {
        issues.push(format!("script has not been applied: {}", script.name()));
    }

    for script in &recon.pending_repeatable {
        if !script.must_repeat_always() {
            issues.push(format!("repeatable script is pending: {}", script.name()));
        }
    }

    issues
}

/// Turn collected issues into the aggregated validation error.
pub fn validation_error(issues: Vec<String>) -> CoreError {
    CoreError::validation(issues.join("; "))
}
