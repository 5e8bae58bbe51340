//! The tabular run listing for human inspection.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metadata::{EntryKind, MetadataEntry, MetadataSnapshot};
use crate::reconcile::Reconciliation;
use crate::script::MigrationScript;

/// Row status in the info listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowState {
    /// Would be applied by the next migrate run.
    Pending,
    /// Outside the configured version window.
    Ignored,
    /// Behind the last applied version while out-of-order mode is off:
    /// the script will never run unless the option is enabled.
    Lost,
    /// Applied successfully.
    Success,
    /// Application failed.
    Failed,
}

impl fmt::Display for RowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Pending => "Pending",
            Self::Ignored => "Ignored",
            Self::Lost => "Lost",
            Self::Success => "Success",
            Self::Failed => "Failed",
        };
        write!(f, "{text}")
    }
}

/// One row of the info listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoRow {
    /// History row id, for executed entries.
    pub id: Option<i64>,
    /// Version label; empty for repeatable scripts.
    pub version: String,
    /// Row category: Schema, StartVersion, Versioned or Repeatable.
    pub category: String,
    /// Description text.
    pub description: String,
    /// When the entry was recorded.
    pub installed_on: Option<DateTime<Utc>>,
    /// Who recorded it; empty for pending rows.
    pub installed_by: String,
    /// Row status.
    pub state: RowState,
    /// Checksum, when one applies.
    pub checksum: String,
}

impl InfoRow {
    fn from_entry(entry: &MetadataEntry) -> Self {
        let category = match entry.kind {
            EntryKind::NewSchema | EntryKind::EmptySchema => "Schema",
            EntryKind::StartVersion => "StartVersion",
            EntryKind::Migration => "Versioned",
            EntryKind::RepeatableMigration => "Repeatable",
            EntryKind::Lock => "Lock",
        };
        let state = match entry.success {
            Some(false) => RowState::Failed,
            _ => RowState::Success,
        };
        Self {
            id: Some(entry.id),
            version: entry.version.as_ref().map(ToString::to_string).unwrap_or_default(),
            category: category.to_string(),
            description: entry.description.clone(),
            installed_on: Some(entry.installed_on),
            installed_by: entry.installed_by.clone(),
            state,
            checksum: entry.checksum.clone().unwrap_or_default(),
        }
    }

    fn from_script(script: &MigrationScript, state: RowState) -> Self {
        Self {
            id: None,
            version: script.version().map(ToString::to_string).unwrap_or_default(),
            category: script.category().to_string(),
            description: script.description().to_string(),
            installed_on: None,
            installed_by: String::new(),
            state,
            checksum: script.checksum().to_string(),
        }
    }
}

/// A schema-lifecycle step the next migrate run would take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaAction {
    /// The schema does not exist and would be created.
    Create(String),
    /// The schema exists empty and would be adopted with an empty marker.
    MarkEmpty(String),
}

/// Build the info rows.
///
/// Section order: pending schema actions, pre-migration history markers,
/// scripts ignored before the start version, executed migrations,
/// out-of-order pendings (when the option is on), the same set tagged
/// `Lost` regardless of the option, forward pendings, repeatable
/// pendings, and scripts beyond the target version.
pub fn info_rows(
    schema_actions: &[SchemaAction],
    snapshot: &MetadataSnapshot,
    recon: &Reconciliation,
    out_of_order: bool,
) -> Vec<InfoRow> {
    let mut rows = Vec::new();

    for action in schema_actions {
        let description = match action {
            SchemaAction::Create(schema) => format!("create schema {schema}"),
            SchemaAction::MarkEmpty(schema) => format!("mark schema {schema} as empty"),
        };
        rows.push(InfoRow {
            id: None,
            version: "0".to_string(),
            category: "Schema".to_string(),
            description,
            installed_on: None,
            installed_by: String::new(),
            state: RowState::Pending,
            checksum: String::new(),
        });
    }

    for entry in snapshot.pre_migration_entries() {
        rows.push(InfoRow::from_entry(entry));
    }

    for script in &recon.ignored_before_start {
        rows.push(InfoRow::from_script(script, RowState::Ignored));
    }

    for entry in snapshot.executed_migrations() {
        rows.push(InfoRow::from_entry(entry));
    }

    if out_of_order {
        for script in &recon.out_of_order_pending {
            rows.push(InfoRow::from_script(script, RowState::Pending));
        }
    }
    // Advisory listing for operators who have not enabled out-of-order
    // mode: these scripts will never run while the option is off.
    for script in &recon.out_of_order_pending {
        rows.push(InfoRow::from_script(script, RowState::Lost));
    }

    for script in &recon.pending_forward {
        rows.push(InfoRow::from_script(script, RowState::Pending));
    }
    for script in &recon.pending_repeatable {
        rows.push(InfoRow::from_script(script, RowState::Pending));
    }
    for script in &recon.off_target {
        rows.push(InfoRow::from_script(script, RowState::Ignored));
    }

    rows
}
