//! The migration engine: command state machines over a driver session.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::{EngineConfig, TransactionMode};
use crate::driver::DatabaseDriver;
use crate::error::{CoreError, CoreResult};
use crate::execute::Executor;
use crate::info::{info_rows, InfoRow, SchemaAction};
use crate::loader::{verify_unique, MigrationLoader};
use crate::lock::{self, LockSet};
use crate::metadata::{EntryDraft, EntryKind, MetadataSnapshot, MetadataStore};
use crate::reconcile::{reconcile, Reconciliation};
use crate::script::MigrationScript;
use crate::validate::{validate_and_repair, validation_error, validation_issues, RepairMode};
use crate::version::Version;

/// Outcome of one command execution. Counters reset at command entry.
#[derive(Debug, Clone, Default)]
pub struct MigrationReport {
    /// Successful script applications recorded this run.
    pub migrations_applied: u32,
    /// Checksums overwritten by repair.
    pub repairs: u32,
    /// Schemas dropped or emptied by erase.
    pub schemas_erased: u32,
    /// Schemas skipped by erase because the engine does not own them.
    pub schemas_skipped: u32,
    /// Wall-clock time for the whole command.
    pub elapsed_ms: i64,
    /// Names of the scripts applied this run, in order.
    pub applied_migrations: Vec<String>,
    /// Set by rollback-all mode: everything was undone, the outcome is a
    /// rehearsal and must not be read as the database state.
    pub dry_run: bool,
}

impl MigrationReport {
    /// One-line human summary.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if self.migrations_applied > 0 {
            parts.push(format!("{} applied", self.migrations_applied));
        }
        if self.repairs > 0 {
            parts.push(format!("{} repaired", self.repairs));
        }
        if self.schemas_erased > 0 {
            parts.push(format!("{} schemas erased", self.schemas_erased));
        }
        if self.schemas_skipped > 0 {
            parts.push(format!("{} schemas skipped", self.schemas_skipped));
        }
        if parts.is_empty() {
            format!("nothing to do in {}ms", self.elapsed_ms)
        } else if self.dry_run {
            format!("{} then rolled back in {}ms", parts.join(", "), self.elapsed_ms)
        } else {
            format!("{} in {}ms", parts.join(", "), self.elapsed_ms)
        }
    }
}

/// Schemas created or adopted while bringing the environment up.
#[derive(Debug, Default)]
struct SchemaPlan {
    created: Vec<String>,
    adopted_empty: Vec<String>,
}

/// Resolved per-command state: the managed schemas and the history store.
struct Context {
    schemas: Vec<String>,
    metadata_schema: String,
    store: Arc<dyn MetadataStore>,
}

/// The migration engine.
///
/// Owns one driver session, a script loader and the configuration, and
/// drives the five commands: migrate, validate, repair, erase and info.
pub struct Engine {
    config: EngineConfig,
    driver: Box<dyn DatabaseDriver>,
    loader: Box<dyn MigrationLoader>,
}

impl Engine {
    /// Create an engine over a driver session and a script loader.
    pub fn new(
        config: EngineConfig,
        driver: Box<dyn DatabaseDriver>,
        loader: Box<dyn MigrationLoader>,
    ) -> Self {
        Self {
            config,
            driver,
            loader,
        }
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Bring the database to the target version.
    pub async fn migrate(&mut self) -> CoreResult<MigrationReport> {
        let started = Instant::now();
        let mut report = MigrationReport::default();
        let ctx = self.context().await?;

        let mut locks = LockSet::default();
        let outcome = self.migrate_guarded(&ctx, &mut locks, &mut report).await;
        lock::release(self.driver.as_ref(), ctx.store.as_ref(), locks).await;

        report.elapsed_ms = started.elapsed().as_millis() as i64;
        if outcome.is_ok() {
            info!(summary = %report.summary(), "migrate finished");
        }
        outcome.map(|()| report)
    }

    /// Check that the database matches the scripts and that nothing is
    /// pending. Read-only; never takes cluster locks.
    pub async fn validate(&mut self) -> CoreResult<MigrationReport> {
        let started = Instant::now();
        let mut report = MigrationReport::default();
        let ctx = self.context().await?;

        let (versioned, repeatable) = self.load_scripts()?;
        let snapshot = self.snapshot(ctx.store.as_ref()).await?;
        let recon = reconcile(&versioned, &repeatable, &snapshot, &self.config);
        let issues = validation_issues(&versioned, &repeatable, &snapshot, &recon);

        report.elapsed_ms = started.elapsed().as_millis() as i64;
        if issues.is_empty() {
            info!("validation passed");
            Ok(report)
        } else {
            Err(validation_error(issues))
        }
    }

    /// Overwrite drifted checksums in the history table with the current
    /// script checksums. Applies no scripts.
    pub async fn repair(&mut self) -> CoreResult<MigrationReport> {
        let started = Instant::now();
        let mut report = MigrationReport::default();
        let ctx = self.context().await?;

        let mut locks = LockSet::default();
        let outcome = self.repair_guarded(&ctx, &mut locks, &mut report).await;
        lock::release(self.driver.as_ref(), ctx.store.as_ref(), locks).await;

        report.elapsed_ms = started.elapsed().as_millis() as i64;
        if outcome.is_ok() {
            info!(repairs = report.repairs, "repair finished");
        }
        outcome.map(|()| report)
    }

    /// Erase every managed schema the engine owns, in reverse discovery
    /// order. Schemas not created or adopted by the engine are skipped.
    pub async fn erase(&mut self) -> CoreResult<MigrationReport> {
        if self.config.erase_disabled {
            return Err(CoreError::configuration(
                "erase is disabled by configuration",
            ));
        }
        let started = Instant::now();
        let mut report = MigrationReport::default();
        let ctx = self.context().await?;

        let mut locks = LockSet::default();
        let outcome = self.erase_guarded(&ctx, &mut locks, &mut report).await;
        lock::release(self.driver.as_ref(), ctx.store.as_ref(), locks).await;

        report.elapsed_ms = started.elapsed().as_millis() as i64;
        outcome.map(|()| report)
    }

    /// Produce the tabular listing of schema actions, history and pending
    /// scripts. Read-only; never takes cluster locks.
    pub async fn info(&mut self) -> CoreResult<Vec<InfoRow>> {
        let ctx = self.context().await?;
        let (versioned, repeatable) = self.load_scripts()?;
        let snapshot = self.snapshot(ctx.store.as_ref()).await?;
        let recon = reconcile(&versioned, &repeatable, &snapshot, &self.config);

        let mut actions = Vec::new();
        for schema in &ctx.schemas {
            if !self.driver.schema_exists(schema).await? {
                actions.push(SchemaAction::Create(schema.clone()));
            } else if self.driver.schema_is_empty(schema).await?
                && !snapshot.can_drop_schema(schema)
                && !snapshot.can_erase_schema(schema)
            {
                actions.push(SchemaAction::MarkEmpty(schema.clone()));
            }
        }

        Ok(info_rows(&actions, &snapshot, &recon, self.config.out_of_order))
    }

    // ------------------------------------------------------------------
    // Command bodies
    // ------------------------------------------------------------------

    async fn migrate_guarded(
        &mut self,
        ctx: &Context,
        locks: &mut LockSet,
        report: &mut MigrationReport,
    ) -> CoreResult<()> {
        self.enter_managed(ctx, locks).await?;

        let (versioned, repeatable) = self.load_scripts()?;
        let mut snapshot = self.snapshot(ctx.store.as_ref()).await?;

        self.check_start_version(&snapshot)?;
        if self.config.start_version != Version::Min
            && !snapshot.is_initialized()
            && snapshot.start_version().is_none()
        {
            info!(version = %self.config.start_version, "recording start version");
            ctx.store
                .append(EntryDraft::marker(
                    EntryKind::StartVersion,
                    Some(self.config.start_version.clone()),
                    "",
                    format!("version {} as a starting point", self.config.start_version),
                    &self.config.installed_by,
                ))
                .await?;
            snapshot = self.snapshot(ctx.store.as_ref()).await?;
        }

        let walk = validate_and_repair(
            &versioned,
            &snapshot,
            ctx.store.as_ref(),
            &self.config,
            RepairMode::Raise,
            report,
        )
        .await;
        if let Err(e) = walk {
            if !e.is_validation() || !self.config.erase_on_validation_error {
                return Err(e);
            }
            warn!(error = %e, "validation failed, erasing and rebuilding from scratch");
            self.erase_managed(ctx, &snapshot, report).await?;
            // The lock row went away with the history table; re-enter to
            // recreate schemas, the table and the lock.
            locks.metadata = false;
            self.enter_managed(ctx, locks).await?;
            snapshot = self.snapshot(ctx.store.as_ref()).await?;
        }

        if versioned.is_empty() && repeatable.is_empty() {
            info!("no migration scripts found, nothing to do");
            return Ok(());
        }

        let recon = reconcile(&versioned, &repeatable, &snapshot, &self.config);
        self.apply_phase(ctx, &recon, report).await
    }

    async fn repair_guarded(
        &mut self,
        ctx: &Context,
        locks: &mut LockSet,
        report: &mut MigrationReport,
    ) -> CoreResult<()> {
        self.enter_managed(ctx, locks).await?;
        let (versioned, _) = self.load_scripts()?;
        let snapshot = self.snapshot(ctx.store.as_ref()).await?;
        validate_and_repair(
            &versioned,
            &snapshot,
            ctx.store.as_ref(),
            &self.config,
            RepairMode::Fix,
            report,
        )
        .await
    }

    async fn erase_guarded(
        &mut self,
        ctx: &Context,
        locks: &mut LockSet,
        report: &mut MigrationReport,
    ) -> CoreResult<()> {
        if self.config.enable_cluster_mode {
            lock::acquire_application(self.driver.as_ref(), &self.config.lock_retry).await?;
            locks.application = true;
            if ctx.store.table_exists().await? {
                lock::acquire_metadata(ctx.store.as_ref(), &self.config.lock_retry).await?;
                locks.metadata = true;
            }
        }

        let snapshot = self.snapshot(ctx.store.as_ref()).await?;
        let metadata_schema_owned = snapshot.can_drop_schema(&ctx.metadata_schema)
            || snapshot.can_erase_schema(&ctx.metadata_schema);
        self.erase_managed(ctx, &snapshot, report).await?;

        // The lock row vanished with the history table; nothing to release.
        if metadata_schema_owned {
            locks.metadata = false;
        }
        info!(
            erased = report.schemas_erased,
            skipped = report.schemas_skipped,
            "erase finished"
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Shared envelope pieces
    // ------------------------------------------------------------------

    /// Resolve the managed schemas and the history store for a command.
    async fn context(&self) -> CoreResult<Context> {
        let schemas = if self.config.schemas.is_empty() {
            match self.driver.current_schema().await? {
                Some(schema) => vec![schema],
                None => {
                    return Err(CoreError::configuration(
                        "no schema to manage: none configured and the connection has no current schema",
                    ))
                }
            }
        } else {
            self.config.schemas.clone()
        };
        let metadata_schema = self.config.resolved_metadata_schema(&schemas)?.to_string();
        let store = self
            .driver
            .metadata_store(&metadata_schema, &self.config.metadata_table_name);
        Ok(Context {
            schemas,
            metadata_schema,
            store,
        })
    }

    /// The write-command preamble: application lock, schema management,
    /// history table, history lock and lifecycle markers, in that order.
    async fn enter_managed(&mut self, ctx: &Context, locks: &mut LockSet) -> CoreResult<()> {
        if self.config.enable_cluster_mode && !locks.application {
            lock::acquire_application(self.driver.as_ref(), &self.config.lock_retry).await?;
            locks.application = true;
        }
        let plan = self.prepare_schemas(ctx).await?;
        ctx.store.ensure_table().await?;
        if self.config.enable_cluster_mode && !locks.metadata {
            lock::acquire_metadata(ctx.store.as_ref(), &self.config.lock_retry).await?;
            locks.metadata = true;
        }
        self.record_schema_markers(ctx, &plan).await
    }

    /// Create missing schemas and detect adopted-empty ones.
    async fn prepare_schemas(&self, ctx: &Context) -> CoreResult<SchemaPlan> {
        let mut plan = SchemaPlan::default();
        for schema in &ctx.schemas {
            if !self.driver.schema_exists(schema).await? {
                info!(schema = %schema, "schema does not exist, creating it");
                self.driver.create_schema(schema).await?;
                plan.created.push(schema.clone());
            } else if self.driver.schema_is_empty(schema).await? {
                plan.adopted_empty.push(schema.clone());
            }
        }
        Ok(plan)
    }

    /// Record lifecycle markers for schemas touched by `prepare_schemas`.
    async fn record_schema_markers(&self, ctx: &Context, plan: &SchemaPlan) -> CoreResult<()> {
        let snapshot = self.snapshot(ctx.store.as_ref()).await?;
        for schema in &plan.created {
            if !snapshot.can_drop_schema(schema) {
                ctx.store
                    .append(EntryDraft::marker(
                        EntryKind::NewSchema,
                        None,
                        schema,
                        format!("schema {schema} created"),
                        &self.config.installed_by,
                    ))
                    .await?;
            }
        }
        for schema in &plan.adopted_empty {
            if !snapshot.can_drop_schema(schema) && !snapshot.can_erase_schema(schema) {
                ctx.store
                    .append(EntryDraft::marker(
                        EntryKind::EmptySchema,
                        None,
                        schema,
                        format!("schema {schema} was empty when first managed"),
                        &self.config.installed_by,
                    ))
                    .await?;
            }
        }
        Ok(())
    }

    fn load_scripts(&self) -> CoreResult<(Vec<MigrationScript>, Vec<MigrationScript>)> {
        let versioned = self.loader.versioned_migrations()?;
        let repeatable = self.loader.repeatable_migrations()?;
        verify_unique(&versioned, &repeatable)?;
        debug!(
            versioned = versioned.len(),
            repeatable = repeatable.len(),
            "scripts loaded"
        );
        Ok((versioned, repeatable))
    }

    async fn snapshot(&self, store: &dyn MetadataStore) -> CoreResult<MetadataSnapshot> {
        if store.table_exists().await? {
            Ok(MetadataSnapshot::new(
                store.all_entries().await?,
                self.driver.has_monotonic_id(),
            ))
        } else {
            Ok(MetadataSnapshot::empty())
        }
    }

    /// A start version can only be introduced before the first migration;
    /// afterwards the persisted marker is authoritative.
    fn check_start_version(&self, snapshot: &MetadataSnapshot) -> CoreResult<()> {
        if self.config.start_version == Version::Min {
            return Ok(());
        }
        if snapshot.is_initialized()
            && snapshot.start_version() != Some(&self.config.start_version)
        {
            return Err(CoreError::configuration(format!(
                "start version {} cannot be set once migrations have been applied",
                self.config.start_version
            )));
        }
        Ok(())
    }

    /// Erase the managed schemas in reverse discovery order, using the
    /// lifecycle markers to decide what the engine owns.
    async fn erase_managed(
        &self,
        ctx: &Context,
        snapshot: &MetadataSnapshot,
        report: &mut MigrationReport,
    ) -> CoreResult<()> {
        if self.config.erase_disabled {
            return Err(CoreError::configuration(
                "erase is disabled by configuration",
            ));
        }
        for schema in ctx.schemas.iter().rev() {
            if snapshot.can_drop_schema(schema) {
                info!(schema = %schema, "dropping schema");
                self.driver.drop_schema(schema).await?;
                report.schemas_erased += 1;
            } else if snapshot.can_erase_schema(schema) {
                info!(schema = %schema, "erasing schema contents");
                self.driver.erase_schema(schema).await?;
                report.schemas_erased += 1;
            } else {
                warn!(schema = %schema, "schema is not managed by the engine, skipping");
                report.schemas_skipped += 1;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Apply phase
    // ------------------------------------------------------------------

    async fn apply_phase(
        &self,
        ctx: &Context,
        recon: &Reconciliation,
        report: &mut MigrationReport,
    ) -> CoreResult<()> {
        let mode = self.config.transaction_mode;
        if mode.is_ambient() && !self.driver.supports_transactions() {
            return Err(CoreError::configuration(format!(
                "transaction mode {mode:?} requires a dialect with transactions"
            )));
        }

        if !mode.is_ambient() {
            let mut executor = Executor::new(
                self.driver.as_ref(),
                ctx.store.as_ref(),
                &self.config,
                false,
            );
            return self.apply_sets(&mut executor, recon, report).await;
        }

        self.driver.begin().await?;
        if let Some(timeout) = self.config.ambient_transaction_timeout {
            self.driver.set_ambient_timeout(timeout).await?;
        }
        let mut executor = Executor::new(
            self.driver.as_ref(),
            ctx.store.as_ref(),
            &self.config,
            true,
        );
        let result = self.apply_sets(&mut executor, recon, report).await;

        match result {
            Ok(()) if mode == TransactionMode::CommitAll => {
                self.driver.commit().await?;
                Ok(())
            }
            Ok(()) => {
                self.driver.rollback().await?;
                self.log_rolled_back(report);
                report.dry_run = true;
                info!("rollback-all mode: every change was rolled back");
                Ok(())
            }
            Err(e) => {
                if let Err(rollback_err) = self.driver.rollback().await {
                    warn!(error = %rollback_err, "rollback failed after run error");
                }
                self.log_rolled_back(report);
                Err(e)
            }
        }
    }

    fn log_rolled_back(&self, report: &mut MigrationReport) {
        for name in &report.applied_migrations {
            warn!(script = %name, "rolled back");
        }
        report.applied_migrations.clear();
    }

    async fn apply_sets(
        &self,
        executor: &mut Executor<'_>,
        recon: &Reconciliation,
        report: &mut MigrationReport,
    ) -> CoreResult<()> {
        if self.config.out_of_order {
            for script in &recon.out_of_order_pending {
                executor.apply(script, report).await?;
            }
        }

        for script in &recon.pending_forward {
            if self.config.skip_next_migrations {
                executor.mark_applied(script, report).await?;
            } else {
                executor.apply(script, report).await?;
            }
        }

        self.apply_repeatable(executor, &recon.pending_repeatable, report)
            .await
    }

    async fn apply_repeatable(
        &self,
        executor: &mut Executor<'_>,
        pending: &[MigrationScript],
        report: &mut MigrationReport,
    ) -> CoreResult<()> {
        if !self.config.retry_repeatable_migrations_until_no_error {
            for script in pending {
                executor.apply(script, report).await?;
            }
            return Ok(());
        }

        // Repeatables may depend on one another in an order the file names
        // do not express. Keep sweeping the failed set while at least one
        // more succeeds per round; report the first failure of the round
        // that stopped making progress.
        let mut remaining: Vec<&MigrationScript> = pending.iter().collect();
        loop {
            let before = remaining.len();
            let mut failed = Vec::new();
            let mut errors = Vec::new();
            for script in remaining {
                match executor.apply(script, report).await {
                    Ok(()) => {}
                    Err(e) => {
                        warn!(script = script.name(), error = %e, "repeatable script failed, will retry");
                        errors.push(e);
                        failed.push(script);
                    }
                }
            }
            if failed.is_empty() {
                return Ok(());
            }
            if failed.len() == before {
                return Err(errors.remove(0));
            }
            remaining = failed;
        }
    }
}
