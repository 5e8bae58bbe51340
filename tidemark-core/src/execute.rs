//! Application of a single migration script.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::driver::DatabaseDriver;
use crate::engine::MigrationReport;
use crate::error::{CoreError, CoreResult};
use crate::metadata::{EntryDraft, MetadataStore};
use crate::script::MigrationScript;

/// Applies scripts over a live driver session, managing per-statement
/// transaction boundaries and the history entry for each outcome.
///
/// In commit-each mode the executor opens and commits transactions as the
/// statements require. In an ambient run (commit-all / rollback-all) the
/// engine owns the one surrounding transaction and the executor only
/// executes.
pub struct Executor<'a> {
    driver: &'a dyn DatabaseDriver,
    store: &'a dyn MetadataStore,
    config: &'a EngineConfig,
    ambient: bool,
    in_transaction: bool,
}

impl<'a> Executor<'a> {
    /// Create an executor for a run.
    pub fn new(
        driver: &'a dyn DatabaseDriver,
        store: &'a dyn MetadataStore,
        config: &'a EngineConfig,
        ambient: bool,
    ) -> Self {
        Self {
            driver,
            store,
            config,
            ambient,
            in_transaction: false,
        }
    }

    /// Execute the script and record its outcome in the history table.
    ///
    /// On failure any open per-script transaction is rolled back, a
    /// `success = false` entry is persisted (commit-each mode only; in an
    /// ambient run the surrounding transaction is about to be aborted and
    /// would swallow it), and the failure is returned wrapping the cause
    /// and the time spent.
    pub async fn apply(
        &mut self,
        script: &MigrationScript,
        report: &mut MigrationReport,
    ) -> CoreResult<()> {
        debug!(script = script.name(), "applying script");
        let started = Instant::now();
        let result = self.run_statements(script).await;
        let elapsed_ms = started.elapsed().as_millis() as i64;

        match result {
            Ok(()) => {
                self.store
                    .append(EntryDraft::migration(
                        script,
                        true,
                        elapsed_ms,
                        &self.config.installed_by,
                    ))
                    .await?;
                if self.in_transaction {
                    self.driver.commit().await?;
                    self.in_transaction = false;
                }
                report.migrations_applied += 1;
                report.applied_migrations.push(script.name().to_string());
                info!(script = script.name(), elapsed_ms, "script applied");
                Ok(())
            }
            Err(cause) => {
                if self.in_transaction {
                    if let Err(e) = self.driver.rollback().await {
                        warn!(error = %e, "rollback failed after script error");
                    }
                    self.in_transaction = false;
                }
                if !self.ambient {
                    self.store
                        .append(EntryDraft::migration(
                            script,
                            false,
                            elapsed_ms,
                            &self.config.installed_by,
                        ))
                        .await?;
                }
                Err(CoreError::Execution {
                    script: script.name().to_string(),
                    elapsed_ms,
                    source: Box::new(cause),
                })
            }
        }
    }

    /// Record the script as applied without executing its body.
    pub async fn mark_applied(
        &mut self,
        script: &MigrationScript,
        report: &mut MigrationReport,
    ) -> CoreResult<()> {
        self.store
            .append(EntryDraft::migration(
                script,
                true,
                0,
                &self.config.installed_by,
            ))
            .await?;
        report.migrations_applied += 1;
        report.applied_migrations.push(script.name().to_string());
        info!(script = script.name(), "script marked as applied, body skipped");
        Ok(())
    }

    async fn run_statements(&mut self, script: &MigrationScript) -> CoreResult<()> {
        let body = script.text(self.config.encoding)?;
        let statements = self.driver.split_statements(&body)?;
        let own_transactions = !self.ambient && self.driver.supports_transactions();

        for statement in statements {
            let sql = self.config.substitute_placeholders(&statement.sql);
            if own_transactions {
                if statement.must_run_in_transaction && !self.in_transaction {
                    self.driver.begin().await?;
                    self.in_transaction = true;
                } else if !statement.must_run_in_transaction && self.in_transaction {
                    // The statement refuses to run inside a transaction;
                    // everything before it is committed first.
                    self.driver.commit().await?;
                    self.in_transaction = false;
                }
            }
            self.driver.execute(&sql, self.config.command_timeout).await?;
        }
        Ok(())
    }
}
