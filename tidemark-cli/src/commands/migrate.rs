//! `tidemark migrate` - apply pending migrations.

use crate::cli::{Cli, MigrateArgs};
use crate::commands::{build_engine, prepare, redact};
use crate::error::CliResult;
use crate::output;

/// Run the migrate command
pub async fn run(cli: &Cli, args: &MigrateArgs) -> CliResult<()> {
    output::header("Migrate");

    let (url, mut config) = prepare(cli)?;
    config.skip_next_migrations |= args.skip_next;
    config.erase_on_validation_error |= args.erase_on_validation_error;
    config.retry_repeatable_migrations_until_no_error |= args.retry_repeatable;

    output::kv("Database", &redact(&url));
    output::kv(
        "Locations",
        &config
            .locations
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", "),
    );
    output::kv("Target", &config.target_version.to_string());
    output::newline();

    let mut engine = build_engine(&url, config).await?;
    let report = engine.migrate().await?;

    for name in &report.applied_migrations {
        output::list_item(name);
    }
    if !report.applied_migrations.is_empty() {
        output::newline();
    }

    if report.dry_run {
        output::warn(&format!(
            "rollback-all rehearsal: {} scripts executed, nothing persisted",
            report.migrations_applied
        ));
    } else {
        output::success(&report.summary());
    }
    Ok(())
}
