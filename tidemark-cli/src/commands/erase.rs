//! `tidemark erase` - erase every schema the engine owns.

use crate::cli::{Cli, EraseArgs};
use crate::commands::{build_engine, prepare, redact};
use crate::error::CliResult;
use crate::output;

/// Run the erase command
pub async fn run(cli: &Cli, args: &EraseArgs) -> CliResult<()> {
    output::header("Erase");

    let (url, config) = prepare(cli)?;
    output::kv("Database", &redact(&url));
    output::newline();

    if !args.force {
        output::warn("this will erase every schema managed by the engine!");
        output::newline();
        if !output::confirm("Erase the managed schemas?") {
            output::newline();
            output::info("erase cancelled");
            return Ok(());
        }
        output::newline();
    }

    let mut engine = build_engine(&url, config).await?;
    let report = engine.erase().await?;

    output::success(&format!(
        "{} schemas erased, {} skipped (not managed by the engine)",
        report.schemas_erased, report.schemas_skipped
    ));
    Ok(())
}
