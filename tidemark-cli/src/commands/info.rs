//! `tidemark info` - the tabular run listing.

use tidemark_core::RowState;

use crate::cli::Cli;
use crate::commands::{build_engine, prepare, redact};
use crate::error::CliResult;
use crate::output;

/// Run the info command
pub async fn run(cli: &Cli) -> CliResult<()> {
    output::header("Info");

    let (url, config) = prepare(cli)?;
    output::kv("Database", &redact(&url));
    output::newline();

    let mut engine = build_engine(&url, config).await?;
    let rows = engine.info().await?;

    if rows.is_empty() {
        output::info("no history and no scripts found");
        return Ok(());
    }

    output::info_table(&rows);
    output::newline();

    let pending = rows.iter().filter(|r| r.state == RowState::Pending).count();
    let applied = rows.iter().filter(|r| r.state == RowState::Success).count();
    output::kv("Applied", &applied.to_string());
    output::kv("Pending", &pending.to_string());
    Ok(())
}
