//! `tidemark repair` - overwrite drifted checksums.

use crate::cli::Cli;
use crate::commands::{build_engine, prepare};
use crate::error::CliResult;
use crate::output;

/// Run the repair command
pub async fn run(cli: &Cli) -> CliResult<()> {
    output::header("Repair");

    let (url, config) = prepare(cli)?;
    let mut engine = build_engine(&url, config).await?;
    let report = engine.repair().await?;

    if report.repairs == 0 {
        output::info("no drifted checksums found");
    } else {
        output::success(&format!("{} checksums repaired", report.repairs));
    }
    Ok(())
}
