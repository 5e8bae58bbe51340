//! `tidemark validate` - check the database against the scripts.

use crate::cli::Cli;
use crate::commands::{build_engine, prepare};
use crate::error::CliResult;
use crate::output;

/// Run the validate command
pub async fn run(cli: &Cli) -> CliResult<()> {
    output::header("Validate");

    let (url, config) = prepare(cli)?;
    let mut engine = build_engine(&url, config).await?;
    let report = engine.validate().await?;

    output::success(&format!(
        "validation passed in {}ms: history and scripts agree, nothing pending",
        report.elapsed_ms
    ));
    Ok(())
}
