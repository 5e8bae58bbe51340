//! Tidemark CLI - database schema migrations from the command line.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tidemark_cli::cli::{Cli, Command};
use tidemark_cli::commands;
use tidemark_cli::error::CliResult;
use tidemark_cli::output;

#[tokio::main]
async fn main() {
    // Run the CLI and handle errors
    if let Err(e) = run().await {
        output::newline();
        output::error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run() -> CliResult<()> {
    // Parse CLI arguments
    let cli = Cli::parse();
    init_tracing(&cli);

    // Run the appropriate command
    match &cli.command {
        Command::Migrate(args) => commands::migrate::run(&cli, args).await,
        Command::Validate => commands::validate::run(&cli).await,
        Command::Repair => commands::repair::run(&cli).await,
        Command::Erase(args) => commands::erase::run(&cli, args).await,
        Command::Info => commands::info::run(&cli).await,
    }
}

fn init_tracing(cli: &Cli) {
    let default = if cli.verbose {
        "tidemark_core=debug,tidemark_postgres=debug,tidemark_sqlite=debug"
    } else if cli.quiet {
        "error"
    } else {
        "tidemark_core=warn,tidemark_postgres=warn,tidemark_sqlite=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
