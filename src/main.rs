mod cli;
mod config;
mod error;
mod importer;
mod ledger;
mod model;
mod providers;
mod query;
mod util;

use anyhow::Result;
use clap::Parser;
use log::error;

#[tokio::main]
async fn main() -> Result<()> {
    // JIRA_* and FIELD_* may come from a .env next to the CSV.
    dotenvy::dotenv().ok();

    let cli = cli::Cli::parse();
    cli::init_logging(cli.verbose, cli.log_file.as_deref())?;

    if let Err(e) = cli::run(cli).await {
        error!("{e:#}");
        return Err(e);
    }
    Ok(())
}
