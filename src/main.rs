mod analysis;
mod cli;
mod config;
mod error;
mod import;
mod ingest;
mod models;
mod report;
mod source;
mod store;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    info!("Starting benchlog - Benchmark History Tool");
    cli.execute().await?;

    Ok(())
}
