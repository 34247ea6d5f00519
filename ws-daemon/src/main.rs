use anyhow::Result;
use clap::Parser;
use tracing::info;

mod cli;
mod commands;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Keep the guard alive so file logs are flushed on exit
    let _log_guard = ws_logging::init_subscriber();

    let args = Args::parse();
    info!("Starting wsd");

    commands::execute(args).await
}
