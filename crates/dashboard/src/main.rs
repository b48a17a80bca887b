//! OBD Dashboard - Main Entry Point

use clap::Parser;
use dashboard::{run, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    run(Cli::parse()).await
}
