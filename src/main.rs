use agent_bridge::cli::{self, Args};
use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    cli::run(args).await
}
