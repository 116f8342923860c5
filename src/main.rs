use anyhow::Result;
use clap::Parser;

use taskmirror::cli::{self, Cli};
use taskmirror::config::Config;
use taskmirror::logger;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load()?;
    logger::init(&config.logging)?;

    cli::run(cli, config).await
}
