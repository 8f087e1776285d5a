use anyhow::{Context, Result};
use clap::Parser;
use unchained::{Args, UnchainedRunner};

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    UnchainedRunner::run(args).await.context("run unchained")?;

    Ok(())
}
