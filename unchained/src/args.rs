use std::path::PathBuf;

use clap::{Parser, Subcommand};
use unchained_format::Address;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the config file
    #[arg(short, long, default_value = "unchained.toml")]
    pub config_path: PathBuf,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print every appearance of an address
    Find {
        /// 0x prefixed hex address
        address: Address,
        #[arg(long, default_value = "mainnet")]
        chain: String,
        /// Sort by block number and transaction index before printing
        #[arg(long)]
        sort: bool,
    },
    /// Decode finalized chunks into the configured sink
    Ingest {
        #[arg(long, default_value = "mainnet")]
        chain: String,
        /// Overrides `ingest.from_block`
        #[arg(long)]
        from_block: Option<u64>,
        /// Overrides `ingest.to_block`
        #[arg(long)]
        to_block: Option<u64>,
    },
}
