use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the config file (option_farmer.toml). Defaults apply when omitted.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Discover today's ATM chain for every configured symbol
    Chain,

    /// Pull snapshot metrics for the contracts in today's chain file
    Detail,

    /// Run one update cycle, or keep running until Ctrl-C with --loop
    Update {
        #[arg(long = "loop")]
        repeat: bool,
    },

    /// Print a page of today's chain file as CSV
    Snapshot {
        /// 1-based page number
        #[arg(long, default_value_t = 1)]
        page: usize,

        #[arg(long, default_value_t = 200)]
        page_size: usize,
    },

    /// Fetch the current snapshot of one contract
    Contract {
        /// Underlying symbol (e.g. "AAPL")
        symbol: String,

        /// Option identifier (e.g. "O:AAPL251017C00150000")
        option_id: String,
    },
}
