use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "groveops", version, about = "Olive grove water-balance pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config.yaml
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override SQLite data directory
    #[arg(short, long)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one water-cycle invocation: fetch, recalculate, advance trees
    Run {
        /// Close out yesterday instead of updating today (bypasses the quota)
        #[arg(long)]
        audit: bool,
    },
    /// Validate config and test the Meteocat connection
    Check,
    /// Show the latest climate fact and current tree balances
    Status,
    /// Register a tree so irrigation and balances can be tracked for it
    AddTree {
        id: String,
        /// Trunk diameter in cm
        #[arg(long)]
        diameter: Option<f64>,
        /// Crop coefficient override (defaults to the reference Kc)
        #[arg(long)]
        kc: Option<f64>,
    },
    /// Record an irrigation event for a tree
    RecordIrrigation {
        tree_id: String,
        liters: f64,
        /// Event timestamp (RFC 3339); defaults to now
        #[arg(long)]
        date: Option<String>,
    },
    /// Import irrigation events from a JSON export (accepts legacy `litres` fields)
    ImportIrrigation { file: PathBuf },
    /// Write an example config to the default location
    Init,
}
