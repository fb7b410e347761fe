use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "irrigation-advisor",
    version,
    about = "Weather-driven lawn irrigation advisor"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config.yaml or the add-on options.json
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the state data directory
    #[arg(short, long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch weather and print an irrigation recommendation
    Advise {
        /// Print the full recommendation as JSON
        #[arg(long)]
        json: bool,
        /// Skip suppression and leave the irrigation log untouched
        #[arg(long)]
        dry_run: bool,
    },
    /// Run an advisor cycle and publish the result over MQTT
    Publish {
        /// Log the topics and payloads instead of connecting
        #[arg(long)]
        dry_run: bool,
    },
    /// Run the HTTP service
    Serve,
    /// Listen for execution feedback over MQTT
    Listen,
    /// Show irrigation state and executions of the last 48 hours
    Status,
    /// Record that irrigation was carried out
    Mark {
        /// Liters per square meter applied (0 means the recommended amount)
        amount: f64,
        /// Free-form notes
        notes: Option<String>,
    },
    /// Delete the irrigation log
    Clear {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Show the rain outlook for the next days
    Rain {
        #[arg(long)]
        json: bool,
    },
    /// Validate config and test connections
    Check,
    /// Re-run interactive setup
    Init,
}
