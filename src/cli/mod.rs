//! Command-line interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod check;
pub mod run;

/// Threshold-trigger trading bot for prediction market CLOBs.
#[derive(Debug, Parser)]
#[command(name = "thresher", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the trading bot.
    Run {
        /// Path to the TOML configuration file.
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
    /// Validate configuration and connectivity, then exit.
    Check {
        /// Path to the TOML configuration file.
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
}
