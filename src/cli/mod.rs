//! CLI Module
//!
//! Command-line interface for computing derived signals offline.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Sigflow - derived signal computation over cached audio analysis
#[derive(Parser, Debug)]
#[command(name = "sigflow")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compute every enabled signal and print a summary per signal
    #[command(name = "compute")]
    Compute {
        /// Definition structure file
        #[arg(short, long)]
        definitions: PathBuf,

        /// Analysis fixture with cached results and event streams
        #[arg(short, long)]
        analysis: PathBuf,

        /// Engine configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the evaluation order
    #[command(name = "order")]
    Order {
        /// Definition structure file
        #[arg(short, long)]
        definitions: PathBuf,
    },

    /// Check version, checksum, parameters and cycles
    #[command(name = "validate")]
    Validate {
        /// Definition structure file
        #[arg(short, long)]
        definitions: PathBuf,
    },
}
