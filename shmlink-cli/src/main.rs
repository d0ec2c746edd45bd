// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! shmlink CLI
//!
//! Command-line interface for creating, inspecting and exchanging data
//! through shmlink shared memory segments.

use clap::{Parser, Subcommand};
use shmlink_core::{ConfigLoader, SegmentConfig};
use tracing_subscriber::EnvFilter;

mod commands;

/// shmlink - named shared memory channels
#[derive(Parser)]
#[command(name = "shmlink")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (defaults, plus SHMLINK_SHAREDMEMORY_POSIX, if absent)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a segment and hold it until interrupted
    Create {
        /// Segment name
        name: String,

        /// Payload size in bytes
        size: u32,

        /// Release the segment after this many seconds instead of waiting for Ctrl-C
        #[arg(long)]
        hold_secs: Option<u64>,
    },

    /// Attach to a segment and show its properties
    Info {
        /// Segment name
        name: String,
    },

    /// Write text into a segment and wake its waiters
    Write {
        /// Segment name
        name: String,

        /// Text to store (truncated to the segment size)
        text: String,
    },

    /// Print the payload of a segment
    Read {
        /// Segment name
        name: String,

        /// Wait for a notification before reading
        #[arg(short, long)]
        wait: bool,
    },

    /// Wake every waiter on a segment
    Notify {
        /// Segment name
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .init();

    let config = match &cli.config {
        Some(path) => ConfigLoader::load_file(path)?,
        None => SegmentConfig::from_env(),
    };

    // Dispatch to command handlers
    match cli.command {
        Commands::Create {
            name,
            size,
            hold_secs,
        } => commands::create::execute(&name, size, hold_secs, &config).await,
        Commands::Info { name } => commands::info::execute(&name, &config).await,
        Commands::Write { name, text } => commands::write::execute(&name, &text, &config).await,
        Commands::Read { name, wait } => commands::read::execute(&name, wait, &config).await,
        Commands::Notify { name } => commands::notify::execute(&name, &config).await,
    }
}
