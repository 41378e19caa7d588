//! Command-line interface for strictly_chess.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Strictly Chess - authoritative two-player chess session server
#[derive(Parser, Debug)]
#[command(name = "strictly_chess")]
#[command(about = "Authoritative host for a two-player chess session", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Host a session over HTTP and WebSocket
    Serve {
        /// Path to a TOML config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Host to bind to (overrides config and environment)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (overrides config and environment)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Validate a saved game by replaying every move
    Replay {
        /// Path to a saved game snapshot
        path: PathBuf,
    },
}
