//! Strictly Chess - Unified CLI
//!
//! Hosts a chess session or checks a saved game.

#![warn(missing_docs)]

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use std::path::{Path, PathBuf};
use strictly_chess::{ChessRules, RulesEngine, ServerConfig, SessionHost};
use tracing::{info, instrument};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config, host, port } => run_server(config, host, port).await,
        Command::Replay { path } => run_replay(&path),
    }
}

/// Host a session until the server stops.
#[instrument(skip_all)]
async fn run_server(config_path: Option<PathBuf>, host: Option<String>, port: Option<u16>) -> Result<()> {
    let config = match &config_path {
        Some(path) => ServerConfig::from_file(path)?,
        None => {
            info!("No config file given, using defaults");
            ServerConfig::default()
        }
    };
    let mut config = config.with_env_overrides()?.with_overrides(host, None)?;
    if let Some(port) = port {
        config = config.with_port(port);
    }

    let rules = match config.starting_fen() {
        Some(fen) => ChessRules::from_fen(fen)?,
        None => ChessRules::standard(),
    };

    info!(host = %config.host(), port = config.port(), "Starting chess session server");
    let handle = SessionHost::spawn(rules, *config.command_buffer(), *config.event_capacity());
    strictly_chess::serve(&config, handle).await?;
    Ok(())
}

/// Replay a saved game and print its moves and outcome.
#[instrument(fields(path = %path.display()))]
fn run_replay(path: &Path) -> Result<()> {
    let encoded = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read saved game {}", path.display()))?;

    let rules = ChessRules::standard();
    let board = rules.deserialize_board(&encoded)?;
    info!(half_moves = rules.half_move_count(&board), "Saved game replayed");

    for (number, pair) in board.moves().chunks(2).enumerate() {
        println!("{:>3}. {}", number + 1, pair.join(" "));
    }

    let outcome = rules.latest_half_move(&board).and_then(|half_move| half_move.outcome());
    match outcome {
        Some(reason) => println!("Result: {}", reason),
        None => println!("In progress, {} to move", rules.side_to_move(&board)),
    }
    Ok(())
}
