//! Replay of recorded blocks through the DEX analyzers.
//!
//! This binary reads newline-delimited JSON blocks, as produced by the chain
//! follower, and prints the extracted operations as JSON lines.

mod config;
mod error;
mod replay;

use std::process::exit;

use clap::Parser;
use tokio::io::{AsyncBufRead, BufReader};
use tracing::error;

use config::{CliConfig, EnvConfig};

#[tokio::main]
async fn main() {
    // Load .env file
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Warning: Failed to load .env file: {}", e);
    }

    // Parse environment configuration
    let env_config = match EnvConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to parse environment configuration: {}", e);
            exit(1);
        }
    };

    // Parse CLI arguments
    let cli_config = CliConfig::parse();

    let replay_config = match cli_config.to_replay_config(&env_config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            exit(1);
        }
    };

    // Set up logging, stdout carries the operations
    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", "info");
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let input: Box<dyn AsyncBufRead + Unpin> = match &cli_config.input {
        Some(path) => match tokio::fs::File::open(path).await {
            Ok(file) => Box::new(BufReader::new(file)),
            Err(e) => {
                eprintln!("Failed to open {}: {}", path.display(), e);
                exit(1);
            }
        },
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    if let Err(e) = replay::run(&replay_config, input, std::io::stdout().lock()).await {
        error!(%e, "Replay failed, shutting down");
        exit(1);
    }
}
