#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Runs the trivia terminal client.
//!
//! ```bash
//! trivia_client --address ws://localhost:8081/
//! ```

use std::process;

use clap::Parser;
use trivia_config::{AppType, file::load_client_config};

const LOG_FILE: &str = "trivia_client.log";

/// Terminal client for the multiplayer trivia game
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Server address prefilled in the connect form [env: TRIVIA_ADDRESS]
    /// [default: ws://localhost:8081/]
    #[arg(long)]
    address: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = load_client_config().unwrap_or_else(|e| {
        eprintln!("Ignoring client config: {e}");
        trivia_config::file::ClientConfig::default()
    });
    let logging = config.logging.unwrap_or_default();

    // the terminal belongs to the UI, so logs go to a file
    if let Err(e) = trivia_logging::init(
        AppType::Client,
        Some(logging.file.as_deref().unwrap_or(LOG_FILE)),
        logging.level.as_deref(),
    ) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let address = trivia_client::resolve_address(cli.address, config.address);
    log::debug!("Starting client for {address}");

    if let Err(e) = trivia_client::tui::run(&address).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
