#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Runs the trivia websocket server.
//!
//! ```bash
//! trivia_server --port 8081 --questions-per-game 5
//! ```

use std::{path::PathBuf, process};

use clap::Parser;
use tokio_util::sync::CancellationToken;
use trivia_config::{AppType, file::load_server_config};
use trivia_server::{ServerSettings, SettingsOverrides, StartError};

/// Multiplayer trivia websocket server
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address to bind [env: TRIVIA_HOST] [default: 127.0.0.1]
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on [env: TRIVIA_PORT] [default: 8081]
    #[arg(long)]
    port: Option<u16>,

    /// JSON question bank replacing the built-in one
    #[arg(long, value_name = "FILE")]
    questions: Option<PathBuf>,

    /// Number of questions asked per game [default: 5]
    #[arg(long, value_name = "N")]
    questions_per_game: Option<usize>,

    /// Seconds players get to answer each question [default: 30]
    #[arg(long, value_name = "SECS")]
    round_timeout: Option<u64>,
}

impl From<Cli> for SettingsOverrides {
    fn from(cli: Cli) -> Self {
        Self {
            host: cli.host,
            port: cli.port,
            questions_file: cli.questions,
            questions_per_game: cli.questions_per_game,
            round_timeout_secs: cli.round_timeout,
        }
    }
}

async fn start(cli: Cli) -> Result<(), StartError> {
    let config = load_server_config()?;
    let level = config.logging.as_ref().and_then(|x| x.level.clone());
    let file = config.logging.as_ref().and_then(|x| x.file.clone());

    if let Err(e) = trivia_logging::init(AppType::Server, file.as_deref(), level.as_deref()) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let settings = ServerSettings::resolve(cli.into(), config)?;
    log::debug!("Starting with {settings:?}");

    let shutdown = CancellationToken::new();

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => log::info!("Received ctrl-c, shutting down"),
                Err(e) => log::error!("Failed to listen for ctrl-c: {e:?}"),
            }
            shutdown.cancel();
        }
    });

    trivia_server::run(settings, shutdown).await
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = start(cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
