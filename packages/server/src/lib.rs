#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Multiplayer trivia websocket server.
//!
//! Players connect over a websocket, pick a username, and wait in a lobby
//! until it reaches the player limit chosen by the first player. The first
//! player then starts the game: a handful of multiple choice questions, one
//! point per correct answer, and a winner announced at the end.
//!
//! ```rust,no_run
//! # async fn start() -> Result<(), trivia_server::StartError> {
//! use tokio_util::sync::CancellationToken;
//! use trivia_server::{ServerSettings, run};
//!
//! run(ServerSettings::default(), CancellationToken::new()).await
//! # }
//! ```

pub mod game;
pub mod lobby;
pub mod questions;
pub mod ws;

use std::{path::PathBuf, time::Duration};

use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use trivia_config::file::{ConfigError, ServerConfig};
use trivia_env_utils::{OptionEnvError, option_env, option_env_u16};

pub use ws::server::GameSettings;

use crate::{
    questions::{LoadQuestionsError, QuestionBank},
    ws::server::GameServer,
};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8081;

#[derive(Debug, Error)]
pub enum StartError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Env(#[from] OptionEnvError),
    #[error(transparent)]
    Questions(#[from] LoadQuestionsError),
}

/// Values given on the command line. They win over everything else.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub questions_file: Option<PathBuf>,
    pub questions_per_game: Option<usize>,
    pub round_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Question bank to load instead of the built-in one
    pub questions_file: Option<PathBuf>,
    pub game: GameSettings,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            questions_file: None,
            game: GameSettings::default(),
        }
    }
}

impl ServerSettings {
    /// Merges command line overrides, then `TRIVIA_HOST`/`TRIVIA_PORT`, then
    /// the config file, then the defaults.
    ///
    /// # Errors
    ///
    /// * If `TRIVIA_PORT` is set but not a port number
    pub fn resolve(overrides: SettingsOverrides, config: ServerConfig) -> Result<Self, StartError> {
        let defaults = Self::default();

        let host = overrides
            .host
            .or_else(|| option_env("TRIVIA_HOST"))
            .or(config.host)
            .unwrap_or(defaults.host);

        let port = match overrides.port {
            Some(port) => port,
            None => option_env_u16("TRIVIA_PORT")?
                .or(config.port)
                .unwrap_or(defaults.port),
        };

        let round_timeout = overrides
            .round_timeout_secs
            .or(config.round_timeout_secs)
            .map_or(defaults.game.round_timeout, Duration::from_secs);

        Ok(Self {
            host,
            port,
            questions_file: overrides
                .questions_file
                .or_else(|| config.questions_file.map(PathBuf::from)),
            game: GameSettings {
                questions_per_game: overrides
                    .questions_per_game
                    .or(config.questions_per_game)
                    .unwrap_or(defaults.game.questions_per_game),
                round_timeout,
                ..defaults.game
            },
        })
    }

    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// # Errors
    ///
    /// * If the question bank fails to load
    pub fn questions(&self) -> Result<QuestionBank, LoadQuestionsError> {
        self.questions_file
            .as_deref()
            .map_or_else(QuestionBank::builtin, QuestionBank::load)
    }
}

/// Loads the questions, binds the listener, and serves until `shutdown` is
/// cancelled.
///
/// # Errors
///
/// * If the question bank fails to load
/// * If the address cannot be bound
pub async fn run(settings: ServerSettings, shutdown: CancellationToken) -> Result<(), StartError> {
    let questions = settings.questions()?;
    log::info!("Loaded {} questions", questions.len());

    let listener = TcpListener::bind(settings.addr()).await?;
    log::info!("Listening on ws://{}", listener.local_addr()?);

    serve(listener, questions, settings.game, shutdown).await;

    Ok(())
}

/// Accepts connections on `listener` until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    questions: QuestionBank,
    settings: GameSettings,
    shutdown: CancellationToken,
) {
    let (game_server, handle) = GameServer::new(questions, settings);
    let game_server = tokio::spawn(game_server.run());

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                log::debug!("serve: shutting down");
                break;
            }

            accepted = listener.accept() => {
                let (stream, addr) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        log::error!("Failed to accept connection: {e:?}");
                        continue;
                    }
                };

                let handle = handle.clone();
                tokio::spawn(async move {
                    if let Err(e) = ws::handler::game_ws(handle, stream, addr).await {
                        log::error!("Connection from {addr} failed: {e:?}");
                    }
                });
            }
        }
    }

    game_server.abort();
}
