//! WebSocket message shapes for the trivia game.
//!
//! This crate provides the JSON messages exchanged between the trivia server and
//! its clients. The shapes are ad-hoc: server events carry a string `event`
//! field, errors carry a string `error` field, and client replies are keyed by
//! the single field they carry (`uname`, `ulimit`, `answer`).
//!
//! # Main Components
//!
//! * [`models::ServerMessage`] - Everything the server pushes to a client
//! * [`models::ClientMessage`] - Everything a client sends to the server
//! * [`ParseMessageError`] - Returned when a frame does not match any shape
//!
//! # Example
//!
//! ```rust
//! use trivia_ws::models::{ServerEvent, ServerMessage};
//!
//! let message: ServerMessage = r#"{"event": "uname_request"}"#.parse().unwrap();
//! assert_eq!(message, ServerMessage::Event(ServerEvent::UnameRequest));
//! ```

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error;

pub mod models;

/// Errors that can occur when parsing a websocket frame into a message.
#[derive(Debug, Error)]
pub enum ParseMessageError {
    /// The frame was not valid JSON or did not match any known shape
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}
