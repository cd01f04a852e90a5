use std::{collections::BTreeMap, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::AsRefStr;

use crate::ParseMessageError;

/// Sent when a connection arrives while the lobby is already full.
pub const USER_LIMIT_REACHED: &str = "user limit has been reached";
/// Sent when the requested username belongs to another player.
pub const USERNAME_ALREADY_USED: &str = "username already used";
/// Sent when the requested username is blank.
pub const USERNAME_EMPTY: &str = "username must not be empty";
/// Sent when the first player's player limit is not an integer of at least 2.
pub const INVALID_USER_LIMIT: &str = "ulimit must be an integer greater than 1";
/// Sent when a connection arrives while a game is running.
pub const GAME_IN_PROGRESS: &str = "game already in progress";
/// Sent when a client frame does not fit the current phase of its session.
pub const UNEXPECTED_MESSAGE: &str = "unexpected message";

/// Winner announced when more than one player shares the top score.
pub const TIE_WINNER: &str = "Tie";

/// Player scores keyed by username.
pub type Scores = BTreeMap<String, u32>;

/// Any frame pushed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Event(ServerEvent),
    Error(ErrorPayload),
}

impl ServerMessage {
    #[must_use]
    pub fn error(error: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            error: error.into(),
        })
    }

    /// # Errors
    ///
    /// * If the message fails to serialize
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<ServerEvent> for ServerMessage {
    fn from(value: ServerEvent) -> Self {
        Self::Event(value)
    }
}

impl FromStr for ServerMessage {
    type Err = ParseMessageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(serde_json::from_str(s)?)
    }
}

impl std::fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Event(event) => f.write_str(event.as_ref()),
            Self::Error(payload) => write!(f, "error({})", payload.error),
        }
    }
}

/// Server events, selected by the `event` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, AsRefStr)]
#[serde(tag = "event", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ServerEvent {
    UnameRequest,
    UlimitRequest,
    UserJoin(LobbyPayload),
    UserLeave(LobbyPayload),
    StartRequest,
    GameStart,
    Question(QuestionPayload),
    ScoreUpdate(ScoresPayload),
    GameOver(GameOverPayload),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
}

impl ErrorPayload {
    #[must_use]
    pub fn is_user_limit_reached(&self) -> bool {
        self.error == USER_LIMIT_REACHED
    }
}

/// Lobby membership after a player joined or left.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyPayload {
    pub count: usize,
    pub uname_list: Vec<String>,
}

/// A question as shown to the players. The correct answer is never part of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionPayload {
    pub question: String,
    #[serde(default)]
    pub traceback: String,
    #[serde(default)]
    pub code: String,
    pub possible_answers: [String; 4],
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoresPayload {
    pub scores: Scores,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameOverPayload {
    pub scores: Scores,
    pub winner: String,
}

/// Any frame sent by a client.
///
/// Variants are tried in declaration order, so each one must require a field
/// the others lack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, AsRefStr)]
#[serde(untagged)]
#[strum(serialize_all = "snake_case")]
pub enum ClientMessage {
    Uname { uname: String },
    Answer { answer: usize },
    Start { event: ClientEvent },
    /// The limit is kept as raw JSON since clients may send `null` or a
    /// fractional number; the server validates it.
    Ulimit { ulimit: Value },
}

impl ClientMessage {
    #[must_use]
    pub fn uname(uname: impl Into<String>) -> Self {
        Self::Uname {
            uname: uname.into(),
        }
    }

    #[must_use]
    pub fn ulimit(ulimit: u16) -> Self {
        Self::Ulimit {
            ulimit: Value::from(ulimit),
        }
    }

    #[must_use]
    pub const fn answer(answer: usize) -> Self {
        Self::Answer { answer }
    }

    #[must_use]
    pub const fn start() -> Self {
        Self::Start {
            event: ClientEvent::StartRequest,
        }
    }

    /// # Errors
    ///
    /// * If the message fails to serialize
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl FromStr for ClientMessage {
    type Err = ParseMessageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(serde_json::from_str(s)?)
    }
}

impl std::fmt::Display for ClientMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientEvent {
    StartRequest,
}

/// Reads a player limit the way the first player may send it.
///
/// Integers and integral floats of at least 2 are accepted; anything else,
/// including `null`, is rejected.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn parse_user_limit(value: &Value) -> Option<u16> {
    let Value::Number(number) = value else {
        return None;
    };

    let limit = match number.as_u64() {
        Some(limit) => limit,
        None => {
            let limit = number.as_f64()?;
            if limit.fract() != 0.0 || !(0.0..=f64::from(u16::MAX)).contains(&limit) {
                return None;
            }
            limit as u64
        }
    };

    u16::try_from(limit).ok().filter(|x| *x >= 2)
}
