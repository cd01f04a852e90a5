//! Everything the player sees, as plain data.
//!
//! [`ClientView`] is updated by server messages and key presses and knows
//! nothing about terminals or sockets. Operations that need to talk to the
//! server return what should be sent instead of sending it.

use serde_json::Value;
use trivia_ws::models::{
    ClientMessage, QuestionPayload, Scores, ServerEvent, ServerMessage,
};

pub const ADDRESS_LABEL: &str = "Server:";
pub const USERNAME_LABEL: &str = "Username:";
pub const MAX_PLAYERS_LABEL: &str = "Max Players:";
pub const SERVER_FULL_LABEL: &str = "Server Full";

pub const CONNECT_FAILED: &str = "Could not connect to server";
pub const DISCONNECTED: &str = "Disconnected from server";

/// What the UI loop should do after a submit.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Open a connection to this address
    Connect(String),
    Send(ClientMessage),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientView {
    pub label: String,
    pub input: String,
    pub input_enabled: bool,
    pub button_enabled: bool,
    pub player_count: Option<usize>,
    pub players: Vec<String>,
    pub question: Option<QuestionPayload>,
    /// Answer already sent for the current question
    pub selected_answer: Option<usize>,
    pub scores: Scores,
    pub winner: Option<String>,
    /// Shown to the host once the lobby is full
    pub start_prompt: bool,
    pub status: Option<String>,
    pub connected: bool,
    address: String,
    /// A form submission is waiting for the server's answer
    awaiting_reply: bool,
}

impl ClientView {
    /// Starts at the address prompt, prefilled with `address`.
    #[must_use]
    pub fn new(address: &str) -> Self {
        Self {
            label: ADDRESS_LABEL.to_string(),
            input: address.to_string(),
            input_enabled: true,
            button_enabled: true,
            player_count: None,
            players: vec![],
            question: None,
            selected_answer: None,
            scores: Scores::new(),
            winner: None,
            start_prompt: false,
            status: None,
            connected: false,
            address: address.to_string(),
            awaiting_reply: false,
        }
    }

    fn prompt(&mut self, label: &str) {
        self.label = label.to_string();
        self.input_enabled = true;
        self.input.clear();
        self.button_enabled = true;
    }

    fn disable_form(&mut self) {
        self.input_enabled = false;
        self.button_enabled = false;
    }

    /// Updates the view from a server message. The newest message always wins.
    ///
    /// Any event settles a pending submission. An error only re-enables the
    /// form while a submission is pending, so an error about a late answer or
    /// start request leaves the answer keys alone.
    pub fn apply(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Event(event) => {
                self.awaiting_reply = false;
                self.apply_event(event);
            }
            ServerMessage::Error(error) => {
                if error.is_user_limit_reached() {
                    self.label = SERVER_FULL_LABEL.to_string();
                    self.awaiting_reply = false;
                    self.disable_form();
                } else if self.awaiting_reply {
                    self.awaiting_reply = false;
                    self.input_enabled = true;
                    self.button_enabled = true;
                }
                self.status = Some(error.error);
            }
        }
    }

    fn apply_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::UnameRequest => self.prompt(USERNAME_LABEL),
            ServerEvent::UlimitRequest => self.prompt(MAX_PLAYERS_LABEL),
            ServerEvent::UserJoin(lobby) | ServerEvent::UserLeave(lobby) => {
                self.player_count = Some(lobby.count);
                self.players = lobby.uname_list;
            }
            ServerEvent::StartRequest => {
                self.start_prompt = true;
                self.status = Some("Lobby is full, press s to start".to_string());
            }
            ServerEvent::GameStart => {
                self.start_prompt = false;
                self.disable_form();
                self.winner = None;
                self.status = Some("Game started".to_string());
            }
            ServerEvent::Question(question) => {
                self.question = Some(question);
                self.selected_answer = None;
            }
            ServerEvent::ScoreUpdate(payload) => self.scores = payload.scores,
            ServerEvent::GameOver(payload) => {
                self.scores = payload.scores;
                self.status = Some(format!("Game over, winner: {}", payload.winner));
                self.winner = Some(payload.winner);
                self.question = None;
                self.selected_answer = None;
            }
        }
    }

    pub fn type_char(&mut self, c: char) {
        if self.input_enabled {
            self.input.push(c);
        }
    }

    pub fn backspace(&mut self) {
        if self.input_enabled {
            self.input.pop();
        }
    }

    /// Submits the input form according to what it currently asks for.
    ///
    /// The form stays disabled until the server asks for something again.
    pub fn submit(&mut self) -> Option<Action> {
        if !self.button_enabled {
            return None;
        }

        let action = match self.label.as_str() {
            ADDRESS_LABEL => {
                let address = self.input.trim().to_string();
                self.address.clone_from(&address);
                self.status = Some(format!("Connecting to {address}..."));
                Action::Connect(address)
            }
            USERNAME_LABEL => {
                log::debug!("Sending uname {}", self.input);
                Action::Send(ClientMessage::uname(self.input.clone()))
            }
            MAX_PLAYERS_LABEL => {
                let ulimit = parse_int(&self.input);
                log::debug!("Sending ulimit {ulimit:?}");
                Action::Send(ClientMessage::Ulimit {
                    ulimit: ulimit.map_or(Value::Null, Value::from),
                })
            }
            _ => return None,
        };

        if matches!(action, Action::Send(_)) {
            self.awaiting_reply = true;
        }
        self.disable_form();

        Some(action)
    }

    /// Picks an answer for the current question; only the first pick counts.
    pub fn answer(&mut self, index: usize) -> Option<ClientMessage> {
        let question = self.question.as_ref()?;

        if self.selected_answer.is_some() || index >= question.possible_answers.len() {
            return None;
        }

        self.selected_answer = Some(index);

        Some(ClientMessage::answer(index))
    }

    /// Confirms the start prompt.
    pub fn start(&mut self) -> Option<ClientMessage> {
        if !self.start_prompt {
            return None;
        }

        self.start_prompt = false;
        self.status = Some("Starting game...".to_string());

        Some(ClientMessage::start())
    }

    pub fn connected(&mut self) {
        self.connected = true;
        self.status = Some(format!("Connected to {}", self.address));
    }

    pub fn connection_failed(&mut self) {
        self.reset(CONNECT_FAILED);
    }

    /// Keeps "Server Full" as the status when that is why the server hung up.
    pub fn disconnected(&mut self) {
        let status = if self.label == SERVER_FULL_LABEL {
            SERVER_FULL_LABEL
        } else {
            DISCONNECTED
        };
        self.reset(status);
    }

    fn reset(&mut self, status: &str) {
        *self = Self {
            status: Some(status.to_string()),
            ..Self::new(&self.address)
        };
    }
}

/// Reads a leading, optionally signed, integer and ignores whatever follows,
/// so `"4 players"` is 4 and `"four"` is nothing.
fn parse_int(input: &str) -> Option<i64> {
    let input = input.trim_start();
    let digits_start = usize::from(input.starts_with(['+', '-']));
    let digits_end = input[digits_start..]
        .find(|c: char| !c.is_ascii_digit())
        .map_or(input.len(), |x| x + digits_start);

    if digits_end == digits_start {
        return None;
    }

    input[..digits_end].parse().ok()
}
