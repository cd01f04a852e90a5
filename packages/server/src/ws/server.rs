//! The game server.
//!
//! A single task owns the lobby and the running game and processes
//! [`Command`]s one at a time. Connection handlers and timers only ever talk
//! to it through its command channel, so no state is shared between tasks.

use std::{
    collections::BTreeMap,
    io,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use strum_macros::AsRefStr;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use trivia_ws::models::{
    ClientMessage, GAME_IN_PROGRESS, INVALID_USER_LIMIT, ScoresPayload, ServerEvent,
    ServerMessage, UNEXPECTED_MESSAGE, USER_LIMIT_REACHED, USERNAME_ALREADY_USED, USERNAME_EMPTY,
    parse_user_limit,
};

use crate::{
    game::Game,
    lobby::{AddUserError, Lobby},
    questions::QuestionBank,
    ws::{ConnId, Msg},
};

/// Timing and size of a game.
#[derive(Debug, Clone)]
pub struct GameSettings {
    pub questions_per_game: usize,
    /// How long players get to answer before the round closes anyway
    pub round_timeout: Duration,
    /// Pause after a round closes before the next question is sent
    pub between_rounds: Duration,
    /// Pause after `game_over` before the host is asked to start again
    pub game_over_cooldown: Duration,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            questions_per_game: 5,
            round_timeout: Duration::from_secs(30),
            between_rounds: Duration::from_secs(1),
            game_over_cooldown: Duration::from_secs(10),
        }
    }
}

/// A command received by the [`GameServer`].
#[derive(Debug, AsRefStr)]
enum Command {
    Connect {
        conn_tx: mpsc::UnboundedSender<Msg>,
        res_tx: oneshot::Sender<Option<ConnId>>,
    },

    Disconnect {
        conn: ConnId,
    },

    Message {
        conn: ConnId,
        msg: String,
    },

    RoundTimeout {
        game_id: u64,
        round: usize,
    },

    NextRound {
        game_id: u64,
    },

    GameOverCooldown {
        game_id: u64,
    },
}

#[derive(Debug, Error)]
pub enum WebsocketMessageError {
    #[error("Session {0} not connected")]
    NoSession(ConnId),
    #[error("Session {0} disconnected")]
    Disconnected(ConnId),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// What the server expects next from a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionPhase {
    AwaitingUname,
    /// Joined the lobby, and owes the player limit
    AwaitingUlimit,
    Joined,
}

#[derive(Debug)]
struct Session {
    tx: mpsc::UnboundedSender<Msg>,
    phase: SessionPhase,
}

#[derive(Debug)]
struct ActiveGame {
    id: u64,
    game: Game,
}

/// Lobby and game state for every connected player.
///
/// Call and spawn [`run`](Self::run) to start processing commands.
#[derive(Debug)]
pub struct GameServer {
    sessions: BTreeMap<ConnId, Session>,
    lobby: Lobby,
    game: Option<ActiveGame>,
    games_started: u64,
    /// Set once the host has been sent `start_request` for the current full lobby.
    start_requested: bool,
    questions: QuestionBank,
    settings: GameSettings,

    /// Tracks the number of open connections.
    visitor_count: Arc<AtomicUsize>,

    /// Used by timers; weak so that dropping every handle stops [`run`](Self::run).
    cmd_tx: mpsc::WeakUnboundedSender<Command>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
}

impl GameServer {
    #[must_use]
    pub fn new(questions: QuestionBank, settings: GameSettings) -> (Self, GameServerHandle) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        (
            Self {
                sessions: BTreeMap::new(),
                lobby: Lobby::new(),
                game: None,
                games_started: 0,
                start_requested: false,
                questions,
                settings,
                visitor_count: Arc::new(AtomicUsize::new(0)),
                cmd_tx: cmd_tx.downgrade(),
                cmd_rx,
            },
            GameServerHandle { cmd_tx },
        )
    }

    fn send_message_to(
        &self,
        id: ConnId,
        message: &ServerMessage,
    ) -> Result<(), WebsocketMessageError> {
        let session = self
            .sessions
            .get(&id)
            .ok_or(WebsocketMessageError::NoSession(id))?;

        let text = message.to_json()?;

        trivia_logging::debug_or_trace!(
            ("Sending {message} to {id}"),
            ("Sending {message} to {id}: {text}")
        );

        // errors if client disconnected abruptly and hasn't been cleaned up yet
        session
            .tx
            .send(Msg::Text(text))
            .map_err(|_| WebsocketMessageError::Disconnected(id))
    }

    fn send(&self, id: ConnId, message: impl Into<ServerMessage>) {
        let message = message.into();
        if let Err(e) = self.send_message_to(id, &message) {
            log::error!("Failed to send {message} to {id}: {e:?}");
        }
    }

    fn send_error(&self, id: ConnId, error: &str) {
        self.send(id, ServerMessage::error(error));
    }

    /// Sends `error`, then asks the handler to close the connection.
    fn send_error_and_close(&self, id: ConnId, error: &str) {
        self.send_error(id, error);
        if let Some(session) = self.sessions.get(&id) {
            let _ = session.tx.send(Msg::Close);
        }
    }

    /// Sends to every player in the lobby.
    fn broadcast(&self, message: impl Into<ServerMessage>) {
        let message = message.into();
        log::debug!("Broadcasting {message} to {} players", self.lobby.len());

        for conn in self.lobby.conns() {
            if let Err(e) = self.send_message_to(conn, &message) {
                log::error!("Failed to broadcast {message} to {conn}: {e:?}");
            }
        }
    }

    fn schedule(&self, delay: Duration, command: Command) {
        let cmd_tx = self.cmd_tx.clone();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(cmd_tx) = cmd_tx.upgrade() {
                let _ = cmd_tx.send(command);
            }
        });
    }

    /// Register new session and assign unique ID to this session.
    ///
    /// Returns `None` after telling the client why when it cannot join.
    fn connect(&mut self, tx: mpsc::UnboundedSender<Msg>) -> Option<ConnId> {
        let rejection = if self.game.is_some() {
            Some(GAME_IN_PROGRESS)
        } else if self.lobby.is_full() {
            Some(USER_LIMIT_REACHED)
        } else {
            None
        };

        if let Some(error) = rejection {
            log::info!("Rejecting connection: {error}");
            if let Ok(text) = ServerMessage::error(error).to_json() {
                let _ = tx.send(Msg::Text(text));
            }
            let _ = tx.send(Msg::Close);
            return None;
        }

        let mut id = rand::random::<ConnId>();
        while self.sessions.contains_key(&id) {
            id = rand::random::<ConnId>();
        }

        log::info!("Someone joined {id}");

        self.sessions.insert(
            id,
            Session {
                tx,
                phase: SessionPhase::AwaitingUname,
            },
        );

        let count = self.visitor_count.fetch_add(1, Ordering::SeqCst);
        log::info!("Visitor count: {}", count + 1);

        self.send(id, ServerEvent::UnameRequest);

        Some(id)
    }

    /// Unregister connection and tell the remaining players.
    fn disconnect(&mut self, conn: ConnId) {
        if self.sessions.remove(&conn).is_none() {
            return;
        }

        log::info!("Someone disconnected {conn}");
        let count = self.visitor_count.fetch_sub(1, Ordering::SeqCst);
        log::info!("Visitor count: {}", count - 1);

        if let Some(uname) = self.lobby.remove_conn(conn) {
            self.user_left(&uname);
        }
    }

    fn user_left(&mut self, uname: &str) {
        log::info!("{uname} left the lobby");

        self.broadcast(ServerEvent::UserLeave(self.lobby.payload()));

        if !self.lobby.is_full() {
            self.start_requested = false;
        }

        if let Some(active) = &mut self.game {
            active.game.remove_player(uname);

            if !active.game.has_players() {
                log::info!("Every player left, abandoning game {}", active.id);
                self.game = None;
            } else if active.game.all_answered() {
                self.end_round();
            }
        }

        self.request_missing_limit();
        self.check_start();
    }

    /// Asks the host for the player limit when the player who owed it left.
    fn request_missing_limit(&mut self) {
        if self.lobby.user_limit().is_some() || self.awaiting_limit() {
            return;
        }

        if let Some(host) = self.lobby.host() {
            if let Some(session) = self.sessions.get_mut(&host) {
                session.phase = SessionPhase::AwaitingUlimit;
            }
            self.send(host, ServerEvent::UlimitRequest);
        }
    }

    fn awaiting_limit(&self) -> bool {
        self.sessions
            .values()
            .any(|x| x.phase == SessionPhase::AwaitingUlimit)
    }

    fn set_phase(&mut self, conn: ConnId, phase: SessionPhase) {
        if let Some(session) = self.sessions.get_mut(&conn) {
            session.phase = phase;
        }
    }

    fn process_message(&mut self, conn: ConnId, msg: &str) {
        let Some(phase) = self.sessions.get(&conn).map(|x| x.phase) else {
            log::warn!("{}", WebsocketMessageError::NoSession(conn));
            return;
        };

        let message = match msg.parse::<ClientMessage>() {
            Ok(message) => message,
            Err(e) => {
                log::warn!("Invalid message from {conn}: {e:?}");
                self.send_error(conn, UNEXPECTED_MESSAGE);
                return;
            }
        };

        log::debug!("Received {message} from {conn} ({phase:?})");

        match (phase, message) {
            (SessionPhase::AwaitingUname, ClientMessage::Uname { uname }) => {
                self.set_uname(conn, &uname);
            }
            (SessionPhase::AwaitingUlimit, ClientMessage::Ulimit { ulimit }) => {
                match parse_user_limit(&ulimit) {
                    Some(limit) => self.set_user_limit(conn, limit),
                    None => {
                        self.send_error(conn, INVALID_USER_LIMIT);
                        self.send(conn, ServerEvent::UlimitRequest);
                    }
                }
            }
            (SessionPhase::Joined, ClientMessage::Start { .. }) => self.host_start(conn),
            (SessionPhase::Joined, ClientMessage::Answer { answer }) => self.answer(conn, answer),
            (phase, message) => {
                log::warn!("Unexpected {message} from {conn} while {phase:?}");
                self.send_error(conn, UNEXPECTED_MESSAGE);
            }
        }
    }

    fn set_uname(&mut self, conn: ConnId, uname: &str) {
        if self.game.is_some() {
            self.send_error_and_close(conn, GAME_IN_PROGRESS);
            return;
        }
        if self.lobby.is_full() {
            self.send_error_and_close(conn, USER_LIMIT_REACHED);
            return;
        }

        if let Err(e) = self.lobby.add_user(uname, conn) {
            log::debug!("Rejected username from {conn}: {e}");
            self.send_error(
                conn,
                match e {
                    AddUserError::UsernameTaken(_) => USERNAME_ALREADY_USED,
                    AddUserError::EmptyUsername => USERNAME_EMPTY,
                },
            );
            self.send(conn, ServerEvent::UnameRequest);
            return;
        }

        log::info!("{} joined as player {}", uname.trim(), self.lobby.len());

        if self.lobby.user_limit().is_none() && !self.awaiting_limit() {
            self.set_phase(conn, SessionPhase::AwaitingUlimit);
            self.send(conn, ServerEvent::UlimitRequest);
        } else {
            self.set_phase(conn, SessionPhase::Joined);
        }

        self.broadcast(ServerEvent::UserJoin(self.lobby.payload()));
        self.check_start();
    }

    /// Raises `limit` to the lobby size when more players joined while the
    /// limit was still owed.
    fn set_user_limit(&mut self, conn: ConnId, limit: u16) {
        let joined = u16::try_from(self.lobby.len()).unwrap_or(u16::MAX);
        let limit = if limit < joined {
            log::info!("Player limit {limit} is below the {joined} players already joined");
            joined
        } else {
            limit
        };

        log::info!("Player limit set to {limit}");

        self.lobby.set_user_limit(limit);
        self.set_phase(conn, SessionPhase::Joined);
        self.check_start();
    }

    /// Asks the host to start once the lobby fills up.
    fn check_start(&mut self) {
        if self.game.is_some() || self.start_requested || !self.lobby.is_full() {
            return;
        }

        if let Some(host) = self.lobby.host() {
            log::debug!("Lobby is full, asking {host} to start");
            self.start_requested = true;
            self.send(host, ServerEvent::StartRequest);
        }
    }

    fn host_start(&mut self, conn: ConnId) {
        if self.game.is_some() || !self.start_requested || self.lobby.host() != Some(conn) {
            log::warn!("Ignoring start request from {conn}");
            self.send_error(conn, UNEXPECTED_MESSAGE);
            return;
        }

        self.start_game();
    }

    fn start_game(&mut self) {
        self.games_started += 1;
        self.start_requested = false;

        let id = self.games_started;
        let questions = self.questions.pick(self.settings.questions_per_game);
        let game = Game::new(questions, self.lobby.current_users());

        log::info!(
            "Starting game {id} with {} players and {} questions",
            self.lobby.len(),
            game.question_count()
        );

        self.game = Some(ActiveGame { id, game });
        self.broadcast(ServerEvent::GameStart);
        self.begin_round();
    }

    fn begin_round(&mut self) {
        let Some(active) = self.game.as_mut() else {
            return;
        };
        let game_id = active.id;

        let Some(question) = active.game.start_round().map(|x| x.payload.clone()) else {
            self.finish_game();
            return;
        };
        let round = active.game.round().unwrap_or_default();
        let scores = active.game.scores().clone();

        log::debug!("Game {game_id}: round {}", round + 1);

        self.broadcast(ServerEvent::ScoreUpdate(ScoresPayload { scores }));
        self.broadcast(ServerEvent::Question(question));
        self.schedule(
            self.settings.round_timeout,
            Command::RoundTimeout { game_id, round },
        );
    }

    fn answer(&mut self, conn: ConnId, answer: usize) {
        let Some(uname) = self.lobby.uname(conn).map(ToString::to_string) else {
            return;
        };
        let Some(active) = self.game.as_mut() else {
            self.send_error(conn, UNEXPECTED_MESSAGE);
            return;
        };

        if let Err(e) = active.game.record_answer(&uname, answer) {
            log::warn!("Rejected answer from {uname}: {e}");
            self.send_error(conn, UNEXPECTED_MESSAGE);
            return;
        }

        if active.game.all_answered() {
            self.end_round();
        }
    }

    fn end_round(&mut self) {
        let Some(active) = self.game.as_mut() else {
            return;
        };

        active.game.finish_round();
        let game_id = active.id;

        self.schedule(self.settings.between_rounds, Command::NextRound { game_id });
    }

    fn finish_game(&mut self) {
        let Some(active) = self.game.as_ref() else {
            return;
        };
        let game_id = active.id;

        match active.game.game_over() {
            Some(payload) => {
                log::info!("Game {game_id} over, winner: {}", payload.winner);
                self.broadcast(ServerEvent::GameOver(payload));
            }
            None => log::warn!("Game {game_id} ended without players"),
        }

        self.schedule(
            self.settings.game_over_cooldown,
            Command::GameOverCooldown { game_id },
        );
    }

    fn is_current_game(&self, game_id: u64) -> bool {
        self.game.as_ref().is_some_and(|x| x.id == game_id)
    }

    /// Runs until every [`GameServerHandle`] is dropped.
    ///
    /// # Errors
    ///
    /// * Never at present; kept fallible for symmetry with the listener
    pub async fn run(mut self) -> io::Result<()> {
        while let Some(cmd) = self.cmd_rx.recv().await {
            log::trace!("Processing command {}", cmd.as_ref());

            match cmd {
                Command::Connect { conn_tx, res_tx } => {
                    if let Err(error) = res_tx.send(self.connect(conn_tx)) {
                        log::error!("Failed to connect {error:?}");
                        if let Some(conn) = error {
                            self.disconnect(conn);
                        }
                    }
                }

                Command::Disconnect { conn } => self.disconnect(conn),

                Command::Message { conn, msg } => self.process_message(conn, &msg),

                Command::RoundTimeout { game_id, round } => {
                    let open = self
                        .game
                        .as_ref()
                        .is_some_and(|x| x.id == game_id && x.game.round() == Some(round));

                    if open {
                        log::debug!("Game {game_id}: round {} timed out", round + 1);
                        self.end_round();
                    }
                }

                Command::NextRound { game_id } => {
                    if self.is_current_game(game_id) {
                        self.begin_round();
                    }
                }

                Command::GameOverCooldown { game_id } => {
                    if self.is_current_game(game_id) {
                        log::debug!("Game {game_id} cleared, back to the lobby");
                        self.game = None;
                        self.start_requested = false;
                        self.check_start();
                    }
                }
            }
        }

        Ok(())
    }
}

/// Handle and command sender for the game server.
#[derive(Debug, Clone)]
pub struct GameServerHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl GameServerHandle {
    /// Register client message sender and obtain connection ID.
    ///
    /// Returns `None` when the server turned the connection away; the reason
    /// has then already been queued on `conn_tx`.
    pub async fn connect(&self, conn_tx: mpsc::UnboundedSender<Msg>) -> Option<ConnId> {
        let (res_tx, res_rx) = oneshot::channel();

        if let Err(e) = self.cmd_tx.send(Command::Connect { conn_tx, res_tx }) {
            log::error!("Game server is not running: {e:?}");
            return None;
        }

        res_rx.await.ok().flatten()
    }

    /// Forward a text frame received from the client.
    pub fn send_message(&self, conn: ConnId, msg: impl Into<String>) {
        if let Err(e) = self.cmd_tx.send(Command::Message {
            conn,
            msg: msg.into(),
        }) {
            log::error!("Game server is not running: {e:?}");
        }
    }

    /// Unregister message sender and tell the remaining players.
    pub fn disconnect(&self, conn: ConnId) {
        if let Err(e) = self.cmd_tx.send(Command::Disconnect { conn }) {
            log::error!("Game server is not running: {e:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use trivia_ws::models::{GameOverPayload, LobbyPayload, QuestionPayload, Scores};

    use super::*;
    use crate::questions::Question;

    fn bank() -> QuestionBank {
        QuestionBank::new(
            (0..3)
                .map(|i| Question {
                    payload: QuestionPayload {
                        question: format!("q{i}"),
                        traceback: String::new(),
                        code: String::new(),
                        possible_answers: ["a".into(), "b".into(), "c".into(), "d".into()],
                    },
                    correct_answer: 0,
                })
                .collect(),
        )
        .unwrap()
    }

    fn settings() -> GameSettings {
        GameSettings {
            questions_per_game: 2,
            round_timeout: Duration::from_secs(5),
            between_rounds: Duration::from_millis(10),
            game_over_cooldown: Duration::from_millis(10),
        }
    }

    fn start_server(settings: GameSettings) -> GameServerHandle {
        let (server, handle) = GameServer::new(bank(), settings);
        tokio::spawn(server.run());
        handle
    }

    struct TestClient {
        conn: Option<ConnId>,
        rx: mpsc::UnboundedReceiver<Msg>,
    }

    impl TestClient {
        async fn connect(handle: &GameServerHandle) -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            let conn = handle.connect(tx).await;
            Self { conn, rx }
        }

        fn id(&self) -> ConnId {
            self.conn.unwrap()
        }

        async fn recv_msg(&mut self) -> Msg {
            tokio::time::timeout(Duration::from_secs(2), self.rx.recv())
                .await
                .expect("timed out waiting for a message")
                .expect("connection channel closed")
        }

        async fn recv(&mut self) -> ServerMessage {
            match self.recv_msg().await {
                Msg::Text(text) => text.parse().unwrap(),
                Msg::Close => panic!("Expected text, got close"),
            }
        }

        async fn expect(&mut self, expected: impl Into<ServerMessage>) {
            assert_eq!(self.recv().await, expected.into());
        }

        fn send(&self, handle: &GameServerHandle, message: &ClientMessage) {
            handle.send_message(self.id(), message.to_json().unwrap());
        }
    }

    fn lobby(names: &[&str]) -> LobbyPayload {
        LobbyPayload {
            count: names.len(),
            uname_list: names.iter().map(ToString::to_string).collect(),
        }
    }

    fn scores(entries: &[(&str, u32)]) -> ServerEvent {
        ServerEvent::ScoreUpdate(ScoresPayload {
            scores: entries.iter().map(|(k, v)| ((*k).to_string(), *v)).collect(),
        })
    }

    async fn expect_question(client: &mut TestClient) {
        match client.recv().await {
            ServerMessage::Event(ServerEvent::Question(_)) => {}
            other => panic!("Expected question, got {other:?}"),
        }
    }

    /// Joins ann as host with a limit of 2, then bob.
    async fn full_lobby(handle: &GameServerHandle) -> (TestClient, TestClient) {
        let mut ann = TestClient::connect(handle).await;
        ann.expect(ServerEvent::UnameRequest).await;
        ann.send(handle, &ClientMessage::uname("ann"));
        ann.expect(ServerEvent::UlimitRequest).await;
        ann.expect(ServerEvent::UserJoin(lobby(&["ann"]))).await;
        ann.send(handle, &ClientMessage::ulimit(2));

        let mut bob = TestClient::connect(handle).await;
        bob.expect(ServerEvent::UnameRequest).await;
        bob.send(handle, &ClientMessage::uname("bob"));
        bob.expect(ServerEvent::UserJoin(lobby(&["ann", "bob"]))).await;
        ann.expect(ServerEvent::UserJoin(lobby(&["ann", "bob"]))).await;
        ann.expect(ServerEvent::StartRequest).await;

        (ann, bob)
    }

    #[test_log::test(tokio::test)]
    async fn first_player_is_asked_for_name_then_limit() {
        let handle = start_server(settings());
        let mut ann = TestClient::connect(&handle).await;

        ann.expect(ServerEvent::UnameRequest).await;
        ann.send(&handle, &ClientMessage::uname("ann"));
        ann.expect(ServerEvent::UlimitRequest).await;
        ann.expect(ServerEvent::UserJoin(lobby(&["ann"]))).await;
    }

    #[test_log::test(tokio::test)]
    async fn duplicate_username_is_requested_again() {
        let handle = start_server(settings());
        let mut ann = TestClient::connect(&handle).await;
        ann.expect(ServerEvent::UnameRequest).await;
        ann.send(&handle, &ClientMessage::uname("ann"));
        ann.expect(ServerEvent::UlimitRequest).await;
        ann.expect(ServerEvent::UserJoin(lobby(&["ann"]))).await;
        ann.send(&handle, &ClientMessage::ulimit(3));

        let mut other = TestClient::connect(&handle).await;
        other.expect(ServerEvent::UnameRequest).await;
        other.send(&handle, &ClientMessage::uname("ann"));

        other.expect(ServerMessage::error(USERNAME_ALREADY_USED)).await;
        other.expect(ServerEvent::UnameRequest).await;

        other.send(&handle, &ClientMessage::uname(""));
        other.expect(ServerMessage::error(USERNAME_EMPTY)).await;
        other.expect(ServerEvent::UnameRequest).await;
    }

    #[test_log::test(tokio::test)]
    async fn invalid_limit_is_requested_again() {
        let handle = start_server(settings());
        let mut ann = TestClient::connect(&handle).await;
        ann.expect(ServerEvent::UnameRequest).await;
        ann.send(&handle, &ClientMessage::uname("ann"));
        ann.expect(ServerEvent::UlimitRequest).await;
        ann.expect(ServerEvent::UserJoin(lobby(&["ann"]))).await;

        handle.send_message(ann.id(), r#"{"ulimit": 1}"#);
        ann.expect(ServerMessage::error(INVALID_USER_LIMIT)).await;
        ann.expect(ServerEvent::UlimitRequest).await;

        handle.send_message(ann.id(), r#"{"ulimit": null}"#);
        ann.expect(ServerMessage::error(INVALID_USER_LIMIT)).await;
        ann.expect(ServerEvent::UlimitRequest).await;
    }

    #[test_log::test(tokio::test)]
    async fn malformed_message_gets_error_and_keeps_session() {
        let handle = start_server(settings());
        let mut ann = TestClient::connect(&handle).await;
        ann.expect(ServerEvent::UnameRequest).await;

        handle.send_message(ann.id(), "not json");
        ann.expect(ServerMessage::error(UNEXPECTED_MESSAGE)).await;

        handle.send_message(ann.id(), r#"{"answer": 1}"#);
        ann.expect(ServerMessage::error(UNEXPECTED_MESSAGE)).await;

        ann.send(&handle, &ClientMessage::uname("ann"));
        ann.expect(ServerEvent::UlimitRequest).await;
    }

    #[test_log::test(tokio::test)]
    async fn full_lobby_rejects_new_connections() {
        let handle = start_server(settings());
        let (_ann, _bob) = full_lobby(&handle).await;

        let mut late = TestClient::connect(&handle).await;

        assert_eq!(late.conn, None);
        late.expect(ServerMessage::error(USER_LIMIT_REACHED)).await;
        assert_eq!(late.recv_msg().await, Msg::Close);
    }

    #[test_log::test(tokio::test)]
    async fn only_host_can_start() {
        let handle = start_server(settings());
        let (_ann, mut bob) = full_lobby(&handle).await;

        bob.send(&handle, &ClientMessage::start());

        bob.expect(ServerMessage::error(UNEXPECTED_MESSAGE)).await;
    }

    #[test_log::test(tokio::test)]
    async fn game_runs_to_game_over_and_returns_to_lobby() {
        let handle = start_server(settings());
        let (mut ann, mut bob) = full_lobby(&handle).await;

        ann.send(&handle, &ClientMessage::start());

        for client in [&mut ann, &mut bob] {
            client.expect(ServerEvent::GameStart).await;
            client.expect(scores(&[("ann", 0), ("bob", 0)])).await;
            expect_question(client).await;
        }

        ann.send(&handle, &ClientMessage::answer(0));
        bob.send(&handle, &ClientMessage::answer(2));

        for client in [&mut ann, &mut bob] {
            client.expect(scores(&[("ann", 1), ("bob", 0)])).await;
            expect_question(client).await;
        }

        ann.send(&handle, &ClientMessage::answer(0));
        bob.send(&handle, &ClientMessage::answer(0));

        let game_over = ServerEvent::GameOver(GameOverPayload {
            scores: Scores::from([("ann".into(), 2), ("bob".into(), 1)]),
            winner: "ann".into(),
        });
        ann.expect(game_over.clone()).await;
        bob.expect(game_over).await;

        ann.expect(ServerEvent::StartRequest).await;
    }

    #[test_log::test(tokio::test)]
    async fn answering_twice_is_rejected() {
        let handle = start_server(settings());
        let (mut ann, mut bob) = full_lobby(&handle).await;
        ann.send(&handle, &ClientMessage::start());
        for client in [&mut ann, &mut bob] {
            client.expect(ServerEvent::GameStart).await;
            client.expect(scores(&[("ann", 0), ("bob", 0)])).await;
            expect_question(client).await;
        }

        ann.send(&handle, &ClientMessage::answer(1));
        ann.send(&handle, &ClientMessage::answer(0));

        ann.expect(ServerMessage::error(UNEXPECTED_MESSAGE)).await;
    }

    #[test_log::test(tokio::test)]
    async fn round_closes_on_timeout() {
        let handle = start_server(GameSettings {
            round_timeout: Duration::from_millis(50),
            ..settings()
        });
        let (mut ann, mut bob) = full_lobby(&handle).await;
        ann.send(&handle, &ClientMessage::start());
        for client in [&mut ann, &mut bob] {
            client.expect(ServerEvent::GameStart).await;
            client.expect(scores(&[("ann", 0), ("bob", 0)])).await;
            expect_question(client).await;
        }

        ann.send(&handle, &ClientMessage::answer(0));

        ann.expect(scores(&[("ann", 1), ("bob", 0)])).await;
        expect_question(&mut ann).await;
    }

    #[test_log::test(tokio::test)]
    async fn game_continues_when_player_leaves() {
        let handle = start_server(settings());
        let (mut ann, mut bob) = full_lobby(&handle).await;
        ann.send(&handle, &ClientMessage::start());
        for client in [&mut ann, &mut bob] {
            client.expect(ServerEvent::GameStart).await;
            client.expect(scores(&[("ann", 0), ("bob", 0)])).await;
            expect_question(client).await;
        }

        ann.send(&handle, &ClientMessage::answer(0));
        handle.disconnect(bob.id());

        ann.expect(ServerEvent::UserLeave(lobby(&["ann"]))).await;
        ann.expect(scores(&[("ann", 1)])).await;
        expect_question(&mut ann).await;
    }

    #[test_log::test(tokio::test)]
    async fn running_game_rejects_new_connections() {
        let handle = start_server(settings());
        let (mut ann, _bob) = full_lobby(&handle).await;
        ann.send(&handle, &ClientMessage::start());
        ann.expect(ServerEvent::GameStart).await;

        let mut late = TestClient::connect(&handle).await;

        assert_eq!(late.conn, None);
        late.expect(ServerMessage::error(GAME_IN_PROGRESS)).await;
    }

    #[test_log::test(tokio::test)]
    async fn abandoned_game_frees_server_for_new_players() {
        let handle = start_server(GameSettings {
            round_timeout: Duration::from_millis(30),
            ..settings()
        });
        let (mut ann, mut bob) = full_lobby(&handle).await;
        ann.send(&handle, &ClientMessage::start());
        for client in [&mut ann, &mut bob] {
            client.expect(ServerEvent::GameStart).await;
            client.expect(scores(&[("ann", 0), ("bob", 0)])).await;
            expect_question(client).await;
        }

        handle.disconnect(ann.id());
        handle.disconnect(bob.id());

        let mut cat = TestClient::connect(&handle).await;
        assert!(cat.conn.is_some());
        cat.expect(ServerEvent::UnameRequest).await;
        cat.send(&handle, &ClientMessage::uname("cat"));
        cat.expect(ServerEvent::UlimitRequest).await;
        cat.expect(ServerEvent::UserJoin(lobby(&["cat"]))).await;

        // the abandoned game's round timer fires here and must be ignored
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cat.rx.try_recv().is_err());

        cat.send(&handle, &ClientMessage::ulimit(2));
        let mut dan = TestClient::connect(&handle).await;
        dan.expect(ServerEvent::UnameRequest).await;
        dan.send(&handle, &ClientMessage::uname("dan"));
        dan.expect(ServerEvent::UserJoin(lobby(&["cat", "dan"]))).await;
        cat.expect(ServerEvent::UserJoin(lobby(&["cat", "dan"]))).await;
        cat.expect(ServerEvent::StartRequest).await;
    }

    #[test_log::test(tokio::test)]
    async fn limit_below_joined_players_is_raised_to_lobby_size() {
        let handle = start_server(settings());
        let mut ann = TestClient::connect(&handle).await;
        ann.expect(ServerEvent::UnameRequest).await;
        ann.send(&handle, &ClientMessage::uname("ann"));
        ann.expect(ServerEvent::UlimitRequest).await;
        ann.expect(ServerEvent::UserJoin(lobby(&["ann"]))).await;

        let mut others = vec![];
        for uname in ["bob", "cat"] {
            let mut client = TestClient::connect(&handle).await;
            client.expect(ServerEvent::UnameRequest).await;
            client.send(&handle, &ClientMessage::uname(uname));
            client.recv().await;
            ann.recv().await;
            others.push(client);
        }

        ann.send(&handle, &ClientMessage::ulimit(2));
        ann.expect(ServerEvent::StartRequest).await;

        let mut late = TestClient::connect(&handle).await;
        assert_eq!(late.conn, None);
        late.expect(ServerMessage::error(USER_LIMIT_REACHED)).await;
    }

    #[test_log::test(tokio::test)]
    async fn emptied_lobby_asks_next_player_for_limit() {
        let handle = start_server(settings());
        let mut ann = TestClient::connect(&handle).await;
        ann.expect(ServerEvent::UnameRequest).await;
        ann.send(&handle, &ClientMessage::uname("ann"));
        ann.expect(ServerEvent::UlimitRequest).await;
        ann.send(&handle, &ClientMessage::ulimit(4));
        handle.disconnect(ann.id());

        let mut bob = TestClient::connect(&handle).await;
        bob.expect(ServerEvent::UnameRequest).await;
        bob.send(&handle, &ClientMessage::uname("bob"));

        bob.expect(ServerEvent::UlimitRequest).await;
    }

    #[test_log::test(tokio::test)]
    async fn limit_is_requested_from_new_host_when_owner_leaves() {
        let handle = start_server(settings());
        let mut ann = TestClient::connect(&handle).await;
        ann.expect(ServerEvent::UnameRequest).await;
        ann.send(&handle, &ClientMessage::uname("ann"));
        ann.expect(ServerEvent::UlimitRequest).await;
        ann.expect(ServerEvent::UserJoin(lobby(&["ann"]))).await;

        let mut bob = TestClient::connect(&handle).await;
        bob.expect(ServerEvent::UnameRequest).await;
        bob.send(&handle, &ClientMessage::uname("bob"));
        bob.expect(ServerEvent::UserJoin(lobby(&["ann", "bob"]))).await;

        handle.disconnect(ann.id());

        bob.expect(ServerEvent::UserLeave(lobby(&["bob"]))).await;
        bob.expect(ServerEvent::UlimitRequest).await;
    }
}
