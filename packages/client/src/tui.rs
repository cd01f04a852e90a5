//! Terminal user interface.
//!
//! Key presses are read on their own thread, as crossterm's reads block, and
//! handed to the async UI loop along with events from the connection. The
//! loop updates the [`ClientView`] and redraws after every event.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
    time::Duration,
};

use ratatui::{
    DefaultTerminal, Frame,
    crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Paragraph, Wrap},
};
use tokio::sync::mpsc;

use crate::{
    view::{Action, ClientView},
    ws::{ConnectWsError, WsClient, WsEvent, WsHandle, parse_address},
};

/// What a key press asks the UI loop to do.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyOutcome {
    Redraw,
    Quit,
    Action(Action),
}

/// Applies a key press to the view.
///
/// While the input field is enabled, printable keys edit it. Otherwise `1`
/// to `4` pick an answer and `s` confirms the start prompt.
pub fn handle_key(view: &mut ClientView, key: KeyEvent) -> KeyOutcome {
    if key.code == KeyCode::Esc
        || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL))
    {
        return KeyOutcome::Quit;
    }

    match key.code {
        KeyCode::Enter => view.submit().map_or(KeyOutcome::Redraw, KeyOutcome::Action),
        KeyCode::Backspace => {
            view.backspace();
            KeyOutcome::Redraw
        }
        KeyCode::Char(c) if view.input_enabled => {
            view.type_char(c);
            KeyOutcome::Redraw
        }
        KeyCode::Char(c @ '1'..='4') => {
            let index = c as usize - '1' as usize;
            view.answer(index)
                .map_or(KeyOutcome::Redraw, |x| KeyOutcome::Action(Action::Send(x)))
        }
        KeyCode::Char('s') => view
            .start()
            .map_or(KeyOutcome::Redraw, |x| KeyOutcome::Action(Action::Send(x))),
        _ => KeyOutcome::Redraw,
    }
}

/// Runs the UI until the player quits.
///
/// # Errors
///
/// * If the terminal cannot be initialized or drawn to
pub async fn run(address: &str) -> io::Result<()> {
    let mut terminal = ratatui::try_init()?;
    terminal.clear()?;

    let result = run_loop(&mut terminal, address).await;

    log::debug!("restore");
    ratatui::restore();

    result
}

#[allow(clippy::too_many_lines)]
async fn run_loop(terminal: &mut DefaultTerminal, address: &str) -> io::Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let (key_tx, mut key_rx) = mpsc::unbounded_channel();
    let keys = spawn_event_loop(running.clone(), key_tx);

    let (ws_tx, mut ws_rx) = mpsc::unbounded_channel();
    let (failed_tx, mut failed_rx) = mpsc::unbounded_channel::<ConnectWsError>();

    let mut view = ClientView::new(address);
    let mut connection: Option<WsHandle> = None;

    let result = loop {
        if let Err(e) = terminal.draw(|frame| render(&view, frame)) {
            break Err(e);
        }

        #[allow(clippy::redundant_pub_crate)]
        let action = tokio::select! {
            key = key_rx.recv() => {
                let Some(key) = key else {
                    break Ok(());
                };
                match handle_key(&mut view, key) {
                    KeyOutcome::Quit => break Ok(()),
                    KeyOutcome::Redraw => None,
                    KeyOutcome::Action(action) => Some(action),
                }
            }

            Some(event) = ws_rx.recv() => {
                match event {
                    WsEvent::Connected => view.connected(),
                    WsEvent::Message(text) => match text.parse() {
                        Ok(message) => view.apply(message),
                        Err(e) => log::error!("Invalid message from server {text}: {e:?}"),
                    },
                    WsEvent::Closed => {
                        connection = None;
                        view.disconnected();
                    }
                }
                None
            }

            Some(e) = failed_rx.recv() => {
                log::error!("Failed to connect: {e}");
                connection = None;
                view.connection_failed();
                None
            }
        };

        match action {
            Some(Action::Connect(address)) => match parse_address(&address) {
                Ok(url) => {
                    let (client, handle) = WsClient::new(url);
                    connection = Some(handle);

                    let ws_tx = ws_tx.clone();
                    let failed_tx = failed_tx.clone();
                    tokio::spawn(async move {
                        if let Err(e) = client.start(ws_tx).await {
                            let _ = failed_tx.send(e);
                        }
                    });
                }
                Err(e) => {
                    log::warn!("{e}");
                    view.connection_failed();
                }
            },
            Some(Action::Send(message)) => {
                if let Some(handle) = &connection {
                    if let Err(e) = handle.send_message(&message).await {
                        log::error!("Failed to send {message}: {e}");
                    }
                } else {
                    log::warn!("Not connected, dropping {message}");
                }
            }
            None => {}
        }
    };

    if let Some(handle) = connection {
        handle.close();
    }

    running.store(false, Ordering::SeqCst);
    match keys.join() {
        Ok(Err(e)) => log::error!("Key reader failed: {e:?}"),
        Err(e) => log::error!("Key reader panicked: {e:?}"),
        Ok(Ok(())) => {}
    }
    log::debug!("closing tui");

    result
}

/// Spawns the key reading loop in a separate thread.
fn spawn_event_loop(
    running: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<KeyEvent>,
) -> JoinHandle<io::Result<()>> {
    std::thread::spawn(move || {
        while running.load(Ordering::SeqCst) {
            if matches!(event::poll(Duration::from_millis(50)), Ok(true)) {
                match event::read()? {
                    Event::FocusGained
                    | Event::FocusLost
                    | Event::Mouse(..)
                    | Event::Paste(..)
                    | Event::Resize(..) => {}
                    Event::Key(key) => {
                        if key.kind == KeyEventKind::Press && tx.send(key).is_err() {
                            break;
                        }
                    }
                }
            }
        }
        log::debug!("read loop finished");

        Ok(())
    })
}

/// Draws the whole view.
pub fn render(view: &ClientView, frame: &mut Frame) {
    let area = frame.area();

    log::trace!("render: start frame.size=({}, {})", area.width, area.height);

    let [header_area, body_area, scores_area, help_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Fill(1),
        Constraint::Length(score_height(view)),
        Constraint::Length(1),
    ])
    .areas(area);

    let [lobby_area, question_area] =
        Layout::horizontal([Constraint::Length(32), Constraint::Fill(1)]).areas(body_area);

    render_header(view, frame, header_area);
    render_lobby(view, frame, lobby_area);
    render_question(view, frame, question_area);
    render_scores(view, frame, scores_area);

    let help = if view.input_enabled {
        "Enter: submit  Esc: quit"
    } else {
        "1-4: answer  s: start  Esc: quit"
    };
    frame.render_widget(
        Paragraph::new(help).style(Style::default().fg(Color::DarkGray)),
        help_area,
    );
}

fn score_height(view: &ClientView) -> u16 {
    u16::try_from(view.scores.len()).map_or(u16::MAX, |x| x.saturating_add(2))
}

fn render_header(view: &ClientView, frame: &mut Frame, area: Rect) {
    let title = Span::styled("Trivia", Style::default().add_modifier(Modifier::BOLD));
    let mut line = vec![title];
    if let Some(status) = &view.status {
        line.push(Span::raw(" | "));
        line.push(Span::raw(status.as_str()));
    }

    frame.render_widget(
        Paragraph::new(Line::from(line)).alignment(Alignment::Center),
        area,
    );
}

fn render_lobby(view: &ClientView, frame: &mut Frame, area: Rect) {
    let input_style = if view.input_enabled {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::DarkGray)
    };

    let mut lines = vec![
        Line::from(view.label.as_str()),
        Line::styled(format!("> {}", view.input), input_style),
        Line::from(""),
        Line::from(format!(
            "Players: {}",
            view.player_count
                .map_or_else(|| "-".to_string(), |x| x.to_string())
        )),
    ];
    lines.extend(view.players.iter().map(|x| Line::from(format!("  {x}"))));

    if view.start_prompt {
        lines.push(Line::from(""));
        lines.push(Line::styled(
            "Press s to start the game",
            Style::default().fg(Color::Green),
        ));
    }

    frame.render_widget(
        Paragraph::new(lines).block(Block::bordered().title("Lobby")),
        area,
    );
}

fn render_question(view: &ClientView, frame: &mut Frame, area: Rect) {
    let block = Block::bordered().title("Question");

    let Some(question) = &view.question else {
        let text = view
            .winner
            .as_ref()
            .map_or_else(String::new, |x| format!("Winner: {x}"));
        frame.render_widget(
            Paragraph::new(text)
                .alignment(Alignment::Center)
                .block(block),
            area,
        );
        return;
    };

    let mut lines = vec![
        Line::styled(
            question.question.as_str(),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Line::from(""),
    ];
    lines.extend(
        question
            .code
            .lines()
            .map(|x| Line::styled(x, Style::default().fg(Color::Cyan))),
    );
    if !question.traceback.is_empty() {
        lines.push(Line::from(""));
        lines.extend(
            question
                .traceback
                .lines()
                .map(|x| Line::styled(x, Style::default().fg(Color::Red))),
        );
    }
    lines.push(Line::from(""));

    for (i, answer) in question.possible_answers.iter().enumerate() {
        let style = if view.selected_answer == Some(i) {
            Style::default().add_modifier(Modifier::REVERSED)
        } else {
            Style::default()
        };
        lines.push(Line::styled(format!("{}. {answer}", i + 1), style));
    }

    frame.render_widget(
        Paragraph::new(lines)
            .wrap(Wrap { trim: false })
            .block(block),
        area,
    );
}

fn render_scores(view: &ClientView, frame: &mut Frame, area: Rect) {
    let lines: Vec<Line> = view
        .scores
        .iter()
        .map(|(uname, score)| Line::from(format!("{uname}: {score}")))
        .collect();

    frame.render_widget(
        Paragraph::new(lines).block(Block::bordered().title("Scores")),
        area,
    );
}
