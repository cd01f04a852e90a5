//! Rounds, answers and scores of a single game.
//!
//! [`Game`] holds no connections and no timers; the game server drives it
//! and decides when rounds open and close.

use std::collections::BTreeMap;

use thiserror::Error;
use trivia_ws::models::{GameOverPayload, Scores, TIE_WINNER};

use crate::questions::Question;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnswerError {
    #[error("No round is open")]
    NoOpenRound,
    #[error("Answer received from {0}, but {0:?} is not present in scores")]
    UnknownPlayer(String),
    #[error("{0} already answered this round")]
    AlreadyAnswered(String),
    #[error("Answer {0} is not one of the possible answers")]
    OutOfRange(usize),
}

/// Awards one point per correct answer to `question` and zero otherwise.
///
/// # Errors
///
/// * If an answer comes from a player missing from `scores`; no score is
///   changed in that case
pub fn update_scores(
    scores: &mut Scores,
    answers: &BTreeMap<String, usize>,
    question: &Question,
) -> Result<(), AnswerError> {
    if let Some(uname) = answers.keys().find(|x| !scores.contains_key(*x)) {
        return Err(AnswerError::UnknownPlayer(uname.clone()));
    }

    for (uname, answer) in answers {
        if question.is_correct(*answer)
            && let Some(score) = scores.get_mut(uname)
        {
            *score += 1;
        }
    }

    Ok(())
}

/// The single top scorer, [`TIE_WINNER`] when the top score is shared, or
/// `None` without players.
#[must_use]
pub fn winner(scores: &Scores) -> Option<String> {
    let top = scores.values().max()?;
    let mut leaders = scores.iter().filter(|(_, score)| *score == top);

    let (first, _) = leaders.next()?;

    if leaders.next().is_some() {
        Some(TIE_WINNER.to_string())
    } else {
        Some(first.clone())
    }
}

#[derive(Debug)]
pub struct Game {
    questions: Vec<Question>,
    /// Index of the next question to ask.
    next_question: usize,
    current: Option<usize>,
    scores: Scores,
    answers: BTreeMap<String, usize>,
}

impl Game {
    #[must_use]
    pub fn new(questions: Vec<Question>, players: impl IntoIterator<Item = String>) -> Self {
        Self {
            questions,
            next_question: 0,
            current: None,
            scores: players.into_iter().map(|x| (x, 0)).collect(),
            answers: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn scores(&self) -> &Scores {
        &self.scores
    }

    #[must_use]
    pub fn has_players(&self) -> bool {
        !self.scores.is_empty()
    }

    /// Zero-based number of the open round, if any.
    #[must_use]
    pub const fn round(&self) -> Option<usize> {
        self.current
    }

    #[must_use]
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.current.and_then(|x| self.questions.get(x))
    }

    /// Opens the next round, returning its question, or `None` when every
    /// question has been asked.
    ///
    /// An open round must be finished first; calling this while one is open
    /// returns its question again.
    pub fn start_round(&mut self) -> Option<&Question> {
        if self.current.is_none() {
            if self.next_question >= self.questions.len() {
                return None;
            }
            self.current = Some(self.next_question);
            self.next_question += 1;
            self.answers.clear();
        }

        self.current_question()
    }

    /// # Errors
    ///
    /// * If no round is open
    /// * If `uname` is not playing
    /// * If `uname` already answered this round
    /// * If `answer` is not an index into the possible answers
    pub fn record_answer(&mut self, uname: &str, answer: usize) -> Result<(), AnswerError> {
        let question = self.current_question().ok_or(AnswerError::NoOpenRound)?;

        if answer >= question.payload.possible_answers.len() {
            return Err(AnswerError::OutOfRange(answer));
        }
        if !self.scores.contains_key(uname) {
            return Err(AnswerError::UnknownPlayer(uname.to_string()));
        }
        if self.answers.contains_key(uname) {
            return Err(AnswerError::AlreadyAnswered(uname.to_string()));
        }

        self.answers.insert(uname.to_string(), answer);

        Ok(())
    }

    /// Whether every remaining player answered the open round.
    #[must_use]
    pub fn all_answered(&self) -> bool {
        self.current.is_some() && self.scores.keys().all(|x| self.answers.contains_key(x))
    }

    /// Scores the open round and closes it. Does nothing without an open round.
    pub fn finish_round(&mut self) {
        let Some(question) = self.current.and_then(|x| self.questions.get(x)) else {
            return;
        };

        if let Err(e) = update_scores(&mut self.scores, &self.answers, question) {
            log::error!("Failed to update scores: {e}");
        }

        self.answers.clear();
        self.current = None;
    }

    /// Drops a player who left, along with any answer they gave.
    pub fn remove_player(&mut self, uname: &str) {
        self.scores.remove(uname);
        self.answers.remove(uname);
    }

    #[must_use]
    pub fn game_over(&self) -> Option<GameOverPayload> {
        Some(GameOverPayload {
            scores: self.scores.clone(),
            winner: winner(&self.scores)?,
        })
    }
}
