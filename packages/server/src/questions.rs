//! Question bank loading and per-game selection.

use std::path::Path;

use rand::seq::SliceRandom as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use trivia_ws::models::QuestionPayload;

const BUILTIN_QUESTIONS: &str = include_str!("../questions.json");

/// A question together with the index of its correct answer.
///
/// Only [`Question::payload`] is ever sent to players.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    #[serde(flatten)]
    pub payload: QuestionPayload,
    pub correct_answer: usize,
}

impl Question {
    #[must_use]
    pub const fn is_correct(&self, answer: usize) -> bool {
        self.correct_answer == answer
    }
}

#[derive(Debug, Error)]
pub enum LoadQuestionsError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    #[error("Question bank contains no questions")]
    Empty,
    #[error("Question {index} has correct_answer {correct_answer}, expected 0 to 3")]
    InvalidAnswer {
        index: usize,
        correct_answer: usize,
    },
}

/// All the questions a game can draw from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionBank {
    questions: Vec<Question>,
}

impl QuestionBank {
    /// # Errors
    ///
    /// * If the bank is empty
    /// * If a question's correct answer is not one of its four answers
    pub fn new(questions: Vec<Question>) -> Result<Self, LoadQuestionsError> {
        if questions.is_empty() {
            return Err(LoadQuestionsError::Empty);
        }

        if let Some((index, question)) = questions
            .iter()
            .enumerate()
            .find(|(_, x)| x.correct_answer >= x.payload.possible_answers.len())
        {
            return Err(LoadQuestionsError::InvalidAnswer {
                index,
                correct_answer: question.correct_answer,
            });
        }

        Ok(Self { questions })
    }

    /// Parses a bank from `{"questions": [...]}` JSON.
    ///
    /// # Errors
    ///
    /// * If the JSON is malformed
    /// * If the bank fails validation
    pub fn from_json(json: &str) -> Result<Self, LoadQuestionsError> {
        let bank: Self = serde_json::from_str(json)?;
        Self::new(bank.questions)
    }

    /// # Errors
    ///
    /// * If the file cannot be read
    /// * If the bank fails to parse or validate
    pub fn load(path: &Path) -> Result<Self, LoadQuestionsError> {
        log::debug!("Loading questions from {}", path.display());
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// The bank compiled into the server.
    ///
    /// # Errors
    ///
    /// * If the built-in bank fails to parse or validate
    pub fn builtin() -> Result<Self, LoadQuestionsError> {
        Self::from_json(BUILTIN_QUESTIONS)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// Picks `count` distinct questions in random order, or the whole bank
    /// shuffled if it holds fewer than `count`.
    #[must_use]
    pub fn pick(&self, count: usize) -> Vec<Question> {
        let mut questions = self.questions.clone();
        questions.shuffle(&mut rand::rng());
        questions.truncate(count);
        questions
    }
}
