use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::quiz::QuestionKind;

/// A button press, as encoded in Telegram callback data.
///
/// Every answering action carries the index of the question it was rendered
/// for, so a press on an old keyboard can be told apart from a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Single { question: usize, option: usize },
    Toggle { question: usize, option: usize },
    Clear { question: usize },
    Submit { question: usize },
}

/// Actions the engine refuses. None of them change any state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("question {question} was already answered (current question is {current})")]
    Stale { question: usize, current: usize },
    #[error("question {question} is a {found} question, not {expected}")]
    TypeMismatch {
        question: usize,
        expected: QuestionKind,
        found: QuestionKind,
    },
    #[error("malformed action: {0}")]
    Malformed(String),
    #[error("no quiz in progress")]
    NoActiveQuiz,
    #[error("a quiz is already in progress")]
    QuizInProgress,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Start => write!(f, "start_quiz"),
            Action::Single { question, option } => write!(f, "s:{question}:{option}"),
            Action::Toggle { question, option } => write!(f, "m:{question}:{option}"),
            Action::Clear { question } => write!(f, "m_clear:{question}"),
            Action::Submit { question } => write!(f, "m_done:{question}"),
        }
    }
}

impl FromStr for Action {
    type Err = ActionError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        if data == "start_quiz" {
            return Ok(Action::Start);
        }
        let malformed = || ActionError::Malformed(data.to_string());
        let number = |part: Option<&str>| -> Result<usize, ActionError> {
            part.and_then(|p| p.parse().ok()).ok_or_else(|| malformed())
        };

        let mut parts = data.split(':');
        let action = match parts.next() {
            Some("s") => Action::Single {
                question: number(parts.next())?,
                option: number(parts.next())?,
            },
            Some("m") => Action::Toggle {
                question: number(parts.next())?,
                option: number(parts.next())?,
            },
            Some("m_clear") => Action::Clear {
                question: number(parts.next())?,
            },
            Some("m_done") => Action::Submit {
                question: number(parts.next())?,
            },
            _ => return Err(malformed()),
        };
        if parts.next().is_some() {
            return Err(malformed());
        }
        Ok(action)
    }
}
