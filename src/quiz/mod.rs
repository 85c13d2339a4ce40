pub mod action;
pub mod bank;
pub mod clock;
pub mod engine;
pub mod leaderboard;
pub mod results;
pub mod scoring;
pub mod session;

use std::collections::BTreeSet;
use std::fmt;

/// Whether a question takes exactly one pick or a set of picks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionKind {
    Single,
    Multi,
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionKind::Single => write!(f, "single"),
            QuestionKind::Multi => write!(f, "multi"),
        }
    }
}

/// The correct answer of a question. The variant doubles as the question kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    Single(usize),
    Multi(BTreeSet<usize>),
}

impl Answer {
    pub fn kind(&self) -> QuestionKind {
        match self {
            Answer::Single(_) => QuestionKind::Single,
            Answer::Multi(_) => QuestionKind::Multi,
        }
    }

    /// Points a perfect answer to this question is worth.
    pub fn points(&self) -> u32 {
        match self {
            Answer::Single(_) => 1,
            Answer::Multi(correct) => correct.len() as u32,
        }
    }
}

/// A validated question. Only [`bank::QuestionBank`] builds these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub id: usize,
    pub prompt: String,
    pub options: Vec<String>,
    pub answer: Answer,
}

impl Question {
    pub fn kind(&self) -> QuestionKind {
        self.answer.kind()
    }

    pub fn option(&self, index: usize) -> Option<&str> {
        self.options.get(index).map(String::as_str)
    }
}

/// Identity of a quiz participant, as handed over by the chat transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserKey(pub u64);

impl fmt::Display for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user#{}", self.0)
    }
}
