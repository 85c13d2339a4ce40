use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::quiz::{Answer, Question};

/// Why a question bank was refused. Any of these aborts startup.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to open question bank {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("question bank is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("question bank contains no questions")]
    Empty,
    #[error("question {question}: missing field `{field}`")]
    MissingField {
        question: usize,
        field: &'static str,
    },
    #[error("question {question}: unknown type `{found}` (expected `single` or `multi`)")]
    UnknownType { question: usize, found: String },
    #[error("question {question}: needs at least 2 options, found {count}")]
    TooFewOptions { question: usize, count: usize },
    #[error("question {question}: `answer_index` must be {expected} for a {kind} question")]
    AnswerShape {
        question: usize,
        kind: &'static str,
        expected: &'static str,
    },
    #[error("question {question}: multi question has no correct options")]
    EmptyAnswer { question: usize },
    #[error("question {question}: answer index {index} is out of range for {options} options")]
    AnswerOutOfRange {
        question: usize,
        index: usize,
        options: usize,
    },
    #[error("question {question}: answer index {index} is listed twice")]
    DuplicateAnswer { question: usize, index: usize },
}

// On-disk shape. Every field is optional so a missing one is reported by name
// instead of as a generic serde error.
#[derive(Debug, serde::Deserialize)]
struct RawQuestion {
    #[serde(rename = "type")]
    kind: Option<String>,
    question: Option<String>,
    options: Option<Vec<String>>,
    answer_index: Option<RawAnswer>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(untagged)]
enum RawAnswer {
    One(usize),
    Many(Vec<usize>),
}

/// The ordered, validated set of questions every session walks through.
#[derive(Debug, Clone)]
pub struct QuestionBank {
    questions: Vec<Question>,
}

impl QuestionBank {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| SchemaError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, SchemaError> {
        let raw: Vec<RawQuestion> = serde_json::from_reader(reader)?;
        Self::from_raw(raw)
    }

    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let raw: Vec<RawQuestion> = serde_json::from_str(json)?;
        Self::from_raw(raw)
    }

    /// Builds a bank from questions made in code, renumbering them by position.
    /// They go through the same checks as a loaded file.
    pub fn new(questions: Vec<Question>) -> Result<Self, SchemaError> {
        if questions.is_empty() {
            return Err(SchemaError::Empty);
        }
        let questions = questions
            .into_iter()
            .enumerate()
            .map(|(id, question)| check(Question { id, ..question }))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { questions })
    }

    fn from_raw(raw: Vec<RawQuestion>) -> Result<Self, SchemaError> {
        if raw.is_empty() {
            return Err(SchemaError::Empty);
        }
        let questions = raw
            .into_iter()
            .enumerate()
            .map(|(id, raw)| validate(id, raw))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { questions })
    }

    pub fn get(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    pub fn count(&self) -> usize {
        self.questions.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Question> {
        self.questions.iter()
    }
}

fn validate(id: usize, raw: RawQuestion) -> Result<Question, SchemaError> {
    let missing = |field: &'static str| SchemaError::MissingField {
        question: id,
        field,
    };
    let kind = raw.kind.ok_or_else(|| missing("type"))?;
    let prompt = raw.question.ok_or_else(|| missing("question"))?;
    let options = raw.options.ok_or_else(|| missing("options"))?;
    let answer = raw.answer_index.ok_or_else(|| missing("answer_index"))?;

    let normalized = kind.trim().to_lowercase();
    let answer = match (normalized.as_str(), answer) {
        ("single", RawAnswer::One(index)) => Answer::Single(index),
        ("single", RawAnswer::Many(_)) => {
            return Err(SchemaError::AnswerShape {
                question: id,
                kind: "single",
                expected: "one index",
            })
        }
        ("multi", RawAnswer::Many(indices)) => {
            let mut correct = BTreeSet::new();
            for index in indices {
                if !correct.insert(index) {
                    return Err(SchemaError::DuplicateAnswer { question: id, index });
                }
            }
            Answer::Multi(correct)
        }
        ("multi", RawAnswer::One(_)) => {
            return Err(SchemaError::AnswerShape {
                question: id,
                kind: "multi",
                expected: "a list of indices",
            })
        }
        _ => return Err(SchemaError::UnknownType { question: id, found: kind }),
    };

    check(Question {
        id,
        prompt,
        options,
        answer,
    })
}

// Structural rules every question obeys, however it was built.
fn check(question: Question) -> Result<Question, SchemaError> {
    let id = question.id;
    let count = question.options.len();
    if count < 2 {
        return Err(SchemaError::TooFewOptions { question: id, count });
    }
    let indices: Vec<usize> = match &question.answer {
        Answer::Single(index) => vec![*index],
        Answer::Multi(correct) if correct.is_empty() => {
            return Err(SchemaError::EmptyAnswer { question: id })
        }
        Answer::Multi(correct) => correct.iter().copied().collect(),
    };
    if let Some(&index) = indices.iter().find(|&&index| index >= count) {
        return Err(SchemaError::AnswerOutOfRange {
            question: id,
            index,
            options: count,
        });
    }
    Ok(question)
}
