use std::collections::BTreeSet;
use std::fmt;

use crate::quiz::action::ActionError;
use crate::quiz::bank::QuestionBank;
use crate::quiz::scoring::{score_multi, score_single};
use crate::quiz::{Question, QuestionKind, UserKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingName,
    Active { index: usize },
    Completed,
}

/// One user's attempt at the quiz.
///
/// The question index only moves forward, and the pending selection is
/// emptied every time it does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    user: UserKey,
    display_name: String,
    score: u32,
    selection: BTreeSet<usize>,
    phase: Phase,
}

/// What the transport should show after a successful step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// The name was accepted; the first question comes next.
    Started,
    /// (Re)render the question at this index with the current selection.
    Question(usize),
    /// The current question was answered.
    Answered { feedback: Feedback, next: Next },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    Question(usize),
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feedback {
    Single {
        chosen: String,
        correct: String,
        is_correct: bool,
    },
    Multi {
        chosen: Vec<String>,
        correct: Vec<String>,
        delta: u32,
    },
}

impl Session {
    pub fn new(user: UserKey) -> Self {
        Self {
            user,
            display_name: String::new(),
            score: 0,
            selection: BTreeSet::new(),
            phase: Phase::AwaitingName,
        }
    }

    pub fn user(&self) -> UserKey {
        self.user
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn selection(&self) -> &BTreeSet<usize> {
        &self.selection
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_completed(&self) -> bool {
        self.phase == Phase::Completed
    }

    pub fn enter_name(&mut self, text: &str) -> Result<Progress, ActionError> {
        match self.phase {
            Phase::AwaitingName => {}
            Phase::Active { .. } => return Err(ActionError::QuizInProgress),
            Phase::Completed => return Err(ActionError::NoActiveQuiz),
        }
        let name = text.trim();
        if name.is_empty() {
            return Err(ActionError::Malformed("empty name".to_string()));
        }
        self.display_name = name.to_string();
        self.score = 0;
        self.selection.clear();
        self.phase = Phase::Active { index: 0 };
        Ok(Progress::Started)
    }

    pub fn answer_single(
        &mut self,
        bank: &QuestionBank,
        question: usize,
        option: usize,
    ) -> Result<Progress, ActionError> {
        let current = self.current_question(bank, question, QuestionKind::Single)?;
        let chosen = option_text(current, option)?;
        let outcome = score_single(current, option)?;
        self.score += outcome.delta;

        let feedback = Feedback::Single {
            chosen: chosen.to_string(),
            correct: current.option(outcome.correct).unwrap_or_default().to_string(),
            is_correct: outcome.is_correct,
        };
        Ok(Progress::Answered {
            feedback,
            next: self.advance(bank),
        })
    }

    /// Flips `option` in the pending selection. Toggling twice is a no-op.
    pub fn toggle(
        &mut self,
        bank: &QuestionBank,
        question: usize,
        option: usize,
    ) -> Result<Progress, ActionError> {
        let current = self.current_question(bank, question, QuestionKind::Multi)?;
        option_text(current, option)?;
        if !self.selection.remove(&option) {
            self.selection.insert(option);
        }
        Ok(Progress::Question(current.id))
    }

    pub fn clear(&mut self, bank: &QuestionBank, question: usize) -> Result<Progress, ActionError> {
        let current = self.current_question(bank, question, QuestionKind::Multi)?;
        self.selection.clear();
        Ok(Progress::Question(current.id))
    }

    pub fn submit(&mut self, bank: &QuestionBank, question: usize) -> Result<Progress, ActionError> {
        let current = self.current_question(bank, question, QuestionKind::Multi)?;
        let outcome = score_multi(current, &self.selection)?;
        self.score += outcome.delta;

        let feedback = Feedback::Multi {
            chosen: texts(current, &self.selection),
            correct: texts(current, &outcome.correct),
            delta: outcome.delta,
        };
        Ok(Progress::Answered {
            feedback,
            next: self.advance(bank),
        })
    }

    // Resolves the question an action refers to, refusing anything that is
    // not the current question or not of the expected kind.
    fn current_question<'b>(
        &self,
        bank: &'b QuestionBank,
        question: usize,
        expected: QuestionKind,
    ) -> Result<&'b Question, ActionError> {
        let index = match self.phase {
            Phase::Active { index } => index,
            Phase::AwaitingName | Phase::Completed => return Err(ActionError::NoActiveQuiz),
        };
        if question != index {
            return Err(ActionError::Stale {
                question,
                current: index,
            });
        }
        let current = bank.get(index).ok_or(ActionError::NoActiveQuiz)?;
        if current.kind() != expected {
            return Err(ActionError::TypeMismatch {
                question,
                expected,
                found: current.kind(),
            });
        }
        Ok(current)
    }

    fn advance(&mut self, bank: &QuestionBank) -> Next {
        self.selection.clear();
        let next = match self.phase {
            Phase::Active { index } => index + 1,
            Phase::AwaitingName | Phase::Completed => return Next::Completed,
        };
        if next >= bank.count() {
            self.phase = Phase::Completed;
            Next::Completed
        } else {
            self.phase = Phase::Active { index: next };
            Next::Question(next)
        }
    }
}

fn option_text(question: &Question, option: usize) -> Result<&str, ActionError> {
    question.option(option).ok_or_else(|| {
        ActionError::Malformed(format!(
            "option {option} does not exist on question {}",
            question.id
        ))
    })
}

fn texts(question: &Question, indices: &BTreeSet<usize>) -> Vec<String> {
    indices
        .iter()
        .filter_map(|i| question.option(*i))
        .map(str::to_string)
        .collect()
}

impl fmt::Display for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feedback::Single {
                chosen,
                is_correct: true,
                ..
            } => write!(f, "Твой ответ: {chosen} — верно! ✅"),
            Feedback::Single {
                chosen, correct, ..
            } => write!(
                f,
                "Твой ответ: {chosen} — неверно ❌\nПравильный ответ: {correct}"
            ),
            Feedback::Multi {
                chosen,
                correct,
                delta,
            } => {
                let chosen = if chosen.is_empty() {
                    "ничего".to_string()
                } else {
                    chosen.join(", ")
                };
                write!(
                    f,
                    "Ты выбрал: {chosen}\nПравильные ответы: {}\nОчков за вопрос: +{delta}",
                    correct.join(", ")
                )
            }
        }
    }
}
