use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};

use crate::quiz::action::{Action, ActionError};
use crate::quiz::bank::QuestionBank;
use crate::quiz::clock::Clock;
use crate::quiz::leaderboard;
use crate::quiz::results::{ResultRecord, ResultStore, StoreError};
use crate::quiz::scoring::total_possible;
use crate::quiz::session::{Next, Progress, Session};
use crate::quiz::{QuestionKind, UserKey};

const LEADERBOARD_UNAVAILABLE: &str = "Рейтинг временно недоступен 😔";

/// Everything the chat transport needs to show after one user action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    AskName,
    ShowQuestion {
        index: usize,
        prompt: String,
        options: Vec<String>,
        kind: QuestionKind,
        selection: BTreeSet<usize>,
    },
    /// Feedback on the action, followed by whatever comes next.
    ShowFeedback {
        text: String,
        next: Box<OutboundEvent>,
    },
    ShowCompletion {
        score: u32,
        total: u32,
        leaderboard: String,
    },
    Rejected {
        reason: ActionError,
    },
}

type Slot = Arc<Mutex<Option<Session>>>;

/// Routes user actions to per-user sessions and records finished attempts.
///
/// Each user with a live attempt owns one slot; the whole step for that user,
/// including the result append on completion, runs with the slot locked.
/// Different users only contend on the slot lookup and on the result store.
/// A slot leaves the map when its attempt completes or is reset, and only
/// `begin` puts one in.
pub struct QuizEngine {
    bank: QuestionBank,
    total: u32,
    store: Arc<dyn ResultStore>,
    sessions: Mutex<HashMap<UserKey, Slot>>,
    top_n: usize,
    clock: Clock,
}

impl QuizEngine {
    pub fn new(bank: QuestionBank, store: Arc<dyn ResultStore>, top_n: usize) -> Self {
        let total = total_possible(&bank);
        Self {
            bank,
            total,
            store,
            sessions: Mutex::new(HashMap::new()),
            top_n,
            clock: Clock::default(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn bank(&self) -> &QuestionBank {
        &self.bank
    }

    pub fn total_possible(&self) -> u32 {
        self.total
    }

    /// Starts a fresh attempt, dropping any unfinished one.
    pub fn begin(&self, user: UserKey) -> OutboundEvent {
        debug!("{user}: begin");
        let slot = Arc::new(Mutex::new(Some(Session::new(user))));
        self.sessions().insert(user, slot);
        OutboundEvent::AskName
    }

    /// Forgets the user's unfinished attempt, if any.
    pub fn reset_session(&self, user: UserKey) {
        debug!("{user}: session reset");
        self.sessions().remove(&user);
    }

    pub fn session(&self, user: UserKey) -> Option<Session> {
        let slot = self.slot(user)?;
        let session = lock(&slot).clone();
        session
    }

    pub fn handle_name_entry(&self, user: UserKey, text: &str) -> Result<OutboundEvent, StoreError> {
        debug!("{user}: name entry");
        self.step(user, |session, _| session.enter_name(text))
    }

    pub fn handle_single_choice(
        &self,
        user: UserKey,
        question: usize,
        option: usize,
    ) -> Result<OutboundEvent, StoreError> {
        debug!("{user}: single answer {option} for question {question}");
        self.step(user, |session, bank| {
            session.answer_single(bank, question, option)
        })
    }

    pub fn handle_multi_toggle(
        &self,
        user: UserKey,
        question: usize,
        option: usize,
    ) -> Result<OutboundEvent, StoreError> {
        debug!("{user}: toggle {option} on question {question}");
        self.step(user, |session, bank| {
            session.toggle(bank, question, option)
        })
    }

    pub fn handle_multi_clear(
        &self,
        user: UserKey,
        question: usize,
    ) -> Result<OutboundEvent, StoreError> {
        debug!("{user}: clear question {question}");
        self.step(user, |session, bank| session.clear(bank, question))
    }

    pub fn handle_multi_submit(
        &self,
        user: UserKey,
        question: usize,
    ) -> Result<OutboundEvent, StoreError> {
        debug!("{user}: submit question {question}");
        self.step(user, |session, bank| session.submit(bank, question))
    }

    pub fn dispatch(&self, user: UserKey, action: Action) -> Result<OutboundEvent, StoreError> {
        match action {
            Action::Start => Ok(self.begin(user)),
            Action::Single { question, option } => {
                self.handle_single_choice(user, question, option)
            }
            Action::Toggle { question, option } => {
                self.handle_multi_toggle(user, question, option)
            }
            Action::Clear { question } => self.handle_multi_clear(user, question),
            Action::Submit { question } => self.handle_multi_submit(user, question),
        }
    }

    /// Rendered ranking of the best result per name.
    pub fn leaderboard(&self, top_n: usize) -> Result<String, StoreError> {
        let records = self.store.list_all()?;
        Ok(leaderboard::build(&records, top_n).to_string())
    }

    pub fn reset_tournament(&self) -> Result<(), StoreError> {
        self.store.reset()?;
        info!("Tournament reset, all results cleared");
        Ok(())
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<UserKey, Slot>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self, user: UserKey) -> Option<Slot> {
        self.sessions().get(&user).map(Arc::clone)
    }

    // A slot that went empty never holds a session again, so it is safe to drop
    // as long as `begin` has not already replaced it.
    fn release(&self, user: UserKey, slot: &Slot) {
        let mut sessions = self.sessions();
        if sessions.get(&user).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            sessions.remove(&user);
        }
    }

    // Runs one transition on a copy of the user's session and only commits it
    // once everything it implies (including the result append) succeeded.
    fn step<F>(&self, user: UserKey, f: F) -> Result<OutboundEvent, StoreError>
    where
        F: FnOnce(&mut Session, &QuestionBank) -> Result<Progress, ActionError>,
    {
        let Some(slot) = self.slot(user) else {
            return Ok(reject(user, ActionError::NoActiveQuiz));
        };
        let mut guard = lock(&slot);

        let Some(mut session) = guard.as_ref().cloned() else {
            return Ok(reject(user, ActionError::NoActiveQuiz));
        };
        let progress = match f(&mut session, &self.bank) {
            Ok(progress) => progress,
            Err(reason) => return Ok(reject(user, reason)),
        };
        let event = self.render(&session, progress)?;

        if session.is_completed() {
            *guard = None;
            drop(guard);
            self.release(user, &slot);
        } else {
            *guard = Some(session);
        }
        Ok(event)
    }

    fn render(&self, session: &Session, progress: Progress) -> Result<OutboundEvent, StoreError> {
        match progress {
            Progress::Started => Ok(OutboundEvent::ShowFeedback {
                text: format!("Отлично, {}! Поехали 🚀", session.display_name()),
                next: Box::new(self.show_question(session, 0)),
            }),
            Progress::Question(index) => Ok(self.show_question(session, index)),
            Progress::Answered { feedback, next } => {
                let next = match next {
                    Next::Question(index) => self.show_question(session, index),
                    Next::Completed => self.complete(session)?,
                };
                Ok(OutboundEvent::ShowFeedback {
                    text: feedback.to_string(),
                    next: Box::new(next),
                })
            }
        }
    }

    fn show_question(&self, session: &Session, index: usize) -> OutboundEvent {
        match self.bank.get(index) {
            Some(question) => OutboundEvent::ShowQuestion {
                index,
                prompt: question.prompt.clone(),
                options: question.options.clone(),
                kind: question.kind(),
                selection: session.selection().clone(),
            },
            None => OutboundEvent::Rejected {
                reason: ActionError::NoActiveQuiz,
            },
        }
    }

    fn complete(&self, session: &Session) -> Result<OutboundEvent, StoreError> {
        let record = ResultRecord {
            name: session.display_name().to_string(),
            score: session.score(),
            total: self.total,
            completed_at: Some(self.clock.now()),
        };
        if let Err(err) = self.store.append(record) {
            warn!("{}: failed to save result: {err}", session.user());
            return Err(err);
        }
        info!(
            "{} finished as {:?} with {}/{}",
            session.user(),
            session.display_name(),
            session.score(),
            self.total
        );

        // The attempt is already recorded; a failing read must not undo it.
        let leaderboard = self.leaderboard(self.top_n).unwrap_or_else(|err| {
            warn!("Failed to build leaderboard: {err}");
            LEADERBOARD_UNAVAILABLE.to_string()
        });
        Ok(OutboundEvent::ShowCompletion {
            score: session.score(),
            total: self.total,
            leaderboard,
        })
    }
}

fn lock(slot: &Slot) -> MutexGuard<'_, Option<Session>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

fn reject(user: UserKey, reason: ActionError) -> OutboundEvent {
    warn!("{user}: rejected action: {reason}");
    OutboundEvent::Rejected { reason }
}
