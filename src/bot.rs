use std::collections::BTreeSet;
use std::sync::Arc;

use log::{info, warn};
use teloxide::{
    dispatching::UpdateHandler,
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, MessageId},
    utils::command::BotCommands,
};

use crate::quiz::action::{Action, ActionError};
use crate::quiz::engine::{OutboundEvent, QuizEngine};
use crate::quiz::results::StoreError;
use crate::quiz::{QuestionKind, UserKey};

pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Shared by every handler through `dptree::deps!`.
pub struct BotState {
    pub engine: QuizEngine,
    pub leaders_top_n: usize,
    pub admin: Option<UserId>,
}

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Команды викторины:")]
pub enum Command {
    #[command(description = "начать заново")]
    Start,
    #[command(description = "показать рейтинг")]
    Leaders,
    #[command(description = "сбросить результаты турнира (только для админа)")]
    Reset,
    #[command(description = "показать эту справку")]
    Help,
}

const GREETING_TEXT: &str =
    "🎂 Привет! Это викторина про дедушку Серёжу 🎉\nКто знает его лучше всех? 🏆";
const START_BUTTON: &str = "▶️ Начать викторину";
const ASK_NAME_TEXT: &str = "Как тебя зовут, герой? 😊";
const SAVE_FAILED_TEXT: &str = "😔 Не получилось сохранить результат. Нажми кнопку ещё раз.";

pub fn schema() -> UpdateHandler<Box<dyn std::error::Error + Send + Sync + 'static>> {
    let messages = Update::filter_message()
        .branch(
            teloxide::filter_command::<Command, _>().endpoint(command),
        )
        .branch(dptree::endpoint(name_entry));

    dptree::entry()
        .branch(messages)
        .branch(Update::filter_callback_query().endpoint(callback))
}

async fn command(bot: Bot, msg: Message, cmd: Command, state: Arc<BotState>) -> HandlerResult {
    match cmd {
        Command::Start => {
            if let Some(user) = msg.from() {
                state.engine.reset_session(UserKey(user.id.0));
            }
            bot.send_message(msg.chat.id, GREETING_TEXT)
                .reply_markup(InlineKeyboardMarkup::new([[
                    InlineKeyboardButton::callback(START_BUTTON, Action::Start.to_string()),
                ]]))
                .await?;
        }
        Command::Leaders => {
            let top_n = state.leaders_top_n;
            let text = match on_engine(&state, move |engine| engine.leaderboard(top_n)).await? {
                Ok(text) => text,
                Err(err) => {
                    warn!("Failed to read results: {err}");
                    "😔 Рейтинг временно недоступен".to_string()
                }
            };
            bot.send_message(msg.chat.id, text).await?;
        }
        Command::Reset => {
            let is_admin = match (msg.from(), state.admin) {
                (Some(user), Some(admin)) => user.id == admin,
                _ => false,
            };
            if !is_admin {
                bot.send_message(msg.chat.id, "⛔ Только организатор может сбросить рейтинг")
                    .await?;
                return Ok(());
            }
            let text = match on_engine(&state, QuizEngine::reset_tournament).await? {
                Ok(()) => "🧹 Рейтинг очищен, начинаем новый турнир!".to_string(),
                Err(err) => {
                    warn!("Failed to reset results: {err}");
                    "😔 Не получилось очистить рейтинг".to_string()
                }
            };
            bot.send_message(msg.chat.id, text).await?;
        }
        Command::Help => {
            bot.send_message(msg.chat.id, Command::descriptions().to_string())
                .await?;
        }
    }
    Ok(())
}

async fn name_entry(bot: Bot, msg: Message, state: Arc<BotState>) -> HandlerResult {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        bot.send_message(msg.chat.id, "Напиши, пожалуйста, имя текстом ✍️")
            .await?;
        return Ok(());
    };

    if text.starts_with('/') {
        bot.send_message(msg.chat.id, Command::descriptions().to_string())
            .await?;
        return Ok(());
    }

    let (user, text) = (UserKey(user.id.0), text.to_string());
    match on_engine(&state, move |engine| engine.handle_name_entry(user, &text)).await? {
        Ok(event) => deliver(&bot, msg.chat.id, None, event).await,
        Err(err) => report_store_failure(&bot, msg.chat.id, err).await,
    }
}

async fn callback(bot: Bot, q: CallbackQuery, state: Arc<BotState>) -> HandlerResult {
    let user = UserKey(q.from.id.0);
    let outcome = match q.data.as_deref().unwrap_or_default().parse::<Action>() {
        Ok(action) => on_engine(&state, move |engine| engine.dispatch(user, action)).await?,
        Err(reason) => Ok(OutboundEvent::Rejected { reason }),
    };

    // Rejections only need a toast; everything else answers the query silently.
    if let Ok(OutboundEvent::Rejected { reason }) = &outcome {
        bot.answer_callback_query(q.id.clone())
            .text(rejection_text(reason))
            .await?;
        return Ok(());
    }
    bot.answer_callback_query(q.id.clone()).await?;

    let Some(message) = q.message.as_ref() else {
        return Ok(());
    };
    match outcome {
        Ok(event) => deliver(&bot, message.chat.id, Some(message.id), event).await,
        Err(err) => report_store_failure(&bot, message.chat.id, err).await,
    }
}

/// Runs engine work on the blocking pool: a step may lock a user slot and
/// rewrite the results file.
pub async fn on_engine<T, F>(state: &Arc<BotState>, f: F) -> Result<T, tokio::task::JoinError>
where
    F: FnOnce(&QuizEngine) -> T + Send + 'static,
    T: Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || f(&state.engine)).await
}

/// Sends an event and any follow-ups it carries.
///
/// A question refresh that comes straight from a button press edits the
/// message holding that keyboard instead of sending a new one.
async fn deliver(
    bot: &Bot,
    chat: ChatId,
    mut origin: Option<MessageId>,
    event: OutboundEvent,
) -> HandlerResult {
    let mut pending = Some(event);
    while let Some(event) = pending.take() {
        match event {
            OutboundEvent::AskName => {
                bot.send_message(chat, ASK_NAME_TEXT).await?;
            }
            OutboundEvent::ShowQuestion {
                index,
                prompt,
                options,
                kind,
                selection,
            } => {
                let keyboard = question_keyboard(index, &options, kind, &selection);
                match origin {
                    Some(message_id) => {
                        // Telegram refuses edits that change nothing; that is harmless here.
                        if let Err(err) = bot
                            .edit_message_text(chat, message_id, prompt)
                            .reply_markup(keyboard)
                            .await
                        {
                            warn!("Failed to refresh question {index}: {err}");
                        }
                    }
                    None => {
                        bot.send_message(chat, prompt).reply_markup(keyboard).await?;
                    }
                }
            }
            OutboundEvent::ShowFeedback { text, next } => {
                bot.send_message(chat, text).await?;
                pending = Some(*next);
            }
            OutboundEvent::ShowCompletion {
                score,
                total,
                leaderboard,
            } => {
                bot.send_message(
                    chat,
                    format!("✅ Викторина окончена!\nТы набрал {score}/{total}.\n\n{leaderboard}"),
                )
                .await?;
            }
            OutboundEvent::Rejected { reason } => {
                bot.send_message(chat, rejection_text(&reason)).await?;
            }
        }
        origin = None;
    }
    Ok(())
}

async fn report_store_failure(bot: &Bot, chat: ChatId, err: StoreError) -> HandlerResult {
    warn!("Result store failure in chat {}: {err}", chat.0);
    bot.send_message(chat, SAVE_FAILED_TEXT).await?;
    Ok(())
}

pub fn question_keyboard(
    question: usize,
    options: &[String],
    kind: QuestionKind,
    selection: &BTreeSet<usize>,
) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = options
        .iter()
        .enumerate()
        .map(|(option, text)| {
            let (label, action) = match kind {
                QuestionKind::Single => (text.clone(), Action::Single { question, option }),
                QuestionKind::Multi => {
                    let mark = if selection.contains(&option) { "✅ " } else { "" };
                    (format!("{mark}{text}"), Action::Toggle { question, option })
                }
            };
            vec![InlineKeyboardButton::callback(label, action.to_string())]
        })
        .collect();

    if kind == QuestionKind::Multi {
        rows.push(vec![
            InlineKeyboardButton::callback("🧹 Сбросить", Action::Clear { question }.to_string()),
            InlineKeyboardButton::callback("➡️ Готово", Action::Submit { question }.to_string()),
        ]);
    }
    InlineKeyboardMarkup::new(rows)
}

pub fn rejection_text(reason: &ActionError) -> &'static str {
    match reason {
        ActionError::Stale { .. } => "Ты уже ответил на этот вопрос 😉",
        ActionError::TypeMismatch { .. } => "Эта кнопка не подходит к текущему вопросу 🤔",
        ActionError::Malformed(_) => "Что-то пошло не так, попробуй ещё раз 🙈",
        ActionError::NoActiveQuiz => "Викторина не запущена. Нажми /start, чтобы начать 🎉",
        ActionError::QuizInProgress => "Сначала закончи викторину — выбирай ответы кнопками 👆",
    }
}

pub fn log_startup(state: &BotState) {
    info!(
        "Quiz ready: {} questions, {} points possible, top {} on the leaderboard",
        state.engine.bank().count(),
        state.engine.total_possible(),
        state.leaders_top_n
    );
}
