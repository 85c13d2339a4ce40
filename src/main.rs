use std::sync::Arc;

use dotenv::dotenv;
use grandpa_quiz_bot::{
    bot::{self, BotState},
    config::Config,
    quiz::{bank::QuestionBank, engine::QuizEngine, results::JsonFileStore},
};
use teloxide::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // The .env file is optional; plain environment variables work as well.
    dotenv().ok();

    pretty_env_logger::init();
    log::info!("Starting quiz bot...");

    let config = Config::from_env()?;

    log::info!("Loading questions from {}", config.questions_file.display());
    let bank = QuestionBank::open(&config.questions_file)?;

    log::info!("Keeping results in {}", config.results_file.display());
    let store = Arc::new(JsonFileStore::new(&config.results_file));

    let state = Arc::new(BotState {
        engine: QuizEngine::new(bank, store, config.leaders_top_n),
        leaders_top_n: config.leaders_top_n,
        admin: config.admin_user_id.map(UserId),
    });
    bot::log_startup(&state);

    let bot = Bot::new(config.token);

    Dispatcher::builder(bot, bot::schema())
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
    Ok(())
}
