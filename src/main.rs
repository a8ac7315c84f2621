use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

use crate::commands::Command;
use crate::handlers::{command_handler, WELCOME_MESSAGE};
use crate::scheduler::{ReminderScheduler, TelegramSink};
use crate::storage::Storage;

mod types;
mod commands;
mod composer;
mod handlers;
mod error;
mod scheduler;
mod storage;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    pretty_env_logger::init();
    log::info!("Starting maqraah bot...");

    // Bot::from_env reads TELOXIDE_TOKEN. Check it together with the other
    // required variables so a missing one fails before anything starts.
    required_env("TELOXIDE_TOKEN")?;
    let chat_id = required_env("CHAT_ID")?
        .parse::<i64>()
        .map(ChatId)
        .map_err(|_| "CHAT_ID must be a numeric Telegram chat id")?;
    let database_path = PathBuf::from(required_env("DATABASE_PATH")?);

    let storage = Arc::new(Storage::open(&database_path)?);
    log::info!("Database ready at {}", database_path.display());

    let bot = Bot::from_env();
    let sink = Arc::new(TelegramSink::new(bot.clone(), chat_id));
    let scheduler = Arc::new(ReminderScheduler::new(storage.clone(), sink));

    if let Err(e) = scheduler.schedule().await {
        log::error!("Failed to schedule the daily reminder: {e}");
    }

    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        log::warn!("Failed to register bot commands: {e}");
    }
    if let Err(e) = bot.send_message(chat_id, WELCOME_MESSAGE).await {
        log::warn!("Failed to send the welcome message: {e}");
    }

    let handler = dptree::entry().branch(
        Update::filter_message()
            .filter_command::<Command>()
            .endpoint(
                |bot: Bot,
                 msg: Message,
                 cmd: Command,
                 storage: Arc<Storage>,
                 scheduler: Arc<ReminderScheduler>| async move {
                    command_handler(bot, msg, cmd, storage, scheduler).await
                },
            ),
    );

    log::info!("Starting command dispatching...");
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![storage, scheduler])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

fn required_env(name: &str) -> Result<String, Box<dyn Error>> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => {
            log::error!("Required environment variable {name} is not set. Please check your .env file.");
            Err(format!("required environment variable {name} is not set").into())
        }
    }
}
