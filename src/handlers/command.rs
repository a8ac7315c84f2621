use std::error::Error;
use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::command::BotCommands;

use crate::commands::{
    resolve_note_positions, Command, ConfigurationAction, NotesAction, ProgressAction, TestAction,
};
use crate::composer;
use crate::scheduler::{DailyTime, ReminderScheduler};
use crate::storage::Storage;
use crate::types::{Configuration, Note, Progress};

type HandlerResult = Result<(), Box<dyn Error + Send + Sync>>;

pub const WELCOME_MESSAGE: &str = "\
Assalamu alaikum! I keep track of the group's maqraah.

📖 Use /progress update to record the last Qur'an page and hadith read.
📝 Use /notes create to leave a note for the next daily reminder.
⏰ Use /configuration update to set the reminder time, timezone and role.
❓ Use /help for the full list of commands.";

pub async fn command_handler(
    bot: Bot,
    msg: Message,
    cmd: Command,
    storage: Arc<Storage>,
    scheduler: Arc<ReminderScheduler>,
) -> HandlerResult {
    let name = command_name(&cmd);
    if let Err(e) = execute(&bot, &msg, cmd, &storage, &scheduler).await {
        log::error!("Error executing command /{name}: {e}");
        bot.send_message(msg.chat.id, "There was an error executing this command!")
            .await?;
    }
    Ok(())
}

async fn execute(
    bot: &Bot,
    msg: &Message,
    cmd: Command,
    storage: &Arc<Storage>,
    scheduler: &Arc<ReminderScheduler>,
) -> HandlerResult {
    match cmd {
        Command::Start => {
            bot.send_message(msg.chat.id, WELCOME_MESSAGE).await?;
        }
        Command::Help => {
            bot.send_message(msg.chat.id, Command::descriptions().to_string())
                .await?;
        }
        Command::Configuration(args) => {
            handle_configuration(bot, msg, &args, storage, scheduler).await?;
        }
        Command::Progress(args) => {
            handle_progress(bot, msg, &args, storage).await?;
        }
        Command::Notes(args) => {
            handle_notes(bot, msg, &args, storage).await?;
        }
        Command::OverrideTime(args) => {
            handle_override_time(bot, msg, &args, scheduler).await?;
        }
        Command::Test(args) => {
            handle_test(bot, msg, &args, storage).await?;
        }
    }
    Ok(())
}

fn command_name(cmd: &Command) -> &'static str {
    match cmd {
        Command::Start => "start",
        Command::Help => "help",
        Command::Configuration(_) => "configuration",
        Command::Progress(_) => "progress",
        Command::Notes(_) => "notes",
        Command::OverrideTime(_) => "overridetime",
        Command::Test(_) => "test",
    }
}

async fn handle_configuration(
    bot: &Bot,
    msg: &Message,
    args: &str,
    storage: &Arc<Storage>,
    scheduler: &Arc<ReminderScheduler>,
) -> HandlerResult {
    let action = match ConfigurationAction::parse(args) {
        Ok(action) => action,
        Err(rejection) => {
            bot.send_message(msg.chat.id, rejection).await?;
            return Ok(());
        }
    };

    match action {
        ConfigurationAction::Show => {
            let configuration = storage.configuration.get().await?;
            let state = if scheduler.has_pending_override().await {
                "override pending"
            } else if scheduler.is_scheduled().await {
                "armed"
            } else {
                "not armed (check the time and timezone)"
            };
            let reply = format!("{}\nDaily reminder: {state}", format_configuration(&configuration));
            bot.send_message(msg.chat.id, reply).await?;
        }
        ConfigurationAction::Update(update) => {
            let mut replies = Vec::new();
            if let Some(role) = &update.role_id {
                replies.push(format!("Role set to {role}."));
            }
            if let Some(voice_chat) = &update.voice_channel_id {
                replies.push(format!("Voice chat set to {voice_chat}."));
            }
            if let Some(time) = &update.daily_time {
                replies.push(format!("Maqraah reminder has been changed to {time}."));
            }
            if let Some(timezone) = &update.timezone {
                replies.push(format!("Timezone set to {timezone}."));
            }

            storage.configuration.update(&update).await?;
            if update.affects_schedule() {
                scheduler.schedule().await?;
            }
            if let Some(time) = &update.daily_time {
                let refreshed = storage.configuration.get().await?;
                rename_voice_chat(bot, &refreshed, time).await;
            }

            bot.send_message(msg.chat.id, replies.join("\n")).await?;
        }
    }
    Ok(())
}

async fn handle_progress(
    bot: &Bot,
    msg: &Message,
    args: &str,
    storage: &Arc<Storage>,
) -> HandlerResult {
    let action = match ProgressAction::parse(args) {
        Ok(action) => action,
        Err(rejection) => {
            bot.send_message(msg.chat.id, rejection).await?;
            return Ok(());
        }
    };

    match action {
        ProgressAction::Show => {
            let progress = storage.progress.get().await?;
            bot.send_message(msg.chat.id, format_progress(&progress))
                .await?;
        }
        ProgressAction::Update(update) => {
            let mut replies = Vec::new();
            if let Some(page) = update.last_page {
                replies.push(format!("Last Quran page set to {page}."));
            }
            if let Some(hadith) = update.last_hadith {
                replies.push(format!("Last hadith set to {hadith}."));
            }
            storage.progress.update(&update).await?;
            bot.send_message(msg.chat.id, replies.join("\n")).await?;
        }
    }
    Ok(())
}

async fn handle_notes(
    bot: &Bot,
    msg: &Message,
    args: &str,
    storage: &Arc<Storage>,
) -> HandlerResult {
    let action = match NotesAction::parse(args) {
        Ok(action) => action,
        Err(rejection) => {
            bot.send_message(msg.chat.id, rejection).await?;
            return Ok(());
        }
    };
    let Some(user) = msg.from() else {
        bot.send_message(msg.chat.id, "I can't tell who sent this command.")
            .await?;
        return Ok(());
    };
    let user_id = user.id.to_string();

    match action {
        NotesAction::Create(text) => {
            storage.notes.add(&user_id, &text).await?;
            bot.send_message(
                msg.chat.id,
                "Note added! It will be included in the next reminder.",
            )
            .await?;
        }
        NotesAction::ShowMine => {
            let notes = storage.notes.pending_for_user(&user_id).await?;
            if notes.is_empty() {
                bot.send_message(msg.chat.id, "You have no pending notes.")
                    .await?;
            } else {
                let list = notes
                    .iter()
                    .map(|note| format!("- {} (added {})", note.note, note.date_added.format("%Y-%m-%d")))
                    .collect::<Vec<_>>()
                    .join("\n");
                bot.send_message(msg.chat.id, format!("Your pending notes:\n{list}"))
                    .await?;
            }
        }
        NotesAction::ShowAll => {
            let notes = storage.notes.pending().await?;
            if notes.is_empty() {
                bot.send_message(msg.chat.id, "There are no pending notes.")
                    .await?;
            } else {
                let list = notes
                    .iter()
                    .enumerate()
                    .map(|(i, note)| {
                        format!(
                            "{}. {} (user {}, added {})",
                            i + 1,
                            note.note,
                            note.user_id,
                            note.date_added.format("%Y-%m-%d")
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                bot.send_message(msg.chat.id, format!("Pending notes:\n{list}"))
                    .await?;
            }
        }
        NotesAction::Delete(positions) => {
            let notes = storage.notes.pending().await?;
            match resolve_note_positions(&notes, &positions) {
                Ok(ids) => {
                    let removed = storage.notes.delete(&ids).await?;
                    bot.send_message(msg.chat.id, format!("Removed {removed} note(s)."))
                        .await?;
                }
                Err(invalid) => {
                    let invalid = invalid
                        .iter()
                        .map(usize::to_string)
                        .collect::<Vec<_>>()
                        .join(", ");
                    bot.send_message(
                        msg.chat.id,
                        format!(
                            "Invalid note position(s): {invalid}. There are {} pending note(s). Nothing was removed.",
                            notes.len()
                        ),
                    )
                    .await?;
                }
            }
        }
        NotesAction::DeleteMine => {
            let removed = storage.notes.delete_for_user(&user_id).await?;
            let reply = if removed == 0 {
                "You have no notes to remove.".to_string()
            } else {
                format!("Removed {removed} of your note(s).")
            };
            bot.send_message(msg.chat.id, reply).await?;
        }
        NotesAction::DeleteAll => {
            let removed = storage.notes.delete_all().await?;
            let reply = if removed == 0 {
                "There are no notes to remove.".to_string()
            } else {
                format!("Removed {removed} note(s) from all users.")
            };
            bot.send_message(msg.chat.id, reply).await?;
        }
        NotesAction::CarryOverLastNotes => {
            let restored = storage.notes.carry_over_last_included().await?;
            let reply = if restored == 0 {
                "There are no included notes to carry over.".to_string()
            } else {
                format!("Carried {restored} note(s) back to pending. They will be included in the next reminder.")
            };
            bot.send_message(msg.chat.id, reply).await?;
        }
        NotesAction::ShowHistory => {
            let notes = storage.notes.included().await?;
            if notes.is_empty() {
                bot.send_message(msg.chat.id, "No notes have been included in a reminder yet.")
                    .await?;
            } else {
                let list = notes
                    .iter()
                    .map(|note| format!("- {} (user {}, included {})", note.note, note.user_id, format_inclusion(note)))
                    .collect::<Vec<_>>()
                    .join("\n");
                bot.send_message(msg.chat.id, format!("Included notes:\n{list}"))
                    .await?;
            }
        }
    }
    Ok(())
}

async fn handle_override_time(
    bot: &Bot,
    msg: &Message,
    args: &str,
    scheduler: &Arc<ReminderScheduler>,
) -> HandlerResult {
    let time = args.trim();
    if DailyTime::parse(time).is_none() {
        bot.send_message(
            msg.chat.id,
            "Invalid time format. Please use H:MM AM/PM format, e.g., \"12:00 AM\".",
        )
        .await?;
        return Ok(());
    }
    scheduler.override_next(time).await?;
    // A stored timezone that no longer parses leaves nothing armed; do not
    // claim otherwise.
    let reply = if scheduler.has_pending_override().await {
        format!("Next maqraah reminder changed to {time}.")
    } else {
        "Could not schedule the override. Check the timezone with /configuration show.".to_string()
    };
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

/// Composes the reminder from live data and sends it to the invoking chat.
/// Nothing is marked as included, this is a dry run.
async fn handle_test(
    bot: &Bot,
    msg: &Message,
    args: &str,
    storage: &Arc<Storage>,
) -> HandlerResult {
    let action = match TestAction::parse(args) {
        Ok(action) => action,
        Err(rejection) => {
            bot.send_message(msg.chat.id, rejection).await?;
            return Ok(());
        }
    };
    let mention_role = matches!(action, TestAction::MentionEveryone);

    let configuration = storage.configuration.get().await?;
    let progress = storage.progress.get().await?;
    let notes = storage.notes.pending().await?;
    let reminder = composer::compose_reminder(&configuration, &progress, &notes, mention_role);

    bot.send_message(msg.chat.id, reminder.main)
        .parse_mode(ParseMode::Markdown)
        .await?;
    for chunk in reminder.notes_chunks {
        bot.send_message(msg.chat.id, chunk).await?;
    }
    bot.send_message(msg.chat.id, "Test reminder sent!").await?;
    Ok(())
}

fn format_configuration(configuration: &Configuration) -> String {
    format!(
        "Current configuration:\nReminder time: {}\nTimezone: {}\nRole: {}\nVoice chat: {}",
        configuration.daily_time,
        configuration.timezone,
        configuration.role_id.as_deref().unwrap_or("not set"),
        configuration.voice_channel_id.as_deref().unwrap_or("not set"),
    )
}

fn format_progress(progress: &Progress) -> String {
    format!(
        "Reading progress:\nLast Quran page: {}\nLast hadith: {}",
        progress.last_page, progress.last_hadith
    )
}

fn format_inclusion(note: &Note) -> String {
    note.last_included_date
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Mirrors the reminder time into the configured voice chat's title, so the
/// chat list shows when the maqraah meets. Best effort, failures only log.
async fn rename_voice_chat(bot: &Bot, configuration: &Configuration, time: &str) {
    let Some(voice_chat) = &configuration.voice_channel_id else {
        return;
    };
    let chat_id = match voice_chat.parse::<i64>() {
        Ok(id) => ChatId(id),
        Err(_) => {
            log::warn!("Voice chat id {voice_chat:?} is not numeric, title not updated");
            return;
        }
    };
    let title = format!("مقراة الساعة {}", strip_meridiem(time));
    if let Err(e) = bot.set_chat_title(chat_id, title).await {
        log::error!("Failed to update the voice chat title: {e}");
    }
}

fn strip_meridiem(time: &str) -> &str {
    time.trim_end_matches(|c: char| c.is_ascii_alphabetic() || c == ' ')
}
