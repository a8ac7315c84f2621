use teloxide::utils::command::BotCommands;

use crate::scheduler::DailyTime;
use crate::types::{ConfigurationUpdate, Note, ProgressUpdate};

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "Start the bot")]
    Start,
    #[command(description = "Show or update the bot configuration")]
    Configuration(String),
    #[command(description = "Show or update the reading progress")]
    Progress(String),
    #[command(description = "Manage notes for the daily reminder")]
    Notes(String),
    #[command(description = "Change the time of the next reminder only")]
    OverrideTime(String),
    #[command(description = "Send a test reminder to this chat")]
    Test(String),
    #[command(description = "Show help message")]
    Help,
}

/// What `/configuration <args>` asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationAction {
    Show,
    Update(ConfigurationUpdate),
}

impl ConfigurationAction {
    /// Parses the free-text arguments. `Err` carries the reply for the user;
    /// every value is validated here, before anything is written.
    pub fn parse(args: &str) -> Result<Self, String> {
        let (action, rest) = split_action(args);
        match action {
            "" | "show" => Ok(Self::Show),
            "update" => {
                let pairs = parse_key_values(rest);
                if pairs.is_empty() {
                    return Err(
                        "No options given. Use `update key=value`, for example `update time=6:00 PM`."
                            .to_string(),
                    );
                }
                let mut update = ConfigurationUpdate::default();
                for (key, value) in pairs {
                    if value.is_empty() {
                        return Err(format!("Missing value for option \"{key}\"."));
                    }
                    match key.as_str() {
                        "role" => update.role_id = Some(value),
                        "time" => {
                            if DailyTime::parse(&value).is_none() {
                                return Err(
                                    "Invalid time format. Please use H:MM AM/PM format, e.g., \"12:00 AM\"."
                                        .to_string(),
                                );
                            }
                            update.daily_time = Some(value);
                        }
                        "timezone" => {
                            if value.parse::<chrono_tz::Tz>().is_err() {
                                return Err(format!(
                                    "Unknown timezone \"{value}\". Use an IANA name such as Africa/Cairo."
                                ));
                            }
                            update.timezone = Some(value);
                        }
                        "voicechat" => update.voice_channel_id = Some(value),
                        other => {
                            return Err(format!(
                                "Unknown option \"{other}\". Valid options: role, time, timezone, voicechat."
                            ))
                        }
                    }
                }
                Ok(Self::Update(update))
            }
            other => Err(format!(
                "Unknown configuration action \"{other}\". Use `show` or `update key=value`."
            )),
        }
    }
}

/// What `/progress <args>` asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressAction {
    Show,
    Update(ProgressUpdate),
}

impl ProgressAction {
    pub fn parse(args: &str) -> Result<Self, String> {
        let (action, rest) = split_action(args);
        match action {
            "" | "show" => Ok(Self::Show),
            "update" => {
                let pairs = parse_key_values(rest);
                if pairs.is_empty() {
                    return Err(
                        "No options given. Use `update page=N hadith=M` with the last page and hadith read."
                            .to_string(),
                    );
                }
                let mut update = ProgressUpdate::default();
                for (key, value) in pairs {
                    match key.as_str() {
                        "page" => match value.parse::<u32>() {
                            Ok(page) if (1..=crate::composer::TOTAL_PAGES).contains(&page) => {
                                update.last_page = Some(page);
                            }
                            _ => return Err("Quran page must be between 1 and 604.".to_string()),
                        },
                        "hadith" => match value.parse::<u32>() {
                            Ok(hadith) if hadith >= 1 => update.last_hadith = Some(hadith),
                            _ => return Err("Hadith number must be a positive integer.".to_string()),
                        },
                        other => {
                            return Err(format!(
                                "Unknown option \"{other}\". Valid options: page, hadith."
                            ))
                        }
                    }
                }
                Ok(Self::Update(update))
            }
            other => Err(format!(
                "Unknown progress action \"{other}\". Use `show` or `update page=N hadith=M`."
            )),
        }
    }
}

/// What `/notes <args>` asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotesAction {
    Create(String),
    ShowMine,
    ShowAll,
    /// 1-based positions into the pending list.
    Delete(Vec<usize>),
    DeleteMine,
    DeleteAll,
    CarryOverLastNotes,
    ShowHistory,
}

impl NotesAction {
    pub fn parse(args: &str) -> Result<Self, String> {
        let (action, rest) = split_action(args);
        match action {
            "create" => {
                let text = rest.trim();
                if text.is_empty() {
                    return Err("Cannot create an empty note.".to_string());
                }
                Ok(Self::Create(text.to_string()))
            }
            "show-mine" => Ok(Self::ShowMine),
            "show-all" => Ok(Self::ShowAll),
            "delete" => Ok(Self::Delete(parse_positions(rest)?)),
            "delete-mine" => Ok(Self::DeleteMine),
            "delete-all" => Ok(Self::DeleteAll),
            "carry-over-last-notes" => Ok(Self::CarryOverLastNotes),
            "show-history" => Ok(Self::ShowHistory),
            "" => Err(
                "Missing notes action. Use create, show-mine, show-all, delete, delete-mine, delete-all, carry-over-last-notes or show-history."
                    .to_string(),
            ),
            other => Err(format!(
                "Unknown notes action \"{other}\". Use create, show-mine, show-all, delete, delete-mine, delete-all, carry-over-last-notes or show-history."
            )),
        }
    }
}

/// What `/test <args>` asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestAction {
    /// Compose the reminder without the role mention.
    PreviewReminder,
    /// Compose the reminder exactly as the schedule would send it.
    MentionEveryone,
}

impl TestAction {
    pub fn parse(args: &str) -> Result<Self, String> {
        let (action, _) = split_action(args);
        match action {
            "" | "preview-reminder" => Ok(Self::PreviewReminder),
            "mention-everyone" => Ok(Self::MentionEveryone),
            other => Err(format!(
                "Unknown test action \"{other}\". Use preview-reminder or mention-everyone."
            )),
        }
    }
}

/// Maps 1-based positions from a delete request to note ids, against the
/// pending notes in creation order. All or nothing: a single out-of-range
/// position rejects the whole request, returned as the invalid positions.
pub fn resolve_note_positions(notes: &[Note], positions: &[usize]) -> Result<Vec<i64>, Vec<usize>> {
    let invalid: Vec<usize> = positions
        .iter()
        .copied()
        .filter(|&position| position == 0 || position > notes.len())
        .collect();
    if !invalid.is_empty() {
        return Err(invalid);
    }
    Ok(positions.iter().map(|&position| notes[position - 1].id).collect())
}

fn split_action(args: &str) -> (&str, &str) {
    let args = args.trim();
    match args.split_once(char::is_whitespace) {
        Some((action, rest)) => (action, rest),
        None => (args, ""),
    }
}

fn parse_key_values(input: &str) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = Vec::new();
    for token in input.split_whitespace() {
        match token.split_once('=') {
            Some((key, value)) => pairs.push((key.to_ascii_lowercase(), value.to_string())),
            None => {
                // Values may contain spaces, like "6:00 PM". A bare word
                // extends the previous value.
                if let Some((_, value)) = pairs.last_mut() {
                    if !value.is_empty() {
                        value.push(' ');
                    }
                    value.push_str(token);
                }
            }
        }
    }
    pairs
}

fn parse_positions(args: &str) -> Result<Vec<usize>, String> {
    let args = args.trim();
    if args.is_empty() {
        return Err("Give the note positions to delete, e.g. `delete 1,3`.".to_string());
    }
    let mut positions = Vec::new();
    for part in args.split(',') {
        let part = part.trim();
        match part.parse::<usize>() {
            Ok(position) if position >= 1 => positions.push(position),
            _ => {
                return Err(format!(
                    "Invalid position \"{part}\". Positions are the numbers shown by `show-all`."
                ))
            }
        }
    }
    Ok(positions)
}
