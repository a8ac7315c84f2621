use chrono::{DateTime, Utc};

/// Lifecycle of a note. A note starts out pending, becomes included once a
/// fired reminder has carried it, and a carry-over moves the most recently
/// included batch back to pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteStatus {
    Pending,
    Included,
}

impl NoteStatus {
    /// Anything that is not explicitly `included` counts as pending, so rows
    /// written before the status column existed keep working.
    pub fn parse(value: &str) -> Self {
        match value {
            "included" => NoteStatus::Included,
            _ => NoteStatus::Pending,
        }
    }
}

/// A member note collected for the daily reminder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub id: i64,
    pub user_id: String,
    pub note: String,
    pub date_added: DateTime<Utc>,
    pub status: NoteStatus,
    /// Set when the note transitions to included, cleared on carry-over.
    pub last_included_date: Option<DateTime<Utc>>,
}
