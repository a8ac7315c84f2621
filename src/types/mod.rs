mod note;
pub use note::*;

/// Singleton bot configuration, stored as the one row of the
/// `configuration` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    /// Mention string rendered verbatim at the front of the daily reminder.
    pub role_id: Option<String>,
    /// Daily reminder time in `H:MM AM/PM` form.
    pub daily_time: String,
    /// IANA timezone name the daily time is interpreted in.
    pub timezone: String,
    /// Voice chat whose title mirrors the reminder time, if any.
    pub voice_channel_id: Option<String>,
}

/// Where the group reading stopped, stored as the one row of the
/// `progress` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub last_page: u32,
    pub last_hadith: u32,
}

/// Partial update of the configuration row. Only populated fields are
/// written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigurationUpdate {
    pub role_id: Option<String>,
    pub daily_time: Option<String>,
    pub timezone: Option<String>,
    pub voice_channel_id: Option<String>,
}

impl ConfigurationUpdate {
    pub fn is_empty(&self) -> bool {
        self.role_id.is_none()
            && self.daily_time.is_none()
            && self.timezone.is_none()
            && self.voice_channel_id.is_none()
    }

    /// True when the update changes when or how the daily reminder fires,
    /// so the scheduler must be re-armed.
    pub fn affects_schedule(&self) -> bool {
        self.daily_time.is_some() || self.timezone.is_some() || self.role_id.is_some()
    }
}

/// Partial update of the progress row. Only populated fields are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub last_page: Option<u32>,
    pub last_hadith: Option<u32>,
}

impl ProgressUpdate {
    pub fn is_empty(&self) -> bool {
        self.last_page.is_none() && self.last_hadith.is_none()
    }
}
