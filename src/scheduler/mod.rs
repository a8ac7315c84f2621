mod time;
pub use time::DailyTime;

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::composer;
use crate::error::StorageError;
use crate::storage::Storage;

/// Where fired reminders go. The Telegram sink is the production
/// implementation; tests substitute a recording one.
#[async_trait::async_trait]
pub trait ReminderSink: Send + Sync {
    /// Sends the announcement. The page number is a Markdown link.
    async fn send_main(&self, text: &str) -> Result<(), Box<dyn Error + Send + Sync>>;
    /// Sends one notes chunk as plain text.
    async fn send_notes_chunk(&self, text: &str) -> Result<(), Box<dyn Error + Send + Sync>>;
}

pub struct TelegramSink {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramSink {
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        Self { bot, chat_id }
    }
}

#[async_trait::async_trait]
impl ReminderSink for TelegramSink {
    async fn send_main(&self, text: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.bot
            .send_message(self.chat_id, text)
            .parse_mode(ParseMode::Markdown)
            .await?;
        Ok(())
    }

    async fn send_notes_chunk(&self, text: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.bot.send_message(self.chat_id, text).await?;
        Ok(())
    }
}

/// Owns the reminder triggers. At most one recurring daily trigger and at
/// most one one-shot override exist at a time; installing a replacement
/// always stops the previous one first.
pub struct ReminderScheduler {
    storage: Arc<Storage>,
    sink: Arc<dyn ReminderSink>,
    recurring: Mutex<Option<JoinHandle<()>>>,
    override_job: Mutex<Option<JoinHandle<()>>>,
}

impl ReminderScheduler {
    pub fn new(storage: Arc<Storage>, sink: Arc<dyn ReminderSink>) -> Self {
        Self {
            storage,
            sink,
            recurring: Mutex::new(None),
            override_job: Mutex::new(None),
        }
    }

    /// Installs the recurring daily trigger from the stored configuration,
    /// replacing any previous one. A daily time or timezone that does not
    /// parse leaves the scheduler idle; only a log line records it.
    pub async fn schedule(self: &Arc<Self>) -> Result<(), StorageError> {
        let configuration = self.storage.configuration.get().await?;

        let mut recurring = self.recurring.lock().await;
        if let Some(job) = recurring.take() {
            job.abort();
        }

        let Some(daily_time) = DailyTime::parse(&configuration.daily_time) else {
            log::warn!(
                "Invalid daily time {:?}, daily reminder not scheduled",
                configuration.daily_time
            );
            return Ok(());
        };
        let tz: Tz = match configuration.timezone.parse() {
            Ok(tz) => tz,
            Err(_) => {
                log::warn!(
                    "Unknown timezone {:?}, daily reminder not scheduled",
                    configuration.timezone
                );
                return Ok(());
            }
        };

        log::info!(
            "Daily reminder scheduled at {} ({})",
            configuration.daily_time,
            tz
        );
        let scheduler = self.clone();
        *recurring = Some(tokio::spawn(async move {
            scheduler.run_recurring(daily_time, tz).await;
        }));
        Ok(())
    }

    /// Replaces only the next firing: stops the recurring trigger, arms a
    /// one-shot at the next occurrence of `new_time`, and restores the
    /// regular cadence after it fires. An unparseable time leaves no trigger
    /// armed at all.
    pub async fn override_next(self: &Arc<Self>, new_time: &str) -> Result<(), StorageError> {
        let mut recurring = self.recurring.lock().await;
        if let Some(job) = recurring.take() {
            job.abort();
        }
        drop(recurring);

        let configuration = self.storage.configuration.get().await?;
        let Some(daily_time) = DailyTime::parse(new_time) else {
            log::warn!("Invalid override time {new_time:?}, no reminder armed");
            return Ok(());
        };
        let tz: Tz = match configuration.timezone.parse() {
            Ok(tz) => tz,
            Err(_) => {
                log::warn!(
                    "Unknown timezone {:?}, no reminder armed",
                    configuration.timezone
                );
                return Ok(());
            }
        };
        let Some(next) = daily_time.schedule().upcoming(tz).next() else {
            log::warn!("No upcoming occurrence of {new_time:?}, no reminder armed");
            return Ok(());
        };

        let mut override_job = self.override_job.lock().await;
        if let Some(job) = override_job.take() {
            job.abort();
        }
        log::info!("Next reminder overridden to fire at {next}");
        let scheduler = self.clone();
        *override_job = Some(tokio::spawn(async move {
            scheduler.run_override(next.with_timezone(&Utc)).await;
        }));
        Ok(())
    }

    /// True when the recurring daily trigger is armed.
    pub async fn is_scheduled(&self) -> bool {
        self.recurring.lock().await.is_some()
    }

    /// True when a one-shot override is waiting to fire.
    pub async fn has_pending_override(&self) -> bool {
        self.override_job.lock().await.is_some()
    }

    async fn run_recurring(self: Arc<Self>, daily_time: DailyTime, tz: Tz) {
        let schedule = daily_time.schedule();
        loop {
            let Some(next) = schedule.upcoming(tz).next() else {
                log::warn!("No upcoming occurrence of the daily time, trigger stopped");
                return;
            };
            sleep_until(next.with_timezone(&Utc)).await;
            // Detached, so replacing the trigger never cancels a firing that
            // has already begun.
            let scheduler = self.clone();
            tokio::spawn(async move { scheduler.fire().await });
        }
    }

    async fn run_override(self: Arc<Self>, at: DateTime<Utc>) {
        sleep_until(at).await;
        // Drop our own handle first: a replacement override installed from
        // here on must not cancel a firing that has begun.
        self.override_job.lock().await.take();
        self.clone().fire().await;
        if let Err(e) = self.schedule().await {
            log::error!("Failed to restore the daily schedule after an override: {e}");
        }
    }

    /// One firing: read everything fresh, compose, send, then mark the
    /// included notes. Each send failure is logged and never stops the
    /// remaining sends.
    async fn fire(self: Arc<Self>) {
        let loaded = async {
            let configuration = self.storage.configuration.get().await?;
            let progress = self.storage.progress.get().await?;
            let notes = self.storage.notes.pending().await?;
            Ok::<_, StorageError>((configuration, progress, notes))
        }
        .await;
        let (configuration, progress, notes) = match loaded {
            Ok(loaded) => loaded,
            Err(e) => {
                log::error!("Failed to load reminder state, skipping this firing: {e}");
                return;
            }
        };

        let reminder = composer::compose_reminder(&configuration, &progress, &notes, true);
        if let Err(e) = self.sink.send_main(&reminder.main).await {
            log::error!("Failed to send the reminder: {e}");
        }
        for chunk in &reminder.notes_chunks {
            if let Err(e) = self.sink.send_notes_chunk(chunk).await {
                log::error!("Failed to send a notes chunk: {e}");
            }
        }

        if !notes.is_empty() {
            let ids: Vec<i64> = notes.iter().map(|note| note.id).collect();
            match self.storage.notes.mark_included(&ids, Utc::now()).await {
                Ok(marked) => log::info!("Included {marked} note(s) in the reminder"),
                Err(e) => log::error!("Failed to mark notes as included: {e}"),
            }
        }
    }
}

async fn sleep_until(at: DateTime<Utc>) {
    let wait = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
    tokio::time::sleep(wait).await;
}
