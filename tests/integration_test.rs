#[cfg(test)]
mod tests {
    use maqraah_bot::*;
    use std::error::Error;
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;
    use tempfile::TempDir;
    use tokio::sync::Mutex;

    // Helper to open a storage backed by a throwaway database file.
    fn temp_storage() -> (Arc<Storage>, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open(&dir.path().join("maqraah.db")).unwrap();
        (Arc::new(storage), dir)
    }

    fn note(id: i64, text: &str) -> Note {
        Note {
            id,
            user_id: "1".to_string(),
            note: text.to_string(),
            date_added: Utc::now(),
            status: NoteStatus::Pending,
            last_included_date: None,
        }
    }

    // Sink that records what a firing would have sent.
    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl ReminderSink for RecordingSink {
        async fn send_main(&self, text: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
            self.sent.lock().await.push(format!("main: {text}"));
            Ok(())
        }

        async fn send_notes_chunk(&self, text: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
            self.sent.lock().await.push(format!("notes: {text}"));
            Ok(())
        }
    }

    // Sink that records every attempt but fails the first few sends.
    struct FlakySink {
        sent: Mutex<Vec<String>>,
        failures_left: Mutex<usize>,
    }

    impl FlakySink {
        fn failing_first(n: usize) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                failures_left: Mutex::new(n),
            }
        }

        async fn attempt(&self, entry: String) -> Result<(), Box<dyn Error + Send + Sync>> {
            self.sent.lock().await.push(entry);
            let mut left = self.failures_left.lock().await;
            if *left > 0 {
                *left -= 1;
                return Err("telegram is down".into());
            }
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl ReminderSink for FlakySink {
        async fn send_main(&self, text: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
            self.attempt(format!("main: {text}")).await
        }

        async fn send_notes_chunk(&self, text: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
            self.attempt(format!("notes: {text}")).await
        }
    }

    // Page arithmetic

    #[test]
    fn next_page_wraps_after_the_last_page() {
        assert_eq!(next_page(0), 1);
        assert_eq!(next_page(10), 11);
        assert_eq!(next_page(603), 604);
        assert_eq!(next_page(604), 1);
        assert_eq!(next_page(700), 1);
    }

    // Reminder composition

    #[test]
    fn main_message_mentions_role_and_links_the_next_page() {
        let configuration = Configuration {
            role_id: Some("@quran-readers".to_string()),
            daily_time: "6:00 AM".to_string(),
            timezone: "Africa/Cairo".to_string(),
            voice_channel_id: None,
        };
        let progress = Progress {
            last_page: 604,
            last_hadith: 10,
        };

        let main = compose_main(&configuration, &progress, true);
        assert!(main.starts_with("@quran-readers 📢\n"));
        assert!(main.contains("Page: [1](https://quran.com/page/1)"));
        assert!(main.ends_with("Hadith: 11"));

        // A test preview leaves the role out even when one is configured.
        let preview = compose_main(&configuration, &progress, false);
        assert!(preview.starts_with("📢"));
        assert!(!preview.contains("@quran-readers"));

        // No configured role mentions nobody.
        let no_role = Configuration {
            role_id: None,
            ..configuration
        };
        assert!(compose_main(&no_role, &progress, true).starts_with("📢"));
    }

    #[test]
    fn no_pending_notes_means_no_notes_messages() {
        let configuration = Configuration {
            role_id: None,
            daily_time: "12:00 PM".to_string(),
            timezone: "Africa/Cairo".to_string(),
            voice_channel_id: None,
        };
        let progress = Progress {
            last_page: 3,
            last_hadith: 0,
        };
        let reminder = compose_reminder(&configuration, &progress, &[], true);
        assert!(reminder.main.contains("Page: [4]"));
        assert!(reminder.notes_chunks.is_empty());
    }

    #[test]
    fn notes_chunks_respect_the_length_limit() {
        let notes: Vec<Note> = (0..40).map(|i| note(i + 1, &"م".repeat(50))).collect();
        let chunks = compose_notes(&notes, 200);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 200, "chunk too long: {chunk}");
        }
        assert!(chunks[0].starts_with("Notes:"));
        assert!(!chunks[1].starts_with("Notes:"));

        // Every note appears once, numbered in creation order.
        let all = chunks.join("\n");
        for i in 1..=40 {
            assert!(all.contains(&format!("{i}. ")), "note {i} is missing");
        }
    }

    #[test]
    fn an_oversized_note_is_split_with_its_number_repeated() {
        let notes = vec![note(1, "short"), note(2, &"x".repeat(450))];
        let chunks = compose_notes(&notes, 200);

        for chunk in &chunks {
            assert!(chunk.chars().count() <= 200);
        }
        let pieces: Vec<&String> = chunks.iter().filter(|c| c.starts_with("2. ")).collect();
        assert_eq!(pieces.len(), 3);
        let stitched: String = pieces.iter().map(|c| &c[3..]).collect();
        assert_eq!(stitched, "x".repeat(450));
    }

    // Storage

    #[tokio::test]
    async fn configuration_defaults_and_partial_updates() {
        let (storage, _dir) = temp_storage();

        let configuration = storage.configuration.get().await.unwrap();
        assert_eq!(configuration.daily_time, "12:00 PM");
        assert_eq!(configuration.timezone, "Africa/Cairo");
        assert_eq!(configuration.role_id, None);
        assert_eq!(configuration.voice_channel_id, None);

        storage
            .configuration
            .update(&ConfigurationUpdate {
                daily_time: Some("6:00 AM".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        let configuration = storage.configuration.get().await.unwrap();
        assert_eq!(configuration.daily_time, "6:00 AM");
        assert_eq!(configuration.timezone, "Africa/Cairo");

        storage
            .configuration
            .update(&ConfigurationUpdate {
                role_id: Some("@readers".to_string()),
                timezone: Some("Europe/Berlin".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        let configuration = storage.configuration.get().await.unwrap();
        assert_eq!(configuration.role_id.as_deref(), Some("@readers"));
        assert_eq!(configuration.daily_time, "6:00 AM");
        assert_eq!(configuration.timezone, "Europe/Berlin");
    }

    #[tokio::test]
    async fn progress_defaults_and_partial_updates() {
        let (storage, _dir) = temp_storage();

        let progress = storage.progress.get().await.unwrap();
        assert_eq!(progress.last_page, 0);
        assert_eq!(progress.last_hadith, 0);

        storage
            .progress
            .update(&ProgressUpdate {
                last_page: Some(302),
                last_hadith: None,
            })
            .await
            .unwrap();
        let progress = storage.progress.get().await.unwrap();
        assert_eq!(progress.last_page, 302);
        assert_eq!(progress.last_hadith, 0);

        storage
            .progress
            .update(&ProgressUpdate {
                last_page: Some(604),
                last_hadith: Some(10),
            })
            .await
            .unwrap();
        let progress = storage.progress.get().await.unwrap();
        assert_eq!(progress.last_page, 604);
        assert_eq!(progress.last_hadith, 10);
    }

    #[tokio::test]
    async fn notes_move_between_pending_and_included() {
        let (storage, _dir) = temp_storage();
        storage.notes.add("1", "first").await.unwrap();
        storage.notes.add("2", "second").await.unwrap();
        storage.notes.add("1", "third").await.unwrap();

        let pending = storage.notes.pending().await.unwrap();
        assert_eq!(
            pending.iter().map(|n| n.note.as_str()).collect::<Vec<_>>(),
            ["first", "second", "third"]
        );
        assert_eq!(storage.notes.pending_for_user("1").await.unwrap().len(), 2);

        // A firing includes the whole pending batch.
        let ids: Vec<i64> = pending.iter().map(|n| n.id).collect();
        let marked = storage.notes.mark_included(&ids, Utc::now()).await.unwrap();
        assert_eq!(marked, 3);
        assert!(storage.notes.pending().await.unwrap().is_empty());
        assert_eq!(storage.notes.included().await.unwrap().len(), 3);

        // A later firing includes only what was added since.
        storage.notes.add("2", "fourth").await.unwrap();
        let newer = storage.notes.pending().await.unwrap();
        assert_eq!(newer.len(), 1);
        let later = Utc::now() + chrono::Duration::seconds(10);
        storage.notes.mark_included(&[newer[0].id], later).await.unwrap();

        // Carry-over restores only the most recent batch, same ids.
        let restored = storage.notes.carry_over_last_included().await.unwrap();
        assert_eq!(restored, 1);
        let pending = storage.notes.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].note, "fourth");
        assert_eq!(pending[0].id, newer[0].id);
        assert_eq!(pending[0].last_included_date, None);
        assert_eq!(storage.notes.included().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn deleting_by_position_is_all_or_nothing() {
        let (storage, _dir) = temp_storage();
        storage.notes.add("1", "first").await.unwrap();
        storage.notes.add("2", "second").await.unwrap();
        storage.notes.add("3", "third").await.unwrap();

        let pending = storage.notes.pending().await.unwrap();

        // One bad position rejects the whole request.
        assert_eq!(resolve_note_positions(&pending, &[2, 5]), Err(vec![5]));
        assert_eq!(resolve_note_positions(&pending, &[0]), Err(vec![0]));
        assert_eq!(storage.notes.pending().await.unwrap().len(), 3);

        let ids = resolve_note_positions(&pending, &[1, 3]).unwrap();
        assert_eq!(storage.notes.delete(&ids).await.unwrap(), 2);
        let left = storage.notes.pending().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].note, "second");
    }

    #[tokio::test]
    async fn bulk_deletes_cover_all_statuses() {
        let (storage, _dir) = temp_storage();
        storage.notes.add("1", "mine").await.unwrap();
        storage.notes.add("1", "mine too").await.unwrap();
        storage.notes.add("2", "theirs").await.unwrap();

        let pending = storage.notes.pending().await.unwrap();
        storage
            .notes
            .mark_included(&[pending[0].id], Utc::now())
            .await
            .unwrap();

        // delete-mine removes included notes too, not just pending ones.
        assert_eq!(storage.notes.delete_for_user("1").await.unwrap(), 2);
        assert_eq!(storage.notes.delete_all().await.unwrap(), 1);
        assert!(storage.notes.pending().await.unwrap().is_empty());
        assert!(storage.notes.included().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn databases_without_the_status_column_are_upgraded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.db");
        {
            let conn = rusqlite::Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE notes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    userId TEXT NOT NULL,
                    note TEXT NOT NULL,
                    dateAdded TEXT NOT NULL
                );
                INSERT INTO notes (userId, note, dateAdded)
                VALUES ('7', 'old note', '2024-01-01T00:00:00+00:00');",
            )
            .unwrap();
        }

        let storage = Storage::open(&path).unwrap();
        let pending = storage.notes.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].note, "old note");
        assert_eq!(pending[0].status, NoteStatus::Pending);
        assert_eq!(pending[0].last_included_date, None);
    }

    // Command argument parsing

    #[test]
    fn configuration_arguments_are_validated_before_writing() {
        assert_eq!(ConfigurationAction::parse(""), Ok(ConfigurationAction::Show));
        assert_eq!(ConfigurationAction::parse("show"), Ok(ConfigurationAction::Show));

        let parsed = ConfigurationAction::parse("update time=6:00 PM timezone=Africa/Cairo role=@readers");
        assert_eq!(
            parsed,
            Ok(ConfigurationAction::Update(ConfigurationUpdate {
                role_id: Some("@readers".to_string()),
                daily_time: Some("6:00 PM".to_string()),
                timezone: Some("Africa/Cairo".to_string()),
                voice_channel_id: None,
            }))
        );

        let rejected = ConfigurationAction::parse("update time=25:00").unwrap_err();
        assert!(rejected.contains("Invalid time format"));
        let rejected = ConfigurationAction::parse("update timezone=Mars/Olympus").unwrap_err();
        assert!(rejected.contains("Unknown timezone"));
        assert!(ConfigurationAction::parse("update page=3").is_err());
        assert!(ConfigurationAction::parse("frobnicate").is_err());
    }

    #[test]
    fn progress_arguments_are_range_checked() {
        assert_eq!(ProgressAction::parse("show"), Ok(ProgressAction::Show));
        assert_eq!(
            ProgressAction::parse("update page=604 hadith=11"),
            Ok(ProgressAction::Update(ProgressUpdate {
                last_page: Some(604),
                last_hadith: Some(11),
            }))
        );

        let rejected = ProgressAction::parse("update page=605").unwrap_err();
        assert_eq!(rejected, "Quran page must be between 1 and 604.");
        assert!(ProgressAction::parse("update page=0").is_err());
        assert!(ProgressAction::parse("update page=abc").is_err());
        assert!(ProgressAction::parse("update hadith=0").is_err());
        assert!(ProgressAction::parse("update").is_err());
    }

    #[test]
    fn notes_arguments_map_to_actions() {
        assert_eq!(
            NotesAction::parse("create read surah al-kahf before friday"),
            Ok(NotesAction::Create("read surah al-kahf before friday".to_string()))
        );
        assert_eq!(NotesAction::parse("show-mine"), Ok(NotesAction::ShowMine));
        assert_eq!(NotesAction::parse("show-all"), Ok(NotesAction::ShowAll));
        assert_eq!(NotesAction::parse("delete 1, 3"), Ok(NotesAction::Delete(vec![1, 3])));
        assert_eq!(NotesAction::parse("delete-mine"), Ok(NotesAction::DeleteMine));
        assert_eq!(NotesAction::parse("delete-all"), Ok(NotesAction::DeleteAll));
        assert_eq!(
            NotesAction::parse("carry-over-last-notes"),
            Ok(NotesAction::CarryOverLastNotes)
        );
        assert_eq!(NotesAction::parse("show-history"), Ok(NotesAction::ShowHistory));

        assert!(NotesAction::parse("create").is_err());
        assert!(NotesAction::parse("delete").is_err());
        assert!(NotesAction::parse("delete x").is_err());
        assert!(NotesAction::parse("delete 0").is_err());
        assert!(NotesAction::parse("").is_err());
        assert!(NotesAction::parse("shred-everything").is_err());
    }

    #[test]
    fn test_arguments_default_to_a_preview() {
        assert_eq!(TestAction::parse(""), Ok(TestAction::PreviewReminder));
        assert_eq!(TestAction::parse("preview-reminder"), Ok(TestAction::PreviewReminder));
        assert_eq!(TestAction::parse("mention-everyone"), Ok(TestAction::MentionEveryone));
        assert!(TestAction::parse("blast").is_err());
    }

    // Scheduler

    #[tokio::test]
    async fn scheduling_requires_a_valid_time_and_timezone() {
        let (storage, _dir) = temp_storage();
        let sink = Arc::new(RecordingSink::default());
        let scheduler = Arc::new(ReminderScheduler::new(storage.clone(), sink));

        // The seeded defaults are valid.
        scheduler.schedule().await.unwrap();
        assert!(scheduler.is_scheduled().await);

        // The repository accepts whatever is given; validation happens at
        // the command boundary. The scheduler just declines to arm.
        storage
            .configuration
            .update(&ConfigurationUpdate {
                daily_time: Some("25:99".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        scheduler.schedule().await.unwrap();
        assert!(!scheduler.is_scheduled().await);

        storage
            .configuration
            .update(&ConfigurationUpdate {
                daily_time: Some("6:00 AM".to_string()),
                timezone: Some("Not/AZone".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        scheduler.schedule().await.unwrap();
        assert!(!scheduler.is_scheduled().await);
    }

    #[tokio::test]
    async fn an_invalid_override_time_disarms_everything() {
        let (storage, _dir) = temp_storage();
        let sink = Arc::new(RecordingSink::default());
        let scheduler = Arc::new(ReminderScheduler::new(storage, sink));

        scheduler.schedule().await.unwrap();
        assert!(scheduler.is_scheduled().await);

        scheduler.override_next("sometime tomorrow").await.unwrap();
        assert!(!scheduler.is_scheduled().await);
        assert!(!scheduler.has_pending_override().await);
    }

    #[tokio::test(start_paused = true)]
    async fn an_override_fires_once_and_restores_the_daily_schedule() {
        let (storage, _dir) = temp_storage();

        // Pin the trigger roughly two hours ahead of the wall clock, in UTC,
        // so the virtual clock only has to jump past one occurrence.
        let target = Utc::now() + chrono::Duration::hours(2);
        let time = target.format("%I:%M %p").to_string();
        storage
            .configuration
            .update(&ConfigurationUpdate {
                role_id: Some("@quran-readers".to_string()),
                daily_time: Some(time.clone()),
                timezone: Some("UTC".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        storage
            .progress
            .update(&ProgressUpdate {
                last_page: Some(604),
                last_hadith: Some(10),
            })
            .await
            .unwrap();
        storage.notes.add("42", "read slowly").await.unwrap();

        let sink = Arc::new(RecordingSink::default());
        let scheduler = Arc::new(ReminderScheduler::new(storage.clone(), sink.clone()));
        scheduler.schedule().await.unwrap();
        scheduler.override_next(&time).await.unwrap();
        assert!(!scheduler.is_scheduled().await);
        assert!(scheduler.has_pending_override().await);

        // The one-shot waits on the virtual clock; jumping past its deadline
        // runs it to completion.
        tokio::time::sleep(Duration::from_secs(2 * 3600 + 300)).await;

        let sent = sink.sent.lock().await.clone();
        let main = sent
            .iter()
            .find(|m| m.starts_with("main: "))
            .expect("the reminder was sent");
        assert!(main.contains("@quran-readers 📢"));
        assert!(main.contains("Page: [1](https://quran.com/page/1)"));
        assert!(main.contains("Hadith: 11"));
        assert!(sent.iter().any(|m| m == "notes: Notes:\n1. read slowly"));

        // The regular cadence is back and the one-shot is gone.
        assert!(!scheduler.has_pending_override().await);
        assert!(scheduler.is_scheduled().await);

        // The firing moved the note out of pending.
        let included = storage.notes.included().await.unwrap();
        assert_eq!(included.len(), 1);
        assert_eq!(included[0].note, "read slowly");
        assert!(included[0].last_included_date.is_some());
        assert!(storage.notes.pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn an_unparseable_stored_timezone_blocks_the_override() {
        let (storage, _dir) = temp_storage();
        // A zone like this gets past no command; it takes a hand-edited
        // database. The override must not claim to be armed.
        storage
            .configuration
            .update(&ConfigurationUpdate {
                timezone: Some("Not/AZone".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let sink = Arc::new(RecordingSink::default());
        let scheduler = Arc::new(ReminderScheduler::new(storage, sink));
        scheduler.override_next("6:00 AM").await.unwrap();
        assert!(!scheduler.has_pending_override().await);
        assert!(!scheduler.is_scheduled().await);
    }

    #[tokio::test(start_paused = true)]
    async fn send_failures_do_not_stop_the_firing() {
        let (storage, _dir) = temp_storage();

        let target = Utc::now() + chrono::Duration::hours(2);
        let time = target.format("%I:%M %p").to_string();
        storage
            .configuration
            .update(&ConfigurationUpdate {
                daily_time: Some(time.clone()),
                timezone: Some("UTC".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        // Two notes long enough to need two messages.
        storage.notes.add("1", &"a".repeat(3000)).await.unwrap();
        storage.notes.add("2", &"b".repeat(3000)).await.unwrap();

        // The main message and the first notes chunk both fail to send.
        let sink = Arc::new(FlakySink::failing_first(2));
        let scheduler = Arc::new(ReminderScheduler::new(storage.clone(), sink.clone()));
        scheduler.override_next(&time).await.unwrap();

        tokio::time::sleep(Duration::from_secs(2 * 3600 + 300)).await;

        // Every send was attempted regardless of the earlier failures.
        let sent = sink.sent.lock().await.clone();
        assert_eq!(sent.iter().filter(|m| m.starts_with("main: ")).count(), 1);
        let chunks: Vec<&String> = sent.iter().filter(|m| m.starts_with("notes: ")).collect();
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].contains(&"b".repeat(3000)));

        // The read batch is still marked included.
        assert!(storage.notes.pending().await.unwrap().is_empty());
        assert_eq!(storage.notes.included().await.unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn a_failed_store_read_skips_the_firing_but_keeps_the_trigger() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("maqraah.db");
        let storage = Arc::new(Storage::open(&path).unwrap());

        let target = Utc::now() + chrono::Duration::hours(2);
        let time = target.format("%I:%M %p").to_string();
        storage
            .configuration
            .update(&ConfigurationUpdate {
                daily_time: Some(time),
                timezone: Some("UTC".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        storage.notes.add("1", "still here").await.unwrap();

        let sink = Arc::new(RecordingSink::default());
        let scheduler = Arc::new(ReminderScheduler::new(storage.clone(), sink.clone()));
        scheduler.schedule().await.unwrap();

        // Break the next read out from under the firing.
        rusqlite::Connection::open(&path)
            .unwrap()
            .execute("DROP TABLE progress", [])
            .unwrap();

        tokio::time::sleep(Duration::from_secs(2 * 3600 + 300)).await;

        // Nothing was sent, nothing was marked, the trigger is still armed.
        assert!(sink.sent.lock().await.is_empty());
        let pending = storage.notes.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].note, "still here");
        assert!(scheduler.is_scheduled().await);
    }
}
