use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use tokio::sync::Mutex;

use crate::error::StorageError;
use crate::types::{Configuration, ConfigurationUpdate, Note, NoteStatus, Progress, ProgressUpdate};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS configuration (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    roleId TEXT,
    dailyTime TEXT NOT NULL DEFAULT '12:00 PM',
    timezone TEXT NOT NULL DEFAULT 'Africa/Cairo',
    voiceChannelId TEXT
);
INSERT OR IGNORE INTO configuration (id) VALUES (1);

CREATE TABLE IF NOT EXISTS progress (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    lastPage INTEGER NOT NULL DEFAULT 0,
    lastHadith INTEGER NOT NULL DEFAULT 0
);
INSERT OR IGNORE INTO progress (id) VALUES (1);

CREATE TABLE IF NOT EXISTS notes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    userId TEXT NOT NULL,
    note TEXT NOT NULL,
    dateAdded TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    lastIncludedDate TEXT
);
";

/// SQLite-backed persistence. The singleton configuration and progress rows
/// are seeded on first open, so reads never miss.
pub struct Storage {
    pub configuration: ConfigurationRepository,
    pub progress: ProgressRepository,
    pub notes: NotesRepository,
}

impl Storage {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        // Databases created before the note lifecycle existed lack these two
        // columns. The ALTERs fail harmlessly everywhere else.
        let _ = conn.execute(
            "ALTER TABLE notes ADD COLUMN status TEXT NOT NULL DEFAULT 'pending'",
            [],
        );
        let _ = conn.execute("ALTER TABLE notes ADD COLUMN lastIncludedDate TEXT", []);

        let conn = Arc::new(Mutex::new(conn));
        Ok(Self {
            configuration: ConfigurationRepository { conn: conn.clone() },
            progress: ProgressRepository { conn: conn.clone() },
            notes: NotesRepository { conn },
        })
    }
}

pub struct ConfigurationRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigurationRepository {
    pub async fn get(&self) -> Result<Configuration, StorageError> {
        let conn = self.conn.lock().await;
        let configuration = conn.query_row(
            "SELECT roleId, dailyTime, timezone, voiceChannelId FROM configuration WHERE id = 1",
            [],
            |row| {
                Ok(Configuration {
                    role_id: row.get(0)?,
                    daily_time: row.get(1)?,
                    timezone: row.get(2)?,
                    voice_channel_id: row.get(3)?,
                })
            },
        )?;
        Ok(configuration)
    }

    /// Writes only the populated fields, leaving the rest of the row alone.
    pub async fn update(&self, update: &ConfigurationUpdate) -> Result<(), StorageError> {
        if update.is_empty() {
            return Ok(());
        }
        let mut fields: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(role_id) = &update.role_id {
            fields.push("roleId = ?");
            values.push(Value::from(role_id.clone()));
        }
        if let Some(daily_time) = &update.daily_time {
            fields.push("dailyTime = ?");
            values.push(Value::from(daily_time.clone()));
        }
        if let Some(timezone) = &update.timezone {
            fields.push("timezone = ?");
            values.push(Value::from(timezone.clone()));
        }
        if let Some(voice_channel_id) = &update.voice_channel_id {
            fields.push("voiceChannelId = ?");
            values.push(Value::from(voice_channel_id.clone()));
        }

        let sql = format!("UPDATE configuration SET {} WHERE id = 1", fields.join(", "));
        let conn = self.conn.lock().await;
        conn.execute(&sql, params_from_iter(values))?;
        Ok(())
    }
}

pub struct ProgressRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ProgressRepository {
    pub async fn get(&self) -> Result<Progress, StorageError> {
        let conn = self.conn.lock().await;
        let progress = conn.query_row(
            "SELECT lastPage, lastHadith FROM progress WHERE id = 1",
            [],
            |row| {
                Ok(Progress {
                    last_page: row.get(0)?,
                    last_hadith: row.get(1)?,
                })
            },
        )?;
        Ok(progress)
    }

    /// Writes only the populated fields, leaving the rest of the row alone.
    pub async fn update(&self, update: &ProgressUpdate) -> Result<(), StorageError> {
        if update.is_empty() {
            return Ok(());
        }
        let mut fields: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(last_page) = update.last_page {
            fields.push("lastPage = ?");
            values.push(Value::from(i64::from(last_page)));
        }
        if let Some(last_hadith) = update.last_hadith {
            fields.push("lastHadith = ?");
            values.push(Value::from(i64::from(last_hadith)));
        }

        let sql = format!("UPDATE progress SET {} WHERE id = 1", fields.join(", "));
        let conn = self.conn.lock().await;
        conn.execute(&sql, params_from_iter(values))?;
        Ok(())
    }
}

pub struct NotesRepository {
    conn: Arc<Mutex<Connection>>,
}

impl NotesRepository {
    pub async fn add(&self, user_id: &str, text: &str) -> Result<(), StorageError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO notes (userId, note, dateAdded, status) VALUES (?1, ?2, ?3, 'pending')",
            params![user_id, text, Utc::now()],
        )?;
        Ok(())
    }

    /// All pending notes in creation order. Positions shown to users and the
    /// numbering in the reminder both come from this order.
    pub async fn pending(&self) -> Result<Vec<Note>, StorageError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, userId, note, dateAdded, status, lastIncludedDate FROM notes \
             WHERE status <> 'included' ORDER BY id",
        )?;
        let rows = stmt.query_map([], note_from_row)?;
        collect_notes(rows)
    }

    pub async fn pending_for_user(&self, user_id: &str) -> Result<Vec<Note>, StorageError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, userId, note, dateAdded, status, lastIncludedDate FROM notes \
             WHERE status <> 'included' AND userId = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![user_id], note_from_row)?;
        collect_notes(rows)
    }

    /// Notes already carried by a fired reminder, newest inclusion first.
    pub async fn included(&self) -> Result<Vec<Note>, StorageError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, userId, note, dateAdded, status, lastIncludedDate FROM notes \
             WHERE status = 'included' ORDER BY lastIncludedDate DESC, id",
        )?;
        let rows = stmt.query_map([], note_from_row)?;
        collect_notes(rows)
    }

    pub async fn delete(&self, ids: &[i64]) -> Result<usize, StorageError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("DELETE FROM notes WHERE id IN ({placeholders})");
        let conn = self.conn.lock().await;
        let removed = conn.execute(&sql, params_from_iter(ids.iter()))?;
        Ok(removed)
    }

    pub async fn delete_for_user(&self, user_id: &str) -> Result<usize, StorageError> {
        let conn = self.conn.lock().await;
        let removed = conn.execute("DELETE FROM notes WHERE userId = ?1", params![user_id])?;
        Ok(removed)
    }

    pub async fn delete_all(&self) -> Result<usize, StorageError> {
        let conn = self.conn.lock().await;
        let removed = conn.execute("DELETE FROM notes", [])?;
        Ok(removed)
    }

    /// Marks the given notes as carried by the reminder fired at `at`. All
    /// rows of one firing share the same timestamp, which is what groups
    /// them into a batch for carry-over.
    pub async fn mark_included(&self, ids: &[i64], at: DateTime<Utc>) -> Result<usize, StorageError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "UPDATE notes SET status = 'included', lastIncludedDate = ? WHERE id IN ({placeholders})"
        );
        let mut values: Vec<Value> = Vec::with_capacity(ids.len() + 1);
        values.push(Value::from(at.to_rfc3339()));
        values.extend(ids.iter().map(|id| Value::from(*id)));
        let conn = self.conn.lock().await;
        let marked = conn.execute(&sql, params_from_iter(values))?;
        Ok(marked)
    }

    /// Moves the most recently included batch back to pending, keeping the
    /// same rows and ids.
    pub async fn carry_over_last_included(&self) -> Result<usize, StorageError> {
        let conn = self.conn.lock().await;
        let restored = conn.execute(
            "UPDATE notes SET status = 'pending', lastIncludedDate = NULL \
             WHERE status = 'included' AND lastIncludedDate = \
               (SELECT MAX(lastIncludedDate) FROM notes WHERE status = 'included')",
            [],
        )?;
        Ok(restored)
    }
}

fn note_from_row(row: &Row<'_>) -> rusqlite::Result<Note> {
    let status: String = row.get(4)?;
    Ok(Note {
        id: row.get(0)?,
        user_id: row.get(1)?,
        note: row.get(2)?,
        date_added: row.get(3)?,
        status: NoteStatus::parse(&status),
        last_included_date: row.get(5)?,
    })
}

fn collect_notes(
    rows: impl Iterator<Item = rusqlite::Result<Note>>,
) -> Result<Vec<Note>, StorageError> {
    let mut notes = Vec::new();
    for row in rows {
        notes.push(row?);
    }
    Ok(notes)
}
