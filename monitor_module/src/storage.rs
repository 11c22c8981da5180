//! Durable mirror of classified messages and generated summaries.
//!
//! The in-memory backlog is the source of truth during a session; this
//! store is written after classification and is never consulted when
//! deciding importance.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::monitor::{Message, MonitorError, SummaryRecord};

const STORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    dedup_key TEXT NOT NULL UNIQUE,
    contact TEXT NOT NULL,
    text TEXT NOT NULL,
    time_label TEXT NOT NULL,
    important INTEGER NOT NULL DEFAULT 1,
    received_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_contact ON messages(contact);
CREATE INDEX IF NOT EXISTS idx_messages_received_at ON messages(received_at);

CREATE TABLE IF NOT EXISTS summaries (
    id TEXT PRIMARY KEY,
    file TEXT NOT NULL,
    message_count INTEGER NOT NULL,
    generated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_summaries_generated_at ON summaries(generated_at);
"#;

/// Counters for status surfaces.
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub total_messages: i64,
    pub total_summaries: i64,
    pub messages_per_contact: Vec<(String, i64)>,
}

#[derive(Debug)]
pub struct MessageStore {
    path: PathBuf,
}

impl MessageStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, MonitorError> {
        let store = Self { path: path.into() };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<(), MonitorError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&self.path)?;
        conn.execute_batch(STORE_SCHEMA)?;
        Ok(())
    }

    fn open(&self) -> Result<Connection, MonitorError> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(conn)
    }

    /// Mirror a classified message. Idempotent on the dedup key, so
    /// re-polls never duplicate rows.
    pub fn save_message(&self, message: &Message) -> Result<(), MonitorError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT OR IGNORE INTO messages (dedup_key, contact, text, time_label, important, received_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5)",
            params![
                message.dedup_key(),
                message.contact,
                message.text,
                message.time_label,
                message.received_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn save_summary(&self, record: &SummaryRecord) -> Result<(), MonitorError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT OR REPLACE INTO summaries (id, file, message_count, generated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record.id.to_string(),
                record.file.to_string_lossy(),
                record.message_count as i64,
                record.generated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Most recent important messages, newest first.
    pub fn recent_important_messages(&self, limit: usize) -> Result<Vec<Message>, MonitorError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT contact, text, time_label, received_at FROM messages
             WHERE important = 1
             ORDER BY received_at DESC, id DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut messages = Vec::new();
        for row in rows {
            let (contact, text, time_label, received_at) = row?;
            let received_at = DateTime::parse_from_rfc3339(&received_at)?.with_timezone(&Utc);
            messages.push(Message {
                contact,
                text,
                time_label,
                received_at,
            });
        }
        Ok(messages)
    }

    pub fn last_summary(&self) -> Result<Option<SummaryRecord>, MonitorError> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                "SELECT id, file, message_count, generated_at FROM summaries
                 ORDER BY generated_at DESC
                 LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((id, file, message_count, generated_at)) => {
                let id = Uuid::parse_str(&id)?;
                let generated_at = DateTime::parse_from_rfc3339(&generated_at)?.with_timezone(&Utc);
                Ok(Some(SummaryRecord {
                    id,
                    file: PathBuf::from(file),
                    message_count: message_count as usize,
                    generated_at,
                }))
            }
        }
    }

    /// Time-based retention: delete mirrored messages older than `days`.
    /// Returns the number of rows removed.
    pub fn prune_messages_older_than(&self, days: i64) -> Result<usize, MonitorError> {
        let cutoff = Utc::now() - chrono::Duration::days(days);
        let conn = self.open()?;
        let removed = conn.execute(
            "DELETE FROM messages WHERE received_at < ?1",
            params![cutoff.to_rfc3339()],
        )?;
        Ok(removed)
    }

    pub fn stats(&self) -> Result<StoreStats, MonitorError> {
        let conn = self.open()?;
        let total_messages: i64 =
            conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        let total_summaries: i64 =
            conn.query_row("SELECT COUNT(*) FROM summaries", [], |row| row.get(0))?;

        let mut stmt = conn.prepare(
            "SELECT contact, COUNT(*) AS total FROM messages
             GROUP BY contact
             ORDER BY total DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut messages_per_contact = Vec::new();
        for row in rows {
            messages_per_contact.push(row?);
        }

        Ok(StoreStats {
            total_messages,
            total_summaries,
            messages_per_contact,
        })
    }
}
