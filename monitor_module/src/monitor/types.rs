use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::browser::DriverError;

/// How many characters of the message text participate in the dedup key.
pub(crate) const DEDUP_TEXT_PREFIX: usize = 20;

/// A message extracted from an open conversation. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub contact: String,
    pub text: String,
    /// Time label as rendered by the web client (e.g. "10:32"); opaque text,
    /// never parsed.
    pub time_label: String,
    pub received_at: DateTime<Utc>,
}

impl Message {
    pub fn new(
        contact: impl Into<String>,
        text: impl Into<String>,
        time_label: impl Into<String>,
    ) -> Self {
        Self {
            contact: contact.into(),
            text: text.into(),
            time_label: time_label.into(),
            received_at: Utc::now(),
        }
    }

    /// Key preventing re-processing of an already-seen message. Includes the
    /// contact, so identical text at the same time from two contacts never
    /// collides.
    pub fn dedup_key(&self) -> String {
        let prefix: String = self.text.chars().take(DEDUP_TEXT_PREFIX).collect();
        format!("{}|{}|{}", self.contact, self.time_label, prefix)
    }
}

/// Record of one generated summary artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub id: Uuid,
    pub file: PathBuf,
    pub message_count: usize,
    pub generated_at: DateTime<Utc>,
}

/// Result of one poll cycle. A failed connect degrades to
/// `connected: false` with no messages; it never raises.
#[derive(Debug, Default)]
pub struct PollOutcome {
    pub connected: bool,
    pub new_messages: Vec<Message>,
}

/// Snapshot of the monitor for status surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    pub connected: bool,
    pub backlog_len: usize,
    pub history_len: usize,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub last_summary_at: Option<DateTime<Utc>>,
}

/// Events emitted to the hosting application.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    NewImportantMessages {
        count: usize,
        messages: Vec<Message>,
    },
    NewSummary {
        file: PathBuf,
        message_count: usize,
        generated_at: DateTime<Utc>,
    },
    ConnectionChanged {
        connected: bool,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("datetime parse error: {0}")]
    DateTimeParse(#[from] chrono::ParseError),
    #[error("uuid parse error: {0}")]
    UuidParse(#[from] uuid::Error),
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),
    #[error("authentication wait exceeded ({0}s)")]
    AuthTimeout(u64),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}
