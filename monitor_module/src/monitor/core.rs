use std::collections::HashSet;

use chrono::Utc;
use crossbeam_channel::Sender;
use tracing::{debug, error, info, warn};

use crate::classifier::classify;
use crate::config::MonitorConfig;
use crate::storage::MessageStore;
use crate::summary;
use crate::whatsapp_web::ConversationSource;

use super::types::{Message, MonitorError, MonitorEvent, MonitorStatus, PollOutcome, SummaryRecord};

/// One monitor instance per process. Owns the conversation source (and
/// through it the browser session), the deduplication history, the
/// important-message backlog and the configuration.
pub struct Monitor<S: ConversationSource> {
    config: MonitorConfig,
    source: S,
    history: HashSet<String>,
    backlog: Vec<Message>,
    store: Option<MessageStore>,
    events: Option<Sender<MonitorEvent>>,
    last_poll_at: Option<chrono::DateTime<Utc>>,
    last_summary_at: Option<chrono::DateTime<Utc>>,
    was_connected: bool,
}

impl<S: ConversationSource> Monitor<S> {
    pub fn new(config: MonitorConfig, source: S) -> Self {
        Self {
            config,
            source,
            history: HashSet::new(),
            backlog: Vec::new(),
            store: None,
            events: None,
            last_poll_at: None,
            last_summary_at: None,
            was_connected: false,
        }
    }

    /// Attach the durable mirror. Mirror failures never fail a poll.
    pub fn with_store(mut self, store: MessageStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Attach the event channel consumed by the hosting application.
    pub fn with_events(mut self, events: Sender<MonitorEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Swap the rule configuration between cycles. Intervals are fixed at
    /// thread start; restart the workers to change cadence.
    pub fn update_config(&mut self, config: MonitorConfig) {
        info!("monitor configuration updated");
        self.config = config;
    }

    pub fn connect(&mut self) -> Result<(), MonitorError> {
        let result = self.source.ensure_connected();
        self.note_connection(result.is_ok());
        result
    }

    pub fn disconnect(&mut self) {
        self.source.disconnect();
        self.note_connection(false);
    }

    pub fn is_connected(&self) -> bool {
        self.source.is_connected()
    }

    pub fn backlog(&self) -> &[Message] {
        &self.backlog
    }

    pub fn status(&self) -> MonitorStatus {
        MonitorStatus {
            connected: self.source.is_connected(),
            backlog_len: self.backlog.len(),
            history_len: self.history.len(),
            last_poll_at: self.last_poll_at,
            last_summary_at: self.last_summary_at,
        }
    }

    /// Run one poll cycle: ensure a session, scan unread conversations,
    /// deduplicate, classify and accumulate. Never raises; a total fetch
    /// failure degrades to an empty result with a logged error.
    pub fn poll_once(&mut self) -> PollOutcome {
        if let Err(err) = self.source.ensure_connected() {
            error!("cannot poll, connect failed: {}", err);
            self.note_connection(false);
            return PollOutcome::default();
        }
        self.note_connection(true);

        let previews = match self.source.unread_conversations() {
            Ok(previews) => previews,
            Err(err) => {
                error!("failed to enumerate unread conversations: {}", err);
                self.last_poll_at = Some(Utc::now());
                return PollOutcome {
                    connected: self.source.is_connected(),
                    new_messages: Vec::new(),
                };
            }
        };
        debug!("{} unread conversation(s)", previews.len());

        let rules = self.config.rules();
        let mut new_messages = Vec::new();
        for preview in previews {
            let window = match self.source.read_conversation(&preview) {
                Ok(window) => window,
                Err(err) => {
                    warn!("skipping conversation with {}: {}", preview.contact, err);
                    continue;
                }
            };

            for raw in window.messages {
                let message = Message::new(window.contact.clone(), raw.text, raw.time_label);
                let key = message.dedup_key();
                if self.history.contains(&key) {
                    continue;
                }
                self.history.insert(key);

                let Some(rule) = classify(&message.contact, &message.text, &rules) else {
                    continue;
                };
                info!("important message from {} ({})", message.contact, rule);
                if let Some(store) = &self.store {
                    if let Err(err) = store.save_message(&message) {
                        warn!("failed to mirror message to store: {}", err);
                    }
                }
                self.backlog.push(message.clone());
                new_messages.push(message);
            }
        }

        self.last_poll_at = Some(Utc::now());
        info!(
            "poll finished: {} new important message(s), backlog {}",
            new_messages.len(),
            self.backlog.len()
        );

        if !new_messages.is_empty() {
            self.emit(MonitorEvent::NewImportantMessages {
                count: new_messages.len(),
                messages: new_messages.clone(),
            });
        }

        PollOutcome {
            connected: true,
            new_messages,
        }
    }

    /// Compile the backlog tail into a summary file. An empty backlog is a
    /// no-op, not an error. The backlog is never trimmed here; re-running
    /// without new polls reproduces the same tail.
    pub fn generate_summary(&mut self) -> Result<Option<SummaryRecord>, MonitorError> {
        if self.backlog.is_empty() {
            info!("no important messages to summarize");
            return Ok(None);
        }

        let selected = summary::select_tail(&self.backlog, self.config.max_messages_per_summary);
        let record = summary::write_summary(
            &self.config.summaries_dir(),
            selected,
            self.backlog.len(),
        )?;

        if let Some(store) = &self.store {
            if let Err(err) = store.save_summary(&record) {
                warn!("failed to mirror summary record: {}", err);
            }
        }

        self.last_summary_at = Some(record.generated_at);
        info!(
            "summary with {} message(s) written to {}",
            record.message_count,
            record.file.display()
        );
        self.emit(MonitorEvent::NewSummary {
            file: record.file.clone(),
            message_count: record.message_count,
            generated_at: record.generated_at,
        });

        Ok(Some(record))
    }

    fn note_connection(&mut self, connected: bool) {
        if connected != self.was_connected {
            self.was_connected = connected;
            self.emit(MonitorEvent::ConnectionChanged { connected });
        }
    }

    fn emit(&self, event: MonitorEvent) {
        if let Some(events) = &self.events {
            // Events are best-effort; the host may have dropped its receiver.
            let _ = events.send(event);
        }
    }
}
