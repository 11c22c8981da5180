use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crossbeam_channel::unbounded;
use tempfile::TempDir;

use crate::browser::{DriverError, ElementHandle};
use crate::config::MonitorConfig;
use crate::storage::MessageStore;
use crate::whatsapp_web::{
    ConversationPreview, ConversationSource, ConversationWindow, RawMessage,
};

use super::{Monitor, MonitorEvent};

type Conversations = Arc<Mutex<Vec<(String, Vec<RawMessage>)>>>;

#[derive(Default)]
struct FakeSource {
    fail_connect: bool,
    connected: bool,
    conversations: Conversations,
    failing_contacts: HashSet<String>,
}

impl FakeSource {
    fn with_conversations(conversations: Vec<(String, Vec<RawMessage>)>) -> Self {
        Self {
            conversations: Arc::new(Mutex::new(conversations)),
            ..Self::default()
        }
    }
}

fn raw(text: &str, time_label: &str) -> RawMessage {
    RawMessage {
        text: text.to_string(),
        time_label: time_label.to_string(),
    }
}

impl ConversationSource for FakeSource {
    fn ensure_connected(&mut self) -> Result<(), crate::monitor::MonitorError> {
        if self.fail_connect {
            return Err(crate::monitor::MonitorError::AuthTimeout(0));
        }
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn unread_conversations(&mut self) -> Result<Vec<ConversationPreview>, DriverError> {
        Ok(self
            .conversations
            .lock()
            .unwrap()
            .iter()
            .enumerate()
            .map(|(index, (contact, _))| ConversationPreview {
                handle: ElementHandle::new(format!("row-{}", index)),
                contact: contact.clone(),
            })
            .collect())
    }

    fn read_conversation(
        &mut self,
        preview: &ConversationPreview,
    ) -> Result<ConversationWindow, DriverError> {
        if self.failing_contacts.contains(&preview.contact) {
            return Err(DriverError::NotFound("stale conversation row".to_string()));
        }
        let index: usize = preview
            .handle
            .id()
            .strip_prefix("row-")
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0);
        let messages = self
            .conversations
            .lock()
            .unwrap()
            .get(index)
            .map(|(_, messages)| messages.clone())
            .unwrap_or_default();
        Ok(ConversationWindow {
            contact: preview.contact.clone(),
            messages,
        })
    }
}

fn test_config(temp: &TempDir) -> MonitorConfig {
    MonitorConfig {
        keywords: vec!["urgente".to_string()],
        important_contacts: vec!["Mãe".to_string()],
        data_dir: temp.path().to_path_buf(),
        ..MonitorConfig::default()
    }
}

#[test]
fn poll_classifies_and_accumulates_important_messages() {
    let temp = TempDir::new().expect("tempdir");
    let source = FakeSource::with_conversations(vec![
        (
            "João".to_string(),
            vec![raw("oi", "10:00"), raw("isso é urgente", "10:01")],
        ),
        ("Mãe".to_string(), vec![raw("oi", "10:02")]),
    ]);
    let mut monitor = Monitor::new(test_config(&temp), source);

    let outcome = monitor.poll_once();
    assert!(outcome.connected);
    assert_eq!(outcome.new_messages.len(), 2);
    assert_eq!(monitor.backlog().len(), 2);

    let texts: Vec<&str> = outcome
        .new_messages
        .iter()
        .map(|m| m.text.as_str())
        .collect();
    assert!(texts.contains(&"isso é urgente"));
    assert!(texts.contains(&"oi"), "contact rule catches Mãe's plain text");
}

#[test]
fn repolling_the_same_state_finds_nothing_new() {
    let temp = TempDir::new().expect("tempdir");
    let source = FakeSource::with_conversations(vec![(
        "João".to_string(),
        vec![raw("isso é urgente", "10:01")],
    )]);
    let mut monitor = Monitor::new(test_config(&temp), source);

    assert_eq!(monitor.poll_once().new_messages.len(), 1);
    assert_eq!(monitor.poll_once().new_messages.len(), 0);
    assert_eq!(monitor.backlog().len(), 1);
}

#[test]
fn identical_text_from_two_contacts_is_kept_twice() {
    let temp = TempDir::new().expect("tempdir");
    let source = FakeSource::with_conversations(vec![
        ("Mãe".to_string(), vec![raw("socorro", "10:00")]),
        ("Ana".to_string(), vec![raw("socorro", "10:00")]),
    ]);
    let mut monitor = Monitor::new(test_config(&temp), source);

    assert_eq!(monitor.poll_once().new_messages.len(), 2);
}

#[test]
fn connect_failure_degrades_to_empty_result() {
    let temp = TempDir::new().expect("tempdir");
    let source = FakeSource {
        fail_connect: true,
        ..FakeSource::default()
    };
    let mut monitor = Monitor::new(test_config(&temp), source);

    let outcome = monitor.poll_once();
    assert!(!outcome.connected);
    assert!(outcome.new_messages.is_empty());
}

#[test]
fn failing_conversation_does_not_abort_the_poll() {
    let temp = TempDir::new().expect("tempdir");
    let mut source = FakeSource::with_conversations(vec![
        ("João".to_string(), vec![raw("isso é urgente", "10:01")]),
        ("Mãe".to_string(), vec![raw("oi", "10:02")]),
    ]);
    source.failing_contacts.insert("João".to_string());
    let mut monitor = Monitor::new(test_config(&temp), source);

    let outcome = monitor.poll_once();
    assert_eq!(outcome.new_messages.len(), 1);
    assert_eq!(outcome.new_messages[0].contact, "Mãe");
}

#[test]
fn summary_takes_the_last_n_messages() {
    let temp = TempDir::new().expect("tempdir");
    let messages: Vec<RawMessage> = (1..=15)
        .map(|n| raw(&format!("urgente {}", n), &format!("10:{:02}", n)))
        .collect();
    let source = FakeSource::with_conversations(vec![("João".to_string(), messages)]);
    let mut monitor = Monitor::new(test_config(&temp), source);

    monitor.poll_once();
    assert_eq!(monitor.backlog().len(), 15);

    let record = monitor
        .generate_summary()
        .expect("summary")
        .expect("record");
    assert_eq!(record.message_count, 10);

    let report = std::fs::read_to_string(&record.file).expect("report");
    assert!(!report.contains("urgente 5\n"), "older tail excluded");
    assert!(report.contains("urgente 6"));
    assert!(report.contains("urgente 15"));
}

#[test]
fn summary_without_new_polls_reproduces_the_same_tail() {
    let temp = TempDir::new().expect("tempdir");
    let source = FakeSource::with_conversations(vec![(
        "João".to_string(),
        vec![raw("isso é urgente", "10:01")],
    )]);
    let mut monitor = Monitor::new(test_config(&temp), source);
    monitor.poll_once();

    let first = monitor.generate_summary().expect("first").expect("record");
    let second = monitor
        .generate_summary()
        .expect("second")
        .expect("record");
    assert_eq!(first.message_count, second.message_count);
    assert_eq!(monitor.backlog().len(), 1, "backlog never trimmed");
}

#[test]
fn empty_backlog_summary_is_a_noop() {
    let temp = TempDir::new().expect("tempdir");
    let mut monitor = Monitor::new(test_config(&temp), FakeSource::default());
    assert!(monitor.generate_summary().expect("summary").is_none());
}

#[test]
fn events_are_emitted_for_messages_and_summaries() {
    let temp = TempDir::new().expect("tempdir");
    let source = FakeSource::with_conversations(vec![(
        "Mãe".to_string(),
        vec![raw("me liga", "10:00")],
    )]);
    let (sender, receiver) = unbounded();
    let mut monitor = Monitor::new(test_config(&temp), source).with_events(sender);

    monitor.poll_once();
    monitor.generate_summary().expect("summary");

    let events: Vec<MonitorEvent> = receiver.try_iter().collect();
    assert!(events
        .iter()
        .any(|event| matches!(event, MonitorEvent::ConnectionChanged { connected: true })));
    assert!(events.iter().any(
        |event| matches!(event, MonitorEvent::NewImportantMessages { count: 1, .. })
    ));
    assert!(events
        .iter()
        .any(|event| matches!(event, MonitorEvent::NewSummary { message_count: 1, .. })));
}

#[test]
fn store_mirror_receives_classified_messages() {
    let temp = TempDir::new().expect("tempdir");
    let config = test_config(&temp);
    let store = MessageStore::new(config.db_path()).expect("store");
    let source = FakeSource::with_conversations(vec![(
        "Mãe".to_string(),
        vec![raw("me liga", "10:00")],
    )]);
    let mut monitor = Monitor::new(config.clone(), source).with_store(store);

    monitor.poll_once();
    monitor.poll_once();

    let mirror = MessageStore::new(config.db_path()).expect("reopen");
    let stats = mirror.stats().expect("stats");
    assert_eq!(stats.total_messages, 1, "mirror writes are idempotent");
}

#[test]
fn updated_rules_apply_on_the_next_poll() {
    let temp = TempDir::new().expect("tempdir");
    let source =
        FakeSource::with_conversations(vec![("Chefe".to_string(), vec![raw("reunião às 9", "08:00")])]);
    let conversations = source.conversations.clone();
    let mut monitor = Monitor::new(test_config(&temp), source);

    assert_eq!(monitor.poll_once().new_messages.len(), 0);

    let mut config = test_config(&temp);
    config.important_contacts.push("Chefe".to_string());
    monitor.update_config(config);

    assert!(
        monitor.poll_once().new_messages.is_empty(),
        "already-seen messages are never re-classified"
    );

    conversations
        .lock()
        .unwrap()
        .push(("Chefe".to_string(), vec![raw("agenda nova", "09:00")]));
    assert_eq!(monitor.poll_once().new_messages.len(), 1);
}

#[test]
fn status_reflects_progress() {
    let temp = TempDir::new().expect("tempdir");
    let source = FakeSource::with_conversations(vec![(
        "Mãe".to_string(),
        vec![raw("me liga", "10:00")],
    )]);
    let mut monitor = Monitor::new(test_config(&temp), source);

    let before = monitor.status();
    assert!(!before.connected);
    assert!(before.last_poll_at.is_none());

    monitor.poll_once();
    monitor.generate_summary().expect("summary");

    let after = monitor.status();
    assert!(after.connected);
    assert_eq!(after.backlog_len, 1);
    assert_eq!(after.history_len, 1);
    assert!(after.last_poll_at.is_some());
    assert!(after.last_summary_at.is_some());
}
