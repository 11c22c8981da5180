//! WhatsApp Web page access behind the `ConversationSource` seam.
//!
//! Selector maintenance lives here and nowhere else; the poll engine only
//! sees conversations and messages.

use std::time::Duration;

use tracing::{debug, warn};

use crate::browser::{DriverError, ElementHandle, SessionDriver};
use crate::connection::{ConnectOptions, ConnectionManager};
use crate::monitor::MonitorError;

/// Chat list container; present only once authenticated.
pub const CHAT_LIST: &str = "div[data-testid=\"chat-list\"]";
/// QR canvas shown while unauthenticated.
pub const QR_CANVAS: &str = "canvas[aria-label*=\"Scan\"]";
/// One conversation row in the chat list.
pub const CHAT_ROW: &str = "div[data-testid=\"chat-list\"] div[role=\"row\"]";
/// Unread marker inside a conversation row.
pub const UNREAD_BADGE: &str = "span[data-testid=\"icon-unread\"]";
/// Contact name inside a conversation row.
pub const CONTACT_NAME: &str = "span[data-testid=\"default-user\"]";
/// One message bubble inside an open conversation.
pub const MESSAGE_CONTAINER: &str = "div[data-testid=\"msg-container\"]";
/// Text body inside a message bubble.
pub const MESSAGE_TEXT: &str = "span[data-testid=\"msg-text\"]";
/// Time label inside a message bubble.
pub const MESSAGE_META: &str = "div[data-testid=\"msg-meta\"]";

/// A message as extracted from the DOM, before classification.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub text: String,
    pub time_label: String,
}

/// An unread conversation spotted in the chat list.
#[derive(Debug, Clone)]
pub struct ConversationPreview {
    pub handle: ElementHandle,
    pub contact: String,
}

/// The recent-message window of one opened conversation.
#[derive(Debug, Clone)]
pub struct ConversationWindow {
    pub contact: String,
    pub messages: Vec<RawMessage>,
}

/// Capability interface the poll engine runs against. The production
/// implementation drives a browser; tests substitute synthetic
/// conversations.
pub trait ConversationSource {
    fn ensure_connected(&mut self) -> Result<(), MonitorError>;
    fn disconnect(&mut self);
    fn is_connected(&self) -> bool;

    /// Conversations currently flagged unread. Order is whatever the chat
    /// list renders; not stable across calls.
    fn unread_conversations(&mut self) -> Result<Vec<ConversationPreview>, DriverError>;

    /// Open a conversation and extract its recent-message window.
    fn read_conversation(
        &mut self,
        preview: &ConversationPreview,
    ) -> Result<ConversationWindow, DriverError>;
}

fn child_text<D: SessionDriver>(
    session: &mut D,
    parent: &ElementHandle,
    selector: &str,
) -> Result<String, DriverError> {
    let element = session.find_child_element(parent, selector)?;
    session.element_text(&element)
}

/// `ConversationSource` over a live WhatsApp Web session.
pub struct WhatsAppWebSource<D: SessionDriver> {
    connection: ConnectionManager<D>,
    load_timeout: Duration,
    recent_window: usize,
}

impl<D: SessionDriver> WhatsAppWebSource<D> {
    pub fn new(
        connection: ConnectionManager<D>,
        load_timeout: Duration,
        recent_window: usize,
    ) -> Self {
        Self {
            connection,
            load_timeout,
            recent_window,
        }
    }

    /// Connect options pointing at WhatsApp Web with its page markers.
    pub fn connect_options(
        service_url: String,
        connect_timeout: Duration,
        auth_timeout: Duration,
    ) -> ConnectOptions {
        ConnectOptions {
            service_url,
            authenticated_selector: CHAT_LIST.to_string(),
            challenge_selector: QR_CANVAS.to_string(),
            connect_timeout,
            auth_timeout,
        }
    }
}

impl<D: SessionDriver> ConversationSource for WhatsAppWebSource<D> {
    fn ensure_connected(&mut self) -> Result<(), MonitorError> {
        self.connection.connect()
    }

    fn disconnect(&mut self) {
        self.connection.disconnect();
    }

    fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    fn unread_conversations(&mut self) -> Result<Vec<ConversationPreview>, DriverError> {
        let session = self.connection.session_mut().ok_or(DriverError::NoSession)?;
        let rows = match session.find_elements(CHAT_ROW) {
            Ok(rows) => rows,
            Err(err) => {
                if err.is_fatal() {
                    warn!("chat list unavailable, dropping session: {}", err);
                    self.connection.disconnect();
                }
                return Err(err);
            }
        };

        let session = self.connection.session_mut().ok_or(DriverError::NoSession)?;
        let mut previews = Vec::new();
        for row in rows {
            let unread = match session.find_child_elements(&row, UNREAD_BADGE) {
                Ok(badges) => !badges.is_empty(),
                Err(_) => false,
            };
            if !unread {
                continue;
            }
            let contact = match child_text(session, &row, CONTACT_NAME) {
                Ok(contact) if !contact.is_empty() => contact,
                Ok(_) | Err(_) => {
                    debug!("skipping unread row without a readable contact name");
                    continue;
                }
            };
            previews.push(ConversationPreview {
                handle: row,
                contact,
            });
        }
        Ok(previews)
    }

    fn read_conversation(
        &mut self,
        preview: &ConversationPreview,
    ) -> Result<ConversationWindow, DriverError> {
        let load_timeout = self.load_timeout;
        let recent_window = self.recent_window;
        let session = self.connection.session_mut().ok_or(DriverError::NoSession)?;

        session.click(&preview.handle)?;
        session.wait_for(MESSAGE_CONTAINER, load_timeout)?;

        let containers = session.find_elements(MESSAGE_CONTAINER)?;
        let start = containers.len().saturating_sub(recent_window);
        let mut messages = Vec::new();
        for container in &containers[start..] {
            // Media-only bubbles have no text node; skip them.
            let text = match child_text(session, container, MESSAGE_TEXT) {
                Ok(text) if !text.is_empty() => text,
                Ok(_) | Err(_) => continue,
            };
            let time_label = child_text(session, container, MESSAGE_META).unwrap_or_default();
            messages.push(RawMessage { text, time_label });
        }

        Ok(ConversationWindow {
            contact: preview.contact.clone(),
            messages,
        })
    }
}
