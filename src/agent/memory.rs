//! Session history store
//!
//! Conversation turns are kept per session id. Histories are created on first
//! use and only ever appended to; nothing is evicted.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Shared handle to one session's append-only log.
#[derive(Debug, Clone, Default)]
pub struct HistoryHandle {
    messages: Arc<RwLock<Vec<ChatMessage>>>,
}

impl HistoryHandle {
    pub fn append(&self, role: Role, content: impl Into<String>) {
        self.messages
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ChatMessage::new(role, content));
    }

    /// Record a user message and its reply as one adjacent pair, even when
    /// other turns on the same session finish concurrently.
    pub fn append_turn(&self, user: impl Into<String>, assistant: impl Into<String>) {
        let mut messages = self.messages.write().unwrap_or_else(PoisonError::into_inner);
        messages.push(ChatMessage::new(Role::User, user));
        messages.push(ChatMessage::new(Role::Assistant, assistant));
    }

    /// Snapshot of the stored messages in chronological order.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.messages.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether both handles point at the same underlying history.
    pub fn same_history(&self, other: &HistoryHandle) -> bool {
        Arc::ptr_eq(&self.messages, &other.messages)
    }
}

impl IntoIterator for &HistoryHandle {
    type Item = ChatMessage;
    type IntoIter = std::vec::IntoIter<ChatMessage>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages().into_iter()
    }
}

/// Backing store for session histories. Swap in a persistent implementation
/// to keep conversations across restarts or to add retention.
pub trait HistoryStore: Send + Sync {
    fn get_or_create(&self, session_id: &str) -> HistoryHandle;

    fn session_count(&self) -> usize;
}

#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    sessions: DashMap<String, HistoryHandle>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryStore for InMemoryHistoryStore {
    fn get_or_create(&self, session_id: &str) -> HistoryHandle {
        self.sessions
            .entry(session_id.to_string())
            .or_default()
            .value()
            .clone()
    }

    fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
