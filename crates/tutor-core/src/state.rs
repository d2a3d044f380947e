//! UI-agnostic conversation types
//!
//! This module contains data structures that are shared between the terminal
//! reader and the one-shot CLI and don't depend on any specific UI framework.

use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// Stable identifier for a message within one session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(kind: &str, seq: u64) -> Self {
        Self(format!("{kind}-{seq}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A citation into the published textbook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub chapter: u32,
    pub lesson: u32,
    pub section: String,
    pub url: String,
}

impl Source {
    pub fn label(&self) -> String {
        format!("Chapter {}, Lesson {}: {}", self.chapter, self.lesson, self.section)
    }
}

/// A chat message in the study conversation
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub id: MessageId,
    pub role: ChatRole,
    pub content: String,
    /// Only ever populated on assistant messages
    pub sources: Vec<Source>,
    /// A failed exchange reported as an assistant message
    pub error: bool,
    pub timestamp: SystemTime,
}

impl ChatMessage {
    pub fn new(id: MessageId, role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            id,
            role,
            content: content.into(),
            sources: Vec::new(),
            error: false,
            timestamp: SystemTime::now(),
        }
    }
}

/// A confirmed text selection, forwarded from the reader to the chat panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionEvent {
    pub text: String,
    pub timestamp: u64,
}

/// One prior turn as sent to the chat endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: ChatRole,
    pub content: String,
}

impl From<&ChatMessage> for HistoryTurn {
    fn from(msg: &ChatMessage) -> Self {
        Self {
            role: msg.role,
            content: msg.content.clone(),
        }
    }
}

/// Body of `POST /chat` and `POST /chat/sync`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub selected_text: Option<String>,
    pub current_page: Option<String>,
    pub conversation_history: Vec<HistoryTurn>,
}
