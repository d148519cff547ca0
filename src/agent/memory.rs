//! Conversation memory: process-lifetime transcripts scoped to a session.
//!
//! A [`ConversationMemory`] is an append-only log of human/assistant turns.
//! Each [`Session`] owns exactly one log; resetting a session swaps in a fresh
//! empty log and hands the old one back, so anything still holding the old
//! transcript keeps a consistent snapshot.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session key used by the single-user server.
pub const DEFAULT_SESSION: &str = "default";

/// Who spoke a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Human,
    Assistant,
}

impl Role {
    /// Speaker label used when rendering a transcript into a prompt.
    pub fn label(self) -> &'static str {
        match self {
            Role::Human => "Human",
            Role::Assistant => "AI",
        }
    }
}

/// A single turn in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Ordered, append-only log of turns.
#[derive(Debug, Clone, Default)]
pub struct ConversationMemory {
    turns: Vec<ConversationTurn>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn at the end of the log.
    pub fn append(&mut self, role: Role, text: impl Into<String>) {
        self.turns.push(ConversationTurn {
            role,
            text: text.into(),
            created_at: Utc::now(),
        });
    }

    /// Turns in insertion order.
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Render the log as `Human: …` / `AI: …` lines.
    pub fn transcript(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("{}: {}", t.role.label(), t.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A conversation session with its own memory.
#[derive(Debug, Default)]
pub struct Session {
    memory: ConversationMemory,
}

impl Session {
    pub fn new() -> Self {
        Self {
            memory: ConversationMemory::new(),
        }
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut ConversationMemory {
        &mut self.memory
    }

    /// Replace the memory with an empty log, returning the previous one.
    pub fn reset(&mut self) -> ConversationMemory {
        std::mem::take(&mut self.memory)
    }
}

/// Sessions keyed by an opaque identifier, created on first use.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<String, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn get_or_create(&mut self, id: &str) -> &mut Session {
        self.sessions.entry(id.to_string()).or_insert_with(|| {
            tracing::debug!("Creating session '{}'", id);
            Session::new()
        })
    }

    /// Reset a session's memory. Unknown sessions are left alone.
    pub fn reset(&mut self, id: &str) -> Option<ConversationMemory> {
        self.sessions.get_mut(id).map(Session::reset)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
