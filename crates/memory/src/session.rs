//! Session memory — an immutable, bounded log of one session's turns.
//!
//! Every mutating operation returns a new [`SessionMemory`]; the receiver
//! is left untouched. The engine publishes the new version back into its
//! registry.

use chrono::{DateTime, Duration, Utc};
use hybridmem_config::SessionConfig;
use hybridmem_core::error::{MemoryError, Result};
use hybridmem_core::message::{Message, Role};
use serde::{Deserialize, Serialize};

/// The data held by one session version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    /// Insertion order, never longer than `max_messages`.
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ttl_ms: u64,
    pub max_messages: usize,
}

/// An immutable session value.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionMemory {
    state: SessionState,
}

/// Reject empty and whitespace-only identifiers, returning the trimmed id.
pub fn validate_session_id(session_id: &str) -> Result<&str> {
    let trimmed = session_id.trim();
    if trimmed.is_empty() {
        return Err(MemoryError::InvalidIdentifier(
            "session id must be a non-empty string".into(),
        ));
    }
    Ok(trimmed)
}

impl SessionMemory {
    /// Create an empty session with default limits (100 messages, 1h TTL).
    pub fn new(session_id: &str) -> Result<Self> {
        Self::with_config(session_id, &SessionConfig::default())
    }

    /// Create an empty session with explicit limits.
    pub fn with_config(session_id: &str, config: &SessionConfig) -> Result<Self> {
        let session_id = validate_session_id(session_id)?;
        if config.max_messages == 0 {
            return Err(MemoryError::Validation("max_messages must be > 0".into()));
        }

        let now = Utc::now();
        Ok(Self {
            state: SessionState {
                session_id: session_id.to_string(),
                messages: Vec::new(),
                created_at: now,
                updated_at: now,
                ttl_ms: config.ttl_ms,
                max_messages: config.max_messages,
            },
        })
    }

    /// Return a new version with `message` appended.
    ///
    /// Oldest entries are evicted first once the log exceeds `max_messages`.
    pub fn append(&self, message: Message) -> Result<Self> {
        message.validate()?;

        let max = self.state.max_messages;
        let keep_from = (self.state.messages.len() + 1).saturating_sub(max);
        let mut messages = Vec::with_capacity(max.min(self.state.messages.len() + 1));
        messages.extend(self.state.messages.iter().skip(keep_from).cloned());
        messages.push(message);

        Ok(self.next_version(messages))
    }

    /// The last `n` messages, or all of them if fewer exist.
    pub fn get_recent(&self, n: usize) -> &[Message] {
        let messages = &self.state.messages;
        &messages[messages.len().saturating_sub(n)..]
    }

    /// Every message from `role`, in original order.
    pub fn get_by_role(&self, role: Role) -> Vec<Message> {
        self.state
            .messages
            .iter()
            .filter(|m| m.role == role)
            .cloned()
            .collect()
    }

    /// Messages with `start <= timestamp <= end`; empty when `start > end`.
    pub fn get_by_time_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Message> {
        if start > end {
            return Vec::new();
        }
        self.state
            .messages
            .iter()
            .filter(|m| m.timestamp >= start && m.timestamp <= end)
            .cloned()
            .collect()
    }

    /// A new version with an empty log. Id, limits and `created_at` carry over.
    pub fn clear(&self) -> Self {
        self.next_version(Vec::new())
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Whether `now - updated_at > ttl`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        let ttl = Duration::milliseconds(i64::try_from(self.state.ttl_ms).unwrap_or(i64::MAX));
        now.signed_duration_since(self.state.updated_at) > ttl
    }

    pub fn session_id(&self) -> &str {
        &self.state.session_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.state.messages
    }

    pub fn len(&self) -> usize {
        self.state.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.messages.is_empty()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    fn next_version(&self, messages: Vec<Message>) -> Self {
        Self {
            state: SessionState {
                session_id: self.state.session_id.clone(),
                messages,
                created_at: self.state.created_at,
                updated_at: Utc::now(),
                ttl_ms: self.state.ttl_ms,
                max_messages: self.state.max_messages,
            },
        }
    }
}
