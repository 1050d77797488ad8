//! Semantic memory contract — session-scoped facts recalled by meaning.
//!
//! The external store is reached through [`SemanticClient`]. Its responses
//! come back as [`RawMemory`] records, which are normalized into the
//! canonical [`MemoryRecord`] shape before anything else sees them.

use crate::error::SemanticClientError;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Importance assigned when neither the caller nor the store provides one.
pub const DEFAULT_IMPORTANCE: f64 = 0.5;

/// Relevance assigned to records the store returns without a score.
pub const DEFAULT_RELEVANCE: f32 = 1.0;

/// Role recorded for memories added without an explicit role.
pub const DEFAULT_MEMORY_ROLE: &str = "user";

/// Metadata attached to every canonical memory record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryMetadata {
    pub timestamp: DateTime<Utc>,

    /// Clamped into `[0, 1]`.
    pub importance: f64,

    pub role: String,

    pub session_id: String,

    /// Any caller-supplied keys beyond the well-known ones.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Fallbacks used while decoding metadata coming back from the store.
#[derive(Debug, Clone)]
pub struct MetadataDefaults<'a> {
    pub session_id: &'a str,
    pub importance: f64,
}

impl MemoryMetadata {
    /// Decode a loosely typed metadata map, filling gaps from `defaults`.
    ///
    /// `timestamp` may be an RFC 3339 string or epoch milliseconds.
    pub fn from_map(map: Option<Map<String, Value>>, defaults: &MetadataDefaults<'_>) -> Self {
        let mut extra = map.unwrap_or_default();

        let timestamp = extra
            .remove("timestamp")
            .and_then(|v| parse_timestamp(&v))
            .unwrap_or_else(Utc::now);
        let importance = extra
            .remove("importance")
            .and_then(|v| v.as_f64())
            .unwrap_or(defaults.importance)
            .clamp(0.0, 1.0);
        let role = match extra.remove("role") {
            Some(Value::String(role)) if !role.is_empty() => role,
            _ => DEFAULT_MEMORY_ROLE.to_string(),
        };
        let session_id = match extra.remove("sessionId") {
            Some(Value::String(id)) if !id.is_empty() => id,
            _ => defaults.session_id.to_string(),
        };

        Self {
            timestamp,
            importance,
            role,
            session_id,
            extra,
        }
    }
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

/// A canonical, session-scoped memory record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryRecord {
    pub id: String,
    pub content: String,
    pub metadata: MemoryMetadata,
    pub relevance_score: f32,
}

impl MemoryRecord {
    /// Normalize one raw store record.
    ///
    /// `fallback_id` is only called when the record carries no id.
    pub fn from_raw(
        raw: RawMemory,
        defaults: &MetadataDefaults<'_>,
        fallback_id: impl FnOnce() -> String,
    ) -> Self {
        let content = raw.content().unwrap_or_default().to_string();
        let id = match raw.id {
            Some(id) if !id.is_empty() => id,
            _ => fallback_id(),
        };
        Self {
            id,
            content,
            metadata: MemoryMetadata::from_map(raw.metadata, defaults),
            relevance_score: raw.score.unwrap_or(DEFAULT_RELEVANCE),
        }
    }
}

// --- Raw store shapes ---

/// A record as returned by the external store.
///
/// Stores disagree on where the text lives: either `memory` at the top
/// level or nested as `data.memory`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMemory {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<RawMemoryData>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMemoryData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

impl RawMemory {
    /// The record text, preferring the top-level `memory` field.
    pub fn content(&self) -> Option<&str> {
        self.memory
            .as_deref()
            .or_else(|| self.data.as_ref().and_then(|d| d.memory.as_deref()))
    }
}

/// The documented response shapes of the store's `add` capability.
///
/// Anything else (an object without a string `id`, a bare string, a
/// number) is a decode error rather than a silent fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AddResponse {
    /// A list of created records; the first one identifies the memory.
    Many(Vec<RawMemory>),
    /// A single created record. Other fields on the object are ignored.
    One { id: String },
    /// `null`: nothing useful came back.
    Empty,
}

/// Options for [`SemanticClient::add`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddOptions {
    /// Isolates records per session.
    pub scope_key: String,
    pub metadata: Map<String, Value>,
}

/// Options for [`SemanticClient::search`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOptions {
    pub scope_key: String,
    pub limit: usize,
}

/// Options for [`SemanticClient::get_all`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeOptions {
    pub scope_key: String,
}

/// The external semantic-memory client contract.
///
/// Implementations: `InMemorySemanticClient` in `hybridmem-memory` (for
/// tests and ephemeral use), or a network client wrapping a hosted store.
#[async_trait]
pub trait SemanticClient: Send + Sync {
    /// The client name (e.g., "in_memory", "mem0").
    fn name(&self) -> &str;

    /// Store new content under `options.scope_key`.
    async fn add(
        &self,
        content: &str,
        options: AddOptions,
    ) -> Result<AddResponse, SemanticClientError>;

    /// Search records in one scope by meaning.
    async fn search(
        &self,
        query: &str,
        options: SearchOptions,
    ) -> Result<Vec<RawMemory>, SemanticClientError>;

    /// List every record in one scope.
    async fn get_all(&self, options: ScopeOptions) -> Result<Vec<RawMemory>, SemanticClientError>;

    /// Delete a record by ID.
    async fn delete(&self, id: &str) -> Result<(), SemanticClientError>;

    /// Whether [`update`](Self::update) is implemented.
    fn supports_update(&self) -> bool {
        false
    }

    /// Replace the content of a record.
    async fn update(&self, _id: &str, _content: &str) -> Result<(), SemanticClientError> {
        Err(SemanticClientError::NotImplemented("update"))
    }
}
