//! Semantic memory adapter — session-scoped facade over a [`SemanticClient`].
//!
//! Every call is scoped by the owning session id. Client failures are
//! caught here and re-raised as [`MemoryError::SemanticStore`] tagged with
//! the operation, so raw client errors never reach callers.

use crate::composite_id;
use chrono::Utc;
use hybridmem_core::error::{MemoryError, Result, SemanticOperation};
use hybridmem_core::memory::{
    AddOptions, AddResponse, DEFAULT_MEMORY_ROLE, MemoryRecord, MetadataDefaults, RawMemory,
    ScopeOptions, SearchOptions, SemanticClient,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Default number of records returned by [`SemanticMemoryAdapter::search_memory`].
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// A semantic-memory facade bound to a single session.
pub struct SemanticMemoryAdapter {
    client: Arc<dyn SemanticClient>,
    session_id: String,
    default_importance: f64,
}

impl std::fmt::Debug for SemanticMemoryAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticMemoryAdapter")
            .field("client", &self.client.name())
            .field("session_id", &self.session_id)
            .field("default_importance", &self.default_importance)
            .finish()
    }
}

impl SemanticMemoryAdapter {
    /// Bind `client` to `session_id`.
    ///
    /// Fails with `InvalidIdentifier` for a blank id and `Validation` when
    /// no client is supplied.
    pub fn new(
        client: Option<Arc<dyn SemanticClient>>,
        session_id: &str,
        default_importance: f64,
    ) -> Result<Self> {
        let session_id = crate::session::validate_session_id(session_id)?;
        let client = client.ok_or_else(|| {
            MemoryError::Validation("a semantic memory client is required".into())
        })?;

        Ok(Self {
            client,
            session_id: session_id.to_string(),
            default_importance: default_importance.clamp(0.0, 1.0),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Store `content`, returning the id the store assigned (or a
    /// synthesized one when the store's response carries none).
    ///
    /// Caller metadata overrides the defaults except `sessionId`, which is
    /// always the adapter's own session.
    pub async fn add_memory(
        &self,
        content: &str,
        metadata: Option<Map<String, Value>>,
    ) -> Result<String> {
        if content.trim().is_empty() {
            return Err(MemoryError::Validation("memory content must not be empty".into()));
        }

        let metadata = self.merge_metadata(metadata);
        let response = self
            .client
            .add(
                content,
                AddOptions {
                    scope_key: self.session_id.clone(),
                    metadata,
                },
            )
            .await
            .map_err(|e| self.wrap(SemanticOperation::Add, e))?;

        let id = Self::decode_added_id(response);
        debug!(session_id = %self.session_id, memory_id = %id, "Stored semantic memory");
        Ok(id)
    }

    /// Search this session's memories by meaning.
    pub async fn search_memory(&self, query: &str, limit: usize) -> Result<Vec<MemoryRecord>> {
        if query.trim().is_empty() {
            return Err(MemoryError::Validation("search query must not be empty".into()));
        }

        let raw = self
            .client
            .search(
                query,
                SearchOptions {
                    scope_key: self.session_id.clone(),
                    limit,
                },
            )
            .await
            .map_err(|e| self.wrap(SemanticOperation::Search, e))?;

        let records = self.normalize(raw);
        debug!(session_id = %self.session_id, count = records.len(), "Semantic search complete");
        Ok(records)
    }

    /// Every memory stored for this session.
    pub async fn get_all_memories(&self) -> Result<Vec<MemoryRecord>> {
        let raw = self
            .client
            .get_all(ScopeOptions {
                scope_key: self.session_id.clone(),
            })
            .await
            .map_err(|e| self.wrap(SemanticOperation::GetAll, e))?;
        Ok(self.normalize(raw))
    }

    pub async fn delete_memory(&self, id: &str) -> Result<()> {
        if id.trim().is_empty() {
            return Err(MemoryError::Validation("memory id must not be empty".into()));
        }
        self.client
            .delete(id)
            .await
            .map_err(|e| self.wrap(SemanticOperation::Delete, e))
    }

    /// Replace the content of a stored memory.
    ///
    /// Fails with `UnsupportedOperation` when the client has no update
    /// capability.
    pub async fn update_memory(&self, id: &str, content: &str) -> Result<()> {
        if id.trim().is_empty() {
            return Err(MemoryError::Validation("memory id must not be empty".into()));
        }
        if content.trim().is_empty() {
            return Err(MemoryError::Validation("memory content must not be empty".into()));
        }
        if !self.client.supports_update() {
            return Err(MemoryError::UnsupportedOperation(format!(
                "semantic client '{}' does not support update",
                self.client.name()
            )));
        }
        self.client
            .update(id, content)
            .await
            .map_err(|e| self.wrap(SemanticOperation::Update, e))
    }

    // ── Helpers ────────────────────────────────────────────────────────────

    fn merge_metadata(&self, overrides: Option<Map<String, Value>>) -> Map<String, Value> {
        let mut metadata = Map::new();
        metadata.insert("timestamp".into(), Value::String(Utc::now().to_rfc3339()));
        metadata.insert("importance".into(), Value::from(self.default_importance));
        metadata.insert("role".into(), Value::String(DEFAULT_MEMORY_ROLE.into()));
        if let Some(overrides) = overrides {
            metadata.extend(overrides);
        }
        metadata.insert("sessionId".into(), Value::String(self.session_id.clone()));
        metadata
    }

    fn decode_added_id(response: AddResponse) -> String {
        let id = match response {
            AddResponse::Many(records) => records.into_iter().next().and_then(|r| r.id),
            AddResponse::One { id } => Some(id),
            AddResponse::Empty => None,
        };
        id.filter(|id| !id.is_empty())
            .unwrap_or_else(|| composite_id("mem"))
    }

    fn normalize(&self, raw: Vec<RawMemory>) -> Vec<MemoryRecord> {
        let defaults = MetadataDefaults {
            session_id: &self.session_id,
            importance: self.default_importance,
        };
        raw.into_iter()
            .map(|r| MemoryRecord::from_raw(r, &defaults, || composite_id("mem")))
            .collect()
    }

    fn wrap(
        &self,
        operation: SemanticOperation,
        source: hybridmem_core::error::SemanticClientError,
    ) -> MemoryError {
        warn!(
            session_id = %self.session_id,
            client = self.client.name(),
            %operation,
            error = %source,
            "Semantic store call failed"
        );
        MemoryError::semantic(operation, source)
    }
}
