//! Hybrid memory engine — the single entry point for session, message,
//! semantic-memory and context operations.
//!
//! The engine owns two registries:
//! - session id → [`SessionMemory`] (the current immutable version)
//! - session id → [`SemanticMemoryAdapter`] (created lazily on first use)
//!
//! Appends run read → compute → publish under the sessions write lock, so
//! two concurrent appends to the same session never both build on the same
//! prior version. Locks are always taken sessions first, then adapters, and
//! are never held across an `.await`.

use crate::composite_id;
use crate::context::{BuildContext, ContextAssembler};
use crate::semantic::{DEFAULT_SEARCH_LIMIT, SemanticMemoryAdapter};
use crate::session::{SessionMemory, validate_session_id};
use chrono::{DateTime, Utc};
use hybridmem_config::MemoryConfig;
use hybridmem_core::error::{MemoryError, Result};
use hybridmem_core::memory::{MemoryRecord, SemanticClient};
use hybridmem_core::message::{Message, Role};
use hybridmem_core::persona::PersonaProvider;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// Aggregate counters over the engine's registries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    /// Registered sessions.
    pub session_count: usize,
    /// Sessions whose short-term log holds at least one message.
    pub short_term_memory_count: usize,
    /// Messages across all session logs.
    pub total_messages: usize,
    /// Sessions with an instantiated semantic adapter.
    pub semantic_adapter_count: usize,
}

type Registry<T> = RwLock<HashMap<String, T>>;

pub struct HybridMemoryEngine {
    config: MemoryConfig,
    sessions: Registry<SessionMemory>,
    adapters: Registry<Arc<SemanticMemoryAdapter>>,
    semantic_client: Option<Arc<dyn SemanticClient>>,
    assembler: ContextAssembler,
}

impl HybridMemoryEngine {
    pub fn new(config: MemoryConfig) -> Self {
        let assembler = ContextAssembler::new(config.context.clone());
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
            adapters: RwLock::new(HashMap::new()),
            semantic_client: None,
            assembler,
        }
    }

    /// Enable semantic memory operations backed by `client`.
    pub fn with_semantic_client(mut self, client: Arc<dyn SemanticClient>) -> Self {
        self.semantic_client = Some(client);
        self
    }

    /// Open every built context with the prompt from `persona`.
    pub fn with_persona(mut self, persona: Arc<dyn PersonaProvider>) -> Self {
        self.assembler = self.assembler.with_persona(persona);
        self
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    // ── Sessions ──────────────────────────────────────────────────────────

    /// Register a new empty session, generating an id when none is given.
    ///
    /// Returns the (trimmed) id.
    pub fn create_session(&self, session_id: Option<&str>) -> Result<String> {
        let session = match session_id {
            Some(id) => SessionMemory::with_config(id, &self.config.session)?,
            None => SessionMemory::with_config(&composite_id("session"), &self.config.session)?,
        };
        let id = session.session_id().to_string();

        let mut sessions = self.sessions_write();
        if sessions.contains_key(&id) {
            return Err(MemoryError::Validation(format!("session {id} already exists")));
        }
        sessions.insert(id.clone(), session);
        info!(session_id = %id, "Session created");
        Ok(id)
    }

    /// A snapshot of the current session version, if registered.
    pub fn get_session(&self, session_id: &str) -> Result<Option<SessionMemory>> {
        let id = validate_session_id(session_id)?;
        Ok(self.sessions_read().get(id).cloned())
    }

    pub fn has_session(&self, session_id: &str) -> Result<bool> {
        let id = validate_session_id(session_id)?;
        Ok(self.sessions_read().contains_key(id))
    }

    /// Remove a session and its semantic adapter. Returns whether it existed.
    pub fn delete_session(&self, session_id: &str) -> Result<bool> {
        let id = validate_session_id(session_id)?;
        let mut sessions = self.sessions_write();
        let existed = sessions.remove(id).is_some();
        self.adapters_write().remove(id);
        drop(sessions);

        if existed {
            info!(session_id = %id, "Session deleted");
        }
        Ok(existed)
    }

    /// Registered session ids, sorted.
    pub fn list_sessions(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions_read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Empty a session's log, keeping the session registered.
    pub fn clear_session(&self, session_id: &str) -> Result<()> {
        let id = validate_session_id(session_id)?;
        let mut sessions = self.sessions_write();
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| MemoryError::SessionNotFound(id.to_string()))?;
        *session = session.clear();
        Ok(())
    }

    /// Remove every expired session (and its adapter) in one pass.
    ///
    /// Scheduling is the caller's concern.
    pub fn cleanup_expired_sessions(&self) -> usize {
        self.cleanup_expired_sessions_at(Utc::now())
    }

    /// [`cleanup_expired_sessions`](Self::cleanup_expired_sessions) against
    /// an explicit clock reading.
    pub fn cleanup_expired_sessions_at(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions_write();
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| s.is_expired_at(now))
            .map(|(id, _)| id.clone())
            .collect();

        let mut adapters = self.adapters_write();
        for id in &expired {
            sessions.remove(id);
            adapters.remove(id);
        }

        if !expired.is_empty() {
            info!(removed = expired.len(), "Expired sessions cleaned up");
        }
        expired.len()
    }

    /// Drop every session and adapter.
    pub fn destroy(&self) {
        let mut sessions = self.sessions_write();
        let count = sessions.len();
        sessions.clear();
        self.adapters_write().clear();
        info!(sessions = count, "Memory engine destroyed");
    }

    // ── Messages ──────────────────────────────────────────────────────────

    /// Append a turn given as a role name and text.
    ///
    /// Unknown roles fail with `InvalidMessage`.
    pub fn add_message(&self, session_id: &str, role: &str, content: &str) -> Result<SessionMemory> {
        validate_session_id(session_id)?;
        let role: Role = role.parse()?;
        self.add_session_message(session_id, Message::new(role, content))
    }

    /// Append `message` and publish the new session version.
    pub fn add_session_message(&self, session_id: &str, message: Message) -> Result<SessionMemory> {
        let id = validate_session_id(session_id)?;
        message.validate()?;

        let mut sessions = self.sessions_write();
        if !sessions.contains_key(id) && self.config.session.auto_create {
            sessions.insert(
                id.to_string(),
                SessionMemory::with_config(id, &self.config.session)?,
            );
            info!(session_id = %id, "Session auto-created on first message");
        }
        let current = sessions
            .get(id)
            .ok_or_else(|| MemoryError::SessionNotFound(id.to_string()))?;

        let next = current.append(message)?;
        sessions.insert(id.to_string(), next.clone());
        debug!(session_id = %id, messages = next.len(), "Message appended");
        Ok(next)
    }

    pub fn get_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        self.with_session(session_id, |s| s.messages().to_vec())
    }

    pub fn get_recent_messages(&self, session_id: &str, n: usize) -> Result<Vec<Message>> {
        self.with_session(session_id, |s| s.get_recent(n).to_vec())
    }

    // ── Semantic memory ───────────────────────────────────────────────────

    /// Store a semantic memory for the session.
    ///
    /// Fails with `Validation` when no semantic client is configured.
    pub async fn add_memory(
        &self,
        session_id: &str,
        content: &str,
        metadata: Option<Map<String, Value>>,
    ) -> Result<String> {
        validate_session_id(session_id)?;
        if self.semantic_client.is_none() {
            return Err(MemoryError::Validation(
                "semantic memory is not configured".into(),
            ));
        }
        let adapter = self.require_adapter(session_id)?;
        adapter.add_memory(content, metadata).await
    }

    /// Search the session's semantic memories. Empty when no client is
    /// configured.
    pub async fn search_memory(
        &self,
        session_id: &str,
        query: &str,
        limit: Option<usize>,
    ) -> Result<Vec<MemoryRecord>> {
        match self.adapter(session_id)? {
            Some(adapter) => {
                adapter
                    .search_memory(query, limit.unwrap_or(DEFAULT_SEARCH_LIMIT))
                    .await
            }
            None => Ok(Vec::new()),
        }
    }

    /// Every semantic memory of the session. Empty when no client is
    /// configured.
    pub async fn get_all_memories(&self, session_id: &str) -> Result<Vec<MemoryRecord>> {
        match self.adapter(session_id)? {
            Some(adapter) => adapter.get_all_memories().await,
            None => Ok(Vec::new()),
        }
    }

    /// Delete one semantic memory. A no-op when no client is configured.
    pub async fn delete_memory(&self, session_id: &str, memory_id: &str) -> Result<()> {
        match self.adapter(session_id)? {
            Some(adapter) => adapter.delete_memory(memory_id).await,
            None => Ok(()),
        }
    }

    /// Replace the content of one semantic memory.
    ///
    /// Fails with `Validation` when no semantic client is configured.
    pub async fn update_memory(&self, session_id: &str, memory_id: &str, content: &str) -> Result<()> {
        validate_session_id(session_id)?;
        if self.semantic_client.is_none() {
            return Err(MemoryError::Validation(
                "semantic memory is not configured".into(),
            ));
        }
        let adapter = self.require_adapter(session_id)?;
        adapter.update_memory(memory_id, content).await
    }

    // ── Context ───────────────────────────────────────────────────────────

    /// Build a token-budgeted context for `current_message`, with semantic
    /// recall when a client is configured.
    pub async fn build_context(&self, session_id: &str, current_message: &str) -> Result<BuildContext> {
        let id = validate_session_id(session_id)?;
        let session = self.snapshot(id)?;
        let adapter = self.adapter(id)?;
        self.assembler
            .build(&session, adapter.as_deref(), current_message)
            .await
    }

    /// Build context without semantic recall.
    pub fn build_context_sync(&self, session_id: &str, current_message: &str) -> Result<BuildContext> {
        let id = validate_session_id(session_id)?;
        let session = self.snapshot(id)?;
        self.assembler.build_sync(&session, current_message)
    }

    pub fn get_stats(&self) -> EngineStats {
        let sessions = self.sessions_read();
        let semantic_adapter_count = self.adapters_read().len();
        EngineStats {
            session_count: sessions.len(),
            short_term_memory_count: sessions.values().filter(|s| !s.is_empty()).count(),
            total_messages: sessions.values().map(SessionMemory::len).sum(),
            semantic_adapter_count,
        }
    }

    // ── Helpers ───────────────────────────────────────────────────────────

    fn with_session<T>(&self, session_id: &str, f: impl FnOnce(&SessionMemory) -> T) -> Result<T> {
        let id = validate_session_id(session_id)?;
        let sessions = self.sessions_read();
        let session = sessions
            .get(id)
            .ok_or_else(|| MemoryError::SessionNotFound(id.to_string()))?;
        Ok(f(session))
    }

    fn snapshot(&self, session_id: &str) -> Result<SessionMemory> {
        self.with_session(session_id, SessionMemory::clone)
    }

    /// The session's adapter, created on first use. `None` when no client
    /// is configured.
    fn adapter(&self, session_id: &str) -> Result<Option<Arc<SemanticMemoryAdapter>>> {
        let id = validate_session_id(session_id)?;
        let Some(client) = &self.semantic_client else {
            return Ok(None);
        };

        let sessions = self.sessions_read();
        if !sessions.contains_key(id) {
            return Err(MemoryError::SessionNotFound(id.to_string()));
        }

        let mut adapters = self.adapters_write();
        if let Some(existing) = adapters.get(id) {
            return Ok(Some(existing.clone()));
        }
        let adapter = Arc::new(SemanticMemoryAdapter::new(
            Some(client.clone()),
            id,
            self.config.semantic.default_importance,
        )?);
        adapters.insert(id.to_string(), adapter.clone());
        debug!(session_id = %id, client = client.name(), "Semantic adapter created");
        Ok(Some(adapter))
    }

    fn require_adapter(&self, session_id: &str) -> Result<Arc<SemanticMemoryAdapter>> {
        self.adapter(session_id)?.ok_or_else(|| {
            MemoryError::Validation("semantic memory is not configured".into())
        })
    }

    fn sessions_read(&self) -> RwLockReadGuard<'_, HashMap<String, SessionMemory>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn sessions_write(&self) -> RwLockWriteGuard<'_, HashMap<String, SessionMemory>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn adapters_read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<SemanticMemoryAdapter>>> {
        self.adapters.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn adapters_write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<SemanticMemoryAdapter>>> {
        self.adapters.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StaticPersona;
    use crate::in_memory::InMemorySemanticClient;
    use chrono::Duration;

    fn engine() -> HybridMemoryEngine {
        HybridMemoryEngine::new(MemoryConfig::default())
    }

    fn semantic_engine() -> HybridMemoryEngine {
        engine().with_semantic_client(Arc::new(InMemorySemanticClient::new()))
    }

    #[test]
    fn create_session_generates_id() {
        let engine = engine();
        let id = engine.create_session(None).unwrap();
        assert!(id.starts_with("session_"));
        assert!(engine.has_session(&id).unwrap());
    }

    #[test]
    fn duplicate_session_is_rejected() {
        let engine = engine();
        engine.create_session(Some("chat")).unwrap();
        assert!(matches!(
            engine.create_session(Some(" chat ")),
            Err(MemoryError::Validation(_))
        ));
    }

    #[test]
    fn add_message_republishes_new_version() {
        let engine = engine();
        engine.create_session(Some("s")).unwrap();
        let before = engine.get_session("s").unwrap().unwrap();

        engine.add_message("s", "user", "hello").unwrap();
        engine.add_message("s", "assistant", "hi!").unwrap();

        assert!(before.is_empty());
        let messages = engine.get_messages("s").unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(engine.get_recent_messages("s", 1).unwrap()[0].content, "hi!");
    }

    #[test]
    fn bad_role_and_content_are_invalid_messages() {
        let engine = engine();
        engine.create_session(Some("s")).unwrap();
        assert!(matches!(
            engine.add_message("s", "narrator", "once upon a time"),
            Err(MemoryError::InvalidMessage(_))
        ));
        assert!(matches!(
            engine.add_message("s", "user", ""),
            Err(MemoryError::InvalidMessage(_))
        ));
        assert!(engine.get_messages("s").unwrap().is_empty());
    }

    #[test]
    fn unknown_session_is_not_found() {
        let engine = engine();
        assert!(matches!(
            engine.add_message("ghost", "user", "hi"),
            Err(MemoryError::SessionNotFound(_))
        ));
        assert!(matches!(engine.clear_session("ghost"), Err(MemoryError::SessionNotFound(_))));
        assert_eq!(engine.get_session("ghost").unwrap(), None);
    }

    #[test]
    fn auto_create_registers_on_first_append() {
        let mut config = MemoryConfig::default();
        config.session.auto_create = true;
        let engine = HybridMemoryEngine::new(config);

        engine.add_message("fresh", "user", "hi").unwrap();
        assert_eq!(engine.list_sessions(), vec!["fresh".to_string()]);
    }

    #[test]
    fn clear_session_keeps_registration() {
        let engine = engine();
        engine.create_session(Some("s")).unwrap();
        engine.add_message("s", "user", "hello").unwrap();

        engine.clear_session("s").unwrap();
        assert!(engine.has_session("s").unwrap());
        assert!(engine.get_messages("s").unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_session_discards_adapter() {
        let engine = semantic_engine();
        engine.create_session(Some("s")).unwrap();
        engine.add_memory("s", "likes green tea", None).await.unwrap();
        assert_eq!(engine.get_stats().semantic_adapter_count, 1);

        assert!(engine.delete_session("s").unwrap());
        assert!(!engine.delete_session("s").unwrap());
        assert_eq!(engine.get_stats().semantic_adapter_count, 0);
    }

    #[test]
    fn cleanup_removes_only_expired() {
        let mut config = MemoryConfig::default();
        config.session.ttl_ms = 1_000;
        let engine = HybridMemoryEngine::new(config);
        engine.create_session(Some("a")).unwrap();
        engine.create_session(Some("b")).unwrap();

        assert_eq!(engine.cleanup_expired_sessions(), 0);
        let later = Utc::now() + Duration::seconds(5);
        assert_eq!(engine.cleanup_expired_sessions_at(later), 2);
        assert!(engine.list_sessions().is_empty());
    }

    #[test]
    fn destroy_forgets_everything() {
        let engine = engine();
        engine.create_session(Some("s")).unwrap();
        engine.destroy();

        assert!(matches!(
            engine.get_messages("s"),
            Err(MemoryError::SessionNotFound(_))
        ));
        assert!(matches!(
            engine.build_context_sync("s", "hi"),
            Err(MemoryError::SessionNotFound(_))
        ));
        assert_eq!(engine.get_stats().session_count, 0);
    }

    #[tokio::test]
    async fn memory_ops_without_client() {
        let engine = engine();
        engine.create_session(Some("s")).unwrap();

        assert!(engine.search_memory("s", "tea", None).await.unwrap().is_empty());
        assert!(engine.get_all_memories("s").await.unwrap().is_empty());
        engine.delete_memory("s", "mem_1").await.unwrap();
        assert!(matches!(
            engine.add_memory("s", "fact", None).await,
            Err(MemoryError::Validation(_))
        ));
        assert!(matches!(
            engine.update_memory("s", "mem_1", "fact").await,
            Err(MemoryError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn memory_roundtrip_through_adapter() {
        let engine = semantic_engine();
        engine.create_session(Some("s")).unwrap();
        let id = engine.add_memory("s", "prefers window seats", None).await.unwrap();

        let found = engine.search_memory("s", "window", Some(3)).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, id);
        assert_eq!(found[0].metadata.session_id, "s");

        engine.update_memory("s", &id, "prefers aisle seats").await.unwrap();
        assert_eq!(engine.get_all_memories("s").await.unwrap()[0].content, "prefers aisle seats");

        engine.delete_memory("s", &id).await.unwrap();
        assert!(engine.get_all_memories("s").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn memory_ops_require_registered_session() {
        let engine = semantic_engine();
        assert!(matches!(
            engine.search_memory("ghost", "q", None).await,
            Err(MemoryError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn build_context_includes_recall_and_persona() {
        let engine = semantic_engine().with_persona(Arc::new(StaticPersona::new("You are Mika.")));
        engine.create_session(Some("s")).unwrap();
        engine.add_memory("s", "user owns a cat named Tofu", None).await.unwrap();
        engine.add_message("s", "user", "I just got home").unwrap();

        let ctx = engine.build_context("s", "what is my cat called").await.unwrap();
        assert!(ctx.full_context.starts_with("You are Mika."));
        assert!(ctx.full_context.contains("1. user owns a cat named Tofu (relevance:"));
        assert_eq!(ctx.relevant_memories.len(), 1);

        let sync_ctx = engine.build_context_sync("s", "what is my cat called").unwrap();
        assert!(sync_ctx.relevant_memories.is_empty());
        assert!(!sync_ctx.full_context.contains("Relevant Memories"));
    }

    #[test]
    fn stats_aggregate_registries() {
        let engine = engine();
        engine.create_session(Some("a")).unwrap();
        engine.create_session(Some("b")).unwrap();
        engine.add_message("a", "user", "one").unwrap();
        engine.add_message("a", "assistant", "two").unwrap();

        assert_eq!(
            engine.get_stats(),
            EngineStats {
                session_count: 2,
                short_term_memory_count: 1,
                total_messages: 2,
                semantic_adapter_count: 0,
            }
        );
    }
}
