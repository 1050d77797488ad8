//! Context assembly pipeline.
//!
//! Assembles a single prompt string from four sections, in fixed order:
//!
//! 1. **Persona** (system prompt): verbatim, never trimmed
//! 2. **Relevant Memories** (semantic recall): numbered, with relevance
//! 3. **Recent Conversation** (session turns): oldest turns dropped first
//! 4. **Current Message** (the input being answered): always last, never trimmed
//!
//! # Determinism
//!
//! Given the same persona prompt, memories, turns and input, assembly
//! always produces the same string. Truncation depends only on the token
//! estimate, never on time or randomness.

use crate::context::token;
use crate::semantic::SemanticMemoryAdapter;
use crate::session::SessionMemory;
use hybridmem_config::ContextConfig;
use hybridmem_core::error::{MemoryError, Result};
use hybridmem_core::memory::MemoryRecord;
use hybridmem_core::message::Message;
use hybridmem_core::persona::PersonaProvider;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

// ── Section markers ───────────────────────────────────────────────────────

pub const MEMORIES_HEADER: &str = "## Relevant Memories";
pub const CONVERSATION_HEADER: &str = "## Recent Conversation";
pub const CURRENT_MESSAGE_HEADER: &str = "## Current Message";

const SECTION_SEPARATOR: &str = "\n\n";

// ── Types ─────────────────────────────────────────────────────────────────

/// The assembled context, ready for an LLM call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildContext {
    /// Persona prompt as returned by the provider (empty when disabled).
    pub system_prompt: String,
    /// Memories recalled for the current message.
    pub relevant_memories: Vec<MemoryRecord>,
    /// Recent turns offered to the assembler, oldest first.
    pub recent_messages: Vec<Message>,
    /// The final, budget-bounded context string.
    pub full_context: String,
    /// Token estimate of `full_context`.
    pub token_count: usize,
    /// Configured token budget.
    pub budget: usize,
    /// Whether any content was dropped to fit the budget.
    pub truncated: bool,
}

/// The rendered sections of one context, kept apart so truncation can
/// work on whole conversation lines.
struct Sections {
    /// Persona and memories, already joined.
    head: Vec<String>,
    /// One line per turn. The header is rendered even when this is empty.
    conversation: Vec<String>,
    current: String,
}

impl Sections {
    fn render(&self) -> String {
        self.render_with(&self.conversation)
    }

    fn render_with(&self, conversation: &[String]) -> String {
        let mut section = String::from(CONVERSATION_HEADER);
        for line in conversation {
            section.push('\n');
            section.push_str(line);
        }

        let mut parts: Vec<String> = self.head.clone();
        parts.push(section);
        parts.push(self.current.clone());
        parts.join(SECTION_SEPARATOR)
    }
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// The context assembler. Stateless apart from its configuration; create
/// one and reuse it.
pub struct ContextAssembler {
    config: ContextConfig,
    persona: Option<Arc<dyn PersonaProvider>>,
}

impl ContextAssembler {
    pub fn new(config: ContextConfig) -> Self {
        Self {
            config,
            persona: None,
        }
    }

    /// Create an assembler with the default budget (4096 tokens).
    pub fn with_default_budget() -> Self {
        Self::new(ContextConfig::default())
    }

    /// Attach the provider whose prompt opens every context.
    pub fn with_persona(mut self, persona: Arc<dyn PersonaProvider>) -> Self {
        self.persona = Some(persona);
        self
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Assemble context for `current_message`, recalling semantic
    /// memories through `recall` when enabled.
    ///
    /// A blank message fails with `Validation` before anything else runs.
    /// Persona and recall failures come back as `ContextBuild`.
    pub async fn build(
        &self,
        session: &SessionMemory,
        recall: Option<&SemanticMemoryAdapter>,
        current_message: &str,
    ) -> Result<BuildContext> {
        Self::validate_current(current_message)?;
        let session_id = session.session_id();

        let system_prompt = self.system_prompt(session_id)?;

        let relevant_memories = match recall {
            Some(adapter) if self.config.enable_semantic_recall => adapter
                .search_memory(current_message, self.config.recall_limit)
                .await
                .map_err(|e| MemoryError::context_build(session_id, e))?,
            _ => Vec::new(),
        };
        debug!(
            session_id,
            count = relevant_memories.len(),
            "Recalled memories for context"
        );

        let recent = session.get_recent(self.config.max_recent_messages);
        Ok(self.assemble(system_prompt, relevant_memories, recent, current_message))
    }

    /// Assemble context without semantic recall, for callers that cannot
    /// await.
    pub fn build_sync(&self, session: &SessionMemory, current_message: &str) -> Result<BuildContext> {
        Self::validate_current(current_message)?;
        let system_prompt = self.system_prompt(session.session_id())?;
        let recent = session.get_recent(self.config.max_recent_messages);
        Ok(self.assemble(system_prompt, Vec::new(), recent, current_message))
    }

    /// Render all sections, then enforce the token budget.
    pub fn assemble(
        &self,
        system_prompt: String,
        relevant_memories: Vec<MemoryRecord>,
        recent_messages: &[Message],
        current_message: &str,
    ) -> BuildContext {
        let sections = Self::sections(
            &system_prompt,
            &relevant_memories,
            recent_messages,
            current_message,
        );
        let rendered = sections.render();
        let budget = self.config.token_budget;

        let (full_context, truncated) = if token::estimate_tokens(&rendered) <= budget {
            (rendered, false)
        } else {
            (Self::truncate(&sections, budget), true)
        };
        let token_count = token::estimate_tokens(&full_context);

        if truncated {
            debug!(budget, token_count, "Context truncated to fit budget");
        }

        BuildContext {
            system_prompt,
            relevant_memories,
            recent_messages: recent_messages.to_vec(),
            full_context,
            token_count,
            budget,
            truncated,
        }
    }

    // ── Private helpers ───────────────────────────────────────────────────

    fn validate_current(current_message: &str) -> Result<()> {
        if current_message.trim().is_empty() {
            return Err(MemoryError::Validation(
                "current message must be non-empty text".into(),
            ));
        }
        Ok(())
    }

    fn system_prompt(&self, session_id: &str) -> Result<String> {
        match &self.persona {
            Some(persona) if self.config.enable_persona => persona
                .system_prompt()
                .map_err(|e| MemoryError::context_build(session_id, e)),
            _ => Ok(String::new()),
        }
    }

    fn sections(
        system_prompt: &str,
        memories: &[MemoryRecord],
        messages: &[Message],
        current_message: &str,
    ) -> Sections {
        let mut head = Vec::new();
        if !system_prompt.is_empty() {
            head.push(system_prompt.to_string());
        }
        if !memories.is_empty() {
            let mut section = String::from(MEMORIES_HEADER);
            for (i, record) in memories.iter().enumerate() {
                let relevance = (record.relevance_score * 100.0).round() as i64;
                section.push_str(&format!(
                    "\n{}. {} (relevance: {}%)",
                    i + 1,
                    record.content,
                    relevance
                ));
            }
            head.push(section);
        }

        let conversation = messages
            .iter()
            .map(|m| format!("{}: {}", m.role.label(), m.content))
            .collect();

        Sections {
            head,
            conversation,
            current: format!("{CURRENT_MESSAGE_HEADER}\nUser: {current_message}"),
        }
    }

    /// Drop the oldest conversation lines until the context fits.
    ///
    /// Persona, memories, the conversation header and the current message
    /// are fixed. Lines are admitted newest first while the whole context
    /// stays within budget. The result can still exceed the budget when the
    /// fixed sections alone do.
    fn truncate(sections: &Sections, budget: usize) -> String {
        let lines = &sections.conversation;
        let mut kept: Vec<String> = Vec::new();
        for line in lines.iter().rev() {
            let mut candidate: Vec<String> = Vec::with_capacity(kept.len() + 1);
            candidate.push(line.clone());
            candidate.extend(kept.iter().cloned());
            if token::estimate_tokens(&sections.render_with(&candidate)) > budget {
                break;
            }
            kept = candidate;
        }

        debug!(
            kept = kept.len(),
            dropped = lines.len() - kept.len(),
            "Oldest turns dropped (sliding window)"
        );
        sections.render_with(&kept)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::persona::StaticPersona;
    use async_trait::async_trait;
    use hybridmem_core::error::{PersonaError, SemanticClientError, SemanticOperation};
    use hybridmem_core::memory::{
        AddOptions, AddResponse, MemoryMetadata, MetadataDefaults, RawMemory, ScopeOptions,
        SearchOptions, SemanticClient,
    };

    // ── Helpers ────────────────────────────────────────────────────────

    fn assembler(budget: usize) -> ContextAssembler {
        ContextAssembler::new(ContextConfig {
            token_budget: budget,
            ..ContextConfig::default()
        })
    }

    fn test_memory(content: &str, score: f32) -> MemoryRecord {
        MemoryRecord {
            id: "mem_1".into(),
            content: content.to_string(),
            metadata: MemoryMetadata::from_map(
                None,
                &MetadataDefaults {
                    session_id: "s",
                    importance: 0.5,
                },
            ),
            relevance_score: score,
        }
    }

    fn session_with(turns: &[(&str, &str)]) -> SessionMemory {
        turns.iter().fold(SessionMemory::new("s").unwrap(), |s, (role, content)| {
            let role = role.parse().unwrap();
            s.append(Message::new(role, *content)).unwrap()
        })
    }

    struct BrokenPersona;

    /// A semantic client whose every call fails.
    struct FailingClient;

    fn refused() -> SemanticClientError {
        SemanticClientError::Transport("connection refused".into())
    }

    #[async_trait]
    impl SemanticClient for FailingClient {
        fn name(&self) -> &str {
            "failing"
        }
        async fn add(&self, _: &str, _: AddOptions) -> std::result::Result<AddResponse, SemanticClientError> {
            Err(refused())
        }
        async fn search(
            &self,
            _: &str,
            _: SearchOptions,
        ) -> std::result::Result<Vec<RawMemory>, SemanticClientError> {
            Err(refused())
        }
        async fn get_all(&self, _: ScopeOptions) -> std::result::Result<Vec<RawMemory>, SemanticClientError> {
            Err(refused())
        }
        async fn delete(&self, _: &str) -> std::result::Result<(), SemanticClientError> {
            Err(refused())
        }
    }

    impl PersonaProvider for BrokenPersona {
        fn system_prompt(&self) -> std::result::Result<String, PersonaError> {
            Err(PersonaError("lore database unavailable".into()))
        }
    }

    // ── Tests ──────────────────────────────────────────────────────────

    #[test]
    fn sections_render_in_fixed_order() {
        let asm = assembler(4096).with_persona(Arc::new(StaticPersona::new("You are Mika.")));
        let session = session_with(&[("user", "hi"), ("assistant", "hello there")]);

        let ctx = asm.build_sync(&session, "how are you?").unwrap();
        assert_eq!(
            ctx.full_context,
            "You are Mika.\n\n\
             ## Recent Conversation\nUser: hi\nAssistant: hello there\n\n\
             ## Current Message\nUser: how are you?"
        );
        assert!(!ctx.truncated);
        assert_eq!(ctx.token_count, token::estimate_tokens(&ctx.full_context));
    }

    #[test]
    fn memories_render_as_numbered_list() {
        let asm = assembler(4096);
        let ctx = asm.assemble(
            String::new(),
            vec![test_memory("likes tea", 0.876), test_memory("lives in Osaka", 1.0)],
            &[],
            "hello",
        );
        assert_eq!(
            ctx.full_context,
            "## Relevant Memories\n\
             1. likes tea (relevance: 88%)\n\
             2. lives in Osaka (relevance: 100%)\n\n\
             ## Recent Conversation\n\n\
             ## Current Message\nUser: hello"
        );
    }

    #[test]
    fn blank_current_message_is_validation_error() {
        let asm = assembler(4096).with_persona(Arc::new(BrokenPersona));
        let session = session_with(&[]);
        // Validation wins over the broken persona.
        assert!(matches!(
            asm.build_sync(&session, "  "),
            Err(MemoryError::Validation(_))
        ));
    }

    #[test]
    fn persona_failure_is_wrapped_with_session_id() {
        let asm = assembler(4096).with_persona(Arc::new(BrokenPersona));
        let session = session_with(&[]);
        match asm.build_sync(&session, "hello") {
            Err(MemoryError::ContextBuild { session_id, source }) => {
                assert_eq!(session_id, "s");
                assert!(source.to_string().contains("lore database"));
            }
            other => panic!("expected ContextBuild, got {other:?}"),
        }
    }

    #[test]
    fn disabled_persona_is_skipped() {
        let asm = ContextAssembler::new(ContextConfig {
            enable_persona: false,
            ..ContextConfig::default()
        })
        .with_persona(Arc::new(BrokenPersona));
        let ctx = asm.build_sync(&session_with(&[]), "hello").unwrap();
        assert!(ctx.system_prompt.is_empty());
        assert_eq!(
            ctx.full_context,
            "## Recent Conversation\n\n## Current Message\nUser: hello"
        );
    }

    #[test]
    fn recent_window_limits_turns() {
        let asm = ContextAssembler::new(ContextConfig {
            max_recent_messages: 2,
            ..ContextConfig::default()
        });
        let session = session_with(&[("user", "one"), ("assistant", "two"), ("user", "three")]);
        let ctx = asm.build_sync(&session, "four").unwrap();

        assert_eq!(ctx.recent_messages.len(), 2);
        assert!(!ctx.full_context.contains("User: one"));
        assert!(ctx.full_context.contains("Assistant: two\nUser: three"));
    }

    #[test]
    fn over_budget_drops_oldest_turns_and_keeps_fixed_sections() {
        let persona = "You are a concise assistant.";
        let asm = assembler(40).with_persona(Arc::new(StaticPersona::new(persona)));
        let turns: Vec<(String, String)> = (1..=8)
            .map(|i| ("user".to_string(), format!("turn number {i} with some padding text")))
            .collect();
        let session = turns.iter().fold(SessionMemory::new("s").unwrap(), |s, (_, c)| {
            s.append(Message::user(c.as_str())).unwrap()
        });

        let ctx = asm.build_sync(&session, "final question").unwrap();
        assert!(ctx.truncated);
        assert!(ctx.token_count <= 40);
        assert!(ctx.full_context.starts_with(persona));
        assert!(ctx.full_context.contains(CONVERSATION_HEADER));
        assert!(ctx.full_context.ends_with("## Current Message\nUser: final question"));
        assert!(ctx.full_context.contains("turn number 8"));
        assert!(!ctx.full_context.contains("turn number 1 "));
    }

    #[test]
    fn retained_turns_stay_chronological() {
        let asm = assembler(45);
        let session = session_with(&[
            ("user", "alpha alpha alpha alpha alpha"),
            ("assistant", "bravo bravo bravo bravo bravo"),
            ("user", "charlie charlie charlie charlie"),
            ("assistant", "delta delta delta delta delta"),
        ]);
        let ctx = asm.build_sync(&session, "echo").unwrap();

        assert!(ctx.truncated);
        let charlie = ctx.full_context.find("charlie").unwrap();
        let delta = ctx.full_context.find("delta").unwrap();
        assert!(charlie < delta);
        assert!(!ctx.full_context.contains("alpha"));
    }

    #[test]
    fn fixed_sections_survive_even_when_no_turn_fits() {
        let persona = "p".repeat(200);
        let asm = assembler(10).with_persona(Arc::new(StaticPersona::new(persona.clone())));
        let session = session_with(&[("user", "old turn")]);

        let ctx = asm.build_sync(&session, "now").unwrap();
        assert!(ctx.truncated);
        assert!(ctx.full_context.contains(&persona));
        assert!(!ctx.full_context.contains("old turn"));
        assert!(ctx.full_context.contains("User: now"));
    }

    #[test]
    fn empty_session_over_budget_keeps_persona_verbatim() {
        let persona = "You are Kurisu. ".repeat(10);
        let asm = assembler(20).with_persona(Arc::new(StaticPersona::new(persona.clone())));

        let ctx = asm.build_sync(&session_with(&[]), "hello").unwrap();
        assert!(ctx.truncated);
        assert!(ctx.full_context.starts_with(&persona));
        assert!(ctx.full_context.contains(CONVERSATION_HEADER));
        assert!(ctx.full_context.ends_with("## Current Message\nUser: hello"));
    }

    #[test]
    fn empty_session_over_budget_keeps_current_input() {
        let input = "please summarise everything we discussed about the trip";
        let ctx = assembler(5).build_sync(&session_with(&[]), input).unwrap();

        assert!(ctx.truncated);
        assert!(ctx.full_context.contains(input));
        assert_eq!(ctx.token_count, token::estimate_tokens(&ctx.full_context));
    }

    #[tokio::test]
    async fn recall_failure_is_wrapped_as_context_build() {
        let adapter = SemanticMemoryAdapter::new(Some(Arc::new(FailingClient)), "s", 0.5).unwrap();
        let session = session_with(&[("user", "hi")]);

        match assembler(4096).build(&session, Some(&adapter), "what do I like?").await {
            Err(MemoryError::ContextBuild { session_id, source }) => {
                assert_eq!(session_id, "s");
                assert!(matches!(
                    source.downcast_ref::<MemoryError>(),
                    Some(MemoryError::SemanticStore {
                        operation: SemanticOperation::Search,
                        ..
                    })
                ));
            }
            other => panic!("expected ContextBuild, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn disabled_recall_skips_the_client() {
        let asm = ContextAssembler::new(ContextConfig {
            enable_semantic_recall: false,
            ..ContextConfig::default()
        });
        let adapter = SemanticMemoryAdapter::new(Some(Arc::new(FailingClient)), "s", 0.5).unwrap();

        let ctx = asm.build(&session_with(&[]), Some(&adapter), "hello").await.unwrap();
        assert!(ctx.relevant_memories.is_empty());
    }

    #[test]
    fn deterministic_assembly() {
        let asm = ContextAssembler::with_default_budget()
            .with_persona(Arc::new(StaticPersona::new("persona")));
        let session = session_with(&[("user", "a"), ("assistant", "b")]);
        let first = asm.build_sync(&session, "c").unwrap();
        let second = asm.build_sync(&session, "c").unwrap();
        assert_eq!(first.full_context, second.full_context);
        assert_eq!(first.token_count, second.token_count);
    }
}
