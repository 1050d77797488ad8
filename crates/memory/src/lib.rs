//! Conversational memory for HybridMem.
//!
//! - [`session`]: immutable, bounded per-session message logs
//! - [`semantic`]: session-scoped facade over an external semantic store
//! - [`context`]: token-budgeted context assembly
//! - [`engine`]: the registry-owning facade the host talks to

pub mod context;
pub mod engine;
pub mod in_memory;
pub mod semantic;
pub mod session;

pub use context::{BuildContext, ContextAssembler, StaticPersona};
pub use engine::{EngineStats, HybridMemoryEngine};
pub use in_memory::InMemorySemanticClient;
pub use semantic::SemanticMemoryAdapter;
pub use session::{SessionMemory, SessionState};

use chrono::Utc;
use uuid::Uuid;

/// `{prefix}_{epoch millis}_{random suffix}`, used for generated session
/// ids and for memory ids the store did not supply.
pub(crate) fn composite_id(prefix: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}_{}", Utc::now().timestamp_millis(), &suffix[..9])
}
