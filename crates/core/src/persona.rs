//! Persona contract — the source of the system prompt.
//!
//! The persona content itself (character sheets, lore, tone rules) lives
//! outside this subsystem. All the context assembler needs is the final
//! prompt text.

use crate::error::PersonaError;

/// Supplies the current system prompt.
///
/// Returns an empty string when no persona is configured.
pub trait PersonaProvider: Send + Sync {
    fn system_prompt(&self) -> Result<String, PersonaError>;
}
