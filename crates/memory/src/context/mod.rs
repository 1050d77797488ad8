//! Token-budgeted context assembly.
//!
//! # Sections (in output order)
//!
//! | Section | Source | Trim Strategy |
//! |---------|--------|---------------|
//! | Persona | `PersonaProvider` | Never trimmed |
//! | Relevant Memories | Semantic recall | Never trimmed |
//! | Recent Conversation | Session log | Oldest turns dropped |
//! | Current Message | Caller input | Never trimmed |

pub mod assembler;
pub mod persona;
pub mod token;

pub use assembler::{
    BuildContext, CONVERSATION_HEADER, CURRENT_MESSAGE_HEADER, ContextAssembler, MEMORIES_HEADER,
};
pub use persona::StaticPersona;
