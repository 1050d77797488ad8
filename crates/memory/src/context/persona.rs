//! Fixed persona prompts.

use hybridmem_core::error::PersonaError;
use hybridmem_core::persona::PersonaProvider;

/// A [`PersonaProvider`] that always serves the same prompt.
#[derive(Debug, Clone, Default)]
pub struct StaticPersona {
    prompt: String,
}

impl StaticPersona {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }
}

impl PersonaProvider for StaticPersona {
    fn system_prompt(&self) -> Result<String, PersonaError> {
        Ok(self.prompt.clone())
    }
}
