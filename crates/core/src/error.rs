//! Error types for the HybridMem domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Remote failures have their own error types so the adapter boundary
//! can wrap them before they reach callers.

use std::fmt;
use thiserror::Error;

/// The top-level error type for all memory subsystem operations.
#[derive(Debug, Error)]
pub enum MemoryError {
    // --- Argument errors ---
    #[error("Invalid session identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    // --- Remote store errors ---
    #[error("Semantic store {operation} failed: {source}")]
    SemanticStore {
        operation: SemanticOperation,
        #[source]
        source: SemanticClientError,
    },

    // --- Context assembly ---
    #[error("Context build failed for session {session_id}: {source}")]
    ContextBuild {
        session_id: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),
}

impl MemoryError {
    /// Wrap a client failure, tagging it with the attempted operation.
    pub fn semantic(operation: SemanticOperation, source: SemanticClientError) -> Self {
        Self::SemanticStore { operation, source }
    }

    /// Wrap any failure raised while assembling context for a session.
    pub fn context_build(
        session_id: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::ContextBuild {
            session_id: session_id.into(),
            source: Box::new(source),
        }
    }
}

/// Result type alias using our error.
pub type Result<T> = std::result::Result<T, MemoryError>;

/// The semantic-store capability an adapter call was exercising.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemanticOperation {
    Add,
    Search,
    GetAll,
    Delete,
    Update,
}

impl SemanticOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Search => "search",
            Self::GetAll => "getAll",
            Self::Delete => "delete",
            Self::Update => "update",
        }
    }
}

impl fmt::Display for SemanticOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- External collaborator errors ---

/// Failures raised by a [`SemanticClient`](crate::memory::SemanticClient).
#[derive(Debug, Clone, Error)]
pub enum SemanticClientError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("capability not implemented: {0}")]
    NotImplemented(&'static str),
}

/// Failures raised by a [`PersonaProvider`](crate::persona::PersonaProvider).
#[derive(Debug, Clone, Error)]
#[error("Persona provider failed: {0}")]
pub struct PersonaError(pub String);
