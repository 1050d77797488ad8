//! # HybridMem Core
//!
//! Domain types, traits, and error definitions for the HybridMem
//! conversational memory subsystem. This crate holds no storage or
//! assembly logic. It defines the model that the other crates build on.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here:
//! - [`SemanticClient`] for the remote semantic-recall store
//! - [`PersonaProvider`] for the system prompt
//!
//! Implementations are injected, so tests run against in-process stubs.

pub mod error;
pub mod message;
pub mod memory;
pub mod persona;

// Re-export key types at crate root for ergonomics
pub use error::{MemoryError, PersonaError, Result, SemanticClientError, SemanticOperation};
pub use message::{Message, Role};
pub use memory::{
    AddOptions, AddResponse, MemoryMetadata, MemoryRecord, MetadataDefaults, RawMemory,
    RawMemoryData, ScopeOptions, SearchOptions, SemanticClient,
};
pub use persona::PersonaProvider;
