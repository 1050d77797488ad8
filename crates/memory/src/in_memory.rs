//! In-memory semantic client — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use hybridmem_core::error::SemanticClientError;
use hybridmem_core::memory::{
    AddOptions, AddResponse, RawMemory, ScopeOptions, SearchOptions, SemanticClient,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct StoredMemory {
    id: String,
    scope_key: String,
    content: String,
    metadata: Map<String, Value>,
}

impl StoredMemory {
    fn to_raw(&self, score: Option<f32>) -> RawMemory {
        RawMemory {
            id: Some(self.id.clone()),
            memory: Some(self.content.clone()),
            data: None,
            metadata: Some(self.metadata.clone()),
            score,
        }
    }
}

/// A semantic client that keeps memories in a Vec and ranks them by
/// keyword overlap. Records are isolated by scope key.
pub struct InMemorySemanticClient {
    entries: Arc<RwLock<Vec<StoredMemory>>>,
}

impl InMemorySemanticClient {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Total records across all scopes.
    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl Default for InMemorySemanticClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Fraction of query terms that occur in `content`, case-insensitively.
fn keyword_score(content: &str, terms: &[String]) -> f32 {
    if terms.is_empty() {
        return 0.0;
    }
    let content = content.to_lowercase();
    let hits = terms.iter().filter(|t| content.contains(t.as_str())).count();
    hits as f32 / terms.len() as f32
}

#[async_trait]
impl SemanticClient for InMemorySemanticClient {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn add(
        &self,
        content: &str,
        options: AddOptions,
    ) -> Result<AddResponse, SemanticClientError> {
        let entry = StoredMemory {
            id: Uuid::new_v4().to_string(),
            scope_key: options.scope_key,
            content: content.to_string(),
            metadata: options.metadata,
        };
        let raw = entry.to_raw(None);
        self.entries.write().await.push(entry);
        Ok(AddResponse::Many(vec![raw]))
    }

    async fn search(
        &self,
        query: &str,
        options: SearchOptions,
    ) -> Result<Vec<RawMemory>, SemanticClientError> {
        let terms: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
        let entries = self.entries.read().await;

        let mut results: Vec<(f32, &StoredMemory)> = entries
            .iter()
            .filter(|e| e.scope_key == options.scope_key)
            .map(|e| (keyword_score(&e.content, &terms), e))
            .filter(|(score, _)| *score > 0.0)
            .collect();

        results.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(options.limit);

        Ok(results
            .into_iter()
            .map(|(score, e)| e.to_raw(Some(score)))
            .collect())
    }

    async fn get_all(&self, options: ScopeOptions) -> Result<Vec<RawMemory>, SemanticClientError> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| e.scope_key == options.scope_key)
            .map(|e| e.to_raw(None))
            .collect())
    }

    async fn delete(&self, id: &str) -> Result<(), SemanticClientError> {
        self.entries.write().await.retain(|e| e.id != id);
        Ok(())
    }

    fn supports_update(&self) -> bool {
        true
    }

    async fn update(&self, id: &str, content: &str) -> Result<(), SemanticClientError> {
        let mut entries = self.entries.write().await;
        match entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                entry.content = content.to_string();
                Ok(())
            }
            None => Err(SemanticClientError::Rejected(format!("memory {id} not found"))),
        }
    }
}
