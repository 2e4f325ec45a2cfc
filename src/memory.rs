//! Semantic-memory collaborator surface.
//!
//! The kernel treats memory as an opaque capability-tagged service: anything
//! implementing [`MemoryService`] can be registered and resolved like any
//! other backend. The bundled [`InMemoryMemoryStore`] keeps records in process
//! memory with a naive token-overlap relevance score, enough for tests and
//! small setups.

use crate::error::KernelResult;
use crate::services::{AiService, ServiceCapability};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// A stored memory.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRecord {
    pub id: String,
    pub text: String,
}

/// A search hit with its relevance score in `[0, 1]`.
#[derive(Debug, Clone)]
pub struct MemoryMatch {
    pub record: MemoryRecord,
    pub relevance: f64,
}

/// Save and search over named collections of text records.
#[async_trait::async_trait]
pub trait MemoryService: Send + Sync {
    /// Store (or overwrite) a record in a collection.
    async fn save(&self, collection: &str, id: &str, text: &str) -> KernelResult<()>;

    /// Return up to `limit` records relevant to the query, ordered by
    /// descending relevance, dropping hits below `min_relevance_score`.
    async fn search(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
        min_relevance_score: f64,
    ) -> KernelResult<Vec<MemoryMatch>>;
}

/// Process-memory implementation of [`MemoryService`].
pub struct InMemoryMemoryStore {
    service_id: String,
    collections: RwLock<HashMap<String, Vec<MemoryRecord>>>,
}

impl InMemoryMemoryStore {
    pub fn new(service_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            collections: RwLock::new(HashMap::new()),
        }
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_lowercase())
        .collect()
}

/// Fraction of query tokens present in the record.
fn relevance(query_tokens: &[String], text: &str) -> f64 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let record_tokens = tokenize(text);
    let hits = query_tokens
        .iter()
        .filter(|token| record_tokens.contains(token))
        .count();
    hits as f64 / query_tokens.len() as f64
}

#[async_trait::async_trait]
impl MemoryService for InMemoryMemoryStore {
    async fn save(&self, collection: &str, id: &str, text: &str) -> KernelResult<()> {
        let mut collections = self.collections.write().await;
        let records = collections.entry(collection.to_string()).or_default();
        if let Some(existing) = records.iter_mut().find(|record| record.id == id) {
            existing.text = text.to_string();
        } else {
            records.push(MemoryRecord {
                id: id.to_string(),
                text: text.to_string(),
            });
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
        min_relevance_score: f64,
    ) -> KernelResult<Vec<MemoryMatch>> {
        let collections = self.collections.read().await;
        let query_tokens = tokenize(query);
        let mut matches: Vec<MemoryMatch> = collections
            .get(collection)
            .map(|records| {
                records
                    .iter()
                    .map(|record| MemoryMatch {
                        record: record.clone(),
                        relevance: relevance(&query_tokens, &record.text),
                    })
                    .filter(|hit| hit.relevance >= min_relevance_score)
                    .collect()
            })
            .unwrap_or_default();
        matches.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
        matches.truncate(limit);
        Ok(matches)
    }
}

impl AiService for InMemoryMemoryStore {
    fn service_id(&self) -> &str {
        &self.service_id
    }

    fn capabilities(&self) -> &[ServiceCapability] {
        &[ServiceCapability::Memory]
    }

    fn as_memory(&self) -> Option<&dyn MemoryService> {
        Some(self)
    }
}
