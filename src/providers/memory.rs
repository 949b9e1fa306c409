//! In-memory knowledge store with cosine-similarity search.
//!
//! Used in mock mode, in tests, and as the fallback when no vector database
//! is configured. Reads vastly outnumber writes, so the collections sit
//! behind a `RwLock` and concurrent runs can search in parallel.

use super::{ChunkStore, SearchHit, VectorSearch};
use crate::error::Result;
use crate::models::KnowledgeChunk;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Default)]
pub struct MemoryVectorStore {
    collections: RwLock<HashMap<String, Vec<KnowledgeChunk>>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of chunks stored in a collection.
    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, Vec::len)
    }

    pub async fn is_empty(&self, collection: &str) -> bool {
        self.len(collection).await == 0
    }
}

/// Cosine similarity of two vectors; 0.0 when either is empty, zero or
/// the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorSearch for MemoryVectorStore {
    async fn search(
        &self,
        collection: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        let collections = self.collections.read().await;
        let Some(chunks) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<SearchHit> = chunks
            .iter()
            .map(|chunk| SearchHit {
                id: chunk.id.clone(),
                text: chunk.text.clone(),
                similarity: cosine_similarity(query_vector, &chunk.embedding),
            })
            .collect();
        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        hits.truncate(top_k);
        Ok(hits)
    }
}

#[async_trait]
impl ChunkStore for MemoryVectorStore {
    async fn insert(&self, collection: &str, chunk: &KnowledgeChunk) -> Result<()> {
        let mut collections = self.collections.write().await;
        let chunks = collections.entry(collection.to_string()).or_default();
        if chunks.iter().any(|c| c.id == chunk.id) {
            debug!(%collection, id = %chunk.id, "chunk already stored; keeping original");
            return Ok(());
        }
        chunks.push(chunk.clone());
        Ok(())
    }
}
