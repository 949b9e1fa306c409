//! Supabase (PostgREST + pgvector) backed knowledge store.
//!
//! Each collection is a table with `id`, `content` and `embedding` columns
//! plus a `match_{collection}` SQL function taking `query_embedding` and
//! `match_count` and returning `content` and `similarity` rows.

use super::{ChunkStore, SearchHit, VectorSearch};
use crate::api::ResilientClient;
use crate::error::Result;
use crate::models::KnowledgeChunk;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use tracing::{debug, instrument};

#[derive(Serialize)]
struct MatchRequest<'a> {
    query_embedding: &'a [f32],
    match_count: usize,
}

#[derive(Serialize)]
struct InsertRow<'a> {
    id: &'a str,
    content: &'a str,
    embedding: &'a [f32],
}

pub struct SupabaseStore {
    client: ResilientClient,
    base_url: String,
    api_key: String,
}

impl fmt::Debug for SupabaseStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupabaseStore")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl SupabaseStore {
    pub fn new(client: ResilientClient, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn rest(&self, path: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, path)
    }
}

#[async_trait]
impl VectorSearch for SupabaseStore {
    #[instrument(level = "debug", skip_all, fields(%collection, top_k))]
    async fn search(
        &self,
        collection: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        let request = MatchRequest {
            query_embedding: query_vector,
            match_count: top_k,
        };
        let body = self
            .client
            .post_json(
                "vector_search",
                &self.rest(&format!("rpc/match_{collection}")),
                Some(&self.api_key),
                &[("apikey", self.api_key.as_str())],
                &request,
            )
            .await?;
        let hits: Vec<SearchHit> = serde_json::from_str(&body)?;
        debug!(hits = hits.len(), "vector search finished");
        Ok(hits)
    }
}

#[async_trait]
impl ChunkStore for SupabaseStore {
    #[instrument(level = "debug", skip_all, fields(%collection, id = %chunk.id))]
    async fn insert(&self, collection: &str, chunk: &KnowledgeChunk) -> Result<()> {
        let row = InsertRow {
            id: &chunk.id,
            content: &chunk.text,
            embedding: &chunk.embedding,
        };
        self.client
            .post_json(
                "chunk_insert",
                &self.rest(collection),
                Some(&self.api_key),
                &[
                    ("apikey", self.api_key.as_str()),
                    ("Prefer", "return=minimal"),
                ],
                &row,
            )
            .await?;
        Ok(())
    }
}
