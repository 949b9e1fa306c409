//! External AI and vector-store collaborators.
//!
//! The pipeline only talks to providers through the traits in this module,
//! so every stage can run against live services or the offline mocks
//! without knowing which one it has.
//!
//! | Trait | Live implementation | Offline implementation |
//! |-------|---------------------|------------------------|
//! | [`ChatProvider`] | [`openai::OpenAiClient`] | [`mock::MockChat`] |
//! | [`EmbeddingProvider`] | [`openai::OpenAiClient`] | [`mock::MockEmbeddings`] |
//! | [`ImageProvider`] | [`openai::OpenAiClient`] | [`mock::MockImages`] |
//! | [`VectorSearch`] / [`ChunkStore`] | [`supabase::SupabaseStore`] | [`memory::MemoryVectorStore`] |

use crate::api::{ResilientClient, RetryPolicy};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::models::KnowledgeChunk;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub mod memory;
pub mod mock;
pub mod openai;
pub mod supabase;

/// Per-call knobs for a chat completion.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    /// What the call is for (`"analysis"`, `"narration"`, ...). Used in logs
    /// and by the offline provider to pick a fixture.
    pub purpose: &'static str,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Ask the provider for a JSON object response.
    pub json_response: bool,
}

impl CompletionOptions {
    pub fn new(purpose: &'static str) -> Self {
        Self {
            purpose,
            temperature: 0.3,
            max_tokens: None,
            json_response: false,
        }
    }

    pub fn json(mut self) -> Self {
        self.json_response = true;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A similarity-search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub id: String,
    #[serde(alias = "content")]
    pub text: String,
    pub similarity: f32,
}

#[async_trait]
pub trait ChatProvider: Send + Sync + fmt::Debug {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String>;
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync + fmt::Debug {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

#[async_trait]
pub trait ImageProvider: Send + Sync + fmt::Debug {
    /// Generate an illustration; `None` when the provider produced nothing usable.
    async fn generate(&self, prompt: &str) -> Result<Option<String>>;
}

#[async_trait]
pub trait VectorSearch: Send + Sync + fmt::Debug {
    async fn search(
        &self,
        collection: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<SearchHit>>;
}

#[async_trait]
pub trait ChunkStore: Send + Sync + fmt::Debug {
    async fn insert(&self, collection: &str, chunk: &KnowledgeChunk) -> Result<()>;
}

/// Every collaborator a pipeline needs, injected at construction time.
#[derive(Debug, Clone)]
pub struct Providers {
    pub chat: Arc<dyn ChatProvider>,
    pub embeddings: Arc<dyn EmbeddingProvider>,
    pub images: Arc<dyn ImageProvider>,
    pub search: Arc<dyn VectorSearch>,
    pub store: Arc<dyn ChunkStore>,
}

impl Providers {
    /// Offline providers: deterministic fixtures and an in-memory vector store.
    pub fn mock() -> Self {
        let memory = Arc::new(memory::MemoryVectorStore::new());
        Self {
            chat: Arc::new(mock::MockChat),
            embeddings: Arc::new(mock::MockEmbeddings::default()),
            images: Arc::new(mock::MockImages),
            search: memory.clone(),
            store: memory,
        }
    }

    /// Pick live or offline providers according to the configuration.
    ///
    /// Live mode talks to the OpenAI-compatible API; the vector store is
    /// Supabase when configured and an in-memory store otherwise.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        if config.mock_mode {
            info!("Using offline mock providers");
            return Ok(Self::mock());
        }

        let api_key = config.openai.api_key.clone().ok_or_else(|| {
            PipelineError::Config("openai.api_key (or OPENAI_API_KEY) is not set".into())
        })?;
        let client = ResilientClient::new(
            RetryPolicy::from(&config.retry),
            Duration::from_secs(config.openai.request_timeout_secs),
        )?;
        let openai = Arc::new(openai::OpenAiClient::new(
            client.clone(),
            &config.openai,
            api_key,
        ));

        let (search, store): (Arc<dyn VectorSearch>, Arc<dyn ChunkStore>) =
            match (&config.vector_store.url, &config.vector_store.api_key) {
                (Some(url), Some(key)) => {
                    info!(%url, "Using Supabase vector store");
                    let supabase = Arc::new(supabase::SupabaseStore::new(client, url, key));
                    (supabase.clone(), supabase)
                }
                _ => {
                    info!("No vector store configured; using in-memory store");
                    let memory = Arc::new(memory::MemoryVectorStore::new());
                    (memory.clone(), memory)
                }
            };

        Ok(Self {
            chat: openai.clone(),
            embeddings: openai.clone(),
            images: openai,
            search,
            store,
        })
    }
}
