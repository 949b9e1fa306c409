//! Retrieval-augmented generation.
//!
//! [`RetrievalAugmenter`] stores text as embedded chunks and, before a
//! prompt is sent, retrieves similar prior editorial feedback and prior
//! analyses and appends them to the prompt as labeled sections.
//!
//! The vector store behind it is shared across runs and read far more often
//! than it is written.

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::models::KnowledgeChunk;
use crate::providers::{ChunkStore, EmbeddingProvider, Providers, SearchHit, VectorSearch};
use futures::stream::{self, StreamExt};
use std::fmt::Write;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub mod chunker;

pub use chunker::chunk_text;

pub const FEEDBACK_LABEL: &str = "Prior editorial feedback";
pub const ANALYSES_LABEL: &str = "Prior analyses";

/// Similar chunks retrieved for one query, per collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievedContext {
    pub feedback: Vec<KnowledgeChunk>,
    pub analyses: Vec<KnowledgeChunk>,
}

impl RetrievedContext {
    pub fn is_empty(&self) -> bool {
        self.feedback.is_empty() && self.analyses.is_empty()
    }
}

/// Outcome of storing one text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreReport {
    pub stored: usize,
    pub skipped: usize,
}

fn hit_to_chunk(hit: SearchHit) -> KnowledgeChunk {
    KnowledgeChunk {
        id: hit.id,
        text: hit.text,
        embedding: Vec::new(),
        similarity: Some(hit.similarity),
    }
}

/// Chunk, embed, store and retrieve prior knowledge.
#[derive(Debug, Clone)]
pub struct RetrievalAugmenter {
    embeddings: Arc<dyn EmbeddingProvider>,
    search: Arc<dyn VectorSearch>,
    store: Arc<dyn ChunkStore>,
    feedback_collection: String,
    analysis_collection: String,
    top_k: usize,
    chunk_size: usize,
}

impl RetrievalAugmenter {
    pub fn new(
        embeddings: Arc<dyn EmbeddingProvider>,
        search: Arc<dyn VectorSearch>,
        store: Arc<dyn ChunkStore>,
    ) -> Self {
        Self {
            embeddings,
            search,
            store,
            feedback_collection: "editorial_feedback".to_string(),
            analysis_collection: "news_analyses".to_string(),
            top_k: 3,
            chunk_size: 800,
        }
    }

    /// Build from the shared providers using the configured collections.
    pub fn from_config(config: &PipelineConfig, providers: &Providers) -> Self {
        Self::new(
            providers.embeddings.clone(),
            providers.search.clone(),
            providers.store.clone(),
        )
        .with_collections(
            config.vector_store.feedback_collection.clone(),
            config.vector_store.analysis_collection.clone(),
        )
        .with_top_k(config.vector_store.top_k)
        .with_chunk_size(config.rag.chunk_size)
    }

    pub fn with_collections(
        mut self,
        feedback: impl Into<String>,
        analyses: impl Into<String>,
    ) -> Self {
        self.feedback_collection = feedback.into();
        self.analysis_collection = analyses.into();
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn feedback_collection(&self) -> &str {
        &self.feedback_collection
    }

    pub fn analysis_collection(&self) -> &str {
        &self.analysis_collection
    }

    /// Chunk `text`, embed each chunk and persist it in `collection`.
    ///
    /// Chunks whose embedding fails or comes back empty are skipped, as are
    /// chunks the store rejects. Neither aborts the rest of the batch.
    #[instrument(level = "info", skip_all, fields(%collection, %source, chars = text.len()))]
    pub async fn store_text(&self, collection: &str, source: &str, text: &str) -> StoreReport {
        let chunks = chunk_text(text, self.chunk_size);
        let total = chunks.len();

        let outcomes: Vec<bool> = stream::iter(chunks.into_iter().enumerate())
            .then(|(index, chunk)| async move {
                let embedding = match self.embeddings.embed(chunk).await {
                    Ok(embedding) if !embedding.is_empty() => embedding,
                    Ok(_) => {
                        warn!(index, "embedding came back empty; skipping chunk");
                        return false;
                    }
                    Err(e) => {
                        warn!(index, error = %e, "embedding failed; skipping chunk");
                        return false;
                    }
                };
                let chunk = KnowledgeChunk::new(source, index, chunk, embedding);
                match self.store.insert(collection, &chunk).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(index, error = %e, "chunk insert failed; skipping chunk");
                        false
                    }
                }
            })
            .collect()
            .await;

        let stored = outcomes.iter().filter(|ok| **ok).count();
        let report = StoreReport {
            stored,
            skipped: total - stored,
        };
        info!(stored = report.stored, skipped = report.skipped, "Stored knowledge chunks");
        report
    }

    /// Embed `query` once and search both collections.
    #[instrument(level = "debug", skip_all, fields(chars = query.len()))]
    pub async fn retrieve(&self, query: &str) -> Result<RetrievedContext> {
        let vector = self.embeddings.embed(query).await?;
        if vector.is_empty() {
            debug!("query embedded to an empty vector; nothing to retrieve");
            return Ok(RetrievedContext::default());
        }

        let (feedback, analyses) = futures::try_join!(
            self.search
                .search(&self.feedback_collection, &vector, self.top_k),
            self.search
                .search(&self.analysis_collection, &vector, self.top_k),
        )?;

        debug!(
            feedback = feedback.len(),
            analyses = analyses.len(),
            "retrieved similar chunks"
        );
        Ok(RetrievedContext {
            feedback: feedback.into_iter().map(hit_to_chunk).collect(),
            analyses: analyses.into_iter().map(hit_to_chunk).collect(),
        })
    }

    /// Retrieve context for `query` and append it to `base_prompt`.
    ///
    /// Retrieval failures are logged and the base prompt is returned as is.
    pub async fn augment_prompt(&self, base_prompt: &str, query: &str) -> String {
        match self.retrieve(query).await {
            Ok(context) => render_sections(base_prompt, &context),
            Err(e) => {
                warn!(error = %e, "retrieval failed; using prompt without context");
                base_prompt.to_string()
            }
        }
    }
}

/// Append each non-empty result set to `base_prompt` as a labeled section.
///
/// With no results at all the base prompt is returned byte-for-byte.
pub fn render_sections(base_prompt: &str, context: &RetrievedContext) -> String {
    let mut prompt = base_prompt.to_string();
    for (label, chunks) in [
        (FEEDBACK_LABEL, &context.feedback),
        (ANALYSES_LABEL, &context.analyses),
    ] {
        if chunks.is_empty() {
            continue;
        }
        let _ = write!(prompt, "\n\n## {label}\n");
        for chunk in chunks {
            let _ = writeln!(
                prompt,
                "- [similarity {:.2}] {}",
                chunk.similarity.unwrap_or_default(),
                chunk.text.trim()
            );
        }
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::providers::memory::MemoryVectorStore;
    use crate::providers::mock::MockEmbeddings;
    use async_trait::async_trait;

    fn retrieved(text: &str, similarity: f32) -> KnowledgeChunk {
        KnowledgeChunk {
            id: "x#0".to_string(),
            text: text.to_string(),
            embedding: Vec::new(),
            similarity: Some(similarity),
        }
    }

    fn augmenter(store: Arc<MemoryVectorStore>) -> RetrievalAugmenter {
        RetrievalAugmenter::new(Arc::new(MockEmbeddings::default()), store.clone(), store)
    }

    #[test]
    fn test_render_empty_context_is_identity() {
        let base = "Summarize this.\n";
        assert_eq!(render_sections(base, &RetrievedContext::default()), base);
    }

    #[test]
    fn test_render_only_non_empty_sections() {
        let context = RetrievedContext {
            feedback: Vec::new(),
            analyses: vec![retrieved("older analysis ", 0.876)],
        };
        let prompt = render_sections("Base", &context);
        assert_eq!(
            prompt,
            "Base\n\n## Prior analyses\n- [similarity 0.88] older analysis\n"
        );
        assert!(!prompt.contains(FEEDBACK_LABEL));
    }

    #[test]
    fn test_render_keeps_duplicates_across_collections() {
        let context = RetrievedContext {
            feedback: vec![retrieved("same", 0.9)],
            analyses: vec![retrieved("same", 0.9)],
        };
        let prompt = render_sections("Base", &context);
        assert_eq!(prompt.matches("- [similarity 0.90] same").count(), 2);
    }

    #[tokio::test]
    async fn test_store_then_retrieve() {
        let store = Arc::new(MemoryVectorStore::new());
        let rag = augmenter(store.clone()).with_chunk_size(60);

        let report = rag
            .store_text(
                "news_analyses",
                "https://example.com/budget",
                "The city council passed the budget. Parks funding rose sharply this year.",
            )
            .await;
        assert_eq!(report, StoreReport { stored: 2, skipped: 0 });
        assert_eq!(store.len("news_analyses").await, 2);

        let context = rag.retrieve("council budget").await.unwrap();
        assert!(context.feedback.is_empty());
        assert_eq!(context.analyses.len(), 2);
        assert!(context.analyses[0].text.contains("council"));
        assert!(context.analyses[0].similarity.unwrap() > 0.0);
    }

    #[derive(Debug)]
    struct FlakyEmbeddings;

    #[async_trait]
    impl EmbeddingProvider for FlakyEmbeddings {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if text.contains("fail") {
                Err(PipelineError::Transport("connection reset".into()))
            } else if text.contains("empty") {
                Ok(Vec::new())
            } else {
                Ok(vec![1.0, 0.0])
            }
        }
    }

    #[tokio::test]
    async fn test_store_skips_failed_and_empty_embeddings() {
        let store = Arc::new(MemoryVectorStore::new());
        let rag = RetrievalAugmenter::new(Arc::new(FlakyEmbeddings), store.clone(), store.clone())
            .with_chunk_size(13);

        let report = rag
            .store_text("c", "doc", "good chunk. fail chunk. empty chunk. fine chunk.")
            .await;
        assert_eq!(report, StoreReport { stored: 2, skipped: 2 });
        assert_eq!(store.len("c").await, 2);
    }

    #[tokio::test]
    async fn test_augment_prompt_without_knowledge_is_identity() {
        let rag = augmenter(Arc::new(MemoryVectorStore::new()));
        let base = "<<<CONTENT>>>\nbody\n<<</CONTENT>>>\n";
        assert_eq!(rag.augment_prompt(base, "body").await, base);
    }

    #[tokio::test]
    async fn test_augment_prompt_degrades_on_failure() {
        let store = Arc::new(MemoryVectorStore::new());
        let rag = RetrievalAugmenter::new(Arc::new(FlakyEmbeddings), store.clone(), store);
        assert_eq!(rag.augment_prompt("base", "fail please").await, "base");
    }

    #[tokio::test]
    async fn test_augment_prompt_includes_feedback() {
        let store = Arc::new(MemoryVectorStore::new());
        let rag = augmenter(store.clone());
        rag.store_text(
            rag.feedback_collection(),
            "editor",
            "Avoid speculation about election outcomes.",
        )
        .await;

        let prompt = rag.augment_prompt("Base", "election outcomes").await;
        assert!(prompt.starts_with("Base\n\n## Prior editorial feedback\n- [similarity "));
        assert!(prompt.contains("Avoid speculation about election outcomes."));
    }
}
