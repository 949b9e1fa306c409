//! Data models shared across extraction, the pipeline and the RAG layer.
//!
//! - [`ArticleData`]: readable article content extracted from a page
//! - [`AnalysisResult`]: what the analysis stages produce for one article
//! - [`FinalAnalysis`]: the aggregated artifact returned from a pipeline run
//! - [`KnowledgeChunk`]: a piece of prior knowledge stored for retrieval
//!
//! All models serialize with camelCase field names so the JSON produced for
//! API consumers matches the rest of the platform.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A readable article as extracted from a web page.
///
/// Once constructed, an `ArticleData` is never mutated in place. Stages that
/// enrich it (for example swapping the illustration) produce a modified copy
/// through the `with_*` methods, so earlier snapshots can be shared freely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleData {
    /// The URL the article was requested from.
    pub url: String,
    /// Headline of the article.
    pub title: String,
    /// Normalized body text.
    pub content: String,
    /// Meta description, when the page declares one.
    pub description: Option<String>,
    /// Byline, when the page declares one.
    pub author: Option<String>,
    /// Publication date exactly as found on the page.
    pub published_at: Option<String>,
    /// Lead image of the article.
    pub image_url: Option<String>,
    /// Primary language subtag (e.g. `"en"`, `"ko"`).
    pub language: String,
    /// Site name, or the URL host when the site does not declare one.
    pub source: Option<String>,
    /// Free-form extraction metadata (final URL, candidate selector, ...).
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ArticleData {
    /// Create an article with the required fields and everything else empty.
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            content: content.into(),
            description: None,
            author: None,
            published_at: None,
            image_url: None,
            language: "en".to_string(),
            source: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Length of the body in characters.
    pub fn content_length(&self) -> usize {
        self.content.chars().count()
    }

    pub fn word_count(&self) -> usize {
        self.content.split_whitespace().count()
    }

    /// Copy of this article with a different lead image.
    pub fn with_image_url(&self, image_url: impl Into<String>) -> Self {
        Self {
            image_url: Some(image_url.into()),
            ..self.clone()
        }
    }

    /// Copy of this article with one extra metadata entry.
    pub fn with_metadata(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut copy = self.clone();
        copy.metadata.insert(key.into(), value.into());
        copy
    }
}

/// The "why it matters" and "what happens next" interpretation of a story.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriticalAnalysis {
    pub why_important: String,
    pub future_prediction: String,
}

/// Analysis produced by the pipeline stages for one article.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// Title translated into the target language.
    pub title: String,
    /// Summary translated into the target language.
    pub translated_summary: String,
    /// Ordered key points.
    pub key_points: Vec<String>,
    /// Narration script, when narration generation is enabled.
    pub narration: Option<String>,
    /// Filled in by the interpretation stage.
    pub critical_analysis: Option<CriticalAnalysis>,
    /// Language the summary was written in.
    pub language: String,
}

/// Provenance recorded alongside a [`FinalAnalysis`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisMetadata {
    pub source_url: String,
    /// RFC 3339 timestamp of when the run finished.
    pub processed_at: String,
    pub agents_used: Vec<String>,
    pub mock_mode: bool,
    pub image_url: Option<String>,
    pub language: Option<String>,
    pub validation_confidence: Option<f32>,
}

/// The structured artifact handed back to API consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalAnalysis {
    pub title: String,
    pub translated_summary: String,
    pub key_points: Vec<String>,
    pub narration: String,
    pub audio_url: Option<String>,
    pub critical_analysis: CriticalAnalysis,
    pub metadata: AnalysisMetadata,
}

/// A piece of prior knowledge stored for retrieval.
///
/// Chunks are write-once: the embedding is computed a single time before
/// the chunk is persisted and is never recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeChunk {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    /// Only set on chunks returned from a similarity query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
}

impl KnowledgeChunk {
    /// Build a chunk whose id is derived from its source and position.
    pub fn new(source: &str, index: usize, text: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            id: format!("{source}#{index}"),
            text: text.into(),
            embedding,
            similarity: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_article() -> ArticleData {
        ArticleData::new(
            "https://example.com/story",
            "Test Article",
            "Some body text with five words",
        )
    }

    #[test]
    fn test_content_length_counts_chars() {
        let article = ArticleData::new("https://example.com", "제목", "한국어 본문");
        assert_eq!(article.content_length(), 6);
        assert_eq!(article.word_count(), 2);
    }

    #[test]
    fn test_with_image_url_leaves_original_untouched() {
        let original = sample_article();
        let updated = original.with_image_url("https://img.example.com/a.png");

        assert_eq!(original.image_url, None);
        assert_eq!(
            updated.image_url.as_deref(),
            Some("https://img.example.com/a.png")
        );
        assert_eq!(updated.title, original.title);
        assert_eq!(updated.content, original.content);
    }

    #[test]
    fn test_with_metadata_copies() {
        let original = sample_article();
        let updated = original.with_metadata("finalUrl", "https://example.com/x");
        assert!(original.metadata.is_empty());
        assert_eq!(
            updated.metadata.get("finalUrl").map(String::as_str),
            Some("https://example.com/x")
        );
    }

    #[test]
    fn test_article_serializes_camel_case() {
        let article = sample_article().with_image_url("https://img");
        let json = serde_json::to_string(&article).unwrap();
        assert!(json.contains("\"imageUrl\":\"https://img\""));
        assert!(json.contains("\"publishedAt\":null"));
    }

    #[test]
    fn test_final_analysis_roundtrip_field_names() {
        let analysis = FinalAnalysis {
            title: "제목".to_string(),
            translated_summary: "요약".to_string(),
            key_points: vec!["one".to_string()],
            narration: "narration".to_string(),
            audio_url: None,
            critical_analysis: CriticalAnalysis {
                why_important: "because".to_string(),
                future_prediction: "later".to_string(),
            },
            metadata: AnalysisMetadata {
                source_url: "https://example.com".to_string(),
                processed_at: "2025-05-06T00:00:00Z".to_string(),
                agents_used: vec!["validation".to_string()],
                mock_mode: true,
                image_url: None,
                language: Some("ko".to_string()),
                validation_confidence: Some(0.5),
            },
        };

        let value = serde_json::to_value(&analysis).unwrap();
        assert_eq!(value["keyPoints"][0], "one");
        assert_eq!(value["criticalAnalysis"]["whyImportant"], "because");
        assert_eq!(value["metadata"]["mockMode"], true);
        assert_eq!(value["metadata"]["agentsUsed"][0], "validation");
    }

    #[test]
    fn test_knowledge_chunk_id() {
        let chunk = KnowledgeChunk::new("https://example.com/a", 2, "text", vec![0.1]);
        assert_eq!(chunk.id, "https://example.com/a#2");
        assert!(chunk.similarity.is_none());
        let json = serde_json::to_string(&chunk).unwrap();
        assert!(!json.contains("similarity"));
    }
}
