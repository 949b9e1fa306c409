//! Pipeline configuration.
//!
//! Configuration is read from a YAML file where every field is optional;
//! anything left out takes the default below. Secrets fall back to the
//! environment (`OPENAI_API_KEY`, `SUPABASE_URL`, `SUPABASE_SERVICE_KEY`)
//! so they don't have to live in the file.
//!
//! ```yaml
//! mock_mode: false
//! target_language: ko
//! retry:
//!   max_retries: 3
//! narration:
//!   enabled: true
//!   min_chars: 900
//! style:
//!   examples_path: ./style_examples.yaml
//! ```

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Top-level configuration for a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Run every provider offline with deterministic fixtures.
    pub mock_mode: bool,
    /// Stop the run at the first failing stage.
    pub stop_on_failure: bool,
    /// Language summaries and narration are written in.
    pub target_language: String,
    pub extractor: ExtractorConfig,
    pub retry: RetryConfig,
    pub openai: OpenAiConfig,
    pub vector_store: VectorStoreConfig,
    pub rag: RagConfig,
    pub narration: NarrationConfig,
    pub illustration: IllustrationConfig,
    pub style: StyleConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mock_mode: false,
            stop_on_failure: true,
            target_language: "ko".to_string(),
            extractor: ExtractorConfig::default(),
            retry: RetryConfig::default(),
            openai: OpenAiConfig::default(),
            vector_store: VectorStoreConfig::default(),
            rag: RagConfig::default(),
            narration: NarrationConfig::default(),
            illustration: IllustrationConfig::default(),
            style: StyleConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub timeout_secs: u64,
    pub max_redirects: usize,
    /// Minimum body length (in characters) for a content candidate to be accepted.
    pub min_content_length: usize,
    pub user_agent: String,
    pub accept_language: String,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            max_redirects: 5,
            min_content_length: 200,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: "en-US,en;q=0.9,ko;q=0.8".to_string(),
        }
    }
}

impl ExtractorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per provider call, including the first one.
    pub max_retries: usize,
    pub base_delay_ms: u64,
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_secs: 30,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub chat_model: String,
    pub embedding_model: String,
    pub image_model: String,
    pub request_timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            chat_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            image_model: "dall-e-3".to_string(),
            request_timeout_secs: 120,
        }
    }
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_deref().map(|_| "<redacted>"))
            .field("chat_model", &self.chat_model)
            .field("embedding_model", &self.embedding_model)
            .field("image_model", &self.image_model)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub feedback_collection: String,
    pub analysis_collection: String,
    pub top_k: usize,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            feedback_collection: "editorial_feedback".to_string(),
            analysis_collection: "news_analyses".to_string(),
            top_k: 3,
        }
    }
}

impl std::fmt::Debug for VectorStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStoreConfig")
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_deref().map(|_| "<redacted>"))
            .field("feedback_collection", &self.feedback_collection)
            .field("analysis_collection", &self.analysis_collection)
            .field("top_k", &self.top_k)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub enabled: bool,
    /// Upper bound, in characters, of a stored chunk.
    pub chunk_size: usize,
    /// Store each finished analysis so later runs can retrieve it.
    pub store_analyses: bool,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            chunk_size: 800,
            store_analyses: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrationConfig {
    pub enabled: bool,
    pub min_chars: usize,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_chars: 900,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IllustrationConfig {
    pub enabled: bool,
}

impl Default for IllustrationConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleConfig {
    /// YAML list of editorial example texts the style stage learns from.
    pub examples_path: Option<PathBuf>,
}

impl PipelineConfig {
    /// Load configuration from an optional YAML file.
    ///
    /// No path means defaults. A path that cannot be read or parsed is a
    /// [`PipelineError::Config`]. Environment fallbacks are applied after
    /// parsing.
    #[instrument(level = "info")]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    PipelineError::Config(format!("cannot read {}: {e}", path.display()))
                })?;
                let parsed = Self::from_yaml(&raw)?;
                info!(path = %path.display(), "Loaded configuration");
                parsed
            }
            None => {
                debug!("No configuration file given; using defaults");
                Self::default()
            }
        };
        config.apply_env();
        Ok(config)
    }

    /// Parse configuration from YAML text. An empty document yields defaults.
    pub fn from_yaml(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).map_err(|e| PipelineError::Config(format!("invalid YAML: {e}")))
    }

    fn apply_env(&mut self) {
        if self.openai.api_key.is_none() {
            self.openai.api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());
        }
        if self.vector_store.url.is_none() {
            self.vector_store.url = std::env::var("SUPABASE_URL").ok().filter(|u| !u.is_empty());
        }
        if self.vector_store.api_key.is_none() {
            self.vector_store.api_key = std::env::var("SUPABASE_SERVICE_KEY")
                .ok()
                .filter(|k| !k.is_empty());
        }
    }

    /// Reject configurations that cannot produce a working pipeline.
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_retries == 0 {
            return Err(PipelineError::Config("retry.max_retries must be at least 1".into()));
        }
        if self.rag.chunk_size == 0 {
            return Err(PipelineError::Config("rag.chunk_size must be positive".into()));
        }
        if !self.mock_mode && self.openai.api_key.is_none() {
            return Err(PipelineError::Config(
                "openai.api_key (or OPENAI_API_KEY) is required outside mock mode".into(),
            ));
        }
        Ok(())
    }

    /// Load the editorial style examples, if configured.
    ///
    /// Returns an empty list when no path is configured; an unreadable or
    /// malformed file is a configuration error.
    pub fn load_style_examples(&self) -> Result<Vec<String>> {
        let Some(path) = &self.style.examples_path else {
            return Ok(Vec::new());
        };
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read style examples {}: {e}", path.display()))
        })?;
        let examples: Vec<String> = serde_yaml::from_str(&raw).map_err(|e| {
            PipelineError::Config(format!("invalid style examples {}: {e}", path.display()))
        })?;
        Ok(examples
            .into_iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect())
    }
}
