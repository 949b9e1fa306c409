//! The staged analysis pipeline.
//!
//! A run threads one [`PipelineContext`] through an ordered list of
//! [`Stage`]s. Each stage reads the context and answers with a
//! [`StageResult`]:
//!
//! - [`StageResult::Success`] carries a [`ContextUpdate`] that the
//!   orchestrator folds into a new context before the next stage runs.
//! - [`StageResult::Failure`] stops the run, or is recorded and skipped
//!   when the pipeline continues on failure.
//! - [`StageResult::Partial`] stops the run with a clarification question.
//!   It is not an error.
//!
//! Stages hold only their collaborators and configuration. Everything that
//! belongs to one run lives in its context, so a single
//! [`Orchestrator`](orchestrator::Orchestrator) can serve concurrent runs.

use crate::models::{AnalysisResult, ArticleData};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;

pub mod orchestrator;
pub mod prompts;
pub mod stages;

pub use orchestrator::{Orchestrator, OrchestratorBuilder, PipelineRunResult, StageOutcome};

/// Metadata key under which the validation stage records its confidence.
pub const VALIDATION_CONFIDENCE: &str = "validation_confidence";

/// State of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineContext {
    pub url: String,
    pub query: Option<String>,
    pub article: Option<ArticleData>,
    pub analysis: Option<AnalysisResult>,
    pub metadata: BTreeMap<String, String>,
    /// Names of the stages that succeeded, in order.
    pub processed_stages: Vec<String>,
}

impl PipelineContext {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_query(mut self, query: Option<String>) -> Self {
        self.query = query.map(|q| q.trim().to_string()).filter(|q| !q.is_empty());
        self
    }

    /// Fold a successful stage's output into the context.
    ///
    /// Articles and analyses are replaced wholesale; metadata entries are
    /// added (a later stage may overwrite a key).
    pub fn apply(mut self, stage: &str, update: ContextUpdate) -> Self {
        if let Some(article) = update.article {
            self.article = Some(article);
        }
        if let Some(analysis) = update.analysis {
            self.analysis = Some(analysis);
        }
        self.metadata.extend(update.metadata);
        self.processed_stages.push(stage.to_string());
        self
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

/// Data produced by a successful stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextUpdate {
    pub article: Option<ArticleData>,
    pub analysis: Option<AnalysisResult>,
    pub metadata: BTreeMap<String, String>,
}

impl ContextUpdate {
    pub fn article(article: ArticleData) -> Self {
        Self {
            article: Some(article),
            ..Self::default()
        }
    }

    pub fn analysis(analysis: AnalysisResult) -> Self {
        Self {
            analysis: Some(analysis),
            ..Self::default()
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Outcome of one stage invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum StageResult {
    Success {
        data: ContextUpdate,
        /// Human-readable notes about work done outside the context
        /// (stored chunks, degraded fallbacks, ...).
        side_effects: Vec<String>,
    },
    Failure {
        messages: Vec<String>,
    },
    Partial {
        clarification_question: String,
        reason: String,
    },
}

impl StageResult {
    pub fn success(data: ContextUpdate) -> Self {
        StageResult::Success {
            data,
            side_effects: Vec::new(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        StageResult::Failure {
            messages: vec![message.into()],
        }
    }
}

/// A unit of work in the pipeline.
#[async_trait]
pub trait Stage: Send + Sync + fmt::Debug {
    /// Stable name used in run results and logs.
    fn name(&self) -> &'static str;

    /// Cheap precondition check on the incoming context.
    fn validate(&self, context: &PipelineContext) -> bool;

    async fn process(&self, context: &PipelineContext) -> StageResult;
}
