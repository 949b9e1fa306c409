//! Run an ordered list of stages and aggregate the final analysis.
//!
//! Execution is strictly sequential within a run. The orchestrator holds
//! no per-run state, so one instance can be shared (`Arc<Orchestrator>`)
//! across any number of concurrent runs.

use super::stages::{
    AnalysisStage, IllustrationStage, InterpretationStage, StyleLearningStage, ValidationStage,
};
use super::{PipelineContext, Stage, StageResult, VALIDATION_CONFIDENCE};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::extractor::ArticleSource;
use crate::models::{AnalysisMetadata, FinalAnalysis};
use crate::providers::Providers;
use crate::rag::RetrievalAugmenter;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Metadata key a speech step may set with the narration audio location.
pub const AUDIO_URL: &str = "audio_url";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Success,
    Failure,
    Partial,
}

/// Serialized outcome of one stage in a [`PipelineRunResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageOutcome {
    pub status: StageStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub side_effects: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl StageOutcome {
    fn success(side_effects: Vec<String>) -> Self {
        Self {
            status: StageStatus::Success,
            messages: Vec::new(),
            side_effects,
            question: None,
            reason: None,
        }
    }

    fn failure(messages: Vec<String>) -> Self {
        Self {
            status: StageStatus::Failure,
            messages,
            side_effects: Vec::new(),
            question: None,
            reason: None,
        }
    }

    fn partial(question: String, reason: String) -> Self {
        Self {
            status: StageStatus::Partial,
            messages: Vec::new(),
            side_effects: Vec::new(),
            question: Some(question),
            reason: Some(reason),
        }
    }
}

/// Everything a caller learns about one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRunResult {
    /// No stage failed and no clarification was requested.
    pub success: bool,
    /// Message of the first failure.
    pub error: Option<String>,
    pub failed_stage: Option<String>,
    pub needs_clarification: bool,
    pub clarification_question: Option<String>,
    pub clarification_reason: Option<String>,
    pub duration_ms: u64,
    /// Every stage that was attempted, in order.
    pub agents: Vec<String>,
    pub results: BTreeMap<String, StageOutcome>,
    pub final_analysis: Option<FinalAnalysis>,
}

impl PipelineRunResult {
    /// A run that failed before or outside any stage (e.g. a deadline).
    pub fn failed(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            failed_stage: None,
            needs_clarification: false,
            clarification_question: None,
            clarification_reason: None,
            duration_ms,
            agents: Vec::new(),
            results: BTreeMap::new(),
            final_analysis: None,
        }
    }
}

/// Ordered stage list plus run policy.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    stages: Vec<Arc<dyn Stage>>,
    stop_on_failure: bool,
    mock_mode: bool,
}

#[derive(Debug, Default)]
pub struct OrchestratorBuilder {
    stages: Vec<Arc<dyn Stage>>,
    continue_on_failure: bool,
    mock_mode: bool,
}

impl OrchestratorBuilder {
    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn stop_on_failure(mut self, stop: bool) -> Self {
        self.continue_on_failure = !stop;
        self
    }

    pub fn mock_mode(mut self, mock: bool) -> Self {
        self.mock_mode = mock;
        self
    }

    pub fn build(self) -> Orchestrator {
        Orchestrator {
            stages: self.stages,
            stop_on_failure: !self.continue_on_failure,
            mock_mode: self.mock_mode,
        }
    }
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    /// Assemble the standard stage list from configuration.
    ///
    /// Style learning is added only when editorial examples are available
    /// and illustration only when enabled.
    pub fn from_config(
        config: &PipelineConfig,
        providers: &Providers,
        source: Arc<dyn ArticleSource>,
    ) -> Result<Self> {
        let mut analysis = AnalysisStage::new(providers.chat.clone(), &config.target_language);
        if config.rag.enabled {
            let rag = RetrievalAugmenter::from_config(config, providers);
            analysis = analysis.with_rag(rag, config.rag.store_analyses);
        }
        if config.narration.enabled {
            analysis = analysis.with_narration(config.narration.min_chars);
        }

        let mut builder = Self::builder()
            .stop_on_failure(config.stop_on_failure)
            .mock_mode(config.mock_mode)
            .stage(ValidationStage::new(
                source,
                providers.chat.clone(),
                config.extractor.min_content_length,
            ))
            .stage(analysis)
            .stage(InterpretationStage::new(providers.chat.clone()));

        let examples = config.load_style_examples()?;
        if examples.is_empty() {
            debug!("No editorial examples; style learning disabled");
        } else {
            let mut style = StyleLearningStage::new(providers.chat.clone(), examples);
            if config.narration.enabled {
                style = style.with_narration_min_chars(config.narration.min_chars);
            }
            builder = builder.stage(style);
        }
        if config.illustration.enabled {
            builder = builder.stage(IllustrationStage::new(providers.images.clone()));
        }

        let orchestrator = builder.build();
        info!(stages = ?orchestrator.stage_names(), "Pipeline assembled");
        Ok(orchestrator)
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub async fn run(&self, url: &str) -> PipelineRunResult {
        self.run_with_query(url, None).await
    }

    /// Run every stage against a fresh context for `url`.
    #[instrument(level = "info", skip_all, fields(%url))]
    pub async fn run_with_query(&self, url: &str, query: Option<&str>) -> PipelineRunResult {
        let started = Instant::now();
        let mut context = PipelineContext::new(url).with_query(query.map(str::to_string));
        let mut agents = Vec::with_capacity(self.stages.len());
        let mut results = BTreeMap::new();
        let mut first_failure: Option<(String, String)> = None;
        let mut clarification: Option<(String, String)> = None;

        for stage in &self.stages {
            let name = stage.name();
            agents.push(name.to_string());

            let result = if stage.validate(&context) {
                debug!(stage = name, "Running stage");
                stage.process(&context).await
            } else {
                StageResult::failure(format!("{name}: preconditions not met"))
            };

            match result {
                StageResult::Success { data, side_effects } => {
                    context = context.apply(name, data);
                    results.insert(name.to_string(), StageOutcome::success(side_effects));
                }
                StageResult::Failure { messages } => {
                    let message = messages
                        .first()
                        .cloned()
                        .unwrap_or_else(|| format!("{name} failed"));
                    warn!(stage = name, error = %message, "Stage failed");
                    first_failure.get_or_insert((name.to_string(), message));
                    results.insert(name.to_string(), StageOutcome::failure(messages));
                    if self.stop_on_failure {
                        break;
                    }
                }
                StageResult::Partial {
                    clarification_question,
                    reason,
                } => {
                    info!(
                        stage = name,
                        question = %clarification_question,
                        "Clarification requested"
                    );
                    results.insert(
                        name.to_string(),
                        StageOutcome::partial(clarification_question.clone(), reason.clone()),
                    );
                    clarification = Some((clarification_question, reason));
                    break;
                }
            }
        }

        let final_analysis = if clarification.is_some() {
            None
        } else {
            self.aggregate(&context)
        };
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let success = first_failure.is_none() && clarification.is_none();
        let (failed_stage, error) = first_failure.unzip();
        let (clarification_question, clarification_reason) = clarification.unzip();

        info!(
            success,
            duration_ms,
            stages = agents.len(),
            needs_clarification = clarification_question.is_some(),
            "Pipeline run finished"
        );

        PipelineRunResult {
            success,
            error,
            failed_stage,
            needs_clarification: clarification_question.is_some(),
            clarification_question,
            clarification_reason,
            duration_ms,
            agents,
            results,
            final_analysis,
        }
    }

    /// Build the final artifact from whatever the context holds.
    fn aggregate(&self, context: &PipelineContext) -> Option<FinalAnalysis> {
        let analysis = context.analysis.as_ref()?;
        let article = context.article.as_ref();

        Some(FinalAnalysis {
            title: analysis.title.clone(),
            translated_summary: analysis.translated_summary.clone(),
            key_points: analysis.key_points.clone(),
            narration: analysis.narration.clone().unwrap_or_default(),
            audio_url: context.meta(AUDIO_URL).map(str::to_string),
            critical_analysis: analysis.critical_analysis.clone().unwrap_or_default(),
            metadata: AnalysisMetadata {
                source_url: context.url.clone(),
                processed_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                agents_used: context.processed_stages.clone(),
                mock_mode: self.mock_mode,
                image_url: article.and_then(|a| a.image_url.clone()),
                language: Some(analysis.language.clone()).filter(|l| !l.is_empty()),
                validation_confidence: context
                    .meta(VALIDATION_CONFIDENCE)
                    .and_then(|c| c.parse().ok()),
            },
        })
    }
}
