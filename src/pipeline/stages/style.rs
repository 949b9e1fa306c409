//! Rewrite summary and narration in a learned editorial voice.
//!
//! Only assembled into a pipeline when editorial examples exist. Any
//! failure keeps the original text; this stage never fails a run.

use super::STYLE_LEARNING;
use crate::models::AnalysisResult;
use crate::pipeline::prompts::{self, STYLE_SYSTEM, StyleResponse};
use crate::pipeline::{ContextUpdate, PipelineContext, Stage, StageResult};
use crate::providers::{ChatProvider, CompletionOptions};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{instrument, warn};

#[derive(Debug, Clone)]
pub struct StyleLearningStage {
    chat: Arc<dyn ChatProvider>,
    examples: Vec<String>,
    /// A restyled narration shorter than this is rejected.
    narration_min_chars: usize,
}

impl StyleLearningStage {
    pub fn new(chat: Arc<dyn ChatProvider>, examples: Vec<String>) -> Self {
        Self {
            chat,
            examples,
            narration_min_chars: 0,
        }
    }

    pub fn with_narration_min_chars(mut self, min_chars: usize) -> Self {
        self.narration_min_chars = min_chars;
        self
    }

    fn unchanged(note: String) -> StageResult {
        StageResult::Success {
            data: ContextUpdate::default(),
            side_effects: vec![note],
        }
    }
}

#[async_trait]
impl Stage for StyleLearningStage {
    fn name(&self) -> &'static str {
        STYLE_LEARNING
    }

    fn validate(&self, context: &PipelineContext) -> bool {
        context.analysis.is_some() && !self.examples.is_empty()
    }

    #[instrument(
        level = "info",
        skip_all,
        fields(stage = STYLE_LEARNING, examples = self.examples.len())
    )]
    async fn process(&self, context: &PipelineContext) -> StageResult {
        let Some(analysis) = context.analysis.as_ref() else {
            return StageResult::failure("style learning requires an analysis");
        };
        let narration = analysis.narration.as_deref().unwrap_or_default();

        let options = CompletionOptions::new("style").json().with_temperature(0.5);
        let user = prompts::style_user(&self.examples, &analysis.translated_summary, narration);
        let raw = match self.chat.complete(STYLE_SYSTEM, &user, &options).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Style rewrite failed; keeping original text");
                return Self::unchanged(format!("style rewrite skipped: {e}"));
            }
        };
        let Some(styled) = prompts::parse_response::<StyleResponse>("style", &raw) else {
            return Self::unchanged("style rewrite malformed; kept original text".to_string());
        };

        let summary = styled.summary.trim();
        let restyled_narration = styled.narration.trim();
        let keep_narration = analysis.narration.is_none()
            || restyled_narration.chars().count() < self.narration_min_chars.max(1);

        let updated = AnalysisResult {
            translated_summary: if summary.is_empty() {
                analysis.translated_summary.clone()
            } else {
                summary.to_string()
            },
            narration: if keep_narration {
                analysis.narration.clone()
            } else {
                Some(restyled_narration.to_string())
            },
            ..analysis.clone()
        };

        let mut side_effects = Vec::new();
        if keep_narration && analysis.narration.is_some() {
            side_effects.push("restyled narration too short; kept original".to_string());
        }
        StageResult::Success {
            data: ContextUpdate::analysis(updated),
            side_effects,
        }
    }
}
