//! Summary, key points and narration.
//!
//! The analysis prompt is augmented with retrieved editorial feedback and
//! prior analyses when a [`RetrievalAugmenter`] is configured. A malformed
//! model response degrades to an extractive summary built from the article
//! itself and is flagged with `analysis_degraded`.

use super::{ANALYSIS, fail, or_fallback};
use crate::models::{AnalysisResult, ArticleData};
use crate::pipeline::prompts::{self, AnalysisResponse};
use crate::pipeline::{ContextUpdate, PipelineContext, Stage, StageResult};
use crate::providers::{ChatProvider, CompletionOptions};
use crate::rag::RetrievalAugmenter;
use crate::utils::sentences;
use async_trait::async_trait;
use itertools::Itertools;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub const ANALYSIS_DEGRADED: &str = "analysis_degraded";

/// How much of the article feeds the retrieval query.
const RETRIEVAL_QUERY_CHARS: usize = 500;

#[derive(Debug, Clone)]
pub struct AnalysisStage {
    chat: Arc<dyn ChatProvider>,
    rag: Option<RetrievalAugmenter>,
    target_language: String,
    /// Minimum narration length; `None` disables narration.
    narration_min_chars: Option<usize>,
    store_analyses: bool,
}

impl AnalysisStage {
    pub fn new(chat: Arc<dyn ChatProvider>, target_language: impl Into<String>) -> Self {
        Self {
            chat,
            rag: None,
            target_language: target_language.into(),
            narration_min_chars: None,
            store_analyses: false,
        }
    }

    pub fn with_rag(mut self, rag: RetrievalAugmenter, store_analyses: bool) -> Self {
        self.rag = Some(rag);
        self.store_analyses = store_analyses;
        self
    }

    pub fn with_narration(mut self, min_chars: usize) -> Self {
        self.narration_min_chars = Some(min_chars);
        self
    }

    async fn user_prompt(&self, base: String, article: &ArticleData) -> String {
        match &self.rag {
            Some(rag) => {
                let query = format!(
                    "{}\n{}",
                    article.title,
                    article.content.chars().take(RETRIEVAL_QUERY_CHARS).collect::<String>()
                );
                rag.augment_prompt(&base, &query).await
            }
            None => base,
        }
    }

    async fn narrate(
        &self,
        article: &ArticleData,
        analysis: &AnalysisResult,
        min_chars: usize,
        side_effects: &mut Vec<String>,
    ) -> String {
        let options = CompletionOptions::new("narration").with_temperature(0.7);
        let narration = match self
            .chat
            .complete(
                &prompts::narration_system(&self.target_language, min_chars),
                &prompts::narration_user(article, &analysis.translated_summary, min_chars),
                &options,
            )
            .await
        {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                warn!(error = %e, "Narration generation failed; building it from the summary");
                side_effects.push(format!("narration generation failed: {e}"));
                String::new()
            }
        };

        let generated = narration.chars().count();
        let padded = pad_narration(narration, analysis, article, min_chars);
        if generated < min_chars {
            debug!(generated, padded = padded.chars().count(), "Padded short narration");
            side_effects.push(format!("narration padded to {min_chars} characters"));
        }
        padded
    }
}

/// Trim, drop empties and duplicates, keep order.
pub fn clean_points(points: impl IntoIterator<Item = String>) -> Vec<String> {
    points
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .unique()
        .collect()
}

/// Analysis built from the article alone, used when the model output is unusable.
pub fn fallback_analysis(article: &ArticleData, language: &str) -> AnalysisResult {
    let all = sentences(&article.content);
    let summary = if all.is_empty() {
        article.title.clone()
    } else {
        all.iter().take(3).join(" ")
    };
    let mut key_points = clean_points(all.into_iter().take(5));
    if key_points.is_empty() {
        key_points.push(article.title.clone());
    }
    AnalysisResult {
        title: article.title.clone(),
        translated_summary: summary,
        key_points,
        narration: None,
        critical_analysis: None,
        language: language.to_string(),
    }
}

/// Extend `narration` with the summary, key points and article sentences
/// until it reaches `min_chars` characters or there is nothing left to add.
pub fn pad_narration(
    narration: String,
    analysis: &AnalysisResult,
    article: &ArticleData,
    min_chars: usize,
) -> String {
    let fillers: Vec<String> = std::iter::once(analysis.translated_summary.clone())
        .chain(analysis.key_points.iter().cloned())
        .chain(sentences(&article.content))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let mut narration = narration;
    let mut length = narration.chars().count();
    if fillers.is_empty() {
        return narration;
    }
    for filler in fillers.iter().cycle() {
        if length >= min_chars {
            break;
        }
        if !narration.is_empty() {
            narration.push(' ');
            length += 1;
        }
        narration.push_str(filler);
        length += filler.chars().count();
    }
    narration
}

#[async_trait]
impl Stage for AnalysisStage {
    fn name(&self) -> &'static str {
        ANALYSIS
    }

    fn validate(&self, context: &PipelineContext) -> bool {
        context
            .article
            .as_ref()
            .is_some_and(|a| !a.content.trim().is_empty())
    }

    #[instrument(level = "info", skip_all, fields(stage = ANALYSIS, url = %context.url))]
    async fn process(&self, context: &PipelineContext) -> StageResult {
        let Some(article) = context.article.as_ref() else {
            return StageResult::failure("analysis requires an article");
        };

        let base = prompts::analysis_user(article, &self.target_language);
        let user = self.user_prompt(base, article).await;
        let options = CompletionOptions::new("analysis").json();
        let raw = match self
            .chat
            .complete(&prompts::analysis_system(&self.target_language), &user, &options)
            .await
        {
            Ok(raw) => raw,
            Err(e) => return fail(ANALYSIS, e),
        };

        let mut side_effects = Vec::new();
        let mut update = ContextUpdate::default();
        let fallback = fallback_analysis(article, &self.target_language);

        let mut analysis = match prompts::parse_response::<AnalysisResponse>("analysis", &raw) {
            Some(parsed) => {
                let key_points = clean_points(parsed.keyPoints);
                AnalysisResult {
                    title: or_fallback(&parsed.translatedTitle, || fallback.title.clone()),
                    translated_summary: or_fallback(&parsed.translatedSummary, || {
                        fallback.translated_summary.clone()
                    }),
                    key_points: if key_points.is_empty() {
                        fallback.key_points.clone()
                    } else {
                        key_points
                    },
                    ..fallback.clone()
                }
            }
            None => {
                side_effects.push("analysis degraded to an extractive summary".to_string());
                update = update.with_meta(ANALYSIS_DEGRADED, "true");
                fallback
            }
        };

        if let Some(min_chars) = self.narration_min_chars {
            let narration = self
                .narrate(article, &analysis, min_chars, &mut side_effects)
                .await;
            analysis.narration = Some(narration);
        }

        if let (Some(rag), true) = (&self.rag, self.store_analyses) {
            let collection = rag.analysis_collection().to_string();
            let report = rag
                .store_text(&collection, &context.url, &analysis.translated_summary)
                .await;
            side_effects.push(format!(
                "stored {} analysis chunk(s) in {collection} ({} skipped)",
                report.stored, report.skipped
            ));
        }

        info!(
            key_points = analysis.key_points.len(),
            narration_chars = analysis.narration.as_deref().map_or(0, |n| n.chars().count()),
            "Analysis complete"
        );
        update.analysis = Some(analysis);
        StageResult::Success {
            data: update,
            side_effects,
        }
    }
}
