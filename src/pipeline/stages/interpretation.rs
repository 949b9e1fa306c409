//! Critical interpretation, key-point filtering and query clarification.

use super::{INTERPRETATION, fail, or_fallback};
use crate::models::{AnalysisResult, CriticalAnalysis};
use crate::pipeline::prompts::{self, INTERPRETATION_SYSTEM, InterpretationResponse};
use crate::pipeline::{ContextUpdate, PipelineContext, Stage, StageResult};
use crate::providers::{ChatProvider, CompletionOptions};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument};

/// Key points shorter than this (in characters) are treated as boilerplate.
pub const MIN_KEY_POINT_CHARS: usize = 8;
pub const MAX_KEY_POINTS: usize = 7;

const DEFAULT_QUESTION: &str =
    "Could you say more precisely what you want to know about this article?";
const DEFAULT_REASON: &str = "The query is too vague to answer from this article.";

#[derive(Debug, Clone)]
pub struct InterpretationStage {
    chat: Arc<dyn ChatProvider>,
}

impl InterpretationStage {
    pub fn new(chat: Arc<dyn ChatProvider>) -> Self {
        Self { chat }
    }
}

/// Drop short and duplicate key points (case-insensitively) and keep at
/// most [`MAX_KEY_POINTS`]. Never returns an empty list when `fallback`
/// is non-empty.
pub fn filter_key_points(points: &[String], fallback: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let filtered: Vec<String> = points
        .iter()
        .map(|p| p.trim())
        .filter(|p| p.chars().count() >= MIN_KEY_POINT_CHARS)
        .filter(|p| seen.insert(p.to_lowercase()))
        .take(MAX_KEY_POINTS)
        .map(str::to_string)
        .collect();

    if filtered.is_empty() && !fallback.trim().is_empty() {
        vec![fallback.trim().to_string()]
    } else {
        filtered
    }
}

fn default_critical_analysis(analysis: &AnalysisResult) -> CriticalAnalysis {
    CriticalAnalysis {
        why_important: format!(
            "\"{}\" concerns developments readers may need to follow.",
            analysis.title
        ),
        future_prediction: "Further developments are likely as the story unfolds.".to_string(),
    }
}

#[async_trait]
impl Stage for InterpretationStage {
    fn name(&self) -> &'static str {
        INTERPRETATION
    }

    fn validate(&self, context: &PipelineContext) -> bool {
        context.article.is_some() && context.analysis.is_some()
    }

    #[instrument(
        level = "info",
        skip_all,
        fields(stage = INTERPRETATION, url = %context.url, query = ?context.query)
    )]
    async fn process(&self, context: &PipelineContext) -> StageResult {
        let (Some(article), Some(analysis)) = (&context.article, &context.analysis) else {
            return StageResult::failure("interpretation requires an article and an analysis");
        };

        let user = prompts::interpretation_user(
            article,
            &analysis.translated_summary,
            context.query.as_deref(),
        );
        let options = CompletionOptions::new("interpretation").json();
        let raw = match self.chat.complete(INTERPRETATION_SYSTEM, &user, &options).await {
            Ok(raw) => raw,
            Err(e) => return fail(INTERPRETATION, e),
        };

        let mut side_effects = Vec::new();
        let defaults = default_critical_analysis(analysis);
        let response = prompts::parse_response::<InterpretationResponse>("interpretation", &raw)
            .unwrap_or_else(|| {
                side_effects.push("interpretation degraded to defaults".to_string());
                InterpretationResponse::default()
            });

        // only a reader query can be ambiguous
        if response.needsClarification && context.query.is_some() {
            info!("Query needs clarification");
            return StageResult::Partial {
                clarification_question: or_fallback(&response.clarificationQuestion, || {
                    DEFAULT_QUESTION.to_string()
                }),
                reason: or_fallback(&response.clarificationReason, || DEFAULT_REASON.to_string()),
            };
        }

        let critical = CriticalAnalysis {
            why_important: or_fallback(&response.whyImportant, || defaults.why_important.clone()),
            future_prediction: or_fallback(&response.futurePrediction, || {
                defaults.future_prediction.clone()
            }),
        };
        let key_points = filter_key_points(&analysis.key_points, &analysis.title);
        let dropped = analysis.key_points.len().saturating_sub(key_points.len());
        if dropped > 0 {
            side_effects.push(format!("filtered out {dropped} key point(s)"));
        }

        let updated = AnalysisResult {
            key_points,
            critical_analysis: Some(critical),
            ..analysis.clone()
        };
        StageResult::Success {
            data: ContextUpdate::analysis(updated),
            side_effects,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::models::ArticleData;
    use crate::providers::mock::MockChat;

    #[derive(Debug)]
    struct Fixed(&'static str);

    #[async_trait]
    impl ChatProvider for Fixed {
        async fn complete(&self, _: &str, _: &str, _: &CompletionOptions) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    fn context(query: Option<&str>, key_points: &[&str]) -> PipelineContext {
        let article = ArticleData::new("https://example.com/a", "Rate Decision", "Body text.");
        let analysis = AnalysisResult {
            title: "Rate Decision".into(),
            translated_summary: "The central bank held rates.".into(),
            key_points: key_points.iter().map(|s| s.to_string()).collect(),
            ..AnalysisResult::default()
        };
        PipelineContext::new("https://example.com/a")
            .with_query(query.map(str::to_string))
            .apply(
                "analysis",
                ContextUpdate {
                    article: Some(article),
                    analysis: Some(analysis),
                    ..ContextUpdate::default()
                },
            )
    }

    #[test]
    fn test_filter_key_points() {
        let points: Vec<String> = [
            "Rates held at 3.5%",
            "OK",
            "rates held at 3.5%",
            "  Inflation is cooling  ",
            "Growth slowed",
            "Jobs market steady",
            "Housing prices flat",
            "Exports rose slightly",
            "Wages climbed again",
            "Markets rallied",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let filtered = filter_key_points(&points, "fallback");
        assert_eq!(filtered.len(), MAX_KEY_POINTS);
        assert_eq!(filtered[0], "Rates held at 3.5%");
        assert_eq!(filtered[1], "Inflation is cooling");
        assert!(!filtered.iter().any(|p| p == "OK"));

        assert_eq!(
            filter_key_points(&["tiny".to_string()], "Rate Decision"),
            vec!["Rate Decision"]
        );
    }

    #[tokio::test]
    async fn test_ambiguous_query_yields_partial() {
        let result = InterpretationStage::new(Arc::new(MockChat))
            .process(&context(Some("rates"), &["Rates held steady today"]))
            .await;
        match result {
            StageResult::Partial {
                clarification_question,
                reason,
            } => {
                assert!(clarification_question.contains("rates"));
                assert!(!reason.is_empty());
            }
            other => panic!("expected partial, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_clarification_ignored_without_query() {
        let chat = Fixed(r#"{"needsClarification":true,"clarificationQuestion":"What?"}"#);
        let result = InterpretationStage::new(Arc::new(chat))
            .process(&context(None, &["Rates held steady today"]))
            .await;
        assert!(matches!(result, StageResult::Success { .. }));
    }

    #[tokio::test]
    async fn test_partial_gets_default_question() {
        let chat = Fixed(r#"{"needsClarification":true}"#);
        let result = InterpretationStage::new(Arc::new(chat))
            .process(&context(Some("why"), &[]))
            .await;
        let StageResult::Partial {
            clarification_question,
            reason,
        } = result
        else {
            panic!("expected partial");
        };
        assert_eq!(clarification_question, DEFAULT_QUESTION);
        assert_eq!(reason, DEFAULT_REASON);
    }

    #[tokio::test]
    async fn test_success_adds_critical_analysis() {
        let result = InterpretationStage::new(Arc::new(MockChat))
            .process(&context(
                Some("impact on mortgage holders"),
                &["Rates held steady today", "ok", "Rates held steady today"],
            ))
            .await;
        let StageResult::Success { data, side_effects } = result else {
            panic!("expected success");
        };
        let analysis = data.analysis.unwrap();
        let critical = analysis.critical_analysis.unwrap();
        assert!(critical.why_important.contains("Rate Decision"));
        assert!(!critical.future_prediction.is_empty());
        assert_eq!(analysis.key_points, vec!["Rates held steady today"]);
        assert_eq!(side_effects, vec!["filtered out 2 key point(s)"]);
    }

    #[tokio::test]
    async fn test_malformed_output_degrades() {
        let result = InterpretationStage::new(Arc::new(Fixed("not json")))
            .process(&context(Some("impact on savers"), &["Savers earn more interest"]))
            .await;
        let StageResult::Success { data, side_effects } = result else {
            panic!("expected success");
        };
        let critical = data.analysis.unwrap().critical_analysis.unwrap();
        assert!(critical.why_important.contains("Rate Decision"));
        assert_eq!(side_effects, vec!["interpretation degraded to defaults"]);
    }
}
