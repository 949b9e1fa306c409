//! URL check, fetch, and content validation.
//!
//! Hard checks (URL syntax, fetch, title, minimum length) fail the stage.
//! The model's opinion on whether the page is a news article only adjusts
//! the recorded confidence and never fails the stage.

use super::{VALIDATION, fail};
use crate::error::PipelineError;
use crate::extractor::ArticleSource;
use crate::models::ArticleData;
use crate::pipeline::prompts::{self, VALIDATION_SYSTEM, ValidationVerdict};
use crate::pipeline::{ContextUpdate, PipelineContext, Stage, StageResult, VALIDATION_CONFIDENCE};
use crate::providers::{ChatProvider, CompletionOptions};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use url::Url;

pub const VALIDATION_NOTE: &str = "validation_note";

/// The verdict is a tiny JSON object.
const VERDICT_MAX_TOKENS: u32 = 200;

#[derive(Debug, Clone)]
pub struct ValidationStage {
    source: Arc<dyn ArticleSource>,
    chat: Arc<dyn ChatProvider>,
    min_content_length: usize,
}

/// Accept absolute `http`/`https` URLs with a host.
pub fn check_url(raw: &str) -> Result<Url, PipelineError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| PipelineError::Validation(format!("invalid URL {raw:?}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(PipelineError::Validation(format!(
            "unsupported URL scheme {:?}",
            url.scheme()
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(PipelineError::Validation(format!("URL {raw:?} has no host")));
    }
    Ok(url)
}

impl ValidationStage {
    pub fn new(
        source: Arc<dyn ArticleSource>,
        chat: Arc<dyn ChatProvider>,
        min_content_length: usize,
    ) -> Self {
        Self {
            source,
            chat,
            min_content_length,
        }
    }

    fn check_content(&self, article: &ArticleData) -> Result<(), PipelineError> {
        if article.title.trim().is_empty() {
            return Err(PipelineError::Validation("article has no title".into()));
        }
        let length = article.content_length();
        if length < self.min_content_length {
            return Err(PipelineError::Validation(format!(
                "article content too short ({length} < {} characters)",
                self.min_content_length
            )));
        }
        Ok(())
    }

    /// Ask the model for a sanity check, falling back to a permissive verdict.
    async fn soft_check(&self, article: &ArticleData) -> (ValidationVerdict, Option<String>) {
        let options = CompletionOptions::new("validation")
            .json()
            .with_temperature(0.0)
            .with_max_tokens(VERDICT_MAX_TOKENS);
        let raw = match self
            .chat
            .complete(VALIDATION_SYSTEM, &prompts::validation_user(article), &options)
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Soft validation unavailable; accepting article");
                return (
                    ValidationVerdict::default(),
                    Some(format!("soft validation skipped: {e}")),
                );
            }
        };

        let parsed = prompts::parse_response::<ValidationVerdict>("validation", &raw)
            .map(|verdict| ValidationVerdict {
                confidence: verdict.confidence.clamp(0.0, 1.0),
                ..verdict
            });
        match parsed {
            Some(verdict) if verdict.isNewsArticle => (verdict, None),
            Some(verdict) => {
                let note = format!("model doubts this is a news article: {}", verdict.reason);
                warn!(confidence = verdict.confidence, "{note}");
                (verdict, Some(note))
            }
            None => (
                ValidationVerdict::default(),
                Some("soft validation returned malformed output".to_string()),
            ),
        }
    }
}

#[async_trait]
impl Stage for ValidationStage {
    fn name(&self) -> &'static str {
        VALIDATION
    }

    fn validate(&self, context: &PipelineContext) -> bool {
        !context.url.trim().is_empty()
    }

    #[instrument(level = "info", skip_all, fields(stage = VALIDATION, url = %context.url))]
    async fn process(&self, context: &PipelineContext) -> StageResult {
        let url = match check_url(&context.url) {
            Ok(url) => url,
            Err(e) => return fail(VALIDATION, e),
        };

        let article = match self.source.fetch(url.as_str()).await {
            Ok(article) => article,
            Err(e) => return fail(VALIDATION, e),
        };
        if let Err(e) = self.check_content(&article) {
            return fail(VALIDATION, e);
        }

        let (verdict, note) = self.soft_check(&article).await;
        info!(
            chars = article.content_length(),
            words = article.word_count(),
            confidence = verdict.confidence,
            "Article validated"
        );

        let mut update = ContextUpdate::article(article)
            .with_meta(VALIDATION_CONFIDENCE, format!("{:.2}", verdict.confidence));
        let mut side_effects = Vec::new();
        if let Some(note) = note {
            update = update.with_meta(VALIDATION_NOTE, note.clone());
            side_effects.push(note);
        }
        StageResult::Success {
            data: update,
            side_effects,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::extractor::FixtureSource;
    use crate::providers::mock::MockChat;

    #[derive(Debug)]
    struct ScriptedChat(std::result::Result<&'static str, u16>);

    #[async_trait]
    impl ChatProvider for ScriptedChat {
        async fn complete(&self, _: &str, _: &str, _: &CompletionOptions) -> Result<String> {
            match self.0 {
                Ok(text) => Ok(text.to_string()),
                Err(status) => Err(PipelineError::Provider {
                    status,
                    message: "bad request".into(),
                }),
            }
        }
    }

    fn stage(chat: Arc<dyn ChatProvider>) -> ValidationStage {
        let short = ArticleData::new("https://example.com/short", "Short", "Too short.");
        let untitled = ArticleData::new("https://example.com/untitled", " ", "x".repeat(500));
        let source = FixtureSource::new().with_article(short).with_article(untitled);
        ValidationStage::new(Arc::new(source), chat, 200)
    }

    fn failure_message(result: StageResult) -> String {
        match result {
            StageResult::Failure { messages } => messages.join("; "),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_check_url() {
        assert!(check_url("https://example.com/a").is_ok());
        assert!(check_url("not a url").is_err());
        assert!(check_url("ftp://example.com/file").is_err());
        assert!(check_url("mailto:someone@example.com").is_err());
    }

    #[tokio::test]
    async fn test_invalid_url_fails() {
        let result = stage(Arc::new(MockChat))
            .process(&PipelineContext::new("htp:/broken"))
            .await;
        assert!(failure_message(result).starts_with("Validation error"));
    }

    #[tokio::test]
    async fn test_short_and_untitled_articles_fail() {
        let stage = stage(Arc::new(MockChat));
        let short = stage
            .process(&PipelineContext::new("https://example.com/short"))
            .await;
        assert!(failure_message(short).contains("too short"));

        let untitled = stage
            .process(&PipelineContext::new("https://example.com/untitled"))
            .await;
        assert!(failure_message(untitled).contains("no title"));
    }

    #[tokio::test]
    async fn test_success_records_confidence() {
        let result = stage(Arc::new(MockChat))
            .process(&PipelineContext::new("https://example.com/news/harbor-bridge"))
            .await;
        let StageResult::Success { data, side_effects } = result else {
            panic!("expected success");
        };
        assert_eq!(data.article.unwrap().title, "Harbor Bridge");
        assert_eq!(data.metadata.get(VALIDATION_CONFIDENCE).map(String::as_str), Some("0.90"));
        assert!(side_effects.is_empty());
    }

    #[tokio::test]
    async fn test_soft_check_degrades_instead_of_failing() {
        for chat in [
            ScriptedChat(Ok("no json here")),
            ScriptedChat(Err(400)),
            ScriptedChat(Ok(r#"{"isNewsArticle":false,"confidence":0.2,"reason":"login page"}"#)),
        ] {
            let result = stage(Arc::new(chat))
                .process(&PipelineContext::new("https://example.com/news/harbor-bridge"))
                .await;
            let StageResult::Success { data, side_effects } = result else {
                panic!("soft validation must never fail the stage");
            };
            assert!(data.metadata.contains_key(VALIDATION_NOTE));
            assert_eq!(side_effects.len(), 1);
        }
    }

    #[tokio::test]
    async fn test_confidence_clamped_for_every_verdict() {
        for (raw, expected) in [
            (r#"{"isNewsArticle":true,"confidence":7.5}"#, "1.00"),
            (r#"{"isNewsArticle":false,"confidence":-3,"reason":"menu"}"#, "0.00"),
            (r#"{"isNewsArticle":false,"confidence":42,"reason":"menu"}"#, "1.00"),
        ] {
            let result = stage(Arc::new(ScriptedChat(Ok(raw))))
                .process(&PipelineContext::new("https://example.com/news/harbor-bridge"))
                .await;
            let StageResult::Success { data, .. } = result else {
                panic!("expected success");
            };
            assert_eq!(
                data.metadata.get(VALIDATION_CONFIDENCE).map(String::as_str),
                Some(expected),
                "{raw}"
            );
        }
    }
}
