//! Pick an illustration for the article.

use super::{ILLUSTRATION, fail};
use crate::pipeline::prompts;
use crate::pipeline::{ContextUpdate, PipelineContext, Stage, StageResult};
use crate::providers::ImageProvider;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument};

#[derive(Debug, Clone)]
pub struct IllustrationStage {
    images: Arc<dyn ImageProvider>,
}

impl IllustrationStage {
    pub fn new(images: Arc<dyn ImageProvider>) -> Self {
        Self { images }
    }
}

#[async_trait]
impl Stage for IllustrationStage {
    fn name(&self) -> &'static str {
        ILLUSTRATION
    }

    fn validate(&self, context: &PipelineContext) -> bool {
        context.article.is_some()
    }

    #[instrument(level = "info", skip_all, fields(stage = ILLUSTRATION, url = %context.url))]
    async fn process(&self, context: &PipelineContext) -> StageResult {
        let Some(article) = context.article.as_ref() else {
            return StageResult::failure("illustration requires an article");
        };

        let (title, summary) = match &context.analysis {
            Some(analysis) => (analysis.title.as_str(), analysis.translated_summary.as_str()),
            None => (
                article.title.as_str(),
                article.description.as_deref().unwrap_or_default(),
            ),
        };
        let prompt = prompts::illustration_prompt(title, summary);

        match self.images.generate(&prompt).await {
            Ok(Some(image_url)) => {
                info!(%image_url, "Illustration selected");
                StageResult::Success {
                    data: ContextUpdate::article(article.with_image_url(image_url.clone())),
                    side_effects: vec![format!("image replaced with {image_url}")],
                }
            }
            Ok(None) => StageResult::Success {
                data: ContextUpdate::default(),
                side_effects: vec!["no illustration generated; kept original image".to_string()],
            },
            Err(e) => fail(ILLUSTRATION, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PipelineError, Result};
    use crate::models::ArticleData;
    use crate::providers::mock::MockImages;

    #[derive(Debug)]
    struct Nothing;

    #[async_trait]
    impl ImageProvider for Nothing {
        async fn generate(&self, _: &str) -> Result<Option<String>> {
            Ok(None)
        }
    }

    #[derive(Debug)]
    struct Broken;

    #[async_trait]
    impl ImageProvider for Broken {
        async fn generate(&self, _: &str) -> Result<Option<String>> {
            Err(PipelineError::Provider {
                status: 400,
                message: "content policy".into(),
            })
        }
    }

    fn context() -> PipelineContext {
        let mut article = ArticleData::new("https://example.com/a", "City Council Votes", "Body.");
        article.image_url = Some("https://example.com/original.jpg".into());
        PipelineContext::new("https://example.com/a")
            .apply("validation", ContextUpdate::article(article))
    }

    #[tokio::test]
    async fn test_generated_image_replaces_original_by_copy() {
        let context = context();
        let result = IllustrationStage::new(Arc::new(MockImages)).process(&context).await;
        let StageResult::Success { data, .. } = result else {
            panic!("expected success");
        };
        let image = data.article.unwrap().image_url.unwrap();
        assert!(image.starts_with("https://placehold.co/"));
        assert_eq!(
            context.article.unwrap().image_url.as_deref(),
            Some("https://example.com/original.jpg")
        );
    }

    #[tokio::test]
    async fn test_no_image_keeps_original() {
        let result = IllustrationStage::new(Arc::new(Nothing)).process(&context()).await;
        let StageResult::Success { data, .. } = result else {
            panic!("expected success");
        };
        assert_eq!(data.article, None);
    }

    #[tokio::test]
    async fn test_provider_error_fails() {
        let result = IllustrationStage::new(Arc::new(Broken)).process(&context()).await;
        match result {
            StageResult::Failure { messages } => assert!(messages[0].contains("content policy")),
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
