//! Offline article source.
//!
//! Registered fixtures are returned as is. Any other valid URL gets a
//! deterministic article synthesized from its host and last path segment,
//! long enough to pass validation, so mock runs work for arbitrary URLs.

use super::ArticleSource;
use crate::error::{PipelineError, Result};
use crate::models::ArticleData;
use async_trait::async_trait;
use itertools::Itertools;
use std::collections::HashMap;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone, Default)]
pub struct FixtureSource {
    articles: HashMap<String, ArticleData>,
}

impl FixtureSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `article` for its own URL.
    pub fn register(&mut self, article: ArticleData) {
        self.articles.insert(article.url.clone(), article);
    }

    pub fn with_article(mut self, article: ArticleData) -> Self {
        self.register(article);
        self
    }
}

/// `"city-council_budget.html"` → `"City Council Budget"`.
fn headline_from_segment(segment: &str) -> String {
    let stem = segment.split('.').next().unwrap_or(segment);
    stem.split(['-', '_', '+'])
        .filter(|w| !w.is_empty() && !w.chars().all(|c| c.is_ascii_digit()))
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .join(" ")
}

/// Deterministic stand-in article for a URL.
pub fn synthesize_article(url: &Url) -> ArticleData {
    let host = url.host_str().unwrap_or("example.com").to_string();
    let title = url
        .path_segments()
        .and_then(|segments| {
            segments
                .filter(|s| !s.is_empty())
                .map(headline_from_segment)
                .filter(|h| !h.is_empty())
                .last()
        })
        .unwrap_or_else(|| format!("Top Story from {host}"));

    let content = [
        format!("{title} is the main story reported by {host} today."),
        format!("Local officials confirmed the key facts behind {title} on Monday morning."),
        "Residents interviewed for the report described mixed reactions to the news.".to_string(),
        "Analysts expect the decision to influence next year's budget discussions.".to_string(),
        "Opposition members asked for a public hearing before any final vote.".to_string(),
        format!("Further coverage of {title} will follow as the situation develops."),
    ]
    .join(" ");

    let mut article = ArticleData::new(url.as_str(), title, content);
    article.source = Some(host);
    article.description = Some("Synthesized offline article.".to_string());
    article.with_metadata("bodySource", "fixture")
}

#[async_trait]
impl ArticleSource for FixtureSource {
    async fn fetch(&self, url: &str) -> Result<ArticleData> {
        if let Some(article) = self.articles.get(url) {
            debug!(%url, "Serving registered fixture");
            return Ok(article.clone());
        }
        let parsed = Url::parse(url)
            .map_err(|e| PipelineError::Fetch(format!("cannot fetch {url}: {e}")))?;
        debug!(%url, "Synthesizing fixture article");
        Ok(synthesize_article(&parsed))
    }
}
