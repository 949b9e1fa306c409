//! Article content extraction.
//!
//! [`ContentExtractor`] fetches a page with browser-like headers and turns
//! the HTML into an [`ArticleData`]:
//!
//! 1. **Pre-check**: `HEAD` the URL. A 451 is final; a 403/405 or a
//!    failed `HEAD` is confirmed with the `GET` below.
//! 2. **Fetch**: `GET` following at most `max_redirects` redirects.
//!    403/451 become [`PipelineError::AccessBlocked`], other non-success
//!    statuses and transport failures [`PipelineError::Fetch`].
//! 3. **Parse**: title and metadata from the raw document ([`metadata`]),
//!    then noise stripping and body selection ([`html`]).
//!
//! [`ArticleSource`] is the seam the pipeline fetches through, so offline
//! runs can swap in a [`FixtureSource`].

use crate::config::{ExtractorConfig, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::models::ArticleData;
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use scraper::Html;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub mod fixture;
pub mod html;
pub mod metadata;

pub use fixture::FixtureSource;

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

/// Anything that can turn a URL into an article.
#[async_trait]
pub trait ArticleSource: Send + Sync + fmt::Debug {
    async fn fetch(&self, url: &str) -> Result<ArticleData>;
}

/// The article source a configured pipeline fetches through: fixtures in
/// mock mode, the live extractor otherwise.
pub fn source_from_config(config: &PipelineConfig) -> Result<Arc<dyn ArticleSource>> {
    if config.mock_mode {
        return Ok(Arc::new(FixtureSource::new()));
    }
    Ok(Arc::new(ContentExtractor::new(&config.extractor)?))
}

/// Live HTML fetcher and readability-style extractor.
#[derive(Debug, Clone)]
pub struct ContentExtractor {
    client: reqwest::Client,
    min_content_length: usize,
}

fn blocked(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::FORBIDDEN | StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS
    )
}

impl ContentExtractor {
    pub fn new(config: &ExtractorConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(&config.accept_language)
                .map_err(|e| PipelineError::Config(format!("invalid accept_language: {e}")))?,
        );

        // Accept-Encoding is set by reqwest for the enabled decoders
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .timeout(config.timeout())
            .build()
            .map_err(|e| PipelineError::Config(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            client,
            min_content_length: config.min_content_length,
        })
    }

    /// `HEAD` the URL. Only an explicit 451 is conclusive here; anything
    /// else that is not a success is settled by the `GET`.
    async fn precheck(&self, url: &str) -> Result<()> {
        match self.client.head(url).send().await {
            Ok(resp) if resp.status() == StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS => {
                Err(PipelineError::AccessBlocked {
                    status: resp.status().as_u16(),
                    url: url.to_string(),
                })
            }
            Ok(resp) if resp.status().is_success() => Ok(()),
            Ok(resp) => {
                debug!(status = resp.status().as_u16(), "HEAD rejected; confirming with GET");
                Ok(())
            }
            Err(e) => {
                debug!(error = %e, "HEAD failed; confirming with GET");
                Ok(())
            }
        }
    }

    /// Fetch and extract one article.
    #[instrument(level = "info", skip_all, fields(%url))]
    pub async fn scrape(&self, url: &str) -> Result<ArticleData> {
        self.precheck(url).await?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PipelineError::Fetch(format!("GET {url} failed: {e}")))?;

        let status = response.status();
        if blocked(status) {
            warn!(status = status.as_u16(), "Access blocked");
            return Err(PipelineError::AccessBlocked {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        if !(status.is_success() || status.is_redirection()) {
            return Err(PipelineError::Fetch(format!("GET {url} returned HTTP {status}")));
        }

        let final_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| PipelineError::Fetch(format!("reading body of {url} failed: {e}")))?;
        debug!(bytes = body.len(), %final_url, "Fetched page");

        let article = parse_article(url, &body, self.min_content_length)?
            .with_metadata("finalUrl", final_url);
        info!(
            chars = article.content_length(),
            language = %article.language,
            "Extracted article"
        );
        Ok(article)
    }
}

#[async_trait]
impl ArticleSource for ContentExtractor {
    async fn fetch(&self, url: &str) -> Result<ArticleData> {
        self.scrape(url).await
    }
}

/// Extract an article from raw HTML.
///
/// Fails with [`PipelineError::Parse`] only when the page holds no text at
/// all. A missing title yields an empty one and is left to validation.
pub fn parse_article(url: &str, raw_html: &str, min_content_length: usize) -> Result<ArticleData> {
    let mut document = Html::parse_document(raw_html);

    let title = metadata::extract_title(&document).unwrap_or_default();
    let page = metadata::extract_metadata(&document, url);

    let removed = html::strip_noise(&mut document);
    let (content, body_source) = html::extract_body(&document, min_content_length)
        .ok_or_else(|| PipelineError::Parse(format!("no readable text in {url}")))?;
    debug!(removed, body = %body_source.describe(), "Selected article body");

    let language = metadata::detect_language(&document, &title, &content);

    let mut article = ArticleData::new(url, title, content);
    article.description = page.description;
    article.author = page.author;
    article.source = page.source;
    article.published_at = page.published_at;
    article.image_url = page.image_url;
    article.language = language;
    Ok(article.with_metadata("bodySource", body_source.describe()))
}
