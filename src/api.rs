//! Provider API calls with status-aware exponential backoff.
//!
//! Every request to an external AI or vector provider goes through
//! [`ResilientClient`], so the chat, embedding, image and vector-search
//! clients all share one retry policy instead of each carrying its own.
//!
//! # Retry Strategy
//!
//! | Outcome | Behavior |
//! |---------|----------|
//! | 2xx | Return the body |
//! | 429 | Wait `max(retry hint, backoff)` (hint capped at [`MAX_RETRY_HINT`]), retry; [`PipelineError::RateLimited`] when exhausted |
//! | 5xx | Wait `backoff`, retry; [`PipelineError::Server`] when exhausted |
//! | other 4xx | Fail immediately with [`PipelineError::Provider`] |
//! | transport failure | Fail immediately with [`PipelineError::Transport`] |
//!
//! The backoff before retry `n` (0-based) is:
//! ```text
//! delay = min(base_delay * 2^n, max_delay)
//! ```
//! `max_retries` counts total attempts, including the first one.

use crate::config::RetryConfig;
use crate::error::{PipelineError, Result};
use crate::utils::truncate_for_log;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::RequestBuilder;
use reqwest::header::RETRY_AFTER;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, instrument, warn};

static TRY_AGAIN_IN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)try again in\s*(\d+(?:\.\d+)?)\s*(ms|s)\b").expect("valid regex")
});
static RETRY_AFTER_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)retry-after:?\s*(\d+(?:\.\d+)?)").expect("valid regex"));

/// The parts of a provider HTTP response the retry policy looks at.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
    /// Value of the `Retry-After` header, when present and numeric.
    pub retry_after: Option<Duration>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            retry_after: None,
        }
    }
}

/// Something that can wait between attempts.
///
/// Production code uses [`TokioSleeper`]; the wait only suspends the task
/// that is retrying, never other runs.
#[async_trait]
pub trait Sleeper: Send + Sync + fmt::Debug {
    async fn sleep(&self, delay: Duration);
}

#[derive(Debug, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Backoff parameters shared by every provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_retries: usize,
    /// Delay before the first retry; doubles with each further retry.
    pub base_delay: Duration,
    /// Cap on the exponential delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_secs(config.max_delay_secs),
        }
    }
}

impl RetryPolicy {
    /// Exponential delay before retry number `retry` (0-based), capped at `max_delay`.
    pub fn backoff(&self, retry: usize) -> Duration {
        let factor = 1u32.checked_shl(retry as u32).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Longest wait a provider hint can ask for.
pub const MAX_RETRY_HINT: Duration = Duration::from_secs(300);

/// A hint in seconds as a wait, capped at [`MAX_RETRY_HINT`]. Negative and
/// non-finite values are ignored.
fn hint_duration(secs: f64) -> Option<Duration> {
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(secs.min(MAX_RETRY_HINT.as_secs_f64())).ok()
}

/// Extract a retry-after hint from a provider error body.
///
/// Understands OpenAI style `"Please try again in 20s"` / `"try again in 850ms"`
/// and header-like `"retry-after: 12"` text.
pub fn parse_retry_hint(body: &str) -> Option<Duration> {
    if let Some(caps) = TRY_AGAIN_IN.captures(body) {
        let value: f64 = caps[1].parse().ok()?;
        let secs = if caps[2].eq_ignore_ascii_case("ms") {
            value / 1000.0
        } else {
            value
        };
        return hint_duration(secs);
    }
    RETRY_AFTER_TEXT
        .captures(body)
        .and_then(|caps| caps[1].parse::<f64>().ok())
        .and_then(hint_duration)
}

/// Parse a numeric `Retry-After` header value (seconds).
pub fn parse_retry_after_header(value: &str) -> Option<Duration> {
    value.trim().parse::<f64>().ok().and_then(hint_duration)
}

/// Best-effort human-readable message from a provider error body.
///
/// Handles `{"error": {"message": ..}}`, `{"error": ".."}` and
/// `{"message": ..}` shapes, falling back to the (truncated) raw body.
pub fn provider_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let message = value
            .pointer("/error/message")
            .or_else(|| value.get("error"))
            .or_else(|| value.get("message"))
            .and_then(|m| m.as_str());
        if let Some(message) = message {
            return message.to_string();
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "no response body".to_string()
    } else {
        truncate_for_log(trimmed, 300)
    }
}

/// Shared HTTP client plus the retry policy every provider call goes through.
///
/// The underlying `reqwest::Client` pools connections and is safe to share
/// across concurrent runs; clone the `ResilientClient` freely.
#[derive(Clone)]
pub struct ResilientClient {
    http: reqwest::Client,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientClient")
            .field("max_retries", &self.policy.max_retries)
            .field("base_delay", &self.policy.base_delay)
            .field("max_delay", &self.policy.max_delay)
            .finish()
    }
}

impl ResilientClient {
    /// Create a client with its own connection pool and per-request timeout.
    pub fn new(policy: RetryPolicy, request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| PipelineError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_http(http, policy))
    }

    /// Wrap an existing `reqwest::Client`.
    pub fn with_http(http: reqwest::Client, policy: RetryPolicy) -> Self {
        Self {
            http,
            policy,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Replace the wait primitive (tests use a recording sleeper).
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Run `call` under the retry policy.
    ///
    /// `call` is invoked once per attempt and must report transport failures
    /// as `Err`; those are returned immediately without retrying.
    #[instrument(level = "debug", skip_all, fields(label = %label))]
    pub async fn execute<F, Fut>(&self, label: &str, mut call: F) -> Result<String>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<RawResponse>> + Send,
    {
        let total_t0 = Instant::now();
        let max_attempts = self.policy.max_retries.max(1);
        let mut attempt = 0usize;

        loop {
            attempt += 1;
            let attempt_t0 = Instant::now();
            let response = match call().await {
                Ok(response) => response,
                Err(e) => {
                    error!(
                        label,
                        attempt,
                        elapsed_ms_attempt = attempt_t0.elapsed().as_millis() as u64,
                        error = %e,
                        "provider call failed at transport level; not retrying"
                    );
                    return Err(e);
                }
            };

            let status = response.status;
            if (200..300).contains(&status) {
                debug!(
                    label,
                    attempt,
                    elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                    "provider call succeeded"
                );
                return Ok(response.body);
            }

            let message = provider_message(&response.body);
            let rate_limited = status == 429;
            if !rate_limited && !(500..600).contains(&status) {
                warn!(label, status, %message, "provider rejected request; not retrying");
                return Err(PipelineError::Provider { status, message });
            }

            if attempt >= max_attempts {
                error!(
                    label,
                    status,
                    attempt,
                    max = max_attempts,
                    elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                    %message,
                    "provider call exhausted retries"
                );
                return Err(if rate_limited {
                    PipelineError::RateLimited {
                        attempts: attempt,
                        message,
                    }
                } else {
                    PipelineError::Server {
                        status,
                        attempts: attempt,
                        message,
                    }
                });
            }

            let backoff = self.policy.backoff(attempt - 1);
            let delay = if rate_limited {
                let hint = response
                    .retry_after
                    .or_else(|| parse_retry_hint(&response.body));
                hint.map_or(backoff, |hint| hint.min(MAX_RETRY_HINT).max(backoff))
            } else {
                backoff
            };

            warn!(
                label,
                status,
                attempt,
                max = max_attempts,
                elapsed_ms_attempt = attempt_t0.elapsed().as_millis() as u64,
                ?delay,
                %message,
                "provider call failed; backing off"
            );
            self.sleeper.sleep(delay).await;
        }
    }

    /// POST a JSON body under the retry policy and return the response text.
    pub async fn post_json<T>(
        &self,
        label: &str,
        url: &str,
        bearer: Option<&str>,
        headers: &[(&str, &str)],
        body: &T,
    ) -> Result<String>
    where
        T: Serialize + ?Sized + Sync,
    {
        self.execute(label, || {
            let mut request = self.http.post(url).json(body);
            if let Some(key) = bearer {
                request = request.bearer_auth(key);
            }
            for (name, value) in headers {
                request = request.header(*name, *value);
            }
            send_raw(request)
        })
        .await
    }
}

async fn send_raw(request: RequestBuilder) -> Result<RawResponse> {
    let response = request
        .send()
        .await
        .map_err(|e| PipelineError::Transport(e.to_string()))?;
    let status = response.status().as_u16();
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after_header);
    let body = response
        .text()
        .await
        .map_err(|e| PipelineError::Transport(e.to_string()))?;
    Ok(RawResponse {
        status,
        body,
        retry_after,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Sleeper that records requested delays instead of waiting.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingSleeper {
        pub(crate) waits: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, delay: Duration) {
            self.waits.lock().unwrap().push(delay);
        }
    }

    fn client(max_retries: usize) -> (ResilientClient, Arc<RecordingSleeper>) {
        let sleeper = Arc::new(RecordingSleeper::default());
        let policy = RetryPolicy {
            max_retries,
            ..RetryPolicy::default()
        };
        let client = ResilientClient::with_http(reqwest::Client::new(), policy)
            .with_sleeper(sleeper.clone());
        (client, sleeper)
    }

    async fn run_script(
        client: &ResilientClient,
        script: Vec<Result<RawResponse>>,
    ) -> (Result<String>, usize) {
        let script = Mutex::new(VecDeque::from(script));
        let calls = AtomicUsize::new(0);
        let result = client
            .execute("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                let next = script
                    .lock()
                    .unwrap()
                    .pop_front()
                    .expect("script exhausted");
                async move { next }
            })
            .await;
        (result, calls.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn test_two_rate_limits_then_success() {
        let (client, sleeper) = client(3);
        let (result, calls) = run_script(
            &client,
            vec![
                Ok(RawResponse::new(429, "slow down")),
                Ok(RawResponse::new(429, "slow down")),
                Ok(RawResponse::new(200, "{\"ok\":true}")),
            ],
        )
        .await;

        assert_eq!(result.unwrap(), "{\"ok\":true}");
        assert_eq!(calls, 3);
        let waits = sleeper.waits.lock().unwrap();
        assert_eq!(
            *waits,
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn test_rate_limit_exhaustion() {
        let (client, sleeper) = client(3);
        let (result, calls) = run_script(
            &client,
            vec![
                Ok(RawResponse::new(429, "a")),
                Ok(RawResponse::new(429, "b")),
                Ok(RawResponse::new(429, "c")),
                Ok(RawResponse::new(429, "d")),
            ],
        )
        .await;

        match result {
            Err(PipelineError::RateLimited { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected RateLimited, got {other:?}"),
        }
        assert_eq!(calls, 3);
        assert_eq!(sleeper.waits.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_retry_hint_wins_when_longer() {
        let (client, sleeper) = client(3);
        let body = r#"{"error":{"message":"Rate limit reached. Please try again in 7s."}}"#;
        let (result, _) = run_script(
            &client,
            vec![Ok(RawResponse::new(429, body)), Ok(RawResponse::new(200, "done"))],
        )
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(*sleeper.waits.lock().unwrap(), vec![Duration::from_secs(7)]);
    }

    #[tokio::test]
    async fn test_retry_after_header_used() {
        let (client, sleeper) = client(3);
        let mut limited = RawResponse::new(429, "");
        limited.retry_after = Some(Duration::from_secs(4));
        let (result, _) =
            run_script(&client, vec![Ok(limited), Ok(RawResponse::new(200, "ok"))]).await;

        assert!(result.is_ok());
        assert_eq!(*sleeper.waits.lock().unwrap(), vec![Duration::from_secs(4)]);
    }

    #[tokio::test]
    async fn test_server_errors_retry_then_fail() {
        let (client, sleeper) = client(3);
        let (result, calls) = run_script(
            &client,
            vec![
                Ok(RawResponse::new(500, "boom")),
                Ok(RawResponse::new(502, "bad gateway")),
                Ok(RawResponse::new(503, "unavailable")),
            ],
        )
        .await;

        match result {
            Err(PipelineError::Server {
                status, attempts, ..
            }) => {
                assert_eq!(status, 503);
                assert_eq!(attempts, 3);
            }
            other => panic!("expected Server, got {other:?}"),
        }
        assert_eq!(calls, 3);
        assert_eq!(sleeper.waits.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_server_error_recovers() {
        let (client, sleeper) = client(3);
        let (result, _) = run_script(
            &client,
            vec![Ok(RawResponse::new(503, "")), Ok(RawResponse::new(201, "created"))],
        )
        .await;
        assert_eq!(result.unwrap(), "created");
        assert_eq!(*sleeper.waits.lock().unwrap(), vec![Duration::from_secs(1)]);
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let (client, sleeper) = client(3);
        let body = r#"{"error":{"message":"Invalid model","type":"invalid_request_error"}}"#;
        let (result, calls) = run_script(&client, vec![Ok(RawResponse::new(400, body))]).await;

        match result {
            Err(PipelineError::Provider { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "Invalid model");
            }
            other => panic!("expected Provider, got {other:?}"),
        }
        assert_eq!(calls, 1);
        assert!(sleeper.waits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_not_retried() {
        let (client, sleeper) = client(3);
        let (result, calls) = run_script(
            &client,
            vec![
                Err(PipelineError::Transport("connection reset".into())),
                Ok(RawResponse::new(200, "never reached")),
            ],
        )
        .await;

        assert!(matches!(result, Err(PipelineError::Transport(_))));
        assert_eq!(calls, 1);
        assert!(sleeper.waits.lock().unwrap().is_empty());
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(4), Duration::from_secs(16));
        assert_eq!(policy.backoff(5), Duration::from_secs(30));
        assert_eq!(policy.backoff(64), Duration::from_secs(30));
    }

    #[test]
    fn test_parse_retry_hint() {
        assert_eq!(
            parse_retry_hint("Please try again in 20s."),
            Some(Duration::from_secs(20))
        );
        assert_eq!(
            parse_retry_hint("try again in 1.5s"),
            Some(Duration::from_millis(1500))
        );
        assert_eq!(
            parse_retry_hint("Try again in 850ms"),
            Some(Duration::from_millis(850))
        );
        assert_eq!(
            parse_retry_hint("Retry-After: 12"),
            Some(Duration::from_secs(12))
        );
        assert_eq!(parse_retry_hint("nothing useful"), None);
    }

    #[test]
    fn test_unusable_hints_are_ignored_or_capped() {
        assert_eq!(
            parse_retry_hint("Please try again in 99999999999999999999999s"),
            Some(MAX_RETRY_HINT)
        );
        assert_eq!(parse_retry_hint("retry-after: 1e999"), Some(Duration::from_secs(1)));
        assert_eq!(parse_retry_after_header("12"), Some(Duration::from_secs(12)));
        assert_eq!(parse_retry_after_header(" 0.5 "), Some(Duration::from_millis(500)));
        for bad in ["-1", "inf", "-inf", "NaN", "Wed, 21 Oct 2015 07:28:00 GMT"] {
            assert_eq!(parse_retry_after_header(bad), None, "{bad}");
        }
        assert_eq!(parse_retry_after_header("1e30"), Some(MAX_RETRY_HINT));
    }

    #[tokio::test]
    async fn test_huge_body_hint_is_capped() {
        let (client, sleeper) = client(3);
        let body = "Rate limit reached. Please try again in 99999999999999999999999s.";
        let (result, _) = run_script(
            &client,
            vec![Ok(RawResponse::new(429, body)), Ok(RawResponse::new(200, "done"))],
        )
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(*sleeper.waits.lock().unwrap(), vec![MAX_RETRY_HINT]);
    }

    #[tokio::test]
    async fn test_oversized_header_hint_is_capped() {
        let (client, sleeper) = client(3);
        let mut limited = RawResponse::new(429, "");
        limited.retry_after = Some(Duration::MAX);
        let (result, _) =
            run_script(&client, vec![Ok(limited), Ok(RawResponse::new(200, "ok"))]).await;

        assert!(result.is_ok());
        assert_eq!(*sleeper.waits.lock().unwrap(), vec![MAX_RETRY_HINT]);
    }

    /// Local endpoint answering 429 with `retry_after` once, then 200.
    async fn rate_limited_endpoint(retry_after: &'static str) -> String {
        use axum::Router;
        use axum::http::StatusCode;
        use axum::response::IntoResponse;
        use axum::routing::post;

        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new().route(
            "/v1/chat",
            post(move || {
                let hits = hits.clone();
                async move {
                    if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                        (
                            StatusCode::TOO_MANY_REQUESTS,
                            [("retry-after", retry_after)],
                            "slow down",
                        )
                            .into_response()
                    } else {
                        (StatusCode::OK, "ok").into_response()
                    }
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}/v1/chat")
    }

    #[tokio::test]
    async fn test_malformed_retry_after_header_falls_back_to_backoff() {
        for (header, expected) in [
            ("-1", Duration::from_secs(1)),
            ("inf", Duration::from_secs(1)),
            ("NaN", Duration::from_secs(1)),
            ("99999999999999999999999", MAX_RETRY_HINT),
        ] {
            let url = rate_limited_endpoint(header).await;
            let (client, sleeper) = client(3);
            let body = client
                .post_json("chat", &url, None, &[], &serde_json::json!({}))
                .await
                .unwrap();
            assert_eq!(body, "ok");
            assert_eq!(*sleeper.waits.lock().unwrap(), vec![expected], "{header}");
        }
    }

    #[test]
    fn test_provider_message_shapes() {
        assert_eq!(provider_message(r#"{"error":{"message":"nested"}}"#), "nested");
        assert_eq!(provider_message(r#"{"error":"flat"}"#), "flat");
        assert_eq!(provider_message(r#"{"message":"top"}"#), "top");
        assert_eq!(provider_message("plain text"), "plain text");
        assert_eq!(provider_message("  "), "no response body");
    }

    #[test]
    fn test_policy_from_config() {
        let policy = RetryPolicy::from(&RetryConfig {
            max_retries: 0,
            base_delay_ms: 250,
            max_delay_secs: 10,
        });
        assert_eq!(policy.max_retries, 1);
        assert_eq!(policy.base_delay, Duration::from_millis(250));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
    }
}
