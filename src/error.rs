//! Error taxonomy shared by extraction, providers and the pipeline.
//!
//! Every fallible operation in the crate returns [`Result`]. The variants
//! map one-to-one onto the ways a run can go wrong: fetching the page,
//! parsing it, validating it, or talking to one of the AI providers.

use thiserror::Error;

/// Errors produced anywhere in the article pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Network or HTTP failure while fetching the article.
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// The site refused access (HTTP 403/451), usually bot or paywall detection.
    #[error("Access blocked (HTTP {status}): {url}")]
    AccessBlocked { status: u16, url: String },

    /// The page was fetched but no readable body could be extracted.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Content is present but unusable (too short, missing title, bad URL).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Non-retryable provider rejection (4xx other than 429).
    #[error("Provider error (HTTP {status}): {message}")]
    Provider { status: u16, message: String },

    /// The provider kept answering 429 until retries ran out.
    #[error("Rate limited after {attempts} attempts: {message}")]
    RateLimited { attempts: usize, message: String },

    /// The provider kept answering 5xx until retries ran out.
    #[error("Server error (HTTP {status}) after {attempts} attempts: {message}")]
    Server {
        status: u16,
        attempts: usize,
        message: String,
    },

    /// DNS, connect, timeout or reset. Never retried.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    /// Short stable name of the variant, used in logs and run results.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Fetch(_) => "FetchError",
            PipelineError::AccessBlocked { .. } => "AccessBlocked",
            PipelineError::Parse(_) => "ParseError",
            PipelineError::Validation(_) => "ValidationError",
            PipelineError::Provider { .. } => "ProviderError",
            PipelineError::RateLimited { .. } => "RateLimited",
            PipelineError::Server { .. } => "ServerError",
            PipelineError::Transport(_) => "TransportError",
            PipelineError::Config(_) => "ConfigError",
            PipelineError::Serialization(_) => "SerializationError",
        }
    }

    /// Whether a retry could plausibly succeed (rate limits and 5xx).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::RateLimited { .. } | PipelineError::Server { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_blocked_display() {
        let err = PipelineError::AccessBlocked {
            status: 451,
            url: "https://example.com/a".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Access blocked (HTTP 451): https://example.com/a"
        );
        assert_eq!(err.kind(), "AccessBlocked");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(
            PipelineError::RateLimited {
                attempts: 3,
                message: "slow down".into()
            }
            .is_retryable()
        );
        assert!(!PipelineError::Transport("reset".into()).is_retryable());
        assert!(
            !PipelineError::Provider {
                status: 400,
                message: "bad".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_serde_error_converts() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: PipelineError = parse.unwrap_err().into();
        assert_eq!(err.kind(), "SerializationError");
    }
}
