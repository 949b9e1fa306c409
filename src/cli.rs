//! Command-line interface definitions for Awful Article Insight.
//!
//! Flags override the matching configuration file settings; the mock flag
//! can also come from the environment.

use clap::Parser;
use std::path::PathBuf;

/// Analyze a single article URL.
///
/// # Examples
///
/// ```sh
/// # Offline run with deterministic providers
/// awful_article_insight https://example.com/news/story --mock
///
/// # Live run answering a reader question, saving the result
/// awful_article_insight https://example.com/news/story \
///     --query "what does this mean for renters" -c config.yaml -j ./runs
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Article URL to analyze
    pub url: String,

    /// Optional reader question to interpret the article against
    #[arg(short, long)]
    pub query: Option<String>,

    /// Optional path to config.yaml file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Use deterministic offline providers instead of live services
    #[arg(long, env = "ARTICLE_INSIGHT_MOCK")]
    pub mock: bool,

    /// Keep running later stages after a stage fails
    #[arg(long)]
    pub continue_on_failure: bool,

    /// Abort the whole run after this many seconds
    #[arg(long, default_value_t = 300)]
    pub timeout_secs: u64,

    /// Directory to save the run result JSON under (dated subdirectories)
    #[arg(short, long)]
    pub json_output_dir: Option<String>,

    /// Print the final analysis as Markdown instead of the run result JSON
    #[arg(short, long)]
    pub markdown: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from([
            "awful_article_insight",
            "https://example.com/news/story",
            "--query",
            "impact on renters",
            "--config",
            "./config.yaml",
            "--continue-on-failure",
        ]);

        assert_eq!(cli.url, "https://example.com/news/story");
        assert_eq!(cli.query.as_deref(), Some("impact on renters"));
        assert_eq!(cli.config, Some(PathBuf::from("./config.yaml")));
        assert!(cli.continue_on_failure);
        assert_eq!(cli.timeout_secs, 300);
        assert!(cli.json_output_dir.is_none());
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from([
            "awful_article_insight",
            "https://example.com/a",
            "-q",
            "why now",
            "-j",
            "/tmp/runs",
            "-m",
            "--mock",
        ]);

        assert_eq!(cli.query.as_deref(), Some("why now"));
        assert_eq!(cli.json_output_dir.as_deref(), Some("/tmp/runs"));
        assert!(cli.markdown);
        assert!(cli.mock);
    }

    #[test]
    fn test_cli_requires_url() {
        assert!(Cli::try_parse_from(["awful_article_insight"]).is_err());
    }
}
