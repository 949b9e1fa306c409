//! # Awful Article Insight
//!
//! Command-line entry point: analyze one article URL and print the run
//! result.
//!
//! ## Usage
//!
//! ```sh
//! awful_article_insight https://example.com/news/story --mock
//! ```
//!
//! The process exits non-zero when the run fails. A run that stops to ask
//! the reader a clarifying question is not a failure.

use awful_article_insight::cli::Cli;
use awful_article_insight::extractor::source_from_config;
use awful_article_insight::outputs::{json, markdown};
use awful_article_insight::utils::ensure_writable_dir;
use awful_article_insight::{Orchestrator, PipelineConfig, PipelineRunResult, Providers};
use clap::Parser;
use std::error::Error;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("article_insight starting up");

    let args = Cli::parse();
    debug!(url = %args.url, query = ?args.query, config = ?args.config, "Parsed CLI arguments");

    // ---- Configuration ----
    let mut config = PipelineConfig::load(args.config.as_deref())?;
    if args.mock {
        config.mock_mode = true;
    }
    if args.continue_on_failure {
        config.stop_on_failure = false;
    }
    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(e.into());
    }

    // Early check: ensure JSON output dir is writable
    if let Some(dir) = &args.json_output_dir {
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(
                path = %dir,
                error = %e,
                "JSON output directory is not writable (fix perms or choose a different path)"
            );
            return Err(e);
        }
    }

    // ---- Assemble pipeline ----
    let providers = Providers::from_config(&config)?;
    let source = source_from_config(&config)?;
    let orchestrator = Orchestrator::from_config(&config, &providers, source)?;
    info!(mock = config.mock_mode, stages = ?orchestrator.stage_names(), "Pipeline ready");

    // ---- Run ----
    let deadline = Duration::from_secs(args.timeout_secs);
    let result = match tokio::time::timeout(
        deadline,
        orchestrator.run_with_query(&args.url, args.query.as_deref()),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => {
            warn!(secs = args.timeout_secs, "Run exceeded its deadline");
            PipelineRunResult::failed(
                format!("deadline exceeded after {}s", args.timeout_secs),
                start_time.elapsed().as_millis() as u64,
            )
        }
    };

    // ---- Output ----
    if let Some(dir) = &args.json_output_dir {
        match json::write_run_result(&result, dir).await {
            Ok(path) => info!(path = %path.display(), "Saved run result"),
            Err(e) => error!(error = %e, "Failed to write run result JSON"),
        }
    }

    match (&result.final_analysis, args.markdown) {
        (Some(analysis), true) => println!("{}", markdown::final_analysis_to_markdown(analysis)),
        _ => println!("{}", serde_json::to_string_pretty(&result)?),
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        success = result.success,
        needs_clarification = result.needs_clarification,
        "Execution complete"
    );

    if result.success || result.needs_clarification {
        Ok(ExitCode::SUCCESS)
    } else {
        error!(
            stage = result.failed_stage.as_deref().unwrap_or("-"),
            error = result.error.as_deref().unwrap_or("unknown"),
            "Run failed"
        );
        Ok(ExitCode::FAILURE)
    }
}
