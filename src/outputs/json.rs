//! JSON output of pipeline runs.
//!
//! Each run is written to its own file, grouped by local date:
//! `{json_output_dir}/{YYYY-MM-DD}/{slug}-{HHMMSS}.json`. The slug comes
//! from the final analysis title, or `run` when the run produced none.

use crate::pipeline::PipelineRunResult;
use crate::utils::slugify_title;
use chrono::Local;
use std::error::Error;
use std::path::PathBuf;
use tokio::fs;
use tracing::{error, info, instrument};

const MAX_SLUG_CHARS: usize = 60;

fn file_slug(result: &PipelineRunResult) -> String {
    let slug = result
        .final_analysis
        .as_ref()
        .map(|analysis| slugify_title(&analysis.title))
        .unwrap_or_default();
    let slug: String = slug
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
        .chars()
        .take(MAX_SLUG_CHARS)
        .collect();
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "run".to_string()
    } else {
        slug.to_string()
    }
}

/// Write a [`PipelineRunResult`] as pretty-printed JSON.
///
/// Creates the dated directory when needed and returns the written path.
#[instrument(level = "info", skip_all, fields(json_output_dir = %json_output_dir))]
pub async fn write_run_result(
    result: &PipelineRunResult,
    json_output_dir: &str,
) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(result)?;
    let now = Local::now();

    let full_json_dir = PathBuf::from(json_output_dir).join(now.format("%Y-%m-%d").to_string());
    info!(full_json_dir = %full_json_dir.display(), "Ensuring JSON directory exists");
    if let Err(e) = fs::create_dir_all(&full_json_dir).await {
        error!(full_json_dir = %full_json_dir.display(), error = %e, "Failed to create JSON dir");
        return Err(e.into());
    }

    let path = full_json_dir.join(format!("{}-{}.json", file_slug(result), now.format("%H%M%S")));
    fs::write(&path, json).await?;
    info!(path = %path.display(), success = result.success, "Wrote run result JSON");

    Ok(path)
}
