//! Markdown rendering of a final analysis.

use crate::models::FinalAnalysis;
use std::fmt::Write;

/// Render a [`FinalAnalysis`] as a standalone Markdown document.
///
/// Sections with nothing to show are left out.
pub fn final_analysis_to_markdown(analysis: &FinalAnalysis) -> String {
    let mut md = String::new();

    let _ = writeln!(md, "# {}\n", analysis.title.trim());
    if let Some(image_url) = &analysis.metadata.image_url {
        let _ = writeln!(md, "![Illustration]({image_url})\n");
    }
    if !analysis.translated_summary.trim().is_empty() {
        let _ = writeln!(md, "{}\n", analysis.translated_summary.trim());
    }

    if !analysis.key_points.is_empty() {
        md.push_str("## Key Points\n\n");
        for point in &analysis.key_points {
            let _ = writeln!(md, "- {}", point.trim());
        }
        md.push('\n');
    }

    let critical = &analysis.critical_analysis;
    if !critical.why_important.trim().is_empty() {
        let _ = writeln!(md, "## Why It Matters\n\n{}\n", critical.why_important.trim());
    }
    if !critical.future_prediction.trim().is_empty() {
        let _ = writeln!(md, "## What Comes Next\n\n{}\n", critical.future_prediction.trim());
    }

    if !analysis.narration.trim().is_empty() {
        let _ = writeln!(md, "## Narration\n\n{}\n", analysis.narration.trim());
    }
    if let Some(audio_url) = &analysis.audio_url {
        let _ = writeln!(md, "[Listen]({audio_url})\n");
    }

    let meta = &analysis.metadata;
    md.push_str("---\n\n");
    let _ = writeln!(md, "- Source: <{}>", meta.source_url);
    let _ = writeln!(md, "- Processed: {}", meta.processed_at);
    let _ = writeln!(md, "- Stages: {}", meta.agents_used.join(", "));
    if let Some(language) = &meta.language {
        let _ = writeln!(md, "- Language: {language}");
    }
    if meta.mock_mode {
        md.push_str("- Generated offline (mock mode)\n");
    }

    md
}
