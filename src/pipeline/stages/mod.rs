//! Concrete pipeline stages, in their default order.
//!
//! | Stage | Reads | Produces |
//! |-------|-------|----------|
//! | [`ValidationStage`] | url | article, validation confidence |
//! | [`AnalysisStage`] | article | analysis (summary, key points, narration) |
//! | [`InterpretationStage`] | article, analysis, query | critical analysis, filtered key points, or a clarification |
//! | [`StyleLearningStage`] | analysis | restyled summary and narration |
//! | [`IllustrationStage`] | article, analysis | article with a new image |

use super::StageResult;
use crate::error::PipelineError;
use tracing::warn;

pub mod analysis;
pub mod illustration;
pub mod interpretation;
pub mod style;
pub mod validation;

pub use analysis::AnalysisStage;
pub use illustration::IllustrationStage;
pub use interpretation::InterpretationStage;
pub use style::StyleLearningStage;
pub use validation::ValidationStage;

pub const VALIDATION: &str = "validation";
pub const ANALYSIS: &str = "analysis";
pub const INTERPRETATION: &str = "interpretation";
pub const STYLE_LEARNING: &str = "style_learning";
pub const ILLUSTRATION: &str = "illustration";

/// Turn an error into a stage failure, logging it once.
fn fail(stage: &'static str, error: PipelineError) -> StageResult {
    warn!(
        stage,
        kind = error.kind(),
        retryable = error.is_retryable(),
        error = %error,
        "Stage failed"
    );
    StageResult::failure(error.to_string())
}

/// Trimmed, non-empty text or the fallback.
fn or_fallback(text: &str, fallback: impl FnOnce() -> String) -> String {
    let text = text.trim();
    if text.is_empty() {
        fallback()
    } else {
        text.to_string()
    }
}
