//! Run result rendering.
//!
//! - [`json`]: writes a [`PipelineRunResult`](crate::pipeline::PipelineRunResult)
//!   to a dated JSON file
//! - [`markdown`]: renders a [`FinalAnalysis`](crate::models::FinalAnalysis)
//!   as a readable Markdown document
//!
//! # Output Structure
//!
//! ```text
//! json_output_dir/
//! └── 2025-05-06/
//!     ├── transit-budget-approved-081502.json
//!     └── run-093011.json            # runs without a final analysis
//! ```

pub mod json;
pub mod markdown;
