//! # Awful Article Insight
//!
//! Turns any article URL into a structured, reader-facing analysis.
//!
//! ## Features
//!
//! - Readability-style extraction with browser-like headers and
//!   distinguished access-blocked errors
//! - An ordered pipeline of stages (validation, analysis, interpretation,
//!   style learning, illustration) sharing one immutable context per run
//! - Retrieval-augmented prompts backed by an embedding provider and a
//!   vector store
//! - Bounded exponential backoff for every provider call
//! - A fully offline mock mode with deterministic providers
//!
//! ## Architecture
//!
//! 1. **Extraction**: [`extractor::ContentExtractor`] fetches and parses the page
//! 2. **Stages**: [`pipeline::Orchestrator`] runs each [`pipeline::Stage`] in order
//! 3. **Providers**: chat, embeddings, images and vector search sit behind
//!    the traits in [`providers`], reached through [`api::ResilientClient`]
//! 4. **Output**: a [`PipelineRunResult`] serialized as JSON, or Markdown
//!    through [`outputs::markdown`]

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod extractor;
pub mod models;
pub mod outputs;
pub mod pipeline;
pub mod providers;
pub mod rag;
pub mod utils;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use extractor::ContentExtractor;
pub use models::{ArticleData, FinalAnalysis};
pub use pipeline::{Orchestrator, PipelineRunResult};
pub use providers::Providers;
