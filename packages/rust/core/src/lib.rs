//! Core pipeline orchestration and domain logic for DealScout.
//!
//! This crate ties the registry, grant, research, website and podcast stages
//! together into the two end-to-end runs in [`pipeline`].

pub mod grants;
pub mod llm;
pub mod merge;
pub mod nace;
pub mod parser;
pub mod pipeline;
pub mod podcast;
pub mod registry;
pub mod research;
pub mod runner;
pub mod website;

#[cfg(test)]
mod testutil;

pub use llm::{CompletionOptions, LlmClient, OpenRouterClient};
pub use pipeline::{
    CompanyRunOptions, CompanyRunSummary, PipelineDeps, PodcastRunOptions, PodcastRunSummary,
    ProgressReporter, SilentProgress, run_company_pipeline, run_podcast_pipeline,
};
pub use runner::{RunOptions, run_bounded};
