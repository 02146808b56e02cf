//! Shared types, error model, and configuration for dealscout.
//!
//! This crate is the foundation depended on by all other dealscout crates.
//! It provides:
//! - [`DealScoutError`] and the per-task [`TaskFailure`] taxonomy
//! - Domain types ([`Company`], [`CompanyRecord`], [`GuestObservation`], ...)
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CacheConfig, ConcurrencyConfig, FetchConfig, LimitsConfig, LlmConfig, PathsConfig,
    RateLimitPolicy, RateLimitRule, config_dir, config_file_path, init_config, load_config,
    load_config_from, validate_api_key,
};
pub use error::{DealScoutError, Result, TaskFailure};
pub use types::{
    Company, CompanyRecord, Episode, FounderResearch, GrantMatch, GuestAggregate,
    GuestObservation, ResearchRecord, WebsiteProfile,
};
