//! Outbound HTTP for dealscout.
//!
//! This crate provides:
//! - [`Fetcher`]: cached, per-host rate-limited GET with a lazily created session
//! - [`HostRateLimiters`]: ordered host-pattern token buckets
//! - [`html`]: text, link and attribute extraction helpers

pub mod fetcher;
pub mod html;
pub mod limiter;

pub use fetcher::{FetchResult, FetchStatus, Fetcher};
pub use html::{extract_links, extract_text, select_attr, truncate_chars};
pub use limiter::HostRateLimiters;
