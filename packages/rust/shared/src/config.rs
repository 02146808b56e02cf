//! Application configuration for dealscout.
//!
//! User config lives at `~/.dealscout/dealscout.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DealScoutError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "dealscout.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".dealscout";

// ---------------------------------------------------------------------------
// Config structs (matching dealscout.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where inputs, outputs and the cache live.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Language model settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Outbound HTTP settings.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Per-call-site concurrency ceilings.
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,

    /// Row limits and time windows.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Per-host rate limits, first matching pattern wins.
    #[serde(default = "default_rate_limits")]
    pub rate_limits: Vec<RateLimitRule>,

    /// Policy for hosts no rule matches.
    #[serde(default = "default_rate_limit_policy")]
    pub rate_limit_default: RateLimitPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            llm: LlmConfig::default(),
            cache: CacheConfig::default(),
            fetch: FetchConfig::default(),
            concurrency: ConcurrencyConfig::default(),
            limits: LimitsConfig::default(),
            rate_limits: default_rate_limits(),
            rate_limit_default: default_rate_limit_policy(),
        }
    }
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Input data directory (registry CSV, grants CSV, episodes JSON).
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Output directory for Parquet artifacts.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// libSQL cache database file.
    #[serde(default = "default_cache_db")]
    pub cache_db: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            output_dir: default_output_dir(),
            cache_db: default_cache_db(),
        }
    }
}

fn default_data_dir() -> String {
    "data".into()
}
fn default_output_dir() -> String {
    "output".into()
}
fn default_cache_db() -> String {
    "data/.cache/dealscout.db".into()
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for company and founder research.
    #[serde(default = "default_research_model")]
    pub research_model: String,

    /// Model used for podcast guest extraction and clustering.
    #[serde(default = "default_extract_model")]
    pub extract_model: String,

    /// Model used for website link selection and analysis.
    #[serde(default = "default_analysis_model")]
    pub analysis_model: String,

    /// Per-request deadline in seconds.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            research_model: default_research_model(),
            extract_model: default_extract_model(),
            analysis_model: default_analysis_model(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_research_model() -> String {
    "alibaba/tongyi-deepresearch-30b-a3b".into()
}
fn default_extract_model() -> String {
    "deepseek/deepseek-chat-v3-0324".into()
}
fn default_analysis_model() -> String {
    "gpt-4o-mini".into()
}
fn default_llm_timeout() -> u64 {
    300
}

/// `[cache]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Expiry applied to every cache write.
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl(),
        }
    }
}

fn default_ttl() -> u64 {
    86_400
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Deadline for content fetches.
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
    /// Deadline for domain probes during website discovery.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            probe_timeout_secs: default_probe_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_fetch_timeout() -> u64 {
    30
}
fn default_probe_timeout() -> u64 {
    10
}
fn default_user_agent() -> String {
    concat!("Mozilla/5.0 (compatible; DealScout/", env!("CARGO_PKG_VERSION"), ")").into()
}

/// `[concurrency]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    #[serde(default = "default_ten")]
    pub research: usize,
    #[serde(default = "default_ten")]
    pub website: usize,
    #[serde(default = "default_extract_concurrency")]
    pub extract: usize,
    #[serde(default = "default_podcast_research_concurrency")]
    pub podcast_research: usize,
    /// Emit a progress update every N completions.
    #[serde(default = "default_progress_every")]
    pub progress_every: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            research: default_ten(),
            website: default_ten(),
            extract: default_extract_concurrency(),
            podcast_research: default_podcast_research_concurrency(),
            progress_every: default_progress_every(),
        }
    }
}

fn default_ten() -> usize {
    10
}
fn default_extract_concurrency() -> usize {
    20
}
fn default_podcast_research_concurrency() -> usize {
    5
}
fn default_progress_every() -> usize {
    5
}

/// `[limits]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Companies sent to the research model.
    #[serde(default = "default_hundred")]
    pub research_limit: usize,
    /// Companies sent through website discovery.
    #[serde(default = "default_hundred")]
    pub website_limit: usize,
    /// High-signal founders researched per run.
    #[serde(default = "default_podcast_research_limit")]
    pub podcast_research_limit: usize,
    /// Episodes older than this are ignored.
    #[serde(default = "default_feed_window")]
    pub feed_window_days: i64,
    /// Companies registered longer ago than this are filtered out.
    #[serde(default = "default_max_age")]
    pub registry_max_age_years: i64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            research_limit: default_hundred(),
            website_limit: default_hundred(),
            podcast_research_limit: default_podcast_research_limit(),
            feed_window_days: default_feed_window(),
            registry_max_age_years: default_max_age(),
        }
    }
}

fn default_hundred() -> usize {
    100
}
fn default_podcast_research_limit() -> usize {
    20
}
fn default_feed_window() -> i64 {
    365
}
fn default_max_age() -> i64 {
    5
}

/// A token-bucket policy: `permits` requests per `interval_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub permits: u32,
    pub interval_ms: u64,
}

/// `[[rate_limits]]` entry: hosts containing `pattern` share one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    pub pattern: String,
    pub permits: u32,
    pub interval_ms: u64,
}

impl RateLimitRule {
    pub fn new(pattern: impl Into<String>, permits: u32, interval_ms: u64) -> Self {
        Self {
            pattern: pattern.into(),
            permits,
            interval_ms,
        }
    }

    pub fn policy(&self) -> RateLimitPolicy {
        RateLimitPolicy {
            permits: self.permits,
            interval_ms: self.interval_ms,
        }
    }
}

fn default_rate_limits() -> Vec<RateLimitRule> {
    vec![
        RateLimitRule::new("core.cro.ie", 1, 1_000),
        RateLimitRule::new("indeed.com", 2, 1_000),
        RateLimitRule::new("linkedin.com", 2, 1_000),
        RateLimitRule::new("api.github.com", 60, 3_600_000),
        RateLimitRule::new("duckduckgo.com", 1, 1_500),
    ]
}

fn default_rate_limit_policy() -> RateLimitPolicy {
    RateLimitPolicy {
        permits: 1,
        interval_ms: 2_000,
    }
}

impl AppConfig {
    /// Resolved data directory.
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.paths.data_dir)
    }

    /// Resolved output directory.
    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.paths.output_dir)
    }

    /// Resolved cache database path.
    pub fn cache_db(&self) -> PathBuf {
        PathBuf::from(&self.paths.cache_db)
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.dealscout/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| DealScoutError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.dealscout/dealscout.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DealScoutError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        DealScoutError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| DealScoutError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| DealScoutError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DealScoutError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the model API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    let var_name = &config.llm.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(()),
        _ => Err(DealScoutError::config(format!(
            "model API key not found. Set the {var_name} environment variable."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let toml_str =
            toml::to_string_pretty(&AppConfig::default()).expect("serialize default config");
        assert!(toml_str.contains("output_dir"));
        assert!(toml_str.contains("OPENAI_API_KEY"));
        assert!(toml_str.contains("core.cro.ie"));
    }

    #[test]
    fn empty_file_yields_builtin_rate_limits() {
        let parsed: AppConfig = toml::from_str("").expect("parse empty");
        assert_eq!(parsed.rate_limits.len(), 5);
        assert_eq!(parsed.rate_limits[0].pattern, "core.cro.ie");
        assert_eq!(parsed.rate_limit_default.permits, 1);
        assert_eq!(parsed.rate_limit_default.interval_ms, 2_000);
        assert_eq!(parsed.cache.ttl_secs, 86_400);
        assert_eq!(parsed.fetch.probe_timeout_secs, 10);
    }

    #[test]
    fn config_roundtrip() {
        let toml_str = toml::to_string_pretty(&AppConfig::default()).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.concurrency.extract, 20);
        assert_eq!(parsed.concurrency.podcast_research, 5);
        assert_eq!(parsed.limits.research_limit, 100);
        assert_eq!(parsed.llm.api_key_env, "OPENAI_API_KEY");
    }

    #[test]
    fn config_with_custom_rate_limits() {
        let toml_str = r#"
[paths]
output_dir = "/tmp/out"

[[rate_limits]]
pattern = "example.com"
permits = 5
interval_ms = 1000

[rate_limit_default]
permits = 3
interval_ms = 500
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.rate_limits.len(), 1);
        assert_eq!(config.rate_limits[0].policy().permits, 5);
        assert_eq!(config.rate_limit_default.interval_ms, 500);
        assert_eq!(config.output_dir(), PathBuf::from("/tmp/out"));
        assert_eq!(config.paths.data_dir, "data");
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.llm.api_key_env = "DS_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
