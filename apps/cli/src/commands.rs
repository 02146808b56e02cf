//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use dealscout_core::{
    CompanyRunOptions, PipelineDeps, PodcastRunOptions, ProgressReporter, run_company_pipeline,
    run_podcast_pipeline,
};
use dealscout_shared::{AppConfig, init_config, load_config, load_config_from, validate_api_key};
use dealscout_storage::Storage;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// DealScout: find investable Irish companies and founders.
#[derive(Parser)]
#[command(
    name = "dealscout",
    version,
    about = "Enrich the company registry and podcast guest signals into deal-flow tables.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.dealscout/dealscout.toml.
    #[arg(long = "config", global = true)]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub paths: PathOverrides,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Path flags that override the `[paths]` section.
#[derive(Args, Debug, Default)]
pub(crate) struct PathOverrides {
    /// Input data directory.
    #[arg(long, global = true)]
    pub data_dir: Option<String>,

    /// Output directory for Parquet artifacts.
    #[arg(long, global = true)]
    pub output_dir: Option<String>,

    /// Cache database file.
    #[arg(long, global = true)]
    pub cache_db: Option<String>,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the company pipeline and write companies.parquet.
    Companies {
        /// Also discover and analyze company websites.
        #[arg(long)]
        websites: bool,

        /// Companies sent to the research model.
        #[arg(long)]
        research_limit: Option<usize>,

        /// Companies sent through website discovery.
        #[arg(long)]
        website_limit: Option<usize>,

        /// Registry CSV (defaults to <data_dir>/companies.csv).
        #[arg(long)]
        registry: Option<PathBuf>,

        /// Grants CSV (defaults to <data_dir>/cordis_horizon.csv).
        #[arg(long)]
        grants: Option<PathBuf>,
    },

    /// Run the podcast founder-signal pipeline.
    Podcasts {
        /// Episodes JSON (defaults to <data_dir>/episodes.json).
        #[arg(long)]
        episodes: Option<PathBuf>,

        /// High-signal founders researched.
        #[arg(long)]
        research_limit: Option<usize>,
    },

    /// Show recent pipeline runs.
    Runs {
        /// Number of runs to show.
        #[arg(short, long, default_value = "10")]
        limit: u32,
    },

    /// Cache maintenance.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Cache subcommands.
#[derive(Subcommand)]
pub(crate) enum CacheAction {
    /// Show entry counts per namespace.
    Stats,
    /// Delete expired entries.
    Purge,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "dealscout=info",
        1 => "dealscout=debug",
        _ => "dealscout=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    if let Command::Config { action } = &cli.command {
        return match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&resolve_config(&cli)?),
        };
    }

    let mut config = resolve_config(&cli)?;
    match cli.command {
        Command::Companies {
            websites,
            research_limit,
            website_limit,
            registry,
            grants,
        } => {
            if let Some(n) = research_limit {
                config.limits.research_limit = n;
            }
            if let Some(n) = website_limit {
                config.limits.website_limit = n;
            }
            let mut options = CompanyRunOptions::from_config(&config);
            options.websites = websites;
            if let Some(path) = registry {
                options.registry_path = path;
            }
            if let Some(path) = grants {
                options.grants_path = path;
            }
            cmd_companies(&config, options).await
        }
        Command::Podcasts {
            episodes,
            research_limit,
        } => {
            if let Some(n) = research_limit {
                config.limits.podcast_research_limit = n;
            }
            let mut options = PodcastRunOptions::from_config(&config);
            if let Some(path) = episodes {
                options.episodes_path = path;
            }
            cmd_podcasts(&config, options).await
        }
        Command::Runs { limit } => cmd_runs(&config, limit).await,
        Command::Cache { action } => match action {
            CacheAction::Stats => cmd_cache_stats(&config).await,
            CacheAction::Purge => cmd_cache_purge(&config).await,
        },
        Command::Config { .. } => Ok(()),
    }
}

/// File config (or defaults) with CLI path flags applied on top.
fn resolve_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config_file {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    if let Some(dir) = &cli.paths.data_dir {
        config.paths.data_dir = dir.clone();
    }
    if let Some(dir) = &cli.paths.output_dir {
        config.paths.output_dir = dir.clone();
    }
    if let Some(db) = &cli.paths.cache_db {
        config.paths.cache_db = db.clone();
    }
    Ok(config)
}

async fn open_storage(config: &AppConfig) -> Result<Arc<Storage>> {
    let path = config.cache_db();
    let storage = Storage::open(&path)
        .await
        .wrap_err_with(|| format!("opening cache database {}", path.display()))?;
    Ok(Arc::new(storage))
}

/// Cancel `token` on the first Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight work");
            token.cancel();
        }
    });
}

// ---------------------------------------------------------------------------
// Pipeline commands
// ---------------------------------------------------------------------------

async fn cmd_companies(config: &AppConfig, options: CompanyRunOptions) -> Result<()> {
    validate_api_key(config)?;
    let storage = open_storage(config).await?;
    let deps = PipelineDeps::from_config(config, storage)?;
    cancel_on_ctrl_c(options.cancel.clone());

    info!(
        registry = %options.registry_path.display(),
        websites = options.websites,
        "running company pipeline"
    );

    let reporter = CliProgress::new();
    let summary = run_company_pipeline(config, &options, &deps, &reporter).await?;

    println!();
    println!("  Company pipeline finished{}", cancelled_note(summary.cancelled));
    println!("  Run:         {}", summary.run_id);
    println!("  Loaded:      {}", summary.loaded);
    println!("  Filtered:    {}", summary.filtered);
    println!("  Tech:        {}", summary.tech);
    println!("  EU grants:   {}", summary.with_grants);
    println!("  Researched:  {}", summary.researched);
    if options.websites {
        println!("  Websites:    {}", summary.websites);
    }
    println!("  Output:      {}", summary.output_path.display());
    println!("  Time:        {:.1}s", summary.elapsed_ms as f64 / 1000.0);
    if !summary.categories.is_empty() {
        println!();
        println!("  Top sectors:");
        for (category, count) in &summary.categories {
            println!("    {count:>6}  {category}");
        }
    }
    println!();

    Ok(())
}

async fn cmd_podcasts(config: &AppConfig, options: PodcastRunOptions) -> Result<()> {
    validate_api_key(config)?;
    let storage = open_storage(config).await?;
    let deps = PipelineDeps::from_config(config, storage)?;
    cancel_on_ctrl_c(options.cancel.clone());

    info!(episodes = %options.episodes_path.display(), "running podcast pipeline");

    let reporter = CliProgress::new();
    let summary = run_podcast_pipeline(config, &options, &deps, &reporter).await?;

    println!();
    println!("  Podcast pipeline finished{}", cancelled_note(summary.cancelled));
    println!("  Run:          {}", summary.run_id);
    println!("  Episodes:     {}", summary.episodes);
    println!("  Guests found: {}", summary.observations);
    println!(
        "  Unique pairs: {} -> {} after clustering",
        summary.unique_before, summary.unique_after
    );
    println!("  High signal:  {} of {}", summary.high_signal, summary.guests);
    println!("  Researched:   {}", summary.researched);
    println!("  Output:       {}", summary.output_dir.display());
    println!("  Time:         {:.1}s", summary.elapsed_ms as f64 / 1000.0);
    if !summary.top.is_empty() {
        println!();
        println!("  Top guests:");
        for guest in &summary.top {
            println!(
                "    {:>5.1}  {} ({}) x{} on {} podcasts{}",
                guest.signal_score,
                guest.guest_name,
                guest.company_name,
                guest.appearances,
                guest.unique_podcasts,
                if guest.is_founder { ", founder" } else { "" }
            );
        }
    }
    println!();

    Ok(())
}

fn cancelled_note(cancelled: bool) -> &'static str {
    if cancelled { " (interrupted, partial results)" } else { "" }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn task_progress(&self, label: &str, completed: usize, total: usize) {
        self.spinner
            .set_message(format!("{label} [{completed}/{total}]"));
    }

    fn done(&self, _message: &str) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Maintenance commands
// ---------------------------------------------------------------------------

async fn cmd_runs(config: &AppConfig, limit: u32) -> Result<()> {
    let storage = open_storage(config).await?;
    let runs = storage.recent_runs(limit).await?;
    if runs.is_empty() {
        println!("No runs recorded yet.");
        return Ok(());
    }
    for run in runs {
        println!(
            "{}  {:<10} {}  {}",
            run.started_at,
            run.kind,
            run.finished_at.as_deref().unwrap_or("(unfinished)"),
            run.id
        );
        if let Some(stats) = run.stats_json {
            println!("    {stats}");
        }
    }
    Ok(())
}

async fn cmd_cache_stats(config: &AppConfig) -> Result<()> {
    let storage = open_storage(config).await?;
    let stats = storage.cache_stats().await?;
    println!("Cache: {}", config.cache_db().display());
    println!("  live:    {}", stats.live);
    println!("  expired: {}", stats.expired);
    for ns in &stats.namespaces {
        println!("  {:<20} {:>8} live {:>8} expired", ns.namespace, ns.live, ns.expired);
    }
    Ok(())
}

async fn cmd_cache_purge(config: &AppConfig) -> Result<()> {
    let storage = open_storage(config).await?;
    let removed = storage.purge_expired().await?;
    info!(removed, "purged expired cache entries");
    println!("Removed {removed} expired entries.");
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn companies_flags_parse() {
        let cli = Cli::try_parse_from([
            "dealscout",
            "-vv",
            "--output-dir",
            "/tmp/out",
            "companies",
            "--websites",
            "--research-limit",
            "5",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.paths.output_dir.as_deref(), Some("/tmp/out"));
        match cli.command {
            Command::Companies {
                websites,
                research_limit,
                ..
            } => {
                assert!(websites);
                assert_eq!(research_limit, Some(5));
            }
            _ => panic!("expected companies"),
        }
    }

    #[test]
    fn path_flags_override_config() {
        let path = std::env::temp_dir().join(format!("ds_cli_{}.toml", std::process::id()));
        std::fs::write(&path, "[paths]\ndata_dir = \"in\"\noutput_dir = \"out\"\n").unwrap();
        let cli = Cli::try_parse_from([
            "dealscout",
            "--config",
            path.to_str().unwrap(),
            "--data-dir",
            "elsewhere",
            "runs",
        ])
        .unwrap();
        let config = resolve_config(&cli).unwrap();
        assert_eq!(config.paths.data_dir, "elsewhere");
        assert_eq!(config.paths.output_dir, "out");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn log_format_is_validated() {
        assert!(Cli::try_parse_from(["dealscout", "--log-format", "xml", "runs"]).is_err());
    }
}
