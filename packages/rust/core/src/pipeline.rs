//! End-to-end pipelines.
//!
//! `companies`: registry -> filter -> NACE -> grants -> research -> websites
//! -> sort -> `companies.parquet`.
//!
//! `podcasts`: episodes -> guest extraction -> clustering -> scoring ->
//! founder research -> `output/podcast/*`.
//!
//! Both pipelines take their long-lived resources as [`PipelineDeps`], record
//! themselves in the run journal, and close the HTTP session on every exit
//! path.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use dealscout_artifacts::{
    safe_file_stem, write_companies, write_founder_research, write_guest_analysis, write_json,
    write_observations,
};
use dealscout_fetch::Fetcher;
use dealscout_shared::{AppConfig, GuestAggregate, Result};
use dealscout_storage::Storage;

use crate::grants::{aggregate_grants, load_grants, match_grants};
use crate::llm::{LlmClient, OpenRouterClient};
use crate::podcast::cluster::distinct_pairs;
use crate::podcast::{
    FounderResearcher, GuestExtractor, aggregate, cluster_guests, extract_guests, high_signal,
    load_episodes, research_high_signal,
};
use crate::registry::{category_breakdown, classify, filter_companies, load_registry, sort_for_output};
use crate::research::{Researcher, enrich_with_research};
use crate::runner::RunOptions;
use crate::website::{WebsiteScout, enrich_with_websites};

/// Extraction emits a progress update this often regardless of config.
const EXTRACT_PROGRESS_EVERY: usize = 50;
const TOP_N: usize = 10;

// ---------------------------------------------------------------------------
// Progress and shared resources
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called by the bounded runner as tasks complete.
    fn task_progress(&self, label: &str, completed: usize, total: usize);
    /// Called when the pipeline completes.
    fn done(&self, message: &str);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn task_progress(&self, _label: &str, _completed: usize, _total: usize) {}
    fn done(&self, _message: &str) {}
}

/// Resources shared by every task of a run.
#[derive(Clone)]
pub struct PipelineDeps {
    pub storage: Arc<Storage>,
    pub fetcher: Arc<Fetcher>,
    pub llm: Arc<dyn LlmClient>,
}

impl PipelineDeps {
    /// Build the fetcher and the model client around an open cache.
    pub fn from_config(config: &AppConfig, storage: Arc<Storage>) -> Result<Self> {
        let fetcher = Arc::new(Fetcher::new(storage.clone(), config)?);
        let llm: Arc<dyn LlmClient> = Arc::new(OpenRouterClient::from_config(config)?);
        Ok(Self {
            storage,
            fetcher,
            llm,
        })
    }
}

fn cache_ttl(config: &AppConfig) -> Duration {
    Duration::from_secs(config.cache.ttl_secs)
}

fn run_options(config: &AppConfig, label: &str, concurrency: usize, cancel: &CancellationToken) -> RunOptions {
    RunOptions::new(label, concurrency)
        .progress_every(config.concurrency.progress_every)
        .cancel(cancel.clone())
}

/// Record the outcome of a run. Journal failures are logged only.
async fn finish_journal<T: Serialize>(storage: &Storage, run_id: &str, outcome: &Result<T>) {
    let stats = match outcome {
        Ok(summary) => serde_json::to_string(summary).unwrap_or_else(|_| "{}".into()),
        Err(e) => serde_json::json!({ "error": e.to_string() }).to_string(),
    };
    if let Err(e) = storage.finish_run(run_id, &stats).await {
        warn!(run_id, error = %e, "failed to record run");
    }
}

// ---------------------------------------------------------------------------
// Company pipeline
// ---------------------------------------------------------------------------

/// Inputs and switches for one company run.
#[derive(Debug, Clone)]
pub struct CompanyRunOptions {
    pub registry_path: PathBuf,
    pub grants_path: PathBuf,
    /// Also discover and analyze company websites.
    pub websites: bool,
    /// Reference date for the registration-age filter.
    pub today: NaiveDate,
    pub cancel: CancellationToken,
}

impl CompanyRunOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        let data = config.data_dir();
        Self {
            registry_path: data.join("companies.csv"),
            grants_path: data.join("cordis_horizon.csv"),
            websites: false,
            today: Utc::now().date_naive(),
            cancel: CancellationToken::new(),
        }
    }
}

/// What a company run produced.
#[derive(Debug, Clone, Serialize)]
pub struct CompanyRunSummary {
    pub run_id: String,
    pub loaded: usize,
    pub filtered: usize,
    pub tech: usize,
    pub with_grants: usize,
    pub researched: usize,
    pub websites: usize,
    pub output_path: PathBuf,
    /// Largest sectors, row count descending.
    pub categories: Vec<(String, usize)>,
    pub cancelled: bool,
    pub elapsed_ms: u64,
}

/// Run the company pipeline.
#[instrument(skip_all, fields(websites = options.websites))]
pub async fn run_company_pipeline(
    config: &AppConfig,
    options: &CompanyRunOptions,
    deps: &PipelineDeps,
    progress: &dyn ProgressReporter,
) -> Result<CompanyRunSummary> {
    let run_id = deps.storage.insert_run("companies").await?;
    info!(%run_id, "starting company pipeline");

    let outcome = company_run(config, options, deps, progress, &run_id).await;
    deps.fetcher.close().await;
    finish_journal(&deps.storage, &run_id, &outcome).await;

    let summary = outcome?;
    progress.done(&format!(
        "{} companies written to {}",
        summary.filtered,
        summary.output_path.display()
    ));
    info!(
        run_id = %summary.run_id,
        rows = summary.filtered,
        researched = summary.researched,
        elapsed_ms = summary.elapsed_ms,
        "company pipeline complete"
    );
    Ok(summary)
}

async fn company_run(
    config: &AppConfig,
    options: &CompanyRunOptions,
    deps: &PipelineDeps,
    progress: &dyn ProgressReporter,
    run_id: &str,
) -> Result<CompanyRunSummary> {
    let start = Instant::now();
    let ttl = cache_ttl(config);

    // --- Phase 1: Registry ---
    progress.phase("Loading registry");
    let rows = load_registry(&options.registry_path)?;
    let loaded = rows.len();
    let kept = filter_companies(rows, options.today, config.limits.registry_max_age_years);
    let mut records = classify(kept);
    let tech = records.iter().filter(|r| r.is_tech).count();
    info!(loaded, filtered = records.len(), tech, "registry prepared");

    // --- Phase 2: Grants ---
    progress.phase("Matching EU grants");
    let grant_rows = load_grants(&options.grants_path).unwrap_or_else(|e| {
        warn!(error = %e, "could not read grants file, skipping grant matching");
        Vec::new()
    });
    let with_grants = match_grants(&mut records, &aggregate_grants(grant_rows));
    info!(with_grants, "grants matched");

    // --- Phase 3: Research ---
    progress.phase("Researching companies");
    let researcher = Researcher::new(
        deps.llm.clone(),
        deps.storage.clone(),
        config.llm.research_model.as_str(),
        ttl,
    );
    let researched = enrich_with_research(
        &mut records,
        &researcher,
        config.limits.research_limit,
        &run_options(config, "research", config.concurrency.research, &options.cancel),
        progress,
    )
    .await;

    // --- Phase 4: Websites ---
    let mut websites = 0;
    if options.websites && !options.cancel.is_cancelled() {
        progress.phase("Profiling company websites");
        let scout = WebsiteScout::new(
            deps.fetcher.clone(),
            deps.llm.clone(),
            config.llm.analysis_model.as_str(),
            ttl,
        );
        websites = enrich_with_websites(
            &mut records,
            &scout,
            config.limits.website_limit,
            &run_options(config, "websites", config.concurrency.website, &options.cancel),
            progress,
        )
        .await;
    }

    // --- Phase 5: Output ---
    progress.phase("Writing companies.parquet");
    let cancelled = options.cancel.is_cancelled();
    if cancelled {
        warn!("run cancelled, writing partial enrichment");
    }
    sort_for_output(&mut records);
    let output_path = config.output_dir().join("companies.parquet");
    write_companies(&output_path, &records)?;

    Ok(CompanyRunSummary {
        run_id: run_id.to_string(),
        loaded,
        filtered: records.len(),
        tech,
        with_grants,
        researched,
        websites,
        output_path,
        categories: category_breakdown(&records, TOP_N),
        cancelled,
        elapsed_ms: start.elapsed().as_millis() as u64,
    })
}

// ---------------------------------------------------------------------------
// Podcast pipeline
// ---------------------------------------------------------------------------

/// Inputs for one podcast run.
#[derive(Debug, Clone)]
pub struct PodcastRunOptions {
    pub episodes_path: PathBuf,
    /// Reference instant for the feed window and recency scoring.
    pub now: DateTime<Utc>,
    pub cancel: CancellationToken,
}

impl PodcastRunOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            episodes_path: config.data_dir().join("episodes.json"),
            now: Utc::now(),
            cancel: CancellationToken::new(),
        }
    }
}

/// What a podcast run produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PodcastRunSummary {
    pub run_id: String,
    pub episodes: usize,
    pub observations: usize,
    pub unique_before: usize,
    pub unique_after: usize,
    pub guests: usize,
    pub high_signal: usize,
    pub researched: usize,
    pub output_dir: PathBuf,
    /// Highest-scoring guests.
    pub top: Vec<GuestAggregate>,
    pub cancelled: bool,
    pub elapsed_ms: u64,
}

/// Run the podcast pipeline.
#[instrument(skip_all)]
pub async fn run_podcast_pipeline(
    config: &AppConfig,
    options: &PodcastRunOptions,
    deps: &PipelineDeps,
    progress: &dyn ProgressReporter,
) -> Result<PodcastRunSummary> {
    let run_id = deps.storage.insert_run("podcasts").await?;
    info!(%run_id, "starting podcast pipeline");

    let outcome = podcast_run(config, options, deps, progress, &run_id).await;
    deps.fetcher.close().await;
    finish_journal(&deps.storage, &run_id, &outcome).await;

    let summary = outcome?;
    progress.done(&format!(
        "{} guests scored, {} high signal, {} researched",
        summary.guests, summary.high_signal, summary.researched
    ));
    info!(
        run_id = %summary.run_id,
        guests = summary.guests,
        high_signal = summary.high_signal,
        elapsed_ms = summary.elapsed_ms,
        "podcast pipeline complete"
    );
    Ok(summary)
}

async fn podcast_run(
    config: &AppConfig,
    options: &PodcastRunOptions,
    deps: &PipelineDeps,
    progress: &dyn ProgressReporter,
    run_id: &str,
) -> Result<PodcastRunSummary> {
    let start = Instant::now();
    let ttl = cache_ttl(config);
    let out_dir = config.output_dir().join("podcast");
    let mut summary = PodcastRunSummary {
        run_id: run_id.to_string(),
        output_dir: out_dir.clone(),
        ..Default::default()
    };

    // --- Phase 1: Episodes ---
    progress.phase("Loading episodes");
    let episodes = load_episodes(&options.episodes_path, options.now, config.limits.feed_window_days)?;
    summary.episodes = episodes.len();
    if episodes.is_empty() {
        warn!("no episodes inside the feed window");
        summary.elapsed_ms = start.elapsed().as_millis() as u64;
        return Ok(summary);
    }

    // --- Phase 2: Guest extraction ---
    progress.phase("Extracting guests");
    let extractor = GuestExtractor::new(
        deps.llm.clone(),
        deps.storage.clone(),
        config.llm.extract_model.as_str(),
        ttl,
    );
    let extract_options = RunOptions::new("extract", config.concurrency.extract)
        .progress_every(EXTRACT_PROGRESS_EVERY)
        .cancel(options.cancel.clone());
    let observations = extract_guests(episodes, &extractor, &extract_options, progress).await;
    summary.observations = observations.len();
    if observations.is_empty() {
        warn!("no guests extracted");
        summary.cancelled = options.cancel.is_cancelled();
        summary.elapsed_ms = start.elapsed().as_millis() as u64;
        return Ok(summary);
    }

    // --- Phase 3: Clustering ---
    progress.phase("Clustering guest names");
    summary.unique_before = distinct_pairs(&observations).len();
    let observations = cluster_guests(observations, deps.llm.as_ref(), &config.llm.extract_model).await;
    summary.unique_after = distinct_pairs(&observations).len();
    write_observations(&out_dir.join("all_episodes.parquet"), &observations)?;

    // --- Phase 4: Scoring ---
    progress.phase("Scoring guests");
    let aggregates = aggregate(observations, options.now);
    let strong = high_signal(&aggregates);
    write_guest_analysis(&out_dir.join("guest_analysis.parquet"), &aggregates)?;
    write_guest_analysis(&out_dir.join("high_signal.parquet"), &strong)?;
    summary.guests = aggregates.len();
    summary.high_signal = strong.len();
    summary.top = aggregates.iter().take(TOP_N).cloned().collect();

    // --- Phase 5: Founder research ---
    progress.phase("Researching high-signal founders");
    let researcher = FounderResearcher::new(
        deps.llm.clone(),
        deps.storage.clone(),
        config.llm.research_model.as_str(),
        ttl,
    );
    let results = research_high_signal(
        &strong,
        &researcher,
        config.limits.podcast_research_limit,
        &run_options(
            config,
            "founder research",
            config.concurrency.podcast_research,
            &options.cancel,
        ),
        progress,
    )
    .await;

    if !results.is_empty() {
        write_founder_research(&out_dir.join("researched.parquet"), &results)?;
        let research_dir = out_dir.join("research");
        for result in &results {
            let path = research_dir.join(format!("{}.json", safe_file_stem(&result.company_name)));
            write_json(&path, result)?;
        }
    }
    summary.researched = results.len();
    summary.cancelled = options.cancel.is_cancelled();
    summary.elapsed_ms = start.elapsed().as_millis() as u64;
    Ok(summary)
}
