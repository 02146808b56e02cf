//! Guest extraction from episode metadata.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use dealscout_fetch::truncate_chars;
use dealscout_shared::{DealScoutError, Episode, GuestObservation, Result};
use dealscout_storage::Storage;

use crate::llm::{CompletionOptions, LlmClient};
use crate::parser::{PayloadStrategy, parse_response};
use crate::pipeline::ProgressReporter;
use crate::runner::{RunOptions, run_bounded};

const DESCRIPTION_CHARS: usize = 2_000;

/// Pulls the interviewed guest out of an episode.
pub struct GuestExtractor {
    llm: Arc<dyn LlmClient>,
    storage: Arc<Storage>,
    model: String,
    ttl: Duration,
}

impl GuestExtractor {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        storage: Arc<Storage>,
        model: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            llm,
            storage,
            model: model.into(),
            ttl,
        }
    }

    /// The guest of `episode`, `None` when the episode has no identifiable
    /// founder guest. Model and parse failures are errors and are not cached.
    pub async fn extract(&self, episode: &Episode) -> Result<Option<GuestObservation>> {
        let key = format!("podcast_extract:{}:{}", episode.podcast, episode.title);
        match self
            .storage
            .cache_get_json::<Option<GuestObservation>>(&key)
            .await
        {
            Ok(Some(hit)) => return Ok(hit),
            Ok(None) => {}
            Err(e) => warn!(key, error = %e, "extraction cache read failed"),
        }

        let prompt = format!(
            "Identify the main guest of this podcast episode.\n\n\
             Podcast: {podcast}\nTitle: {title}\nDescription: {description}\n\n\
             Reply with one JSON object: {{\"guest_name\": ..., \"company_name\": ..., \
             \"role\": ..., \"is_founder\": true or false}}. \
             Use null for guest_name when there is no guest.",
            podcast = episode.podcast,
            title = episode.title,
            description = truncate_chars(&episode.description, DESCRIPTION_CHARS),
        );
        let reply = self
            .llm
            .complete(&self.model, &prompt, CompletionOptions::deterministic(Some(200)))
            .await?;

        let parsed = parse_response(&reply, &[PayloadStrategy::FirstFlatObject]);
        let payload = parsed
            .payload()
            .ok_or_else(|| DealScoutError::parse("extraction reply had no JSON object"))?;

        let observation = match (payload.text("guest_name"), payload.text("company_name")) {
            (Some(guest_name), Some(company_name)) => Some(GuestObservation {
                guest_name,
                company_name,
                role: payload.text("role"),
                is_founder: payload.flag("is_founder"),
                podcast: episode.podcast.clone(),
                episode_title: episode.title.clone(),
                pub_date: episode.pub_date,
                link: episode.link.clone(),
            }),
            _ => {
                debug!(title = %episode.title, "no guest in episode");
                None
            }
        };

        if let Err(e) = self.storage.cache_set_json(&key, &observation, self.ttl).await {
            warn!(key, error = %e, "extraction cache write failed");
        }
        Ok(observation)
    }
}

/// Extract guests from every episode. Episodes without a guest, or whose
/// extraction failed, are dropped.
#[instrument(skip_all, fields(episodes = episodes.len()))]
pub async fn extract_guests(
    episodes: Vec<Episode>,
    extractor: &GuestExtractor,
    options: &RunOptions,
    progress: &dyn ProgressReporter,
) -> Vec<GuestObservation> {
    let observations = run_bounded(episodes, options, progress, |episode| async move {
        extractor.extract(&episode).await
    })
    .await;
    info!(guests = observations.len(), "extracted guests");
    observations
}
