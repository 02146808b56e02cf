//! Founder signal path.
//!
//! Episodes come in from the feed collector, guests are pulled out of each
//! episode by the model, spellings are clustered, repeat appearances are
//! scored and the strongest founders get researched.

pub mod cluster;
pub mod extract;
pub mod research;
pub mod signal;

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use dealscout_shared::{DealScoutError, Episode, Result};

pub use cluster::cluster_guests;
pub use extract::{GuestExtractor, extract_guests};
pub use research::{FounderResearcher, research_high_signal};
pub use signal::{aggregate, high_signal};

/// Load the episode list and drop episodes published before the window.
///
/// A missing file is fatal for the podcast run.
pub fn load_episodes(path: &Path, now: DateTime<Utc>, window_days: i64) -> Result<Vec<Episode>> {
    if !path.exists() {
        return Err(DealScoutError::validation(format!(
            "episodes file not found: {}",
            path.display()
        )));
    }
    let raw = std::fs::read_to_string(path).map_err(|e| DealScoutError::io(path, e))?;
    let episodes: Vec<Episode> = serde_json::from_str(&raw)
        .map_err(|e| DealScoutError::parse(format!("{}: {e}", path.display())))?;

    let cutoff = now - Duration::days(window_days.max(0));
    let total = episodes.len();
    let recent: Vec<Episode> = episodes
        .into_iter()
        .filter(|e| e.pub_date >= cutoff)
        .collect();

    info!(total, recent = recent.len(), window_days, "loaded episodes");
    Ok(recent)
}
