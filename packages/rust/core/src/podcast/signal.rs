//! Repeat-appearance scoring.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::info;

use dealscout_shared::{GuestAggregate, GuestObservation};

use crate::merge::group_by_key;

const APPEARANCE_WEIGHT: f64 = 2.0;
const PODCAST_WEIGHT: f64 = 1.5;
const FOUNDER_BONUS: f64 = 3.0;
const RECENCY_BONUS: f64 = 2.0;
const RECENT_DAYS: i64 = 30;

/// One aggregate per (guest, company), highest score first.
///
/// `now` is the shared reference instant for every group. Groups with equal
/// scores keep first-seen order.
pub fn aggregate(observations: Vec<GuestObservation>, now: DateTime<Utc>) -> Vec<GuestAggregate> {
    let groups = group_by_key(observations, |o| (o.guest_name.clone(), o.company_name.clone()));

    let mut aggregates: Vec<GuestAggregate> = groups
        .into_iter()
        .filter_map(|((guest_name, company_name), group)| {
            let latest = group
                .iter()
                .reduce(|best, o| if o.pub_date > best.pub_date { o } else { best })?;

            let appearances = group.len() as u32;
            let unique_podcasts = group
                .iter()
                .map(|o| o.podcast.as_str())
                .collect::<HashSet<_>>()
                .len() as u32;
            let is_founder = group.iter().any(|o| o.is_founder == Some(true));
            let days_since_last = (now - latest.pub_date).num_days();

            let mut signal_score =
                f64::from(appearances) * APPEARANCE_WEIGHT + f64::from(unique_podcasts) * PODCAST_WEIGHT;
            if is_founder {
                signal_score += FOUNDER_BONUS;
            }
            if days_since_last < RECENT_DAYS {
                signal_score += RECENCY_BONUS;
            }

            Some(GuestAggregate {
                role: group.iter().find_map(|o| o.role.clone()),
                podcast: latest.podcast.clone(),
                last_appearance: latest.pub_date,
                latest_link: latest.link.clone(),
                guest_name,
                company_name,
                appearances,
                unique_podcasts,
                is_founder,
                days_since_last,
                signal_score,
                high_signal: appearances >= 2 || unique_podcasts >= 2,
            })
        })
        .collect();

    aggregates.sort_by(|a, b| b.signal_score.total_cmp(&a.signal_score));
    info!(
        guests = aggregates.len(),
        high_signal = aggregates.iter().filter(|a| a.high_signal).count(),
        "aggregated guest signals"
    );
    aggregates
}

/// High-signal aggregates, order kept.
pub fn high_signal(aggregates: &[GuestAggregate]) -> Vec<GuestAggregate> {
    aggregates.iter().filter(|a| a.high_signal).cloned().collect()
}
