//! Guest name clustering.
//!
//! The same founder shows up as "Ann Byrne, Acme" on one show and
//! "Anne Byrne, Acme Ltd" on another. All distinct (guest, company) pairs go
//! to the model in one request and come back mapped to canonical spellings.

use std::collections::HashMap;

use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use dealscout_shared::GuestObservation;

use crate::llm::{CompletionOptions, LlmClient};
use crate::parser::{Payload, PayloadStrategy, parse_response};

type Pair = (String, String);

/// Rewrite every observation's guest and company to its canonical spelling.
///
/// Total over the input: pairs the reply does not cover, and every pair when
/// the call or its parse fails, keep their original spelling. With fewer than
/// two distinct pairs no call is made.
#[instrument(skip_all, fields(observations = observations.len()))]
pub async fn cluster_guests(
    mut observations: Vec<GuestObservation>,
    llm: &dyn LlmClient,
    model: &str,
) -> Vec<GuestObservation> {
    let pairs = distinct_pairs(&observations);
    if pairs.len() <= 1 {
        debug!(pairs = pairs.len(), "nothing to cluster");
        return observations;
    }

    let prompt = clustering_prompt(&pairs);
    let reply = match llm
        .complete(model, &prompt, CompletionOptions::deterministic(None))
        .await
    {
        Ok(reply) => reply,
        Err(e) => {
            warn!(failure = %e.task_failure(), error = %e, "clustering failed, keeping original names");
            return observations;
        }
    };
    let Some(mapping) = mapping_payload(&reply) else {
        warn!("clustering reply had no mapping, keeping original names");
        return observations;
    };

    let canonical: HashMap<&Pair, Pair> = pairs
        .iter()
        .enumerate()
        .map(|(i, pair)| {
            let target = mapping
                .raw(&i.to_string())
                .and_then(canonical_pair)
                .unwrap_or_else(|| pair.clone());
            (pair, target)
        })
        .collect();

    let mut renamed = 0usize;
    for obs in observations.iter_mut() {
        let key = (obs.guest_name.clone(), obs.company_name.clone());
        if let Some((guest, company)) = canonical.get(&key) {
            if *guest != obs.guest_name || *company != obs.company_name {
                renamed += 1;
                obs.guest_name = guest.clone();
                obs.company_name = company.clone();
            }
        }
    }

    let unique_after = distinct_pairs(&observations).len();
    info!(unique_before = pairs.len(), unique_after, renamed, "clustered guests");
    observations
}

/// Distinct (guest, company) pairs in first-seen order.
pub fn distinct_pairs(observations: &[GuestObservation]) -> Vec<Pair> {
    let mut pairs: Vec<Pair> = Vec::new();
    for obs in observations {
        let pair = (obs.guest_name.clone(), obs.company_name.clone());
        if !pairs.contains(&pair) {
            pairs.push(pair);
        }
    }
    pairs
}

fn clustering_prompt(pairs: &[Pair]) -> String {
    let listing = pairs
        .iter()
        .enumerate()
        .map(|(i, (guest, company))| format!("{i}. {guest} | {company}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Below are podcast guests with their companies, one per line. Some entries are \
         the same person or company spelled differently.\n\n{listing}\n\n\
         Map every index to its canonical name and company. Reply inside <json></json> \
         tags with an object like {{\"0\": [\"Name\", \"Company\"], \"1\": [\"Name\", \"Company\"]}}."
    )
}

/// The index-to-pair object: tagged or fenced, else the outermost braces.
fn mapping_payload(reply: &str) -> Option<Payload> {
    let parsed = parse_response(reply, &[PayloadStrategy::TagPair, PayloadStrategy::Fenced]);
    if let Some(payload) = parsed.payload() {
        return Some(payload.clone());
    }
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Map<String, Value>>(&reply[start..=end])
        .ok()
        .map(Payload::new)
}

/// `["Name", "Company"]` or `{"guest_name": .., "company_name": ..}`.
fn canonical_pair(entry: &Value) -> Option<Pair> {
    let (guest, company) = match entry {
        Value::Array(items) if items.len() >= 2 => (items[0].as_str()?, items[1].as_str()?),
        Value::Object(map) => (
            map.get("guest_name")?.as_str()?,
            map.get("company_name")?.as_str()?,
        ),
        _ => return None,
    };
    let (guest, company) = (guest.trim(), company.trim());
    if guest.is_empty() || company.is_empty() {
        return None;
    }
    Some((guest.to_string(), company.to_string()))
}
