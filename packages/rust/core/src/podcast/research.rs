//! Investment research on high-signal founders' companies.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use dealscout_shared::{FounderResearch, GuestAggregate, Result};
use dealscout_storage::Storage;

use crate::llm::{CompletionOptions, LlmClient};
use crate::parser::{ParsedResponse, PayloadStrategy, parse_response};
use crate::pipeline::ProgressReporter;
use crate::runner::{RunOptions, run_bounded};

/// Researches the company behind a founder guest.
pub struct FounderResearcher {
    llm: Arc<dyn LlmClient>,
    storage: Arc<Storage>,
    model: String,
    ttl: Duration,
}

impl FounderResearcher {
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

    /// Research `guest`'s company. A failed model call is an error.
    pub async fn research(&self, guest: &GuestAggregate) -> Result<FounderResearch> {
        let key = format!("podcast_research:{}", guest.company_name);
        match self.storage.cache_get_json::<FounderResearch>(&key).await {
            Ok(Some(hit)) => {
                debug!(company = %guest.company_name, "founder research cache hit");
                return Ok(FounderResearch {
                    guest_name: guest.guest_name.clone(),
                    company_name: guest.company_name.clone(),
                    ..hit
                });
            }
            Ok(None) => {}
            Err(e) => warn!(key, error = %e, "founder research cache read failed"),
        }

        let prompt = founder_prompt(guest);
        let reply = self
            .llm
            .complete(&self.model, &prompt, CompletionOptions::default())
            .await?;
        let result = parse_founder_research(&reply, guest);

        if let Err(e) = self.storage.cache_set_json(&key, &result, self.ttl).await {
            warn!(key, error = %e, "founder research cache write failed");
        }
        Ok(result)
    }
}

fn founder_prompt(guest: &GuestAggregate) -> String {
    format!(
        "Research {company} for a venture investor. Its {role} {guest} has appeared \
         {appearances} times across {podcasts} podcasts, most recently on {podcast}.\n\n\
         Write a short memo on what the company does, its traction, funding history and \
         investors, and how likely it is to raise in the next twelve months.\n\n\
         End with <json></json> tags around an object with the keys website, industry, \
         stage, funding_total, latest_round, notable_investors (list), employee_count, \
         founded_year, fundraise_likelihood (High, Medium or Low), attractiveness_score \
         (1 to 10) and key_signals (list).",
        company = guest.company_name,
        role = guest.role.as_deref().unwrap_or("founder"),
        guest = guest.guest_name,
        appearances = guest.appearances,
        podcasts = guest.unique_podcasts,
        podcast = guest.podcast,
    )
}

/// Build a research record from a reply. Without a payload only the report
/// is kept.
pub fn parse_founder_research(reply: &str, guest: &GuestAggregate) -> FounderResearch {
    let parsed = parse_response(reply, &[PayloadStrategy::TagPair, PayloadStrategy::Fenced]);
    let base = FounderResearch {
        guest_name: guest.guest_name.clone(),
        company_name: guest.company_name.clone(),
        research_report: Some(parsed.report().to_string()).filter(|r| !r.is_empty()),
        ..Default::default()
    };
    let ParsedResponse::Structured { payload, .. } = parsed else {
        return base;
    };

    FounderResearch {
        website: payload.text("website"),
        industry: payload.text("industry"),
        stage: payload.text("stage"),
        funding_total: payload.text("funding_total"),
        latest_round: payload.text("latest_round"),
        notable_investors: payload.list("notable_investors"),
        employee_count: payload.text("employee_count"),
        founded_year: payload.year("founded_year"),
        fundraise_likelihood: payload.text("fundraise_likelihood"),
        attractiveness_score: payload.int("attractiveness_score"),
        key_signals: payload.list("key_signals"),
        ..base
    }
}

/// Research the first `limit` distinct companies among `aggregates`, in
/// score order. Failed companies are dropped.
#[instrument(skip_all, fields(limit = limit, candidates = aggregates.len()))]
pub async fn research_high_signal(
    aggregates: &[GuestAggregate],
    researcher: &FounderResearcher,
    limit: usize,
    options: &RunOptions,
    progress: &dyn ProgressReporter,
) -> Vec<FounderResearch> {
    let mut seen = HashSet::new();
    let targets: Vec<&GuestAggregate> = aggregates
        .iter()
        .filter(|a| seen.insert(a.company_name.to_lowercase()))
        .take(limit)
        .collect();
    info!(companies = targets.len(), "researching founder companies");

    let results = run_bounded(targets, options, progress, |guest| async move {
        researcher.research(guest).await.map(Some)
    })
    .await;
    info!(researched = results.len(), "founder research finished");
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::scripted::ScriptedLlm;
    use crate::pipeline::SilentProgress;
    use crate::testutil::temp_storage;
    use chrono::{TimeZone, Utc};

    fn guest(name: &str, company: &str, score: f64) -> GuestAggregate {
        GuestAggregate {
            guest_name: name.into(),
            company_name: company.into(),
            appearances: 2,
            unique_podcasts: 2,
            is_founder: true,
            role: Some("CEO".into()),
            podcast: "P".into(),
            last_appearance: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
            latest_link: String::new(),
            days_since_last: 10,
            signal_score: score,
            high_signal: true,
        }
    }

    const REPLY: &str = "Acme sells robots.\n<json>{\"website\": \"https://acme.ie\", \
        \"notable_investors\": [\"Frontline\"], \"attractiveness_score\": \"8\", \
        \"founded_year\": 2020, \"key_signals\": [], \"stage\": \"Unknown\"}</json>";

    #[test]
    fn tagged_payload_fills_fields() {
        let r = parse_founder_research(REPLY, &guest("Ann", "Acme", 9.0));
        assert_eq!(r.research_report.as_deref(), Some("Acme sells robots."));
        assert_eq!(r.website.as_deref(), Some("https://acme.ie"));
        assert_eq!(r.notable_investors.as_deref(), Some(r#"["Frontline"]"#));
        assert_eq!(r.attractiveness_score, Some(8));
        assert_eq!(r.founded_year, Some(2020));
        assert_eq!(r.key_signals, None);
        assert_eq!(r.stage, None);
        assert_eq!(r.guest_name, "Ann");
    }

    #[test]
    fn reply_without_payload_keeps_report() {
        let r = parse_founder_research("Nothing public about this one.", &guest("Ann", "Acme", 9.0));
        assert_eq!(r.research_report.as_deref(), Some("Nothing public about this one."));
        assert_eq!(r.website, None);
        assert_eq!(r.attractiveness_score, None);
    }

    #[tokio::test]
    async fn companies_are_deduped_limited_and_failures_dropped() {
        let llm = Arc::new(
            ScriptedLlm::new()
                .reply("Research Acme", REPLY)
                .fail("Research Beta", "quota")
                .reply("Research Gamma", "Gamma memo"),
        );
        let storage = temp_storage().await;
        let researcher = FounderResearcher::new(llm.clone(), storage.clone(), "m", Duration::from_secs(60));
        let aggregates = vec![
            guest("Ann", "Acme", 9.0),
            guest("Anne", "ACME", 8.0),
            guest("Bob", "Beta", 7.0),
            guest("Cara", "Gamma", 6.0),
            guest("Dan", "Delta", 5.0),
        ];

        let out = research_high_signal(
            &aggregates,
            &researcher,
            3,
            &RunOptions::new("founders", 2),
            &SilentProgress,
        )
        .await;

        let companies: Vec<&str> = out.iter().map(|r| r.company_name.as_str()).collect();
        assert_eq!(companies, vec!["Acme", "Gamma"]);
        assert_eq!(llm.calls(), 3);
        assert!(storage.cache_contains("podcast_research:Acme").await.unwrap());
        assert!(!storage.cache_contains("podcast_research:Beta").await.unwrap());
    }

    #[tokio::test]
    async fn cache_hit_reports_the_current_guest() {
        let llm = Arc::new(ScriptedLlm::new().reply("Research Acme", REPLY));
        let storage = temp_storage().await;
        let researcher = FounderResearcher::new(llm.clone(), storage, "m", Duration::from_secs(60));

        let first = researcher.research(&guest("Ann", "Acme", 9.0)).await.unwrap();
        let second = researcher.research(&guest("Brian", "Acme", 7.0)).await.unwrap();

        assert_eq!(llm.calls(), 1);
        assert_eq!(first.guest_name, "Ann");
        assert_eq!(second.guest_name, "Brian");
        assert_eq!(second.company_name, "Acme");
        assert_eq!(second.website.as_deref(), Some("https://acme.ie"));
    }
}
