//! Company research through the language model.
//!
//! Each eligible company gets one long-form memo with a structured block at
//! the end. A failed model call degrades to a record whose report carries
//! the error text; such records are never cached so the next run retries.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use dealscout_shared::{Company, CompanyRecord, DealScoutError, ResearchRecord};
use dealscout_storage::Storage;

use crate::llm::{CompletionOptions, LlmClient};
use crate::merge::left_join;
use crate::parser::{ParsedResponse, PayloadStrategy, parse_response};
use crate::pipeline::ProgressReporter;
use crate::registry::software_candidates;
use crate::runner::{RunOptions, run_bounded};

/// Research result for one company, keyed by display name for the merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyResearch {
    pub company_name: String,
    #[serde(flatten)]
    pub record: ResearchRecord,
}

/// Runs and caches company research.
pub struct Researcher {
    llm: Arc<dyn LlmClient>,
    storage: Arc<Storage>,
    model: String,
    ttl: Duration,
}

impl Researcher {
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

    /// Research one company. Never fails.
    pub async fn research(&self, company: &Company, category: Option<&str>) -> CompanyResearch {
        let key = format!("research:{}", company.company_num);
        match self.storage.cache_get_json::<CompanyResearch>(&key).await {
            Ok(Some(hit)) => {
                debug!(company = %company.company_name, "research cache hit");
                return hit;
            }
            Ok(None) => {}
            Err(e) => warn!(key, error = %e, "research cache read failed"),
        }

        let prompt = research_prompt(company, category);
        let record = match self
            .llm
            .complete(&self.model, &prompt, CompletionOptions::default())
            .await
        {
            Ok(text) => parse_research(&text),
            Err(e) => {
                warn!(company = %company.company_name, failure = %e.task_failure(), error = %e, "research failed");
                return CompanyResearch {
                    company_name: company.company_name.clone(),
                    record: ResearchRecord {
                        research_report: Some(format!("Error researching company: {e}")),
                        ..Default::default()
                    },
                };
            }
        };

        let result = CompanyResearch {
            company_name: company.company_name.clone(),
            record,
        };
        if let Err(e) = self.storage.cache_set_json(&key, &result, self.ttl).await {
            warn!(key, error = %e, "research cache write failed");
        }
        result
    }
}

fn research_prompt(company: &Company, category: Option<&str>) -> String {
    let or_unknown = |v: Option<&str>| v.unwrap_or("Unknown").to_string();
    format!(
        "You are preparing a one-page Series A investment memo on an Irish company.\n\n\
         Company: {name}\n\
         Registered: {registered}\n\
         Address: {address}\n\
         Registry number: {num}\n\
         Sector: {sector}\n\n\
         Cover: overview, market and customers, technology and product, team, \
         traction and funding, competitors, and the bull and bear case.\n\n\
         Finish with a fenced ```json block containing exactly these keys:\n\
         industry, sub_industry, tech_stack (list), business_model, stage, \
         key_people (list of \"Name - Role\"), funding_total, employee_count, \
         founded_year, verdict (Promising, Maybe or Pass), verdict_reason.\n\
         Use \"Unknown\" for anything you cannot find.",
        name = company.company_name,
        registered = or_unknown(company.company_reg_date.as_deref()),
        address = company.full_address(),
        num = company.company_num,
        sector = or_unknown(category),
    )
}

/// Turn a research reply into a record. Malformed payloads keep the report.
pub fn parse_research(text: &str) -> ResearchRecord {
    let parsed = parse_response(text, &[PayloadStrategy::Fenced]);
    let report = Some(parsed.report().to_string()).filter(|r| !r.is_empty());
    let ParsedResponse::Structured { payload, .. } = parsed else {
        return ResearchRecord {
            research_report: report,
            ..Default::default()
        };
    };

    ResearchRecord {
        research_report: report,
        industry: payload.text("industry"),
        sub_industry: payload.text("sub_industry"),
        tech_stack: payload.list("tech_stack"),
        business_model: payload.text("business_model"),
        stage: payload.text("stage"),
        key_people: payload.list("key_people"),
        funding_total: payload.text("funding_total"),
        employee_count: payload.text("employee_count"),
        founded_year: payload.year("founded_year"),
        verdict: payload.text("verdict").map(|v| normalize_verdict(&v)),
        verdict_reason: payload.text("verdict_reason"),
    }
}

/// Sortable verdict labels. Unrecognised verdicts pass through unchanged.
pub fn normalize_verdict(verdict: &str) -> String {
    match verdict.trim().to_lowercase().as_str() {
        "promising" => "1-Promising".into(),
        "maybe" => "2-Maybe".into(),
        "pass" => "3-Pass".into(),
        _ => verdict.to_string(),
    }
}

/// Research the first `limit` eligible companies and attach the results.
///
/// Returns how many rows received a research record.
#[instrument(skip_all, fields(limit = limit, rows = records.len()))]
pub async fn enrich_with_research(
    records: &mut [CompanyRecord],
    researcher: &Researcher,
    limit: usize,
    options: &RunOptions,
    progress: &dyn ProgressReporter,
) -> usize {
    let candidates = software_candidates(records, limit);
    info!(candidates = candidates.len(), "researching companies");

    let results = run_bounded(candidates, options, progress, |record| async move {
        Ok::<_, DealScoutError>(Some(
            researcher
                .research(&record.company, record.nace_category.as_deref())
                .await,
        ))
    })
    .await;

    left_join(
        records,
        &results,
        |r| r.company.company_name.clone(),
        |res| res.company_name.clone(),
        |record, hit| record.research = hit.map(|res| res.record.clone()),
    )
}
