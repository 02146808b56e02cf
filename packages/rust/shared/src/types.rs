//! Core domain types for the enrichment pipelines.
//!
//! Base attributes come from the registry or the feed collector and are never
//! modified after ingestion. Enrichment attributes are `Option`s: a missing
//! value is always `None`, never a zero value or an empty string.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Registry companies
// ---------------------------------------------------------------------------

/// One row of the public company registry. Field names match the CSV header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub company_num: String,
    pub company_name: String,
    #[serde(default)]
    pub company_type: Option<String>,
    #[serde(default)]
    pub company_status: Option<String>,
    #[serde(default)]
    pub company_reg_date: Option<String>,
    #[serde(default)]
    pub company_address_1: Option<String>,
    #[serde(default)]
    pub company_address_2: Option<String>,
    #[serde(default)]
    pub company_address_3: Option<String>,
    #[serde(default)]
    pub company_address_4: Option<String>,
    #[serde(default)]
    pub eircode: Option<String>,
    #[serde(default)]
    pub nace_v2_code: Option<String>,
}

impl Company {
    /// Non-empty address lines joined with ", ".
    pub fn full_address(&self) -> String {
        [
            &self.company_address_1,
            &self.company_address_2,
            &self.company_address_3,
            &self.company_address_4,
        ]
        .into_iter()
        .filter_map(|a| a.as_deref())
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
    }
}

/// Grant columns attached to every company row.
///
/// `has_eu_grant` is `false` (never null) for companies without a match so
/// downstream filters stay total.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GrantMatch {
    pub has_eu_grant: bool,
    pub eu_grant_amount: Option<f64>,
    pub eu_project_title: Option<String>,
}

/// Structured fields from the company research model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchRecord {
    /// Free-text memo, or the error text when the call failed.
    pub research_report: Option<String>,
    pub industry: Option<String>,
    pub sub_industry: Option<String>,
    /// JSON-encoded list.
    pub tech_stack: Option<String>,
    pub business_model: Option<String>,
    pub stage: Option<String>,
    /// JSON-encoded list.
    pub key_people: Option<String>,
    pub funding_total: Option<String>,
    pub employee_count: Option<String>,
    pub founded_year: Option<i32>,
    /// One of `1-Promising`, `2-Maybe`, `3-Pass`, or the raw value.
    pub verdict: Option<String>,
    pub verdict_reason: Option<String>,
}

/// Website discovered for a company and the model's profile of it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebsiteProfile {
    pub website_url: Option<String>,
    pub description: Option<String>,
    pub products: Option<String>,
    pub technology: Option<String>,
    pub customers: Option<String>,
    pub use_cases: Option<String>,
    pub category: Option<String>,
    pub target_market: Option<String>,
    pub company_stage: Option<String>,
    pub differentiators: Option<String>,
}

/// A registry company with every enrichment attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyRecord {
    pub company: Company,
    pub nace_category: Option<String>,
    pub is_tech: bool,
    pub grant: GrantMatch,
    pub research: Option<ResearchRecord>,
    pub website: Option<WebsiteProfile>,
    /// Pass-through columns from future enrichment passes.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl CompanyRecord {
    /// Wrap a freshly loaded company with every enrichment unset.
    pub fn new(company: Company) -> Self {
        Self {
            company,
            nace_category: None,
            is_tech: false,
            grant: GrantMatch::default(),
            research: None,
            website: None,
            extra: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Podcast path
// ---------------------------------------------------------------------------

/// An episode as delivered by the feed collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub podcast: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub pub_date: DateTime<Utc>,
    #[serde(default)]
    pub link: String,
}

/// One guest appearance extracted from one episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuestObservation {
    pub guest_name: String,
    pub company_name: String,
    pub role: Option<String>,
    pub is_founder: Option<bool>,
    pub podcast: String,
    pub episode_title: String,
    pub pub_date: DateTime<Utc>,
    pub link: String,
}

/// Per-(guest, company) aggregate over all observations in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuestAggregate {
    pub guest_name: String,
    pub company_name: String,
    pub appearances: u32,
    pub unique_podcasts: u32,
    pub is_founder: bool,
    /// First role any observation in the group reported.
    pub role: Option<String>,
    /// Podcast of the most recent appearance.
    pub podcast: String,
    pub last_appearance: DateTime<Utc>,
    /// Link of the most recent appearance.
    pub latest_link: String,
    pub days_since_last: i64,
    pub signal_score: f64,
    pub high_signal: bool,
}

/// Founder research result for a high-signal guest's company.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FounderResearch {
    pub guest_name: String,
    pub company_name: String,
    pub research_report: Option<String>,
    pub website: Option<String>,
    pub industry: Option<String>,
    pub stage: Option<String>,
    pub funding_total: Option<String>,
    pub latest_round: Option<String>,
    /// JSON-encoded list.
    pub notable_investors: Option<String>,
    pub employee_count: Option<String>,
    pub founded_year: Option<i32>,
    pub fundraise_likelihood: Option<String>,
    pub attractiveness_score: Option<i64>,
    /// JSON-encoded list.
    pub key_signals: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn company() -> Company {
        Company {
            company_num: "123456".into(),
            company_name: "ACME SOFTWARE LIMITED".into(),
            company_type: Some("LTD - Private Company Limited by Shares".into()),
            company_status: Some("Normal".into()),
            company_reg_date: Some("2023-04-01".into()),
            company_address_1: Some("1 Main Street".into()),
            company_address_2: Some("  ".into()),
            company_address_3: None,
            company_address_4: Some("Dublin 2".into()),
            eircode: None,
            nace_v2_code: Some("6201".into()),
        }
    }

    #[test]
    fn full_address_skips_blank_lines() {
        assert_eq!(company().full_address(), "1 Main Street, Dublin 2");
    }

    #[test]
    fn new_record_has_null_enrichment_and_false_grant_flag() {
        let record = CompanyRecord::new(company());
        assert!(!record.grant.has_eu_grant);
        assert!(record.grant.eu_grant_amount.is_none());
        assert!(record.research.is_none());
        assert!(record.website.is_none());
        assert!(record.nace_category.is_none());
    }

    #[test]
    fn episode_deserializes_without_optional_fields() {
        let json = r#"{"podcast":"Equity","title":"Ep 1","pub_date":"2024-05-01T10:00:00Z"}"#;
        let ep: Episode = serde_json::from_str(json).expect("deserialize");
        assert_eq!(ep.podcast, "Equity");
        assert!(ep.description.is_empty());
        assert!(ep.link.is_empty());
    }
}
