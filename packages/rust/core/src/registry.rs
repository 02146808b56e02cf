//! Registry loading, filtering and classification.

use std::path::Path;

use chrono::{Days, NaiveDate};
use tracing::{debug, info};

use dealscout_shared::{Company, CompanyRecord, DealScoutError, Result};

use crate::nace::{self, SOFTWARE_CATEGORIES};

/// Name fragments that mark special-purpose vehicles rather than operating
/// companies.
const VEHICLE_MARKERS: &[&str] = &["DESIGNATED ACTIVITY", "ISSUER", "FUND"];

/// Read the registry CSV. A missing file is fatal.
pub fn load_registry(path: &Path) -> Result<Vec<Company>> {
    if !path.exists() {
        return Err(DealScoutError::validation(format!(
            "registry file not found: {}",
            path.display()
        )));
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_path(path)
        .map_err(|e| DealScoutError::parse(format!("opening {}: {e}", path.display())))?;

    let mut companies = Vec::new();
    let mut skipped = 0usize;
    for row in reader.deserialize::<Company>() {
        match row {
            Ok(company) => companies.push(company),
            Err(e) => {
                skipped += 1;
                debug!(error = %e, "skipping malformed registry row");
            }
        }
    }

    info!(path = %path.display(), rows = companies.len(), skipped, "loaded registry");
    Ok(companies)
}

/// Keep live limited companies registered within the last `max_age_years`.
///
/// Registration dates are ISO strings, so the cutoff is compared as text.
/// Rows missing status, type or date are dropped.
pub fn filter_companies(rows: Vec<Company>, today: NaiveDate, max_age_years: i64) -> Vec<Company> {
    let days = u64::try_from(max_age_years.max(0) * 365).unwrap_or(0);
    let cutoff = today
        .checked_sub_days(Days::new(days))
        .unwrap_or(NaiveDate::MIN)
        .format("%Y-%m-%d")
        .to_string();

    let before = rows.len();
    let kept: Vec<Company> = rows
        .into_iter()
        .filter(|c| c.company_status.as_deref().map(str::trim) == Some("Normal"))
        .filter(|c| {
            c.company_reg_date
                .as_deref()
                .is_some_and(|d| d >= cutoff.as_str())
        })
        .filter(|c| {
            c.company_type
                .as_deref()
                .is_some_and(|t| t.contains("LTD") || t.contains("DAC"))
        })
        .collect();

    info!(before, after = kept.len(), %cutoff, "filtered registry");
    kept
}

/// Wrap companies as records with their NACE sector and tech flag set.
pub fn classify(companies: Vec<Company>) -> Vec<CompanyRecord> {
    companies
        .into_iter()
        .map(|company| {
            let code = company.nace_v2_code.as_deref();
            let category = nace::nace_category(code);
            let is_tech = nace::is_tech(code);
            let mut record = CompanyRecord::new(company);
            record.nace_category = Some(category.to_string());
            record.is_tech = is_tech;
            record
        })
        .collect()
}

/// Software companies that are not financial vehicles, first `limit` in
/// current row order.
pub fn software_candidates(records: &[CompanyRecord], limit: usize) -> Vec<&CompanyRecord> {
    records
        .iter()
        .filter(|r| {
            r.nace_category
                .as_deref()
                .is_some_and(|c| SOFTWARE_CATEGORIES.contains(&c))
        })
        .filter(|r| {
            !VEHICLE_MARKERS
                .iter()
                .any(|m| r.company.company_name.contains(m))
        })
        .take(limit)
        .collect()
}

/// Tech companies first, then newest registration first. Stable.
pub fn sort_for_output(records: &mut [CompanyRecord]) {
    records.sort_by(|a, b| {
        b.is_tech.cmp(&a.is_tech).then_with(|| {
            b.company
                .company_reg_date
                .cmp(&a.company.company_reg_date)
        })
    });
}

/// Row count per sector, largest first, at most `top` entries.
pub fn category_breakdown(records: &[CompanyRecord], top: usize) -> Vec<(String, usize)> {
    let rows: Vec<&CompanyRecord> = records.iter().collect();
    let groups = crate::merge::group_by_key(rows, |r: &&CompanyRecord| {
        r.nace_category.clone().unwrap_or_else(|| "Unknown".into())
    });
    let mut counts: Vec<(String, usize)> = groups
        .into_iter()
        .map(|(category, rows)| (category, rows.len()))
        .collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.truncate(top);
    counts
}
