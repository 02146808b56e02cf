//! EU research grant matching.
//!
//! The grants export is optional. Its column names vary between releases, so
//! the name, amount, title and country columns are discovered from the
//! header. Matching is by [`normalize_name`] on both sides.

use std::path::Path;

use tracing::{info, warn};

use dealscout_shared::{CompanyRecord, DealScoutError, GrantMatch, Result};

use crate::merge::{group_by_key, left_join, normalize_name};

const NAME_COLUMNS: &[&str] = &["organisationName", "organizationName", "name", "legalName"];
const AMOUNT_COLUMNS: &[&str] = &["ecContribution", "totalCost", "ecMaxContribution"];
const TITLE_COLUMNS: &[&str] = &["title", "projectTitle", "acronym"];
const COUNTRY_COLUMNS: &[&str] = &["organizationCountry", "country"];

/// Country code rows must carry to be considered.
const HOME_COUNTRY: &str = "IE";

/// One grant participation row.
#[derive(Debug, Clone, PartialEq)]
pub struct GrantRow {
    pub name: String,
    pub amount: Option<f64>,
    pub title: Option<String>,
}

/// All grants for one organisation, keyed by normalized name.
#[derive(Debug, Clone, PartialEq)]
pub struct GrantSummary {
    pub name_key: String,
    pub total_amount: Option<f64>,
    pub first_title: Option<String>,
}

/// Load grant rows for home-country organisations.
///
/// A missing file, or one without a recognizable name column, yields no rows.
pub fn load_grants(path: &Path) -> Result<Vec<GrantRow>> {
    if !path.exists() {
        warn!(path = %path.display(), "grants file not found, skipping grant matching");
        return Ok(Vec::new());
    }

    let raw = std::fs::read(path).map_err(|e| DealScoutError::io(path, e))?;
    let delimiter = sniff_delimiter(&raw);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(raw.as_slice());

    let headers = reader
        .headers()
        .map_err(|e| DealScoutError::parse(format!("grants header: {e}")))?
        .clone();
    let find = |candidates: &[&str]| {
        candidates
            .iter()
            .find_map(|c| headers.iter().position(|h| h == *c))
    };

    let Some(name_idx) = find(NAME_COLUMNS) else {
        warn!("grants file has no organisation name column");
        return Ok(Vec::new());
    };
    let amount_idx = find(AMOUNT_COLUMNS);
    let title_idx = find(TITLE_COLUMNS);
    let country_idx = find(COUNTRY_COLUMNS).or_else(|| {
        headers
            .iter()
            .position(|h| h.to_lowercase().contains("country"))
    });

    let mut rows = Vec::new();
    for record in reader.records() {
        let Ok(record) = record else { continue };
        if let Some(idx) = country_idx {
            if record.get(idx).map(str::trim) != Some(HOME_COUNTRY) {
                continue;
            }
        }
        let Some(name) = record.get(name_idx).map(str::trim).filter(|n| !n.is_empty()) else {
            continue;
        };
        rows.push(GrantRow {
            name: name.to_string(),
            amount: amount_idx
                .and_then(|i| record.get(i))
                .and_then(parse_amount),
            title: title_idx
                .and_then(|i| record.get(i))
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
        });
    }

    info!(rows = rows.len(), "loaded grant participations");
    Ok(rows)
}

/// Semicolon when the header line has more of them than commas.
fn sniff_delimiter(raw: &[u8]) -> u8 {
    let header = raw.split(|b| *b == b'\n').next().unwrap_or_default();
    let semis = header.iter().filter(|b| **b == b';').count();
    let commas = header.iter().filter(|b| **b == b',').count();
    if semis > commas { b';' } else { b',' }
}

/// Amounts may use a decimal comma.
fn parse_amount(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    raw.parse::<f64>()
        .ok()
        .or_else(|| raw.replace(',', ".").parse::<f64>().ok())
}

/// One summary per organisation: amounts summed, first non-null title.
pub fn aggregate_grants(rows: Vec<GrantRow>) -> Vec<GrantSummary> {
    group_by_key(rows, |r| normalize_name(&r.name))
        .into_iter()
        .map(|(name_key, group)| {
            let amounts: Vec<f64> = group.iter().filter_map(|g| g.amount).collect();
            GrantSummary {
                name_key,
                total_amount: (!amounts.is_empty()).then(|| amounts.iter().sum()),
                first_title: group.iter().find_map(|g| g.title.clone()),
            }
        })
        .collect()
}

/// Attach grant columns to every record. Returns the number matched.
pub fn match_grants(records: &mut [CompanyRecord], summaries: &[GrantSummary]) -> usize {
    left_join(
        records,
        summaries,
        |r| normalize_name(&r.company.company_name),
        |s| s.name_key.clone(),
        |record, hit| {
            record.grant = match hit {
                Some(s) => GrantMatch {
                    has_eu_grant: true,
                    eu_grant_amount: s.total_amount,
                    eu_project_title: s.first_title.clone(),
                },
                None => GrantMatch::default(),
            };
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use dealscout_shared::Company;

    fn record(name: &str) -> CompanyRecord {
        CompanyRecord::new(Company {
            company_num: name.into(),
            company_name: name.into(),
            company_type: None,
            company_status: None,
            company_reg_date: None,
            company_address_1: None,
            company_address_2: None,
            company_address_3: None,
            company_address_4: None,
            eircode: None,
            nace_v2_code: None,
        })
    }

    fn write_tmp(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("ds_grants_{}.csv", uuid::Uuid::now_v7()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn missing_file_is_empty() {
        let rows = load_grants(Path::new("/nonexistent/cordis.csv")).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn loads_home_country_rows_with_discovered_columns() {
        let path = write_tmp(
            "projectID;acronym;organisationName;organizationCountry;ecContribution\n\
             1;ALPHA;Acme Software Ltd;IE;1000,5\n\
             2;BETA;Other GmbH;DE;5000\n\
             3;;Acme Software Limited;IE;250\n",
        );
        let rows = load_grants(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].amount, Some(1000.5));
        assert_eq!(rows[0].title.as_deref(), Some("ALPHA"));
        assert_eq!(rows[1].title, None);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn no_name_column_yields_nothing() {
        let path = write_tmp("id,country\n1,IE\n");
        assert!(load_grants(&path).unwrap().is_empty());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn aggregation_sums_amounts_and_takes_first_title() {
        let summaries = aggregate_grants(vec![
            GrantRow {
                name: "Acme Software Ltd".into(),
                amount: Some(100.0),
                title: None,
            },
            GrantRow {
                name: "ACME SOFTWARE LIMITED".into(),
                amount: Some(50.0),
                title: Some("Quantum".into()),
            },
            GrantRow {
                name: "Beta".into(),
                amount: None,
                title: None,
            },
        ]);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].name_key, "ACME SOFTWARE");
        assert_eq!(summaries[0].total_amount, Some(150.0));
        assert_eq!(summaries[0].first_title.as_deref(), Some("Quantum"));
        assert_eq!(summaries[1].total_amount, None);
    }

    #[test]
    fn partial_match_leaves_false_flags() {
        let mut records = vec![
            record("ACME SOFTWARE LIMITED"),
            record("GAMMA LIMITED"),
            record("DELTA LIMITED"),
        ];
        let summaries = aggregate_grants(vec![GrantRow {
            name: "Acme Software Ltd".into(),
            amount: Some(10.0),
            title: Some("P1".into()),
        }]);

        let matched = match_grants(&mut records, &summaries);
        assert_eq!(matched, 1);
        assert_eq!(records.len(), 3);
        assert!(records[0].grant.has_eu_grant);
        assert_eq!(records[0].grant.eu_grant_amount, Some(10.0));
        for r in &records[1..] {
            assert!(!r.grant.has_eu_grant);
            assert_eq!(r.grant.eu_grant_amount, None);
            assert_eq!(r.grant.eu_project_title, None);
        }

        let once = records.clone();
        match_grants(&mut records, &summaries);
        assert_eq!(records, once);
    }
}
