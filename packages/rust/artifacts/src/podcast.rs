//! Podcast path tables: `all_episodes`, `guest_analysis` / `high_signal`,
//! and `researched`.

use std::path::Path;

use arrow_array::RecordBatch;

use dealscout_shared::{FounderResearch, GuestAggregate, GuestObservation, Result};

use crate::table::{TableBuilder, write_parquet};

/// One row per extracted guest appearance.
pub fn observations_batch(observations: &[GuestObservation]) -> Result<RecordBatch> {
    TableBuilder::new()
        .utf8(
            "guest_name",
            observations.iter().map(|o| Some(o.guest_name.as_str())),
        )
        .utf8(
            "company_name",
            observations.iter().map(|o| Some(o.company_name.as_str())),
        )
        .utf8("role", observations.iter().map(|o| o.role.as_deref()))
        .opt_boolean(
            "is_founder",
            observations.iter().map(|o| o.is_founder).collect(),
        )
        .utf8("podcast", observations.iter().map(|o| Some(o.podcast.as_str())))
        .utf8(
            "episode_title",
            observations.iter().map(|o| Some(o.episode_title.as_str())),
        )
        .timestamp("pub_date", observations.iter().map(|o| o.pub_date).collect())
        .utf8("link", observations.iter().map(|o| Some(o.link.as_str())))
        .finish()
}

/// One row per (guest, company) aggregate, in the given order.
pub fn guest_analysis_batch(aggregates: &[GuestAggregate]) -> Result<RecordBatch> {
    TableBuilder::new()
        .utf8(
            "guest_name",
            aggregates.iter().map(|a| Some(a.guest_name.as_str())),
        )
        .utf8(
            "company_name",
            aggregates.iter().map(|a| Some(a.company_name.as_str())),
        )
        .uint32("appearances", aggregates.iter().map(|a| a.appearances).collect())
        .uint32(
            "unique_podcasts",
            aggregates.iter().map(|a| a.unique_podcasts).collect(),
        )
        .boolean("is_founder", aggregates.iter().map(|a| a.is_founder).collect())
        .utf8("role", aggregates.iter().map(|a| a.role.as_deref()))
        .utf8("podcast", aggregates.iter().map(|a| Some(a.podcast.as_str())))
        .timestamp(
            "last_appearance",
            aggregates.iter().map(|a| a.last_appearance).collect(),
        )
        .utf8(
            "latest_link",
            aggregates.iter().map(|a| Some(a.latest_link.as_str())),
        )
        .int64(
            "days_since_last",
            aggregates.iter().map(|a| Some(a.days_since_last)).collect(),
        )
        .float64(
            "signal_score",
            aggregates.iter().map(|a| Some(a.signal_score)).collect(),
        )
        .boolean("high_signal", aggregates.iter().map(|a| a.high_signal).collect())
        .finish()
}

/// One row per researched founder company.
pub fn founder_research_batch(results: &[FounderResearch]) -> Result<RecordBatch> {
    let text = |f: fn(&FounderResearch) -> Option<&str>| results.iter().map(f).collect::<Vec<_>>();

    TableBuilder::new()
        .utf8("guest_name", text(|r| Some(r.guest_name.as_str())))
        .utf8("company_name", text(|r| Some(r.company_name.as_str())))
        .utf8("research_report", text(|r| r.research_report.as_deref()))
        .utf8("website", text(|r| r.website.as_deref()))
        .utf8("industry", text(|r| r.industry.as_deref()))
        .utf8("stage", text(|r| r.stage.as_deref()))
        .utf8("funding_total", text(|r| r.funding_total.as_deref()))
        .utf8("latest_round", text(|r| r.latest_round.as_deref()))
        .utf8("notable_investors", text(|r| r.notable_investors.as_deref()))
        .utf8("employee_count", text(|r| r.employee_count.as_deref()))
        .int32(
            "founded_year",
            results.iter().map(|r| r.founded_year).collect(),
        )
        .utf8(
            "fundraise_likelihood",
            text(|r| r.fundraise_likelihood.as_deref()),
        )
        .int64(
            "attractiveness_score",
            results.iter().map(|r| r.attractiveness_score).collect(),
        )
        .utf8("key_signals", text(|r| r.key_signals.as_deref()))
        .finish()
}

pub fn write_observations(path: &Path, observations: &[GuestObservation]) -> Result<()> {
    write_parquet(path, &observations_batch(observations)?)
}

pub fn write_guest_analysis(path: &Path, aggregates: &[GuestAggregate]) -> Result<()> {
    write_parquet(path, &guest_analysis_batch(aggregates)?)
}

pub fn write_founder_research(path: &Path, results: &[FounderResearch]) -> Result<()> {
    write_parquet(path, &founder_research_batch(results)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::{Array, Float64Array, UInt32Array};
    use chrono::{TimeZone, Utc};

    fn aggregate(guest: &str, score: f64) -> GuestAggregate {
        GuestAggregate {
            guest_name: guest.into(),
            company_name: "Acme".into(),
            appearances: 2,
            unique_podcasts: 1,
            is_founder: true,
            role: None,
            podcast: "Equity".into(),
            last_appearance: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            latest_link: "https://pod.example/1".into(),
            days_since_last: 40,
            signal_score: score,
            high_signal: true,
        }
    }

    #[test]
    fn guest_analysis_keeps_row_order() {
        let batch =
            guest_analysis_batch(&[aggregate("Ann", 10.5), aggregate("Bob", 7.0)]).unwrap();
        assert_eq!(batch.num_rows(), 2);
        let scores = batch
            .column_by_name("signal_score")
            .unwrap()
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert_eq!(scores.value(0), 10.5);
        assert_eq!(scores.value(1), 7.0);

        let apps = batch
            .column_by_name("appearances")
            .unwrap()
            .as_any()
            .downcast_ref::<UInt32Array>()
            .unwrap();
        assert_eq!(apps.value(0), 2);
    }

    #[test]
    fn empty_research_table_still_has_schema() {
        let batch = founder_research_batch(&[]).unwrap();
        assert_eq!(batch.num_rows(), 0);
        assert!(batch.column_by_name("attractiveness_score").is_some());
        assert_eq!(batch.column(0).len(), 0);
    }
}
