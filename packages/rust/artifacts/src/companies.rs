//! The enriched company table (`companies.parquet`).
//!
//! Registry and grant columns are always written. Research and website
//! columns appear only when at least one row carries that enrichment, and
//! pass-through `extra` keys become one text column each, in key order.

use std::collections::BTreeSet;
use std::path::Path;

use arrow_array::RecordBatch;

use dealscout_shared::{CompanyRecord, ResearchRecord, Result, WebsiteProfile};

use crate::table::{TableBuilder, write_parquet};

/// Build the output batch for `records` in their current order.
pub fn companies_batch(records: &[CompanyRecord]) -> Result<RecordBatch> {
    let text = |f: fn(&CompanyRecord) -> Option<&str>| records.iter().map(f).collect::<Vec<_>>();

    let mut table = TableBuilder::new()
        .utf8("company_num", text(|r| Some(r.company.company_num.as_str())))
        .utf8("company_name", text(|r| Some(r.company.company_name.as_str())))
        .utf8("company_type", text(|r| r.company.company_type.as_deref()))
        .utf8("company_reg_date", text(|r| r.company.company_reg_date.as_deref()))
        .utf8("company_address_1", text(|r| r.company.company_address_1.as_deref()))
        .utf8("company_address_2", text(|r| r.company.company_address_2.as_deref()))
        .utf8("company_address_3", text(|r| r.company.company_address_3.as_deref()))
        .utf8("company_address_4", text(|r| r.company.company_address_4.as_deref()))
        .utf8("eircode", text(|r| r.company.eircode.as_deref()))
        .utf8("nace_v2_code", text(|r| r.company.nace_v2_code.as_deref()))
        .utf8("nace_category", text(|r| r.nace_category.as_deref()))
        .boolean("is_tech", records.iter().map(|r| r.is_tech).collect())
        .boolean(
            "has_eu_grant",
            records.iter().map(|r| r.grant.has_eu_grant).collect(),
        )
        .float64(
            "eu_grant_amount",
            records.iter().map(|r| r.grant.eu_grant_amount).collect(),
        )
        .utf8("eu_project_title", text(|r| r.grant.eu_project_title.as_deref()));

    if records.iter().any(|r| r.research.is_some()) {
        table = research_columns(table, records);
    }
    if records.iter().any(|r| r.website.is_some()) {
        table = website_columns(table, records);
    }

    let extra_keys: BTreeSet<&String> = records.iter().flat_map(|r| r.extra.keys()).collect();
    for key in extra_keys {
        let values = records.iter().map(|r| {
            r.extra.get(key).and_then(|v| match v {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            })
        });
        table = table.utf8(key, values);
    }

    table.finish()
}

fn research_columns(table: TableBuilder, records: &[CompanyRecord]) -> TableBuilder {
    let text = |f: fn(&ResearchRecord) -> Option<&str>| {
        records
            .iter()
            .map(|r| r.research.as_ref().and_then(f))
            .collect::<Vec<_>>()
    };

    table
        .utf8("research_report", text(|r| r.research_report.as_deref()))
        .utf8("industry", text(|r| r.industry.as_deref()))
        .utf8("sub_industry", text(|r| r.sub_industry.as_deref()))
        .utf8("tech_stack", text(|r| r.tech_stack.as_deref()))
        .utf8("business_model", text(|r| r.business_model.as_deref()))
        .utf8("stage", text(|r| r.stage.as_deref()))
        .utf8("key_people", text(|r| r.key_people.as_deref()))
        .utf8("funding_total", text(|r| r.funding_total.as_deref()))
        .utf8("employee_count", text(|r| r.employee_count.as_deref()))
        .int32(
            "founded_year",
            records
                .iter()
                .map(|r| r.research.as_ref().and_then(|x| x.founded_year))
                .collect(),
        )
        .utf8("verdict", text(|r| r.verdict.as_deref()))
        .utf8("verdict_reason", text(|r| r.verdict_reason.as_deref()))
}

fn website_columns(table: TableBuilder, records: &[CompanyRecord]) -> TableBuilder {
    let text = |f: fn(&WebsiteProfile) -> Option<&str>| {
        records
            .iter()
            .map(|r| r.website.as_ref().and_then(f))
            .collect::<Vec<_>>()
    };

    table
        .utf8("website_url", text(|w| w.website_url.as_deref()))
        .utf8("description", text(|w| w.description.as_deref()))
        .utf8("products", text(|w| w.products.as_deref()))
        .utf8("technology", text(|w| w.technology.as_deref()))
        .utf8("customers", text(|w| w.customers.as_deref()))
        .utf8("use_cases", text(|w| w.use_cases.as_deref()))
        .utf8("category", text(|w| w.category.as_deref()))
        .utf8("target_market", text(|w| w.target_market.as_deref()))
        .utf8("company_stage", text(|w| w.company_stage.as_deref()))
        .utf8("differentiators", text(|w| w.differentiators.as_deref()))
}

/// Write `records` to `path` as Parquet.
pub fn write_companies(path: &Path, records: &[CompanyRecord]) -> Result<()> {
    let batch = companies_batch(records)?;
    write_parquet(path, &batch)
}
