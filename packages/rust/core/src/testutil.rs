//! Fixtures shared by the core unit tests.

use std::sync::Arc;

use dealscout_shared::{AppConfig, Company, CompanyRecord, RateLimitPolicy};
use dealscout_storage::Storage;
use dealscout_fetch::Fetcher;

pub async fn temp_storage() -> Arc<Storage> {
    let path = std::env::temp_dir().join(format!("ds_core_test_{}.db", uuid::Uuid::now_v7()));
    Arc::new(Storage::open(&path).await.expect("open test db"))
}

/// A fetcher with no per-host rules and a generous default bucket.
pub fn fast_fetcher(storage: Arc<Storage>) -> Arc<Fetcher> {
    let mut config = AppConfig::default();
    config.rate_limits.clear();
    config.rate_limit_default = RateLimitPolicy {
        permits: 1_000,
        interval_ms: 1_000,
    };
    config.fetch.probe_timeout_secs = 2;
    config.fetch.timeout_secs = 5;
    Arc::new(Fetcher::new(storage, &config).expect("build fetcher"))
}

pub fn company(num: &str, name: &str, nace: &str) -> Company {
    Company {
        company_num: num.into(),
        company_name: name.into(),
        company_type: Some("LTD - Private Company Limited by Shares".into()),
        company_status: Some("Normal".into()),
        company_reg_date: Some("2023-01-01".into()),
        company_address_1: Some("1 Main Street".into()),
        company_address_2: None,
        company_address_3: None,
        company_address_4: Some("Dublin".into()),
        eircode: None,
        nace_v2_code: Some(nace.into()),
    }
}

pub fn classified(companies: Vec<Company>) -> Vec<CompanyRecord> {
    crate::registry::classify(companies)
}
