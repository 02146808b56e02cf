//! Output artifacts: Parquet tables and research JSON dumps.
//!
//! This crate provides:
//! - [`TableBuilder`] / [`write_parquet`]: columnar table assembly and writing
//! - [`companies`]: the enriched company table
//! - [`podcast`]: episode, guest analysis and founder research tables
//! - [`write_json`] / [`safe_file_stem`]: per-entity JSON files

pub mod companies;
pub mod podcast;
pub mod table;

pub use companies::{companies_batch, write_companies};
pub use podcast::{
    founder_research_batch, guest_analysis_batch, observations_batch, write_founder_research,
    write_guest_analysis, write_observations,
};
pub use table::{TableBuilder, read_parquet, write_parquet};

use std::path::Path;

use dealscout_shared::{DealScoutError, Result};
use serde::Serialize;

/// Write `value` as pretty JSON, creating parent directories.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| DealScoutError::io(parent, e))?;
    }
    let content = serde_json::to_string_pretty(value)
        .map_err(|e| DealScoutError::Artifact(format!("JSON encode failed: {e}")))?;
    std::fs::write(path, content).map_err(|e| DealScoutError::io(path, e))?;
    tracing::debug!(path = %path.display(), "wrote JSON artifact");
    Ok(())
}

/// File-name-safe form of `name`: non-alphanumerics become `_`, at most 50 chars.
pub fn safe_file_stem(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(50)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_file_stem_replaces_and_caps() {
        assert_eq!(safe_file_stem("Acme, Inc."), "Acme__Inc_");
        assert_eq!(safe_file_stem("Zoë Labs"), "Zo__Labs");
        assert_eq!(safe_file_stem(&"a".repeat(80)).len(), 50);
    }

    #[test]
    fn write_json_creates_parent_dirs() {
        let dir = std::env::temp_dir().join(format!("ds_json_{}", uuid::Uuid::now_v7()));
        let path = dir.join("research").join("acme.json");
        write_json(&path, &serde_json::json!({"industry": "SaaS"})).expect("write");
        let content = std::fs::read_to_string(&path).expect("read back");
        assert!(content.contains("\"industry\": \"SaaS\""));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
