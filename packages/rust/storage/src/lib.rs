//! libSQL storage layer (offline mode).
//!
//! The [`Storage`] struct wraps a libSQL database holding the durable
//! response/enrichment cache and the pipeline run journal.
//!
//! **Cache rules:**
//! - Entries are written only after a successful fetch or enrichment call.
//! - Every write replaces the whole value for its key; there are no partial
//!   updates, so no locking beyond what libSQL provides is needed.
//! - Expired entries are invisible to readers and removed by
//!   [`Storage::purge_expired`].

mod migrations;

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use dealscout_shared::{DealScoutError, Result};
use libsql::{Connection, Database, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

/// Primary storage handle wrapping a libSQL database.
///
/// Safe to share between tasks behind an `Arc`.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path`, applying pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DealScoutError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DealScoutError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| DealScoutError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        DealScoutError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Cache operations
    // -----------------------------------------------------------------------

    /// Get an unexpired cache value.
    pub async fn cache_get(&self, key: &str) -> Result<Option<String>> {
        let now = Utc::now().timestamp();
        let mut rows = self
            .conn
            .query(
                "SELECT value FROM cache_entries WHERE key = ?1 AND expires_at > ?2",
                params![key, now],
            )
            .await
            .map_err(|e| DealScoutError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let value: String = row
                    .get(0)
                    .map_err(|e| DealScoutError::Storage(e.to_string()))?;
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DealScoutError::Storage(e.to_string())),
        }
    }

    /// Whether an unexpired entry exists for `key`.
    pub async fn cache_contains(&self, key: &str) -> Result<bool> {
        Ok(self.cache_get(key).await?.is_some())
    }

    /// Store `value` under `key`, replacing any previous entry.
    pub async fn cache_set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let now = Utc::now().timestamp();
        let expires_at = now.saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX));
        self.conn
            .execute(
                "INSERT INTO cache_entries (key, value, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(key) DO UPDATE SET
                   value = excluded.value,
                   created_at = excluded.created_at,
                   expires_at = excluded.expires_at",
                params![key, value, now, expires_at],
            )
            .await
            .map_err(|e| DealScoutError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Get and deserialize a JSON cache value.
    ///
    /// A value that no longer deserializes into `T` is treated as a miss.
    pub async fn cache_get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self.cache_get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(key, error = %e, "discarding undecodable cache entry");
                Ok(None)
            }
        }
    }

    /// Serialize `value` as JSON and store it under `key`.
    pub async fn cache_set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<()> {
        let raw = serde_json::to_string(value)
            .map_err(|e| DealScoutError::Storage(format!("cache encode failed: {e}")))?;
        self.cache_set(key, &raw, ttl).await
    }

    /// Remove the entry for `key`, if any.
    pub async fn cache_delete(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM cache_entries WHERE key = ?1", params![key])
            .await
            .map_err(|e| DealScoutError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Delete every expired entry. Returns the number removed.
    pub async fn purge_expired(&self) -> Result<u64> {
        let now = Utc::now().timestamp();
        let removed = self
            .conn
            .execute(
                "DELETE FROM cache_entries WHERE expires_at <= ?1",
                params![now],
            )
            .await
            .map_err(|e| DealScoutError::Storage(e.to_string()))?;
        tracing::info!(removed, "purged expired cache entries");
        Ok(removed)
    }

    /// Entry counts, split by expiry and by key namespace.
    pub async fn cache_stats(&self) -> Result<CacheStats> {
        let now = Utc::now().timestamp();
        let mut rows = self
            .conn
            .query(
                "SELECT
                   CASE
                     WHEN key LIKE 'http%' THEN 'http'
                     WHEN instr(key, ':') > 0 THEN substr(key, 1, instr(key, ':') - 1)
                     ELSE key
                   END AS namespace,
                   SUM(CASE WHEN expires_at > ?1 THEN 1 ELSE 0 END),
                   SUM(CASE WHEN expires_at <= ?1 THEN 1 ELSE 0 END)
                 FROM cache_entries
                 GROUP BY namespace
                 ORDER BY namespace",
                params![now],
            )
            .await
            .map_err(|e| DealScoutError::Storage(e.to_string()))?;

        let mut stats = CacheStats::default();
        while let Ok(Some(row)) = rows.next().await {
            let namespace: String = row
                .get(0)
                .map_err(|e| DealScoutError::Storage(e.to_string()))?;
            let live = row.get::<i64>(1).unwrap_or(0).max(0) as u64;
            let expired = row.get::<i64>(2).unwrap_or(0).max(0) as u64;
            stats.live += live;
            stats.expired += expired;
            stats.namespaces.push(NamespaceStats {
                namespace,
                live,
                expired,
            });
        }
        Ok(stats)
    }

    // -----------------------------------------------------------------------
    // Run journal
    // -----------------------------------------------------------------------

    /// Record the start of a pipeline run. Returns the generated run ID.
    pub async fn insert_run(&self, kind: &str) -> Result<String> {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO pipeline_runs (id, kind, started_at) VALUES (?1, ?2, ?3)",
                params![id.as_str(), kind, now.as_str()],
            )
            .await
            .map_err(|e| DealScoutError::Storage(e.to_string()))?;
        Ok(id)
    }

    /// Mark a run finished and attach its summary.
    pub async fn finish_run(&self, run_id: &str, stats_json: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE pipeline_runs SET finished_at = ?1, stats_json = ?2 WHERE id = ?3",
                params![now.as_str(), stats_json, run_id],
            )
            .await
            .map_err(|e| DealScoutError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Most recent runs, newest first.
    pub async fn recent_runs(&self, limit: u32) -> Result<Vec<RunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, kind, started_at, finished_at, stats_json
                 FROM pipeline_runs ORDER BY started_at DESC, id DESC LIMIT ?1",
                params![limit],
            )
            .await
            .map_err(|e| DealScoutError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(RunRecord {
                id: row
                    .get::<String>(0)
                    .map_err(|e| DealScoutError::Storage(e.to_string()))?,
                kind: row
                    .get::<String>(1)
                    .map_err(|e| DealScoutError::Storage(e.to_string()))?,
                started_at: row
                    .get::<String>(2)
                    .map_err(|e| DealScoutError::Storage(e.to_string()))?,
                finished_at: row.get::<String>(3).ok(),
                stats_json: row.get::<String>(4).ok(),
            });
        }
        Ok(results)
    }
}

/// Cache entry counts returned by [`Storage::cache_stats`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub live: u64,
    pub expired: u64,
    pub namespaces: Vec<NamespaceStats>,
}

/// Counts for one key namespace (`http`, `research`, `website`, ...).
#[derive(Debug, Clone, Serialize)]
pub struct NamespaceStats {
    pub namespace: String,
    pub live: u64,
    pub expired: u64,
}

/// One row of the pipeline run journal.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: String,
    pub kind: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub stats_json: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const DAY: Duration = Duration::from_secs(86_400);

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("ds_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        let version = storage.get_schema_version().await;
        assert_eq!(version, 2);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("ds_test_{}.db", Uuid::now_v7()));
        let _s1 = Storage::open(&tmp).await.expect("first open");
        drop(_s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 2);
    }

    #[tokio::test]
    async fn cache_miss_set_hit_delete() {
        let storage = test_storage().await;

        assert!(storage.cache_get("https://example.com").await.unwrap().is_none());

        storage
            .cache_set("https://example.com", "<html>hi</html>", DAY)
            .await
            .expect("set");
        let hit = storage.cache_get("https://example.com").await.expect("get");
        assert_eq!(hit.as_deref(), Some("<html>hi</html>"));
        assert!(storage.cache_contains("https://example.com").await.unwrap());

        storage.cache_delete("https://example.com").await.expect("delete");
        assert!(!storage.cache_contains("https://example.com").await.unwrap());
    }

    #[tokio::test]
    async fn cache_set_overwrites_whole_value() {
        let storage = test_storage().await;
        storage.cache_set("research:1", "first", DAY).await.unwrap();
        storage.cache_set("research:1", "second", DAY).await.unwrap();
        let value = storage.cache_get("research:1").await.unwrap();
        assert_eq!(value.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn expired_entries_are_invisible_and_purgeable() {
        let storage = test_storage().await;
        storage
            .cache_set("website:ACME", "\"https://acme.ie\"", Duration::ZERO)
            .await
            .unwrap();
        storage.cache_set("website:BETA", "null", DAY).await.unwrap();

        assert!(storage.cache_get("website:ACME").await.unwrap().is_none());

        let removed = storage.purge_expired().await.expect("purge");
        assert_eq!(removed, 1);
        assert!(storage.cache_contains("website:BETA").await.unwrap());
    }

    #[tokio::test]
    async fn json_helpers_distinguish_cached_null_from_miss() {
        let storage = test_storage().await;
        storage
            .cache_set_json::<Option<String>>("website:NOWHERE", &None, DAY)
            .await
            .unwrap();

        let cached: Option<Option<String>> =
            storage.cache_get_json("website:NOWHERE").await.unwrap();
        assert_eq!(cached, Some(None));

        let missing: Option<Option<String>> =
            storage.cache_get_json("website:ELSEWHERE").await.unwrap();
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn undecodable_json_is_a_miss() {
        let storage = test_storage().await;
        storage.cache_set("research:9", "not json", DAY).await.unwrap();
        let value: Option<u32> = storage.cache_get_json("research:9").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn stats_group_by_namespace() {
        let storage = test_storage().await;
        storage.cache_set("https://a.example", "a", DAY).await.unwrap();
        storage.cache_set("http://b.example", "b", DAY).await.unwrap();
        storage.cache_set("research:1", "{}", DAY).await.unwrap();
        storage
            .cache_set("podcast_extract:Show:Ep", "{}", Duration::ZERO)
            .await
            .unwrap();

        let stats = storage.cache_stats().await.expect("stats");
        assert_eq!(stats.live, 3);
        assert_eq!(stats.expired, 1);

        let http = stats
            .namespaces
            .iter()
            .find(|n| n.namespace == "http")
            .expect("http namespace");
        assert_eq!(http.live, 2);
        let extract = stats
            .namespaces
            .iter()
            .find(|n| n.namespace == "podcast_extract")
            .expect("extract namespace");
        assert_eq!(extract.expired, 1);
    }

    #[tokio::test]
    async fn run_journal_lifecycle() {
        let storage = test_storage().await;

        let run_id = storage.insert_run("companies").await.expect("insert run");
        assert!(!run_id.is_empty());

        storage
            .finish_run(&run_id, r#"{"companies": 10}"#)
            .await
            .expect("finish run");

        let runs = storage.recent_runs(5).await.expect("recent runs");
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].kind, "companies");
        assert!(runs[0].finished_at.is_some());
        assert!(runs[0].stats_json.as_deref().unwrap().contains("10"));
    }
}
