//! Cached, rate-limited HTTP fetcher.
//!
//! Every outbound GET in dealscout goes through [`Fetcher`]:
//! 1. a durable cache lookup keyed by the exact URL (skipped with `skip_cache`),
//! 2. a permit from the host's token bucket,
//! 3. the request on a shared, lazily created session,
//! 4. a cache write for 2xx responses only.
//!
//! Failures never escape [`Fetcher::fetch`]; they collapse to `None` so
//! callers treat an outage the same as a missing page, and nothing is cached
//! for them so the next run retries.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use dealscout_shared::{AppConfig, DealScoutError, Result, TaskFailure};
use dealscout_storage::Storage;

use crate::limiter::HostRateLimiters;

// ---------------------------------------------------------------------------
// FetchResult
// ---------------------------------------------------------------------------

/// How a fetch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    Success,
    HttpError(u16),
    NetworkError(String),
}

/// Outcome of one fetch. `body` is present only on success.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub url: String,
    pub status: FetchStatus,
    pub body: Option<String>,
    /// The body came from the cache rather than the network.
    pub from_cache: bool,
}

impl FetchResult {
    fn failed(url: &str, status: FetchStatus) -> Self {
        Self {
            url: url.to_string(),
            status,
            body: None,
            from_cache: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// Shared HTTP entry point. Construct once per pipeline run and share via `Arc`.
pub struct Fetcher {
    storage: Arc<Storage>,
    limiters: HostRateLimiters,
    session: Mutex<Option<Client>>,
    user_agent: String,
    timeout: Duration,
    probe_timeout: Duration,
    cache_ttl: Duration,
}

impl Fetcher {
    /// Create a fetcher from config. The HTTP session is opened on first use.
    pub fn new(storage: Arc<Storage>, config: &AppConfig) -> Result<Self> {
        let limiters = HostRateLimiters::new(&config.rate_limits, config.rate_limit_default)?;
        Ok(Self {
            storage,
            limiters,
            session: Mutex::new(None),
            user_agent: config.fetch.user_agent.clone(),
            timeout: Duration::from_secs(config.fetch.timeout_secs),
            probe_timeout: Duration::from_secs(config.fetch.probe_timeout_secs),
            cache_ttl: Duration::from_secs(config.cache.ttl_secs),
        })
    }

    /// The cache handle backing this fetcher.
    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    /// Shared session, created on first call.
    async fn client(&self) -> Result<Client> {
        let mut session = self.session.lock().await;
        if let Some(client) = session.as_ref() {
            return Ok(client.clone());
        }

        let client = Client::builder()
            .user_agent(self.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(self.timeout)
            .build()
            .map_err(|e| DealScoutError::Network(format!("failed to build HTTP client: {e}")))?;
        debug!("opened HTTP session");
        *session = Some(client.clone());
        Ok(client)
    }

    /// Release the shared session. A later fetch opens a new one.
    pub async fn close(&self) {
        if self.session.lock().await.take().is_some() {
            info!("closed HTTP session");
        }
    }

    /// GET `url` and return its body, or `None` on any failure.
    pub async fn fetch(&self, url: &str, skip_cache: bool) -> Option<String> {
        self.fetch_result(url, skip_cache).await.body
    }

    /// GET `url`, reporting how the request ended.
    pub async fn fetch_result(&self, url: &str, skip_cache: bool) -> FetchResult {
        if !skip_cache {
            match self.storage.cache_get(url).await {
                Ok(Some(body)) => {
                    debug!(url, "cache hit");
                    return FetchResult {
                        url: url.to_string(),
                        status: FetchStatus::Success,
                        body: Some(body),
                        from_cache: true,
                    };
                }
                Ok(None) => {}
                Err(e) => warn!(url, error = %e, "cache read failed, fetching"),
            }
        }

        self.limiters.acquire(url).await;

        let client = match self.client().await {
            Ok(client) => client,
            Err(e) => return network_failure(url, e.to_string()),
        };

        let response = match client.get(url).send().await {
            Ok(response) => response,
            Err(e) => return network_failure(url, e.to_string()),
        };

        let status = response.status();
        if !status.is_success() {
            debug!(url, status = status.as_u16(), "non-success status, not caching");
            return FetchResult::failed(url, FetchStatus::HttpError(status.as_u16()));
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return network_failure(url, format!("body read failed: {e}")),
        };

        if let Err(e) = self.storage.cache_set(url, &body, self.cache_ttl).await {
            warn!(url, error = %e, "cache write failed");
        }

        FetchResult {
            url: url.to_string(),
            status: FetchStatus::Success,
            body: Some(body),
            from_cache: false,
        }
    }

    /// Uncached GET with the short probe deadline. Returns the body length on 2xx.
    pub async fn probe(&self, url: &str) -> Option<usize> {
        self.limiters.acquire(url).await;
        let client = self.client().await.ok()?;

        let response = client
            .get(url)
            .timeout(self.probe_timeout)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        response.text().await.ok().map(|body| body.len())
    }
}

fn network_failure(url: &str, message: String) -> FetchResult {
    debug!(url, failure = %TaskFailure::Network, error = %message, "fetch failed");
    FetchResult::failed(url, FetchStatus::NetworkError(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dealscout_shared::RateLimitPolicy;
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn test_fetcher() -> Fetcher {
        let tmp = std::env::temp_dir().join(format!("ds_fetch_test_{}.db", Uuid::now_v7()));
        let storage = Arc::new(Storage::open(&tmp).await.expect("open test db"));
        let mut config = AppConfig::default();
        config.rate_limits.clear();
        config.rate_limit_default = RateLimitPolicy {
            permits: 100,
            interval_ms: 1_000,
        };
        Fetcher::new(storage, &config).expect("build fetcher")
    }

    #[tokio::test]
    async fn second_fetch_is_served_from_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>hello</p>"))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = test_fetcher().await;
        let url = format!("{}/page", server.uri());

        let first = fetcher.fetch_result(&url, false).await;
        assert_eq!(first.status, FetchStatus::Success);
        assert!(!first.from_cache);

        let second = fetcher.fetch_result(&url, false).await;
        assert!(second.from_cache);
        assert_eq!(second.body.as_deref(), Some("<p>hello</p>"));
        // MockServer verifies `expect(1)` on drop.
    }

    #[tokio::test]
    async fn skip_cache_goes_to_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_string("fresh"))
            .expect(2)
            .mount(&server)
            .await;

        let fetcher = test_fetcher().await;
        let url = format!("{}/fresh", server.uri());
        assert!(fetcher.fetch(&url, false).await.is_some());
        assert!(fetcher.fetch(&url, true).await.is_some());
    }

    #[tokio::test]
    async fn non_success_is_absent_and_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let fetcher = test_fetcher().await;
        let url = format!("{}/missing", server.uri());

        let result = fetcher.fetch_result(&url, false).await;
        assert_eq!(result.status, FetchStatus::HttpError(503));
        assert!(result.body.is_none());

        assert!(fetcher.fetch(&url, false).await.is_none());
        assert!(!fetcher.storage().cache_contains(&url).await.unwrap());
    }

    #[tokio::test]
    async fn connection_failure_is_absent() {
        let fetcher = test_fetcher().await;
        // Port 9 (discard) on localhost is closed in test environments.
        let result = fetcher.fetch_result("http://127.0.0.1:9/", false).await;
        assert!(matches!(result.status, FetchStatus::NetworkError(_)));
        assert!(result.body.is_none());
    }

    #[tokio::test]
    async fn session_reopens_after_close() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let fetcher = test_fetcher().await;
        let url = format!("{}/a", server.uri());
        assert!(fetcher.fetch(&url, true).await.is_some());
        fetcher.close().await;
        assert!(fetcher.fetch(&url, true).await.is_some());
    }

    #[tokio::test]
    async fn probe_reports_body_length_without_caching() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(600)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = test_fetcher().await;
        let root = format!("{}/", server.uri());
        assert_eq!(fetcher.probe(&root).await, Some(600));
        assert_eq!(fetcher.probe(&format!("{}/gone", server.uri())).await, None);
        assert!(!fetcher.storage().cache_contains(&root).await.unwrap());
    }

    #[tokio::test]
    async fn requests_draw_from_the_host_bucket() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let tmp = std::env::temp_dir().join(format!("ds_fetch_test_{}.db", Uuid::now_v7()));
        let storage = Arc::new(Storage::open(&tmp).await.unwrap());
        let mut config = AppConfig::default();
        config.rate_limits = vec![dealscout_shared::RateLimitRule::new("127.0.0.1", 1, 60_000)];
        let fetcher = Fetcher::new(storage, &config).unwrap();

        let url = format!("{}/r0", server.uri());
        assert!(fetcher.fetch(&url, true).await.is_some());
        // The single permit for the mock host is spent; other hosts are unaffected.
        assert!(!fetcher.limiters.try_acquire(&format!("{}/r1", server.uri())));
        assert!(fetcher.limiters.try_acquire("https://example.com/"));
    }
}
