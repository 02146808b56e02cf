//! Per-host token buckets.
//!
//! Each `[[rate_limits]]` rule owns one bucket shared by every caller whose
//! URL host contains the rule's pattern. Rules are checked in order and the
//! first match wins; unmatched hosts share a single default bucket.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use url::Url;

use dealscout_shared::{DealScoutError, RateLimitPolicy, RateLimitRule, Result};

type Bucket<C> = RateLimiter<NotKeyed, InMemoryState, C, NoOpMiddleware<<C as Clock>::Instant>>;

/// Ordered host-pattern rate limiters with a default fallback.
#[derive(Clone)]
pub struct HostRateLimiters<C: Clock = DefaultClock> {
    rules: Vec<(String, Arc<Bucket<C>>)>,
    default: Arc<Bucket<C>>,
}

impl HostRateLimiters {
    /// Build one bucket per rule plus the default bucket.
    pub fn new(rules: &[RateLimitRule], default: RateLimitPolicy) -> Result<Self> {
        Self::with_clock(rules, default, DefaultClock::default())
    }

    /// Wait until the bucket for `url` grants a permit.
    pub async fn acquire(&self, url: &str) {
        self.bucket_for(url).until_ready().await;
    }
}

impl<C: Clock + Clone> HostRateLimiters<C> {
    /// Same as [`HostRateLimiters::new`], with every bucket reading `clock`.
    pub fn with_clock(rules: &[RateLimitRule], default: RateLimitPolicy, clock: C) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|rule| {
                let quota = quota_for(rule.policy()).map_err(|e| {
                    DealScoutError::config(format!("rate limit for {}: {e}", rule.pattern))
                })?;
                let bucket = RateLimiter::direct_with_clock(quota, clock.clone());
                Ok((rule.pattern.clone(), Arc::new(bucket)))
            })
            .collect::<Result<Vec<_>>>()?;

        let default = Arc::new(RateLimiter::direct_with_clock(quota_for(default)?, clock));
        Ok(Self { rules, default })
    }

    /// The pattern governing `url`, or `None` for the default bucket.
    pub fn pattern_for(&self, url: &str) -> Option<&str> {
        self.matching_rule(url).map(|(pattern, _)| pattern.as_str())
    }

    /// Take a permit for `url` if one is free right now.
    pub fn try_acquire(&self, url: &str) -> bool {
        self.bucket_for(url).check().is_ok()
    }

    fn bucket_for(&self, url: &str) -> &Bucket<C> {
        self.matching_rule(url)
            .map(|(_, bucket)| bucket)
            .unwrap_or(&self.default)
    }

    fn matching_rule(&self, url: &str) -> Option<&(String, Arc<Bucket<C>>)> {
        let host = host_of(url);
        self.rules
            .iter()
            .find(|(pattern, _)| host.contains(pattern.as_str()))
    }
}

/// `permits` per `interval`, with a burst of `permits`.
fn quota_for(policy: RateLimitPolicy) -> Result<Quota> {
    let permits = NonZeroU32::new(policy.permits)
        .ok_or_else(|| DealScoutError::config("permits must be greater than zero"))?;
    let period = Duration::from_millis(policy.interval_ms) / policy.permits;
    let quota = Quota::with_period(period)
        .ok_or_else(|| DealScoutError::config("interval must be greater than zero"))?;
    Ok(quota.allow_burst(permits))
}

/// Host (with port) of `url`, or the raw string when it does not parse.
fn host_of(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            _ => String::new(),
        },
        Err(_) => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use governor::clock::FakeRelativeClock;
    use std::time::Instant;

    fn rules() -> Vec<RateLimitRule> {
        vec![
            RateLimitRule::new("core.cro.ie", 1, 1_000),
            RateLimitRule::new("github.com", 60, 3_600_000),
        ]
    }

    fn policy(permits: u32, interval_ms: u64) -> RateLimitPolicy {
        RateLimitPolicy {
            permits,
            interval_ms,
        }
    }

    fn limiters(default_permits: u32, default_interval_ms: u64) -> HostRateLimiters {
        HostRateLimiters::new(&rules(), policy(default_permits, default_interval_ms))
            .expect("build limiters")
    }

    fn fake_limiters(
        default_permits: u32,
        default_interval_ms: u64,
    ) -> (HostRateLimiters<FakeRelativeClock>, FakeRelativeClock) {
        let clock = FakeRelativeClock::default();
        let l = HostRateLimiters::with_clock(
            &rules(),
            policy(default_permits, default_interval_ms),
            clock.clone(),
        )
        .expect("build limiters");
        (l, clock)
    }

    #[test]
    fn first_matching_pattern_wins() {
        let l = limiters(1, 2_000);
        assert_eq!(
            l.pattern_for("https://core.cro.ie/search?q=1"),
            Some("core.cro.ie")
        );
        assert_eq!(
            l.pattern_for("https://api.github.com/repos"),
            Some("github.com")
        );
        assert_eq!(l.pattern_for("https://example.com/"), None);
    }

    #[test]
    fn pattern_matches_host_not_path() {
        let l = limiters(1, 2_000);
        assert_eq!(l.pattern_for("https://example.com/github.com"), None);
    }

    #[test]
    fn zero_permits_is_a_config_error() {
        let result = HostRateLimiters::new(
            &[RateLimitRule::new("x.com", 0, 1_000)],
            RateLimitPolicy {
                permits: 1,
                interval_ms: 1_000,
            },
        );
        assert!(result.is_err());
        assert!(result.err().unwrap().to_string().contains("x.com"));
    }

    #[test]
    fn burst_is_immediate_then_bucket_refills_one_token_per_period() {
        // 2 permits per 400ms: one token refills every 200ms.
        let (l, clock) = fake_limiters(2, 400);
        assert!(l.try_acquire("https://example.com/a"));
        assert!(l.try_acquire("https://example.com/b"));
        assert!(!l.try_acquire("https://example.com/c"));

        clock.advance(Duration::from_millis(199));
        assert!(!l.try_acquire("https://example.com/c"));
        clock.advance(Duration::from_millis(1));
        assert!(l.try_acquire("https://example.com/c"));
        assert!(!l.try_acquire("https://example.com/d"));
    }

    #[test]
    fn unmatched_hosts_share_the_default_bucket() {
        let (l, clock) = fake_limiters(1, 300);
        assert!(l.try_acquire("https://one.example/"));
        assert!(!l.try_acquire("https://two.example/"));
        clock.advance(Duration::from_millis(300));
        assert!(l.try_acquire("https://two.example/"));
    }

    #[test]
    fn rule_buckets_are_independent_of_the_default() {
        let (l, _clock) = fake_limiters(1, 60_000);
        assert!(l.try_acquire("https://example.com/"));
        assert!(!l.try_acquire("https://example.com/"));
        assert!(l.try_acquire("https://core.cro.ie/company/1"));
        assert!(!l.try_acquire("https://core.cro.ie/company/2"));
        assert!(l.try_acquire("https://api.github.com/repos"));
    }

    #[tokio::test]
    async fn acquire_waits_for_refill() {
        let l = limiters(1, 200);
        let start = Instant::now();
        l.acquire("https://example.com/a").await;
        l.acquire("https://example.com/b").await;
        assert!(start.elapsed() >= Duration::from_millis(150));
    }
}
