//! Company website discovery, scraping and analysis.
//!
//! Discovery first probes domains guessed from the company name, then falls
//! back to a DuckDuckGo HTML search. Both positive and negative discoveries
//! are cached; a search that could not complete is not. Scraping reads the homepage plus up to ten internal pages
//! the model picks, and analysis asks the model for a fixed profile.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use url::Url;

use dealscout_fetch::{Fetcher, extract_links, extract_text, select_attr, truncate_chars};
use dealscout_shared::{CompanyRecord, DealScoutError, Result, TaskFailure, WebsiteProfile};

use crate::llm::{CompletionOptions, LlmClient};
use crate::merge::{left_join, normalize_name};
use crate::parser::{PayloadStrategy, parse_response};
use crate::pipeline::ProgressReporter;
use crate::registry::software_candidates;
use crate::runner::{RunOptions, run_bounded};

const DEFAULT_SEARCH_URL: &str = "https://html.duckduckgo.com/html/";
const DEFAULT_PROBE_TEMPLATE: &str = "https://{domain}/";

/// Bodies at or below this size are parking pages or errors.
const MIN_SITE_BYTES: usize = 500;
const HOMEPAGE_CHARS: usize = 6_000;
const PAGE_CHARS: usize = 4_000;
const MAX_LINKS: usize = 50;
const MAX_PAGES: usize = 10;
const MAX_ANALYSIS_CHARS: usize = 30_000;

/// Hosts that are never a company's own site.
const SKIP_DOMAINS: &[&str] = &[
    "linkedin.com",
    "facebook.com",
    "twitter.com",
    "youtube.com",
    "bloomberg.com",
    "crunchbase.com",
    "glassdoor.com",
    "indeed.com",
    "wikipedia.org",
    "google.com",
    "yelp.com",
    "tripadvisor.com",
    "gov.ie",
    "cro.ie",
    "companieshouse",
    "dnb.com",
    "zoominfo.com",
    "apollo.io",
    "pitchbook.com",
    "rocketreach.co",
    "reddit.com",
    "quora.com",
    "amazon.com",
    "ebay.com",
    "alibaba.com",
    "trustpilot.com",
    "zhihu.com",
    "baidu.com",
    "weibo.com",
];

/// Words too generic to identify a company in a domain.
const FILLER_WORDS: &[&str] = &[
    "the",
    "group",
    "ireland",
    "international",
    "solutions",
    "technologies",
    "services",
];

/// Path fragments that never describe the business.
const EXCLUDED_PATHS: &[&str] = &[
    "/login",
    "/signup",
    "/cart",
    "/checkout",
    "/privacy",
    "/terms",
    "/cookie",
];

/// Paths worth reading when the model cannot choose.
const PRIORITY_PATHS: &[&str] = &[
    "/about",
    "/product",
    "/solution",
    "/service",
    "/platform",
    "/company",
    "/team",
    "/customer",
    "/case",
    "/feature",
];

/// Text gathered from one company site.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedSite {
    pub url: String,
    /// `(page name, text)` in fetch order, homepage first.
    pub pages: Vec<(String, String)>,
}

/// Profile result keyed by company display name for the merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyWebsite {
    pub company_name: String,
    pub profile: WebsiteProfile,
}

/// Discovers, scrapes and analyzes company websites.
pub struct WebsiteScout {
    fetcher: Arc<Fetcher>,
    llm: Arc<dyn LlmClient>,
    model: String,
    ttl: Duration,
    search_url: String,
    probe_template: String,
}

impl WebsiteScout {
    pub fn new(
        fetcher: Arc<Fetcher>,
        llm: Arc<dyn LlmClient>,
        model: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            fetcher,
            llm,
            model: model.into(),
            ttl,
            search_url: DEFAULT_SEARCH_URL.into(),
            probe_template: DEFAULT_PROBE_TEMPLATE.into(),
        }
    }

    /// Override the search endpoint.
    pub fn with_search_url(mut self, url: impl Into<String>) -> Self {
        self.search_url = url.into();
        self
    }

    /// Override how a candidate domain becomes a probe URL. `{domain}` is
    /// replaced with the candidate.
    pub fn with_probe_template(mut self, template: impl Into<String>) -> Self {
        self.probe_template = template.into();
        self
    }

    // -----------------------------------------------------------------------
    // Discovery
    // -----------------------------------------------------------------------

    /// Find the company's website. `None` when nothing plausible turns up.
    pub async fn discover(&self, company_name: &str) -> Option<String> {
        let key = format!("website:{company_name}");
        let storage = self.fetcher.storage();
        match storage.cache_get_json::<Option<String>>(&key).await {
            Ok(Some(cached)) => {
                debug!(company = company_name, found = cached.is_some(), "website cache hit");
                return cached;
            }
            Ok(None) => {}
            Err(e) => warn!(key, error = %e, "website cache read failed"),
        }

        let found = match self.probe_candidates(company_name).await {
            Some(url) => Some(url),
            None => match self.search(company_name).await {
                Ok(found) => found,
                Err(failure) => {
                    warn!(company = company_name, %failure, "website search failed, not caching");
                    return None;
                }
            },
        };

        if let Err(e) = storage.cache_set_json(&key, &found, self.ttl).await {
            warn!(key, error = %e, "website cache write failed");
        }
        found
    }

    async fn probe_candidates(&self, company_name: &str) -> Option<String> {
        for domain in candidate_domains(company_name) {
            let url = self.probe_template.replace("{domain}", &domain);
            if let Some(len) = self.fetcher.probe(&url).await {
                if len > MIN_SITE_BYTES {
                    debug!(company = company_name, %url, "domain guess accepted");
                    return Some(url);
                }
            }
        }
        None
    }

    /// Search for the company's site. `Ok(None)` only when every query
    /// completed without an acceptable result.
    async fn search(&self, company_name: &str) -> std::result::Result<Option<String>, TaskFailure> {
        let clean = normalize_name(company_name);
        if clean.is_empty() {
            return Ok(None);
        }
        let queries = [
            format!("{clean} official website"),
            format!("{clean} company Ireland"),
        ];

        let mut incomplete = false;
        for query in &queries {
            let Ok(mut search) = Url::parse(&self.search_url) else {
                warn!(url = %self.search_url, "invalid search URL");
                return Err(TaskFailure::Task);
            };
            search.query_pairs_mut().append_pair("q", query);

            let Some(html) = self.fetcher.fetch(search.as_str(), false).await else {
                incomplete = true;
                continue;
            };
            for href in select_attr(&html, "a.result__a", "href") {
                if let Some(url) = accept_result(&href, company_name) {
                    debug!(company = company_name, %url, "search result accepted");
                    return Ok(Some(url));
                }
            }
        }

        if incomplete {
            Err(TaskFailure::Network)
        } else {
            Ok(None)
        }
    }

    // -----------------------------------------------------------------------
    // Scraping
    // -----------------------------------------------------------------------

    /// Homepage text plus the model-selected internal pages.
    pub async fn scrape(&self, url: &str, company_name: &str) -> Option<ScrapedSite> {
        let html = self.fetcher.fetch(url, false).await?;
        let base = Url::parse(url).ok()?;

        let mut pages = vec![("homepage".to_string(), extract_text(&html, HOMEPAGE_CHARS))];
        let paths = internal_paths(&html, &base);
        let selected = self.select_paths(&paths, company_name).await;

        let base = &base;
        let fetches = selected.iter().map(|path| async move {
            let page_url = base.join(path).ok()?;
            let page = self.fetcher.fetch(page_url.as_str(), false).await?;
            let text = extract_text(&page, PAGE_CHARS);
            (!text.is_empty()).then(|| (path.clone(), text))
        });
        pages.extend(join_all(fetches).await.into_iter().flatten());

        Some(ScrapedSite {
            url: url.to_string(),
            pages,
        })
    }

    async fn select_paths(&self, paths: &[String], company_name: &str) -> Vec<String> {
        if paths.is_empty() {
            return Vec::new();
        }
        let listing = paths
            .iter()
            .map(|p| format!("- {p}"))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "These are pages on {company_name}'s website. Pick up to {MAX_PAGES} that best \
             explain what the company sells, who buys it, how it works and who runs it.\n\n\
             {listing}\n\nReply with the paths only, one per line."
        );

        match self
            .llm
            .complete(&self.model, &prompt, CompletionOptions::deterministic(Some(200)))
            .await
        {
            Ok(reply) => reply
                .lines()
                .map(str::trim)
                .filter(|l| l.starts_with('/'))
                .map(str::to_string)
                .take(MAX_PAGES)
                .collect(),
            Err(e) => {
                debug!(company = company_name, error = %e, "link selection failed, using keywords");
                paths
                    .iter()
                    .filter(|p| PRIORITY_PATHS.iter().any(|k| p.contains(k)))
                    .take(MAX_PAGES)
                    .cloned()
                    .collect()
            }
        }
    }

    // -----------------------------------------------------------------------
    // Analysis
    // -----------------------------------------------------------------------

    /// Model profile of a scraped site. Degrades to an all-null profile.
    pub async fn analyze(&self, site: &ScrapedSite, company_name: &str) -> WebsiteProfile {
        let key = format!("analysis:{}", site.url);
        let storage = self.fetcher.storage();
        match storage.cache_get_json::<WebsiteProfile>(&key).await {
            Ok(Some(hit)) => return hit,
            Ok(None) => {}
            Err(e) => warn!(key, error = %e, "analysis cache read failed"),
        }

        match self.request_analysis(site, company_name).await {
            Ok(profile) => {
                if let Err(e) = storage.cache_set_json(&key, &profile, self.ttl).await {
                    warn!(key, error = %e, "analysis cache write failed");
                }
                profile
            }
            Err(e) => {
                warn!(company = company_name, failure = %e.task_failure(), error = %e, "website analysis failed");
                WebsiteProfile {
                    website_url: Some(site.url.clone()),
                    ..Default::default()
                }
            }
        }
    }

    async fn request_analysis(&self, site: &ScrapedSite, company_name: &str) -> Result<WebsiteProfile> {
        let mut content = site
            .pages
            .iter()
            .filter(|(_, text)| !text.is_empty())
            .map(|(name, text)| format!("=== {name} ===\n{}", truncate_chars(text, PAGE_CHARS)))
            .collect::<Vec<_>>()
            .join("\n\n");
        if content.chars().count() > MAX_ANALYSIS_CHARS {
            content = format!("{}...[truncated]", truncate_chars(&content, MAX_ANALYSIS_CHARS));
        }

        let prompt = format!(
            "Profile the company \"{company_name}\" from its website content below.\n\n\
             {content}\n\n\
             Reply with one JSON object with the keys description, products, technology, \
             customers, use_cases, category, target_market (B2B, B2C or B2B2C), \
             company_stage (Startup, Growth or Enterprise) and differentiators. \
             Use \"Unknown\" only when the content says nothing."
        );
        let reply = self
            .llm
            .complete(&self.model, &prompt, CompletionOptions::deterministic(Some(1_000)))
            .await?;

        let parsed = parse_response(&reply, &[PayloadStrategy::Fenced, PayloadStrategy::FirstFlatObject]);
        let payload = parsed
            .payload()
            .ok_or_else(|| DealScoutError::parse("analysis reply had no JSON object"))?;

        Ok(WebsiteProfile {
            website_url: Some(site.url.clone()),
            description: payload.text("description"),
            products: payload.text("products"),
            technology: payload.text("technology"),
            customers: payload.text("customers"),
            use_cases: payload.text("use_cases"),
            category: payload.text("category"),
            target_market: payload.text("target_market"),
            company_stage: payload.text("company_stage"),
            differentiators: payload.text("differentiators"),
        })
    }

    /// Discover, scrape and analyze. Never fails.
    pub async fn profile(&self, company_name: &str) -> WebsiteProfile {
        let Some(url) = self.discover(company_name).await else {
            return WebsiteProfile::default();
        };
        let Some(site) = self.scrape(&url, company_name).await else {
            return WebsiteProfile {
                website_url: Some(url),
                ..Default::default()
            };
        };
        self.analyze(&site, company_name).await
    }
}

// ---------------------------------------------------------------------------
// Name and URL heuristics
// ---------------------------------------------------------------------------

/// Domains to probe, most likely first.
pub fn candidate_domains(company_name: &str) -> Vec<String> {
    let clean = normalize_name(company_name).to_lowercase();
    if clean.is_empty() {
        return Vec::new();
    }
    let slug = clean.replace(' ', "").replace('&', "and");
    let dashed = clean.replace(' ', "-").replace('&', "and");

    let mut domains = vec![
        format!("{slug}.com"),
        format!("{slug}.ie"),
        format!("www.{slug}.com"),
        format!("{dashed}.com"),
        format!("{dashed}.ie"),
    ];
    if let Some(first) = clean.split_whitespace().next() {
        if first.chars().count() >= 4 {
            domains.push(format!("{first}.com"));
            domains.push(format!("{first}.ie"));
        }
    }
    let mut seen = std::collections::HashSet::new();
    domains.retain(|d| seen.insert(d.clone()));
    domains
}

/// Whether `domain` plausibly belongs to `company_name`.
pub fn domain_matches_company(domain: &str, company_name: &str) -> bool {
    let domain = domain.to_lowercase();
    let label = domain
        .trim_start_matches("www.")
        .split('.')
        .next()
        .unwrap_or_default();

    let mut clean = normalize_name(company_name).to_lowercase();
    for word in FILLER_WORDS {
        clean = clean.replace(word, "");
    }
    let clean: String = clean.split_whitespace().collect();

    if label.chars().count() < 4 || clean.chars().count() < 4 {
        return false;
    }
    let prefix: String = clean.chars().take(6).collect();
    clean.contains(label) || label.contains(&prefix)
}

/// Unwrap a search result link and accept it if it looks like the company's
/// own site.
fn accept_result(href: &str, company_name: &str) -> Option<String> {
    let href = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    };
    let mut url = Url::parse(&href).ok()?;

    // DuckDuckGo wraps targets in a redirect carrying the real URL in `uddg`.
    if let Some(target) = url
        .query_pairs()
        .find(|(k, _)| k == "uddg")
        .map(|(_, v)| v.into_owned())
    {
        url = Url::parse(&target).ok()?;
    }

    let mut host = url.host_str()?.to_lowercase();
    if SKIP_DOMAINS.iter().any(|skip| host.contains(skip)) {
        return None;
    }
    if let Some(main) = host.strip_prefix("support.") {
        host = main.to_string();
        url = Url::parse(&format!("{}://{host}/", url.scheme())).ok()?;
    }
    domain_matches_company(&host, company_name).then(|| url.to_string())
}

/// Same-host paths linked from `html`, minus account and legal pages.
fn internal_paths(html: &str, base: &Url) -> Vec<String> {
    let mut paths: Vec<String> = Vec::new();
    for link in extract_links(html, base) {
        if link.host_str() != base.host_str() {
            continue;
        }
        let path = link.path().to_lowercase();
        if path == "/" || EXCLUDED_PATHS.iter().any(|x| path.contains(x)) || paths.contains(&path) {
            continue;
        }
        paths.push(path);
        if paths.len() >= MAX_LINKS {
            break;
        }
    }
    paths
}

// ---------------------------------------------------------------------------
// Batch enrichment
// ---------------------------------------------------------------------------

/// Profile the first `limit` eligible companies and attach the results.
#[instrument(skip_all, fields(limit = limit, rows = records.len()))]
pub async fn enrich_with_websites(
    records: &mut [CompanyRecord],
    scout: &WebsiteScout,
    limit: usize,
    options: &RunOptions,
    progress: &dyn ProgressReporter,
) -> usize {
    let names: Vec<String> = software_candidates(records, limit)
        .into_iter()
        .map(|r| r.company.company_name.clone())
        .collect();
    info!(candidates = names.len(), "profiling company websites");

    let results = run_bounded(names, options, progress, |company_name| async move {
        let profile = scout.profile(&company_name).await;
        Ok::<_, DealScoutError>(Some(CompanyWebsite {
            company_name,
            profile,
        }))
    })
    .await;

    let found = results.iter().filter(|r| r.profile.website_url.is_some()).count();
    info!(profiled = results.len(), found, "website enrichment finished");

    left_join(
        records,
        &results,
        |r| r.company.company_name.clone(),
        |w| w.company_name.clone(),
        |record, hit| record.website = hit.map(|w| w.profile.clone()),
    )
}
