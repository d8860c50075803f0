use chrono::NaiveDate;
use std::time::Duration;

/// Immutable knobs for a scrape run.
///
/// Every component takes a copy of this at construction instead of reading
/// module-level constants, so tests can shrink the enumeration cap, zero the
/// politeness delays, or point `api_base` at a mock server.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    /// Base URL of the GitHub REST API.
    pub api_base: String,
    /// Account whose authored commits are counted.
    pub username: String,
    /// Numeric id of the account, recorded in the state file metadata.
    pub user_id: u64,
    /// First date of the scrape range.
    pub start_date: NaiveDate,
    /// User-Agent header sent with every request.
    pub user_agent: String,

    /// Attempts per request before the transport gives up.
    pub max_retries: u32,
    /// Base of the exponential backoff for 5xx and network errors.
    pub retry_base: Duration,
    /// Wait applied to a 403 that carries no rate-limit reset header.
    pub rate_limit_fallback: Duration,
    /// Wait applied to a 429 that carries no Retry-After header.
    pub secondary_fallback: Duration,
    /// Per-request timeout, separate from any retry or backoff sleep.
    pub request_timeout: Duration,
    /// Politeness delay between consecutive search requests.
    pub request_interval: Duration,

    /// Maximum items the search API will paginate across one query.
    pub result_cap: u64,
    /// Items requested per page when enumerating a window.
    pub page_size: u64,
    /// Recursion limit for adaptive window splitting.
    pub max_depth: u32,
    /// Pages fetched in the best-effort scan at the recursion floor.
    pub floor_pages: u64,

    /// Checkpoint the state file after this many successful dates.
    pub checkpoint_every: u32,
    /// Insert a cooldown after this many date fetches.
    pub cooldown_every: u32,
    /// Length of that cooldown.
    pub cooldown: Duration,
    /// Failed dates retried per lightweight update run.
    pub max_failed_retry: usize,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        ScrapeConfig {
            api_base: "https://api.github.com".to_string(),
            username: "claude".to_string(),
            user_id: 81847,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            user_agent: "github-contrib-scraper".to_string(),
            max_retries: 3,
            retry_base: Duration::from_secs(5),
            rate_limit_fallback: Duration::from_secs(60),
            secondary_fallback: Duration::from_secs(120),
            request_timeout: Duration::from_secs(30),
            request_interval: Duration::from_millis(2200),
            result_cap: 1000,
            page_size: 100,
            max_depth: 5,
            floor_pages: 10,
            checkpoint_every: 10,
            cooldown_every: 100,
            cooldown: Duration::from_secs(60),
            max_failed_retry: 10,
        }
    }
}
