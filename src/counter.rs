use chrono::{Days, NaiveDate};
use serde_json::Value;
use std::collections::HashSet;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::ScrapeConfig;
use crate::error::TransportError;
use crate::transport::GitHubClient;

/// Half-open `[start, end)` time-of-day window in minutes. `end == 1440`
/// denotes the day boundary. Never persisted; only used while splitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: u32,
    pub end: u32,
}

impl TimeWindow {
    /// The whole day, `00:00` through the next midnight.
    pub const DAY: TimeWindow = TimeWindow { start: 0, end: 1440 };

    pub fn span(&self) -> u32 {
        self.end - self.start
    }

    /// Partition into `k` contiguous sub-windows that exactly tile `self`.
    ///
    /// The last sub-window absorbs the rounding remainder, so there is never
    /// a gap or an overlap. Requires `1 <= k <= span`.
    pub fn split(&self, k: u32) -> Vec<TimeWindow> {
        let span = self.span();
        (0..k)
            .map(|i| TimeWindow {
                start: self.start + i * span / k,
                end: if i == k - 1 {
                    self.end
                } else {
                    self.start + (i + 1) * span / k
                },
            })
            .collect()
    }
}

/// Outcome of probing a window's total match count.
#[derive(Debug)]
pub enum WindowResult {
    /// The window fit under the cap; these are its distinct repositories.
    Enumerated(HashSet<String>),
    /// True count exceeds the pagination cap; the window must be split.
    Overflow(u64),
}

/// How many sub-windows to split an overflowing window into.
///
/// Denser windows split into more pieces (up to 12) so one pass usually
/// lands each piece under the cap; k never exceeds the span, which keeps
/// every sub-window at least a minute wide.
fn split_factor(total_count: u64, span: u32) -> u32 {
    let k = (total_count / 800).clamp(2, 12) as u32;
    k.min(span)
}

fn render_minutes(minutes: u32) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

fn collect_repo_names(body: &Value, repos: &mut HashSet<String>) {
    if let Some(items) = body["items"].as_array() {
        for item in items {
            if let Some(full_name) = item["repository"]["full_name"].as_str() {
                repos.insert(full_name.to_string());
            }
        }
    }
}

/// Counts distinct repositories a user committed to, per day, working around
/// the search API's 1000-item enumeration cap by adaptive window splitting.
pub struct RepoCounter {
    client: GitHubClient,
    config: ScrapeConfig,
}

impl RepoCounter {
    pub fn new(client: GitHubClient, config: ScrapeConfig) -> Self {
        RepoCounter { client, config }
    }

    /// Count the distinct repositories for one date. The single number that
    /// ends up in the persisted series.
    pub async fn count_unique_repos(&self, date: NaiveDate) -> Result<u64, TransportError> {
        match self.count_window(date, None).await? {
            WindowResult::Enumerated(repos) => Ok(repos.len() as u64),
            WindowResult::Overflow(total_count) => {
                info!(
                    "{}: {} commits exceed the cap, splitting into time windows...",
                    date, total_count
                );
                sleep(self.config.request_interval).await;
                let repos = self.collect_adaptive(date, TimeWindow::DAY).await?;
                Ok(repos.len() as u64)
            }
        }
    }

    /// Probe a window's total count, then enumerate it if it fits under the
    /// cap.
    ///
    /// `window == None` queries the whole day. The first request asks for a
    /// single item purely to read `total_count`. Pages whose request fails
    /// are skipped; the resulting undercount is an accepted tradeoff.
    pub async fn count_window(
        &self,
        date: NaiveDate,
        window: Option<TimeWindow>,
    ) -> Result<WindowResult, TransportError> {
        let query = match window {
            None => self.day_query(date),
            Some(window) => self.window_query(date, window),
        };

        let body = self.client.request_json(&self.search_url(&query, 1, 1)).await?;
        let total_count = body["total_count"].as_u64().unwrap_or(0);

        if total_count == 0 {
            return Ok(WindowResult::Enumerated(HashSet::new()));
        }
        if total_count > self.config.result_cap {
            return Ok(WindowResult::Overflow(total_count));
        }

        let mut repos = HashSet::new();
        let pages = total_count.div_ceil(self.config.page_size);
        for page in 1..=pages {
            sleep(self.config.request_interval).await;
            let url = self.search_url(&query, page, self.config.page_size);
            match self.client.request_json(&url).await {
                Ok(body) => collect_repo_names(&body, &mut repos),
                Err(e) => warn!("Skipping page {} of '{}': {}", page, query, e),
            }
        }

        Ok(WindowResult::Enumerated(repos))
    }

    /// Enumerate a window whose count exceeds the cap by recursively
    /// splitting it into sub-windows until each piece is enumerable.
    ///
    /// Runs on an explicit work stack so a raised depth limit can never
    /// overflow the call stack. A failed sub-window contributes nothing;
    /// only a failure on the root window fails the whole date. At the
    /// recursion floor (depth or one-minute span) the first `floor_pages`
    /// pages are scanned as a best effort, a documented undercount.
    pub async fn collect_adaptive(
        &self,
        date: NaiveDate,
        root: TimeWindow,
    ) -> Result<HashSet<String>, TransportError> {
        let mut repos = HashSet::new();
        let mut stack = vec![(root, 0u32)];
        let mut first = true;

        while let Some((window, depth)) = stack.pop() {
            if !first {
                sleep(self.config.request_interval).await;
            }
            first = false;

            let result = match self.count_window(date, Some(window)).await {
                Ok(result) => result,
                Err(e) if depth == 0 => return Err(e),
                Err(e) => {
                    warn!(
                        "Sub-window {} {}-{} failed, continuing without it: {}",
                        date,
                        render_minutes(window.start),
                        render_minutes(window.end),
                        e
                    );
                    continue;
                }
            };

            match result {
                WindowResult::Enumerated(sub_repos) => repos.extend(sub_repos),
                WindowResult::Overflow(total_count) => {
                    let span = window.span();
                    if depth >= self.config.max_depth || span < 2 {
                        warn!(
                            "{} reached for {} {}-{} ({} commits); scanning first {} pages only",
                            if depth >= self.config.max_depth {
                                "max depth"
                            } else {
                                "min span"
                            },
                            date,
                            render_minutes(window.start),
                            render_minutes(window.end),
                            total_count,
                            self.config.floor_pages
                        );
                        let scanned = self.scan_capped(date, window).await;
                        repos.extend(scanned);
                    } else {
                        let k = split_factor(total_count, span);
                        info!(
                            "Split: {} {}-{} into {} windows (depth={})",
                            date,
                            render_minutes(window.start),
                            render_minutes(window.end),
                            k,
                            depth + 1
                        );
                        for sub in window.split(k).into_iter().rev() {
                            stack.push((sub, depth + 1));
                        }
                    }
                }
            }
        }

        Ok(repos)
    }

    /// Best-effort scan of an unsplittable window: fetch up to `floor_pages`
    /// pages and keep whatever was observed.
    async fn scan_capped(&self, date: NaiveDate, window: TimeWindow) -> HashSet<String> {
        let query = self.window_query(date, window);
        let mut repos = HashSet::new();

        for page in 1..=self.config.floor_pages {
            sleep(self.config.request_interval).await;
            let url = self.search_url(&query, page, self.config.page_size);
            let body = match self.client.request_json(&url).await {
                Ok(body) => body,
                Err(_) => break,
            };
            match body["items"].as_array() {
                Some(items) if !items.is_empty() => collect_repo_names(&body, &mut repos),
                _ => break,
            }
        }

        repos
    }

    fn day_query(&self, date: NaiveDate) -> String {
        format!("author:{} author-date:{}", self.config.username, date)
    }

    /// GitHub `a..b` range syntax. A window ending at the day boundary
    /// renders as the next day's midnight.
    fn window_query(&self, date: NaiveDate, window: TimeWindow) -> String {
        let start = format!("{}T{}:00", date, render_minutes(window.start));
        let end = if window.end == 1440 {
            format!("{}T00:00:00", date + Days::new(1))
        } else {
            format!("{}T{}:00", date, render_minutes(window.end))
        };
        format!(
            "author:{} author-date:{}..{}",
            self.config.username, start, end
        )
    }

    fn search_url(&self, query: &str, page: u64, per_page: u64) -> String {
        format!(
            "{}/search/commits?q={}&per_page={}&page={}",
            self.config.api_base,
            query.replace(' ', "+"),
            per_page,
            page
        )
    }
}
