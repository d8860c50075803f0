use chrono::{Days, NaiveDate, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::ScrapeConfig;
use crate::counter::RepoCounter;
use crate::error::ScrapeError;
use crate::state::{self, CrawlState};
use crate::transport::GitHubClient;

/// Build the backfill work list: previously failed dates first (so a long
/// backlog of new dates never starves known retries), then every missing
/// date from `start` through `until`, chronologically.
pub fn plan_work(state: &CrawlState, start: NaiveDate, until: NaiveDate) -> Vec<String> {
    let mut dates: Vec<String> = state.failed_dates.iter().cloned().collect();

    let mut day = start;
    while day <= until {
        let key = day.to_string();
        if !state.contributions.contains_key(&key) && !state.failed_dates.contains(&key) {
            dates.push(key);
        }
        day = day + Days::new(1);
    }

    dates
}

/// Drives the crawl: picks the next date, asks the counter, commits the
/// result, and checkpoints. One date is in flight at a time.
pub struct Scraper {
    counter: RepoCounter,
    config: ScrapeConfig,
    data_path: PathBuf,
}

impl Scraper {
    pub fn new(
        token: String,
        config: ScrapeConfig,
        data_path: PathBuf,
    ) -> Result<Self, reqwest::Error> {
        let client = GitHubClient::new(token, config.clone())?;
        Ok(Scraper {
            counter: RepoCounter::new(client, config.clone()),
            config,
            data_path,
        })
    }

    /// Backfill every missing date from the configured start date through
    /// yesterday (UTC). Resumable: committed dates are never re-fetched,
    /// failed dates are retried first, and progress is checkpointed every
    /// `checkpoint_every` successes.
    pub async fn run_scrape(&self) -> Result<(), ScrapeError> {
        // Read zero-count dates from the unmigrated file first; a v2
        // migration resets the series and these can be re-committed without
        // a request.
        let zero_dates = state::previous_zero_dates(&self.data_path);
        let mut state = CrawlState::load(&self.data_path, &self.config)?;

        let yesterday = Utc::now().date_naive() - Days::new(1);

        let mut seeded = 0;
        for date in &zero_dates {
            let in_range = NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .map(|d| d >= self.config.start_date && d <= yesterday)
                .unwrap_or(false);
            if in_range
                && !state.contributions.contains_key(date)
                && !state.failed_dates.contains(date)
            {
                state.commit(date, 0);
                seeded += 1;
            }
        }
        if seeded > 0 {
            info!("Re-committed {} zero-commit dates from the previous series", seeded);
            state.save(&self.data_path)?;
        }

        let work = plan_work(&state, self.config.start_date, yesterday);
        if work.is_empty() {
            info!("All dates already collected. Nothing to do.");
            return Ok(());
        }

        let est_hours =
            work.len() as f64 * self.config.request_interval.as_secs_f64() / 3600.0;
        info!("Dates to fetch: {}", work.len());
        info!("Already collected: {}", state.contributions.len());
        info!("Previously failed: {}", state.failed_dates.len());
        info!("Estimated minimum time: {:.1} hours", est_hours);

        let interrupted = Arc::new(AtomicBool::new(false));
        let flag = interrupted.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                flag.store(true, Ordering::SeqCst);
            }
        });

        let pb = ProgressBar::new(work.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {wide_msg}")
                .unwrap()
                .progress_chars("=>-"),
        );

        let mut fetches = 0u32;
        let mut successes = 0u32;
        let mut failures = 0u32;

        for date_key in &work {
            if interrupted.load(Ordering::SeqCst) {
                break;
            }

            if fetches > 0 && fetches % self.config.cooldown_every == 0 {
                info!(
                    "Cooldown: {}s after {} dates",
                    self.config.cooldown.as_secs(),
                    fetches
                );
                sleep(self.config.cooldown).await;
            }

            let date = match NaiveDate::parse_from_str(date_key, "%Y-%m-%d") {
                Ok(date) => date,
                Err(e) => {
                    warn!("Skipping unparseable date {:?}: {}", date_key, e);
                    state.failed_dates.remove(date_key);
                    continue;
                }
            };

            pb.set_message(date_key.clone());
            match self.counter.count_unique_repos(date).await {
                Ok(count) => {
                    state.commit(date_key, count);
                    successes += 1;
                    info!("{}: {} unique repos", date_key, count);

                    if successes % self.config.checkpoint_every == 0 {
                        state.save(&self.data_path)?;
                        info!("Checkpoint saved: {} dates", state.contributions.len());
                    }
                }
                Err(e) => {
                    state.mark_failed(date_key);
                    failures += 1;
                    warn!("{}: failed ({})", date_key, e);
                }
            }
            fetches += 1;
            pb.inc(1);

            sleep(self.config.request_interval).await;
        }
        pb.finish_and_clear();

        state.save(&self.data_path)?;

        info!(
            "Done. {} succeeded, {} failed, {} dates collected, {} total repos",
            successes,
            failures,
            state.contributions.len(),
            state.metadata.total_repos
        );
        if !state.failed_dates.is_empty() {
            warn!("Failed dates remaining: {}", state.failed_dates.len());
        }

        if interrupted.load(Ordering::SeqCst) {
            warn!("Interrupted; checkpoint written");
            return Err(ScrapeError::Interrupted);
        }
        Ok(())
    }

    /// Lightweight variant for frequent invocations: refresh yesterday and
    /// today, retry up to `max_failed_retry` failed dates, and touch the
    /// state file only if something actually changed.
    pub async fn run_update(&self) -> Result<(), ScrapeError> {
        let mut state = CrawlState::load(&self.data_path, &self.config)?;

        let today = Utc::now().date_naive();
        let yesterday = today - Days::new(1);
        let mut dates = vec![yesterday.to_string(), today.to_string()];
        for date in state
            .failed_dates
            .iter()
            .take(self.config.max_failed_retry)
            .cloned()
            .collect::<Vec<_>>()
        {
            if !dates.contains(&date) {
                dates.push(date);
            }
        }

        let snapshot: BTreeMap<String, Option<u64>> = dates
            .iter()
            .map(|date| (date.clone(), state.contributions.get(date).copied()))
            .collect();
        let mut changed = false;

        for (i, date_key) in dates.iter().enumerate() {
            let date = match NaiveDate::parse_from_str(date_key, "%Y-%m-%d") {
                Ok(date) => date,
                Err(e) => {
                    warn!("Skipping unparseable date {:?}: {}", date_key, e);
                    continue;
                }
            };

            match self.counter.count_unique_repos(date).await {
                Ok(count) => {
                    let was_failed = state.failed_dates.contains(date_key);
                    if snapshot[date_key] != Some(count) || was_failed {
                        changed = true;
                    }
                    state.commit(date_key, count);
                    info!("{}: {} unique repos", date_key, count);
                }
                Err(e) => {
                    if !state.failed_dates.contains(date_key)
                        || state.contributions.contains_key(date_key)
                    {
                        changed = true;
                    }
                    state.mark_failed(date_key);
                    warn!("{}: failed ({})", date_key, e);
                }
            }

            if i + 1 < dates.len() {
                sleep(self.config.request_interval).await;
            }
        }

        if changed {
            state.save(&self.data_path)?;
            info!("Data updated.");
        } else {
            info!("No changes detected. File not modified.");
        }
        Ok(())
    }
}
