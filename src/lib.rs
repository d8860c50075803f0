//! # GitHub Contribution Scraper
//!
//! A Rust library for counting, per calendar day, how many distinct
//! repositories a GitHub user committed to, using the commit Search API.
//! Handles rate limits and transient failures, works around the API's
//! 1000-result enumeration cap by adaptively splitting time windows, and
//! keeps a resumable, checkpointed series on disk.
//!
//! ## Main Components
//!
//! - [`GitHubClient`]: authenticated transport with bounded retry/backoff
//! - [`RepoCounter`]: per-window counting and adaptive window splitting
//! - [`Scraper`]: the crawl loop with work planning, checkpoints, cooldowns
//! - [`CrawlState`]: the persisted date -> count series
//! - [`ScrapeConfig`]: immutable configuration passed into each component
//!
//! ## Example
//!
//! ```no_run
//! use github_contrib_scraper::{resolve_token, ScrapeConfig, Scraper};
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let token = resolve_token(None).await?;
//!     let config = ScrapeConfig::default();
//!     let scraper = Scraper::new(token, config, PathBuf::from("data/contributions.json"))?;
//!     scraper.run_scrape().await?;
//!     Ok(())
//! }
//! ```

mod args;
mod config;
mod counter;
mod error;
mod scraper;
mod state;
mod token;
mod transport;

// Re-export main components for documentation and external use
pub use crate::args::{Args, Command};
pub use crate::config::ScrapeConfig;
pub use crate::counter::{RepoCounter, TimeWindow, WindowResult};
pub use crate::error::{ScrapeError, StateError, TokenError, TransportError};
pub use crate::scraper::{plan_work, Scraper};
pub use crate::state::{migrate_v1, CrawlState, Metadata, DATA_VERSION};
pub use crate::token::resolve_token;
pub use crate::transport::GitHubClient;
