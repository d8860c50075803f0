use thiserror::Error;

/// Errors surfaced by the HTTP transport after its internal retry loop.
///
/// Rate limiting, secondary throttling, server errors, and network failures
/// are retried inside the transport and never reach callers directly. Callers
/// must treat either variant as "count unknown, try again next cycle",
/// never as a zero count.
#[derive(Debug, Error)]
pub enum TransportError {
    /// A client error that is pointless to retry (anything 4xx other than
    /// 403/429).
    #[error("HTTP {0} is not retryable")]
    Status(reqwest::StatusCode),

    /// All retry attempts were spent on retryable failures.
    #[error("retries exhausted after {0} attempts")]
    RetriesExhausted(u32),
}

/// Errors from loading or persisting the crawl state file.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to read or write state file: {0}")]
    Io(#[from] std::io::Error),

    #[error("state file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that abort a whole scrape or update run.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    State(#[from] StateError),

    /// Ctrl-C was received; a checkpoint was written before stopping.
    #[error("run interrupted; progress checkpointed")]
    Interrupted,
}

/// No usable credential could be found.
#[derive(Debug, Error)]
#[error("no GitHub token found; pass --token, set GITHUB_TOKEN, or install the gh CLI")]
pub struct TokenError;
