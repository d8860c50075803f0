use chrono::Utc;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::config::ScrapeConfig;
use crate::error::TransportError;

/// Per-attempt classification of a non-2xx response.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum RetryDecision {
    /// Sleep this long, then spend another attempt on the same URL.
    RetryAfter(Duration),
    /// Not worth retrying; the caller's unit of work fails for this cycle.
    Fatal(StatusCode),
}

/// Authenticated GitHub API client with bounded retry and backoff.
///
/// Rate-limit waits can block the caller for minutes; that is the intended
/// behavior for a long-running scrape, not a hang.
pub struct GitHubClient {
    client: Client,
    token: String,
    config: ScrapeConfig,
}

impl GitHubClient {
    pub fn new(token: String, config: ScrapeConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.request_timeout)
            .build()?;

        Ok(GitHubClient {
            client,
            token,
            config,
        })
    }

    /// Issue a GET and return the parsed JSON body.
    ///
    /// Rate limits (403/429), server errors, and network failures are slept
    /// through and retried up to `max_retries` times. Unexpected 4xx statuses
    /// fail immediately.
    pub async fn request_json(&self, url: &str) -> Result<Value, TransportError> {
        for attempt in 0..self.config.max_retries {
            debug!("Requesting URL: {}", url);

            let response = match self
                .client
                .get(url)
                .header("Accept", "application/vnd.github.v3+json")
                .header("Authorization", format!("Bearer {}", self.token))
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    let wait = backoff(self.config.retry_base, attempt);
                    warn!("Network error: {}. Retry in {}s...", e, wait.as_secs());
                    sleep(wait).await;
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                match response.json().await {
                    Ok(body) => return Ok(body),
                    Err(e) => {
                        // Truncated or malformed body; treat like a transient
                        // server fault.
                        let wait = backoff(self.config.retry_base, attempt);
                        warn!("Bad response body: {}. Retry in {}s...", e, wait.as_secs());
                        sleep(wait).await;
                        continue;
                    }
                }
            }

            match classify(status, response.headers(), attempt, &self.config) {
                RetryDecision::RetryAfter(wait) => {
                    warn!(
                        "HTTP {} on {}. Waiting {}s before retry...",
                        status,
                        url,
                        wait.as_secs()
                    );
                    sleep(wait).await;
                }
                RetryDecision::Fatal(status) => {
                    error!("HTTP {} for {}", status, url);
                    return Err(TransportError::Status(status));
                }
            }
        }

        Err(TransportError::RetriesExhausted(self.config.max_retries))
    }
}

/// Decide how to handle a non-success status.
pub(crate) fn classify(
    status: StatusCode,
    headers: &HeaderMap,
    attempt: u32,
    config: &ScrapeConfig,
) -> RetryDecision {
    if status == StatusCode::FORBIDDEN {
        // Primary rate limit: the reset header says when the quota refills.
        if let Some(reset) = header_u64(headers, "X-RateLimit-Reset") {
            let now = Utc::now().timestamp().max(0) as u64;
            let wait = reset.saturating_sub(now).max(1) + 1;
            return RetryDecision::RetryAfter(Duration::from_secs(wait));
        }
        return RetryDecision::RetryAfter(config.rate_limit_fallback);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let wait = header_u64(headers, "Retry-After")
            .map(Duration::from_secs)
            .unwrap_or(config.secondary_fallback);
        return RetryDecision::RetryAfter(wait);
    }

    if status.is_server_error() {
        return RetryDecision::RetryAfter(backoff(config.retry_base, attempt));
    }

    RetryDecision::Fatal(status)
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)?
        .to_str()
        .ok()
        .and_then(|value| value.parse().ok())
}

fn backoff(base: Duration, attempt: u32) -> Duration {
    base * 2u32.pow(attempt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderName, HeaderValue};

    fn headers(pairs: &[(&str, String)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                name.parse::<HeaderName>().unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_403_with_reset_waits_until_reset() {
        let config = ScrapeConfig::default();
        let reset = (Utc::now().timestamp() + 10) as u64;
        let decision = classify(
            StatusCode::FORBIDDEN,
            &headers(&[("X-RateLimit-Reset", reset.to_string())]),
            0,
            &config,
        );
        match decision {
            RetryDecision::RetryAfter(wait) => {
                // reset - now, floored at 1, plus the 1s safety margin
                assert!(wait >= Duration::from_secs(10), "waited {:?}", wait);
                assert!(wait <= Duration::from_secs(12), "waited {:?}", wait);
            }
            other => panic!("expected retry, got {:?}", other),
        }
    }

    #[test]
    fn test_403_with_stale_reset_still_waits_at_least_2s() {
        let config = ScrapeConfig::default();
        let reset = (Utc::now().timestamp() - 100) as u64;
        let decision = classify(
            StatusCode::FORBIDDEN,
            &headers(&[("X-RateLimit-Reset", reset.to_string())]),
            0,
            &config,
        );
        assert_eq!(decision, RetryDecision::RetryAfter(Duration::from_secs(2)));
    }

    #[test]
    fn test_403_without_reset_uses_fallback() {
        let config = ScrapeConfig::default();
        let decision = classify(StatusCode::FORBIDDEN, &HeaderMap::new(), 0, &config);
        assert_eq!(
            decision,
            RetryDecision::RetryAfter(config.rate_limit_fallback)
        );
    }

    #[test]
    fn test_429_honors_retry_after() {
        let config = ScrapeConfig::default();
        let decision = classify(
            StatusCode::TOO_MANY_REQUESTS,
            &headers(&[("Retry-After", "30".to_string())]),
            0,
            &config,
        );
        assert_eq!(decision, RetryDecision::RetryAfter(Duration::from_secs(30)));
    }

    #[test]
    fn test_429_without_header_uses_fallback() {
        let config = ScrapeConfig::default();
        let decision = classify(StatusCode::TOO_MANY_REQUESTS, &HeaderMap::new(), 0, &config);
        assert_eq!(
            decision,
            RetryDecision::RetryAfter(config.secondary_fallback)
        );
    }

    #[test]
    fn test_5xx_backoff_doubles_per_attempt() {
        let config = ScrapeConfig::default();
        for (attempt, expected) in [(0, 5), (1, 10), (2, 20)] {
            let decision = classify(
                StatusCode::INTERNAL_SERVER_ERROR,
                &HeaderMap::new(),
                attempt,
                &config,
            );
            assert_eq!(
                decision,
                RetryDecision::RetryAfter(Duration::from_secs(expected))
            );
        }
    }

    #[test]
    fn test_unexpected_4xx_is_fatal() {
        let config = ScrapeConfig::default();
        for status in [
            StatusCode::NOT_FOUND,
            StatusCode::UNPROCESSABLE_ENTITY,
            StatusCode::UNAUTHORIZED,
        ] {
            assert_eq!(
                classify(status, &HeaderMap::new(), 0, &config),
                RetryDecision::Fatal(status)
            );
        }
    }
}
