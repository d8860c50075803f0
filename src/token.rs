use std::env;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::error::TokenError;

/// Resolve the bearer token: CLI flag, then `GITHUB_TOKEN`, then the local
/// `gh` CLI. Runs before any request is issued; a missing token aborts the
/// whole run.
pub async fn resolve_token(cli_token: Option<&str>) -> Result<String, TokenError> {
    if let Some(token) = cli_token {
        if !token.trim().is_empty() {
            return Ok(token.trim().to_string());
        }
    }

    if let Ok(token) = env::var("GITHUB_TOKEN") {
        if !token.trim().is_empty() {
            return Ok(token.trim().to_string());
        }
    }

    debug!("GITHUB_TOKEN not set, asking the gh CLI");
    if let Ok(Ok(output)) = timeout(
        Duration::from_secs(10),
        Command::new("gh").args(["auth", "token"]).output(),
    )
    .await
    {
        if output.status.success() {
            let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !token.is_empty() {
                return Ok(token);
            }
        }
    }

    Err(TokenError)
}
