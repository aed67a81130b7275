//! GitHub API error types and response classification.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::api::ApiError;
use crate::http::{HttpError, HttpResponse};

/// Errors that can occur when talking to the GitHub REST API.
#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    #[error("JSON decode error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Rate limit exceeded. Resets at {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    #[error("GitHub returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid API URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Credentials unavailable: {0}")]
    Credentials(String),
}

/// Check if a GitHubError indicates quota exhaustion.
pub fn is_rate_limit_error(e: &GitHubError) -> bool {
    matches!(e, GitHubError::RateLimited { .. })
}

/// Detect quota exhaustion in a non-success response.
///
/// GitHub signals the primary limit with `x-ratelimit-remaining: 0` plus an
/// epoch `x-ratelimit-reset`, and secondary limits with `retry-after`
/// seconds. Both arrive as 403 or 429.
pub fn rate_limit_reset(response: &HttpResponse, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if response.status != 403 && response.status != 429 {
        return None;
    }

    if let Some(secs) = response
        .header("retry-after")
        .and_then(|v| v.trim().parse::<i64>().ok())
    {
        return Some(now + Duration::seconds(secs.max(0)));
    }

    let exhausted = response
        .header("x-ratelimit-remaining")
        .and_then(|v| v.trim().parse::<u64>().ok())
        == Some(0);
    if !exhausted {
        return None;
    }

    let reset = response
        .header("x-ratelimit-reset")
        .and_then(|v| v.trim().parse::<i64>().ok())
        .and_then(|epoch| DateTime::from_timestamp(epoch, 0));

    // Exhausted without a usable reset header; probe again shortly.
    Some(reset.unwrap_or_else(|| now + Duration::minutes(1)))
}

/// Pull the `message` field out of a GitHub error body, or fall back to raw text.
pub fn error_message(body: &[u8]) -> String {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string())
}

impl From<GitHubError> for ApiError {
    fn from(err: GitHubError) -> Self {
        match err {
            GitHubError::RateLimited { reset_at } => ApiError::RateLimited { reset_at },
            GitHubError::Status { status, message } => match status {
                401 | 403 => ApiError::auth(message),
                404 => ApiError::not_found(message),
                _ => ApiError::api(status, message),
            },
            GitHubError::Http(e) => ApiError::network(e.to_string()),
            GitHubError::Json(e) => ApiError::decode(e.to_string()),
            GitHubError::InvalidUrl { url, reason } => {
                ApiError::network(format!("invalid url {url}: {reason}"))
            }
            GitHubError::Credentials(message) => ApiError::auth(message),
        }
    }
}
