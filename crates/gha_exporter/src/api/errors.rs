use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors surfaced through the [`ActionsApi`](super::ActionsApi) seam.
///
/// Only [`ApiError::RateLimited`] gets special treatment from callers; every
/// other variant is logged and the current operation is abandoned.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request quota exhausted until `reset_at`.
    #[error("Rate limit exceeded. Resets at {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    /// The API answered with an unexpected status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Authentication required or rejected.
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    /// Resource not found (org, repo, enterprise, run).
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Network or connection error.
    #[error("Network error: {message}")]
    Network { message: String },

    /// Response body could not be decoded.
    #[error("Decode error: {message}")]
    Decode { message: String },
}

impl ApiError {
    #[inline]
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    #[inline]
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    #[inline]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    #[inline]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    #[inline]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Check if this error is quota exhaustion.
    #[inline]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// The quota reset time, if this is quota exhaustion.
    #[inline]
    pub fn reset_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::RateLimited { reset_at } => Some(*reset_at),
            _ => None,
        }
    }
}

/// Extract a short error message suitable for display.
///
/// Takes the first line of an error message, which keeps multi-line API
/// bodies out of single-line log records.
#[inline]
pub fn short_error_message(e: &impl std::error::Error) -> String {
    let full = e.to_string();
    full.lines().next().unwrap_or(&full).to_string()
}

/// Result type for API operations.
pub type Result<T> = std::result::Result<T, ApiError>;
