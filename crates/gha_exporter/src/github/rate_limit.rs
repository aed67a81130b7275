use std::num::NonZeroU32;
use std::sync::Arc;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

use crate::http::HttpHeaders;
use crate::http::header_get;

use super::types::RateLimitResource;

/// Type alias for the governor rate limiter.
type GovernorRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Proactive request pacing using the governor crate.
///
/// This only spreads requests out; reacting to an exhausted quota is the
/// fetcher's job.
#[derive(Clone)]
pub struct ApiRateLimiter {
    inner: Arc<GovernorRateLimiter>,
}

impl ApiRateLimiter {
    /// Create a limiter admitting `requests_per_second`. Zero yields `None`.
    pub fn new(requests_per_second: u32) -> Option<Self> {
        let rps = NonZeroU32::new(requests_per_second)?;
        Some(Self {
            inner: Arc::new(RateLimiter::direct(Quota::per_second(rps))),
        })
    }

    /// Wait until a request is allowed by the rate limiter.
    pub async fn wait(&self) {
        self.inner.until_ready().await;
    }
}

/// Extract quota state from GitHub response headers.
pub fn parse_rate_limit_headers(headers: &HttpHeaders) -> Option<RateLimitResource> {
    let number = |name: &str| header_get(headers, name).and_then(|v| v.trim().parse::<u64>().ok());

    Some(RateLimitResource {
        limit: number("x-ratelimit-limit")?,
        remaining: number("x-ratelimit-remaining")?,
        used: number("x-ratelimit-used").unwrap_or_default(),
        reset: header_get(headers, "x-ratelimit-reset")
            .and_then(|v| v.trim().parse::<i64>().ok())?,
    })
}
