//! GitHub REST API client for the Actions endpoints.
//!
//! # Module Structure
//!
//! - [`types`] - Response payloads and conclusion codes
//! - [`client`] - [`GitHubClient`], the [`ActionsApi`](crate::api::ActionsApi) implementation
//! - [`error`] - Error types and quota-exhaustion classification
//! - [`pagination`] - `Link` header parsing
//! - [`conditional`] - ETag response cache
//! - [`rate_limit`] - Proactive request pacing and quota headers

mod client;
mod conditional;
mod error;
mod pagination;
mod rate_limit;
pub mod types;

pub use client::{DEFAULT_API_URL, GitHubClient, normalize_api_base_url};
pub use conditional::{CachedResponse, DEFAULT_HTTP_CACHE_BYTES, ResponseCache};
pub use error::{GitHubError, is_rate_limit_error};
pub use pagination::{LinkPagination, parse_link_header};
pub use rate_limit::{ApiRateLimiter, parse_rate_limit_headers};
pub use types::{Conclusion, RateLimitResource, RateLimitResponse};
