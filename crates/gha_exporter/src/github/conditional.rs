//! ETag-based conditional requests.
//!
//! Each successful response carrying an ETag is kept in a bounded store keyed
//! by request URL. The next request for that URL sends `If-None-Match`; a
//! `304 Not Modified` is answered from the stored body and, on github.com,
//! does not count against the request quota.

use std::sync::Arc;

use crate::clock::Clock;
use crate::store::{TtlStore, Weigh};

/// Default byte budget for cached response bodies (32 MiB).
pub const DEFAULT_HTTP_CACHE_BYTES: usize = 32 * 1024 * 1024;

/// A stored response body with the validator it came with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub etag: String,
    pub body: Vec<u8>,
    pub next_page: Option<u32>,
}

impl Weigh for CachedResponse {
    fn weight(&self) -> usize {
        self.etag.len() + self.body.len() + std::mem::size_of::<Option<u32>>()
    }
}

/// URL-keyed store of conditional responses.
pub struct ResponseCache {
    store: TtlStore<CachedResponse>,
}

impl ResponseCache {
    pub fn new(capacity_bytes: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: TtlStore::new(capacity_bytes, clock),
        }
    }

    /// The stored entry for `url`, if any. Store failures read as a miss.
    pub fn lookup(&self, url: &str) -> Option<CachedResponse> {
        match self.store.get(url) {
            Ok(hit) => hit,
            Err(e) => {
                tracing::debug!(url, error = %e, "Response cache lookup failed");
                None
            }
        }
    }

    /// Keep `response` until it is evicted to make room.
    pub fn store(&self, url: &str, response: CachedResponse) {
        if let Err(e) = self.store.insert(url, response, None) {
            tracing::debug!(url, error = %e, "Response not cached");
        }
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}
