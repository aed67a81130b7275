//! De-duplication of terminal workflow observations.
//!
//! A finished run or job keeps showing up in every poll until it ages out of
//! the fetch window. The reconciler records its gauges once per exact
//! `(identity, status, conclusion)` tuple and uses this cache to recognise the
//! repeats.

use std::sync::Arc;

use chrono::Duration;
use thiserror::Error;

use crate::clock::Clock;
use crate::store::{StoreError, TtlStore};

/// Default lifetime of a dedup entry.
pub const DEFAULT_DEDUP_TTL_SECS: i64 = 3600;

/// Default byte budget of the dedup cache (100 MiB).
pub const DEFAULT_CACHE_SIZE_BYTES: usize = 100 * 1024 * 1024;

const SENTINEL: u8 = 1;

/// Errors from dedup cache operations. Callers treat all of them as a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache store error: {0}")]
    Store(#[from] StoreError),
}

/// Composite key identifying one terminal observation.
///
/// Each part is length-prefixed, so values containing the separator can never
/// make two different tuples encode to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey(String);

impl DedupKey {
    /// Build a key from a kind tag and ordered parts.
    pub fn from_parts(kind: &str, parts: &[&str]) -> Self {
        let mut encoded = String::with_capacity(
            kind.len() + parts.iter().map(|p| p.len() + 6).sum::<usize>() + 1,
        );
        encoded.push_str(kind);
        for part in parts {
            encoded.push('|');
            encoded.push_str(&part.len().to_string());
            encoded.push(':');
            encoded.push_str(part);
        }
        Self(encoded)
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DedupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bounded set of recently processed keys with per-entry expiry.
pub struct DedupCache {
    store: TtlStore<u8>,
}

impl DedupCache {
    pub fn new(capacity_bytes: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: TtlStore::new(capacity_bytes, clock),
        }
    }

    /// Record `key` as processed for `ttl`.
    pub fn put(&self, key: &DedupKey, ttl: Duration) -> Result<(), CacheError> {
        self.store.insert(key.as_str(), SENTINEL, Some(ttl))?;
        Ok(())
    }

    /// Whether `key` was processed and has not yet expired or been evicted.
    pub fn contains(&self, key: &DedupKey) -> Result<bool, CacheError> {
        Ok(self.store.contains(key.as_str())?)
    }

    /// [`contains`](Self::contains), logging failures and reporting them as a miss.
    pub fn seen(&self, key: &DedupKey) -> bool {
        match self.contains(key) {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Dedup cache lookup failed");
                false
            }
        }
    }

    /// [`put`](Self::put), logging failures instead of returning them.
    pub fn remember(&self, key: &DedupKey, ttl: Duration) {
        if let Err(e) = self.put(key, ttl) {
            tracing::warn!(key = %key, error = %e, "Dedup cache insert failed");
        }
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}
