//! Byte-bounded in-memory store with per-entry expiry.
//!
//! Both the dedup cache and the HTTP response cache sit on top of this. When
//! an insert would exceed the byte budget the oldest entries are evicted
//! first; callers never control which keys go.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::clock::Clock;

/// Fixed bookkeeping cost charged per entry on top of key and value bytes.
const ENTRY_OVERHEAD_BYTES: usize = 48;

/// Errors raised by [`TtlStore`] operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("entry of {size} bytes exceeds store capacity of {capacity} bytes")]
    EntryTooLarge { size: usize, capacity: usize },

    #[error("store lock poisoned")]
    Poisoned,
}

/// Approximate in-memory size of a stored value.
pub trait Weigh {
    fn weight(&self) -> usize;
}

impl Weigh for u8 {
    fn weight(&self) -> usize {
        1
    }
}

impl Weigh for Vec<u8> {
    fn weight(&self) -> usize {
        self.len()
    }
}

struct Entry<V> {
    value: V,
    expires_at: Option<DateTime<Utc>>,
    size: usize,
    /// Insertion generation, matched against the eviction queue.
    generation: u64,
}

struct State<V> {
    entries: HashMap<String, Entry<V>>,
    /// Insertion order; stale generations are skipped on eviction.
    order: VecDeque<(String, u64)>,
    used_bytes: usize,
    next_generation: u64,
}

impl<V> State<V> {
    fn remove(&mut self, key: &str) {
        if let Some(entry) = self.entries.remove(key) {
            self.used_bytes -= entry.size;
        }
    }

    fn evict_oldest(&mut self) -> bool {
        while let Some((key, generation)) = self.order.pop_front() {
            let live = self
                .entries
                .get(&key)
                .is_some_and(|e| e.generation == generation);
            if live {
                self.remove(&key);
                return true;
            }
        }
        false
    }
}

/// Bounded key/value store with optional per-entry time-to-live.
pub struct TtlStore<V> {
    state: Mutex<State<V>>,
    capacity_bytes: usize,
    clock: Arc<dyn Clock>,
}

impl<V: Weigh + Clone> TtlStore<V> {
    pub fn new(capacity_bytes: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(State {
                entries: HashMap::new(),
                order: VecDeque::new(),
                used_bytes: 0,
                next_generation: 0,
            }),
            capacity_bytes,
            clock,
        }
    }

    pub fn capacity_bytes(&self) -> usize {
        self.capacity_bytes
    }

    /// Insert or replace `key`. `ttl` of `None` means the entry lives until evicted.
    pub fn insert(&self, key: &str, value: V, ttl: Option<Duration>) -> Result<(), StoreError> {
        let size = key.len() + value.weight() + ENTRY_OVERHEAD_BYTES;
        if size > self.capacity_bytes {
            return Err(StoreError::EntryTooLarge {
                size,
                capacity: self.capacity_bytes,
            });
        }

        let expires_at = ttl.map(|ttl| self.clock.now() + ttl);
        let mut state = self.state.lock().map_err(|_| StoreError::Poisoned)?;

        state.remove(key);
        while state.used_bytes + size > self.capacity_bytes {
            if !state.evict_oldest() {
                break;
            }
        }

        let generation = state.next_generation;
        state.next_generation += 1;
        state.order.push_back((key.to_string(), generation));
        state.used_bytes += size;
        state.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at,
                size,
                generation,
            },
        );

        // Keep the queue from growing without bound under heavy key churn.
        if state.order.len() > state.entries.len() * 2 + 64 {
            let State { entries, order, .. } = &mut *state;
            order.retain(|(k, g)| entries.get(k).is_some_and(|e| e.generation == *g));
        }

        Ok(())
    }

    /// Return a clone of the live value for `key`, dropping it if expired.
    pub fn get(&self, key: &str) -> Result<Option<V>, StoreError> {
        let now = self.clock.now();
        let mut state = self.state.lock().map_err(|_| StoreError::Poisoned)?;

        let expired = match state.entries.get(key) {
            None => return Ok(None),
            Some(entry) => entry.expires_at.is_some_and(|at| at <= now),
        };

        if expired {
            state.remove(key);
            return Ok(None);
        }

        Ok(state.entries.get(key).map(|e| e.value.clone()))
    }

    /// Whether a live entry exists for `key`.
    pub fn contains(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }

    /// Number of entries currently held, including expired ones not yet reaped.
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .map(|s| s.entries.len())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes currently charged against the capacity.
    pub fn used_bytes(&self) -> usize {
        self.state.lock().map(|s| s.used_bytes).unwrap_or_default()
    }
}
