// ABOUTME: In-memory TTL cache memoizing scrape results with hit/miss counters.
// ABOUTME: Entries expire lazily on read; there is no sweeper and no size bound.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Cache key: a site identifier, plus the locale for sites that localize results.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub identifier: String,
    pub locale: Option<String>,
}

impl CacheKey {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            locale: None,
        }
    }

    pub fn with_locale(identifier: impl Into<String>, locale: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            locale: Some(locale.into()),
        }
    }
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CacheStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug)]
struct CacheState<K, V> {
    entries: HashMap<K, (V, Instant)>,
    hits: u64,
    misses: u64,
}

/// A map whose entries are visible for `ttl` after they were written.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    state: Mutex<CacheState<K, V>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                hits: 0,
                misses: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<K, V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the value for `key` if it was written less than `ttl` ago.
    ///
    /// Counts a hit or a miss; an expired entry is evicted and counts as a miss.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut guard = self.lock();
        let state = &mut *guard;

        let expired = match state.entries.get(key) {
            Some((value, written_at)) if written_at.elapsed() < self.ttl => {
                let value = value.clone();
                state.hits += 1;
                return Some(value);
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            state.entries.remove(key);
        }
        state.misses += 1;
        None
    }

    /// Store `value` under `key`, replacing any previous entry and resetting its age.
    pub fn set(&self, key: K, value: V) {
        self.lock().entries.insert(key, (value, Instant::now()));
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            size: state.entries.len(),
            hits: state.hits,
            misses: state.misses,
        }
    }
}
