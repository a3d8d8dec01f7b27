//! Process-wide, bounded LRU caches shared across sessions.
//!
//! Two instances are used by the pipeline: one keyed by raw text for
//! embeddings, one keyed by the rewritten query string for query expansion.
//! Both report hit/miss counters.

use std::hash::Hash;
use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;

/// A bounded, thread-safe LRU cache with hit/miss counters.
pub struct BoundedCache<K: Eq + Hash, V: Clone> {
    inner: Mutex<LruCache<K, V>>,
    hits: Mutex<u64>,
    misses: Mutex<u64>,
}

impl<K: Eq + Hash, V: Clone> BoundedCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is non-zero");
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            hits: Mutex::new(0),
            misses: Mutex::new(0),
        }
    }

    /// Returns a clone of the cached value, recording a hit or miss.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut guard = self.inner.lock();
        match guard.get(key) {
            Some(value) => {
                *self.hits.lock() += 1;
                Some(value.clone())
            }
            None => {
                *self.misses.lock() += 1;
                None
            }
        }
    }

    pub fn put(&self, key: K, value: V) {
        self.inner.lock().put(key, value);
    }

    pub fn hits(&self) -> u64 {
        *self.hits.lock()
    }

    pub fn misses(&self) -> u64 {
        *self.misses.lock()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Embedding cache: text -> embedding vector.
pub type EmbeddingCache = BoundedCache<String, Vec<f32>>;

/// Query-expansion cache: original query text -> expanded query string.
pub type ExpansionCache = BoundedCache<String, String>;
