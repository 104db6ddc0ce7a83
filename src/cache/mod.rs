use std::fmt::Display;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use crate::error::AppResult;
use crate::models::{RecommendRequest, RecommendResponse};

mod macros;

/// Canonical fingerprint of a recommendation request
///
/// Built from the serialized typed request, so every option is present with its
/// resolved default and the field order of the incoming JSON does not matter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn from_request(request: &RecommendRequest) -> AppResult<Self> {
        Ok(Self(serde_json::to_string(request)?))
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "recommend:{}", self.0)
    }
}

/// Bounded in-memory LRU of recommendation responses
///
/// Clones share the same underlying cache. The lock is only held for the duration of
/// a single lookup or insert.
#[derive(Clone)]
pub struct ResponseCache {
    entries: Arc<Mutex<LruCache<CacheKey, RecommendResponse>>>,
    max_size: usize,
}

impl ResponseCache {
    pub fn new(max_size: usize) -> Self {
        let capacity = NonZeroUsize::new(max_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Arc::new(Mutex::new(LruCache::new(capacity))),
            max_size: capacity.get(),
        }
    }

    /// Returns a copy of the cached response, marking it most recently used
    pub fn get(&self, key: &CacheKey) -> Option<RecommendResponse> {
        self.entries.lock().get(key).cloned()
    }

    /// Stores a response, evicting the least recently used entry when full
    pub fn put(&self, key: &CacheKey, response: &RecommendResponse) {
        let evicted = self.entries.lock().push(key.clone(), response.clone());
        if let Some((evicted_key, _)) = evicted {
            if &evicted_key != key {
                tracing::debug!(max_size = self.max_size, "Evicted least recently used response");
            }
        }
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
        tracing::info!("Response cache cleared");
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}
