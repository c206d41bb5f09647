//! Node output caching.
//!
//! A [`Cache`] is a keyed store over node identifiers. The engine reads it
//! before running a cacheable node and writes it only after the node
//! succeeded, so a failing run never poisons the cache. [`MemoryCache`] is the
//! reference implementation and backs the process-wide default cache.

use std::sync::Arc;

use async_trait::async_trait;
use nodes::{NodeId, ResultMap, Value};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use thiserror::Error;

/// Failure reported by a cache backend.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Storage for node outputs, shared across runs.
///
/// Implementations must be internally synchronized: several engine runs and
/// every task of a level may call them at once.
#[async_trait]
pub trait Cache: Send + Sync {
    /// `Ok(Some(_))` on hit, `Ok(None)` on miss.
    async fn get(&self, id: &NodeId) -> Result<Option<Value>, CacheError>;

    async fn set(&self, id: &NodeId, value: Value) -> Result<(), CacheError>;
}

/// Thread-safe in-memory cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    store: RwLock<ResultMap>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove specific entries.
    pub fn delete<I>(&self, ids: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut store = self.store.write();
        for id in ids {
            store.remove(id.as_ref());
        }
    }

    pub fn clear(&self) {
        self.store.write().clear();
    }

    /// Copy of every cached entry.
    pub fn snapshot(&self) -> ResultMap {
        self.store.read().clone()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.store.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.store.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.read().is_empty()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, id: &NodeId) -> Result<Option<Value>, CacheError> {
        Ok(self.store.read().get(id).cloned())
    }

    async fn set(&self, id: &NodeId, value: Value) -> Result<(), CacheError> {
        self.store.write().insert(id.clone(), value);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Process-wide default cache
// ---------------------------------------------------------------------------

static DEFAULT_CACHE: Lazy<Arc<MemoryCache>> = Lazy::new(|| Arc::new(MemoryCache::new()));

/// The cache used by runs that do not configure one.
pub fn default_cache() -> Arc<MemoryCache> {
    Arc::clone(&DEFAULT_CACHE)
}

/// Empty the default cache.
pub fn reset_default_cache() {
    DEFAULT_CACHE.clear();
}
