//! Payload caching keyed by credential-free tile identifiers.
//!
//! Tile URLs carry the API key and a session token that change between runs
//! while the content they address does not. Callers key the cache with
//! [`tile_identifier`](crate::urls::tile_identifier) so that a payload
//! fetched under one session is reused under the next.

use crate::error::Result;
use std::{
    collections::{HashMap, VecDeque},
    future::Future,
    pin::Pin,
    sync::{Arc, PoisonError, RwLock},
};

/// Future type for cache lookups.
pub type GetFuture<'a> = Pin<Box<dyn Future<Output = Result<Option<Vec<u8>>>> + Send + 'a>>;

/// Future type for cache writes.
pub type CacheFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// A store for fetched tile payloads and documents.
pub trait Cache: Send + Sync {
    /// Look up a payload by tile identifier.
    fn get(&self, key: &str) -> GetFuture<'_>;

    /// Store a payload under a tile identifier.
    fn put(&self, key: &str, data: Vec<u8>) -> CacheFuture<'_>;
}

/// A cache that stores nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl Cache for NoCache {
    fn get(&self, _key: &str) -> GetFuture<'_> {
        Box::pin(async { Ok(None) })
    }

    fn put(&self, _key: &str, _data: Vec<u8>) -> CacheFuture<'_> {
        Box::pin(async { Ok(()) })
    }
}

/// An in-memory cache with an optional byte budget.
///
/// When the budget is exceeded the oldest payloads are evicted first.
/// Payloads larger than the whole budget are never stored.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    inner: Arc<RwLock<MemoryCacheInner>>,
    max_size: Option<usize>,
}

#[derive(Debug, Default)]
struct MemoryCacheInner {
    entries: HashMap<String, Vec<u8>>,
    /// Insertion order, oldest first.
    order: VecDeque<String>,
    current_size: usize,
}

impl MemoryCacheInner {
    fn evict(&mut self, key: &str) {
        if let Some(old) = self.entries.remove(key) {
            self.current_size -= old.len();
            self.order.retain(|k| k != key);
        }
    }
}

impl MemoryCache {
    /// Create an unbounded memory cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a memory cache holding at most `max_size` bytes of payload.
    #[must_use]
    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            inner: Arc::default(),
            max_size: Some(max_size),
        }
    }

    /// Total bytes currently stored.
    #[must_use]
    pub fn size(&self) -> usize {
        self.read().current_size
    }

    /// Number of stored payloads.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MemoryCacheInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MemoryCacheInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> GetFuture<'_> {
        let result = self.read().entries.get(key).cloned();
        Box::pin(async move { Ok(result) })
    }

    fn put(&self, key: &str, data: Vec<u8>) -> CacheFuture<'_> {
        let mut cache = self.write();
        cache.evict(key);

        let incoming = data.len();
        if self.max_size.is_some_and(|max| incoming > max) {
            tracing::debug!(key, size = incoming, "payload exceeds cache budget");
            return Box::pin(async { Ok(()) });
        }
        if let Some(max_size) = self.max_size {
            while cache.current_size + incoming > max_size {
                let Some(oldest) = cache.order.pop_front() else {
                    break;
                };
                if let Some(old) = cache.entries.remove(&oldest) {
                    cache.current_size -= old.len();
                }
            }
        }

        cache.entries.insert(key.to_owned(), data);
        cache.order.push_back(key.to_owned());
        cache.current_size += incoming;
        Box::pin(async { Ok(()) })
    }
}
