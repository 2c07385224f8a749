//! Routing and cache statistics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::route::Route;

/// A point-in-time copy of [`WorkerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Requests left to default handling (non-GET or cross-origin).
    pub ignored: u64,
    /// Requests on network-only paths.
    pub bypassed: u64,
    /// Cache-first requests answered from cache.
    pub cache_hits: u64,
    /// Cache-first requests that had to go to the network.
    pub cache_misses: u64,
    /// Network-first requests answered from cache after a network failure.
    pub fallbacks: u64,
    /// Responses written to a cache.
    pub stored: u64,
    /// Cache writes that failed.
    pub store_errors: u64,
    /// Intercepted requests that ended in an error.
    pub failures: u64,
}

impl StatsSnapshot {
    /// Returns the number of intercepted requests answered from cache.
    #[must_use]
    pub const fn served_from_cache(&self) -> u64 {
        self.cache_hits + self.fallbacks
    }
}

/// Counters updated by the worker while it handles events.
#[derive(Debug, Default)]
pub struct WorkerStats {
    ignored: AtomicU64,
    bypassed: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    fallbacks: AtomicU64,
    stored: AtomicU64,
    store_errors: AtomicU64,
    failures: AtomicU64,
}

impl WorkerStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a request that was not intercepted.
    pub fn record_passthrough(&self, route: Route) {
        match route {
            Route::Ignore => self.ignored.fetch_add(1, Ordering::Relaxed),
            Route::Bypass => self.bypassed.fetch_add(1, Ordering::Relaxed),
            Route::CacheFirst | Route::NetworkFirst => return,
        };
    }

    /// Counts a cache-first request answered from cache.
    pub fn record_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a cache-first request that had to go to the network.
    pub fn record_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a network-first request answered from cache after a network failure.
    pub fn record_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a cache write; `ok` is false when the write failed.
    pub fn record_store(&self, ok: bool) {
        if ok {
            self.stored.fetch_add(1, Ordering::Relaxed);
        } else {
            self.store_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Counts an intercepted request that ended in an error.
    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads all counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ignored: self.ignored.load(Ordering::Relaxed),
            bypassed: self.bypassed.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            stored: self.stored.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}
