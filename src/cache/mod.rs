//! Named cache storage abstraction.
//!
//! A [`CacheStorage`] holds any number of named caches, each mapping a GET
//! request to a stored response. The worker only ever uses two names; every
//! other name it finds is stale.

mod disk;
mod memory;

pub use disk::DiskCacheStorage;
pub use memory::MemoryCacheStorage;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;

use crate::error::{Error, Result};
use crate::request::{Request, Response};

/// Abstraction over the host's scoped cache storage.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Returns the names of all existing caches, in lookup order.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Returns true if a cache with this name exists.
    async fn has(&self, name: &str) -> Result<bool>;

    /// Creates the named cache if it does not exist yet.
    async fn open(&self, name: &str) -> Result<()>;

    /// Deletes the named cache and all of its entries.
    ///
    /// Returns false if there was no such cache.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Stores `response` under `request` in the named cache, creating the
    /// cache if needed and replacing any previous entry.
    async fn put(&self, name: &str, request: &Request, response: &Response) -> Result<()>;

    /// Looks up `request` in one named cache.
    async fn match_in(&self, name: &str, request: &Request) -> Result<Option<Response>>;

    /// Looks up `request` in every cache, returning the first hit in
    /// [`keys`](Self::keys) order.
    async fn match_any(&self, request: &Request) -> Result<Option<Response>> {
        for name in self.keys().await? {
            if let Some(response) = self.match_in(&name, request).await? {
                return Ok(Some(response));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl<T: CacheStorage + ?Sized> CacheStorage for Arc<T> {
    async fn keys(&self) -> Result<Vec<String>> {
        (**self).keys().await
    }

    async fn has(&self, name: &str) -> Result<bool> {
        (**self).has(name).await
    }

    async fn open(&self, name: &str) -> Result<()> {
        (**self).open(name).await
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        (**self).delete(name).await
    }

    async fn put(&self, name: &str, request: &Request, response: &Response) -> Result<()> {
        (**self).put(name, request, response).await
    }

    async fn match_in(&self, name: &str, request: &Request) -> Result<Option<Response>> {
        (**self).match_in(name, request).await
    }

    async fn match_any(&self, request: &Request) -> Result<Option<Response>> {
        (**self).match_any(request).await
    }
}

/// Rejects requests that can never be cache keys.
fn ensure_cacheable(request: &Request) -> Result<()> {
    if request.method == Method::GET {
        Ok(())
    } else {
        Err(Error::Cache(format!(
            "cannot cache {} request for {}",
            request.method, request.url
        )))
    }
}
