//! In-process cache storage.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Method;

use super::{CacheStorage, ensure_cacheable};
use crate::error::{Error, Result};
use crate::request::{Request, Response};

type Entries = HashMap<String, Response>;

/// Cache storage kept in memory. Caches are looked up in creation order.
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    caches: Mutex<Vec<(String, Entries)>>,
}

impl MemoryCacheStorage {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries in the named cache, or `None` if it does not exist.
    #[must_use]
    pub fn len(&self, name: &str) -> Option<usize> {
        self.lock()
            .ok()?
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, entries)| entries.len())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<(String, Entries)>>> {
        self.caches
            .lock()
            .map_err(|_| Error::Cache("memory cache lock poisoned".into()))
    }
}

fn find_or_create<'a>(caches: &'a mut Vec<(String, Entries)>, name: &str) -> &'a mut Entries {
    let index = match caches.iter().position(|(n, _)| n == name) {
        Some(index) => index,
        None => {
            caches.push((name.to_string(), Entries::new()));
            caches.len() - 1
        }
    };
    &mut caches[index].1
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.iter().map(|(n, _)| n.clone()).collect())
    }

    async fn has(&self, name: &str) -> Result<bool> {
        Ok(self.lock()?.iter().any(|(n, _)| n == name))
    }

    async fn open(&self, name: &str) -> Result<()> {
        find_or_create(&mut *self.lock()?, name);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let mut caches = self.lock()?;
        let before = caches.len();
        caches.retain(|(n, _)| n != name);
        Ok(caches.len() != before)
    }

    async fn put(&self, name: &str, request: &Request, response: &Response) -> Result<()> {
        ensure_cacheable(request)?;
        find_or_create(&mut *self.lock()?, name).insert(request.cache_key(), response.clone());
        Ok(())
    }

    async fn match_in(&self, name: &str, request: &Request) -> Result<Option<Response>> {
        if request.method != Method::GET {
            return Ok(None);
        }
        let key = request.cache_key();
        Ok(self
            .lock()?
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, entries)| entries.get(&key).cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::{StatusCode, Url};

    fn get(path: &str) -> Request {
        Request::get(Url::parse("http://app.test").unwrap().join(path).unwrap())
    }

    #[tokio::test]
    async fn put_creates_cache_and_matches() {
        let storage = MemoryCacheStorage::new();
        storage
            .put("pages", &get("/"), &Response::new(StatusCode::OK, "home"))
            .await
            .unwrap();

        assert!(storage.has("pages").await.unwrap());
        let hit = storage.match_in("pages", &get("/")).await.unwrap().unwrap();
        assert_eq!(hit.body, "home");
        assert!(storage.match_in("pages", &get("/other/")).await.unwrap().is_none());
        assert!(storage.match_in("missing", &get("/")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_replaces_existing_entry() {
        let storage = MemoryCacheStorage::new();
        let req = get("/static/app.css");
        storage.put("s", &req, &Response::new(StatusCode::OK, "v1")).await.unwrap();
        storage.put("s", &req, &Response::new(StatusCode::OK, "v2")).await.unwrap();

        assert_eq!(storage.len("s"), Some(1));
        let hit = storage.match_in("s", &req).await.unwrap().unwrap();
        assert_eq!(hit.body, "v2");
    }

    #[tokio::test]
    async fn keys_in_creation_order() {
        let storage = MemoryCacheStorage::new();
        storage.open("b").await.unwrap();
        storage.open("a").await.unwrap();
        storage.open("b").await.unwrap();
        assert_eq!(storage.keys().await.unwrap(), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn match_any_uses_first_cache_with_entry() {
        let storage = MemoryCacheStorage::new();
        let req = get("/");
        storage.open("first").await.unwrap();
        storage.put("second", &req, &Response::new(StatusCode::OK, "2")).await.unwrap();
        storage.put("third", &req, &Response::new(StatusCode::OK, "3")).await.unwrap();

        let hit = storage.match_any(&req).await.unwrap().unwrap();
        assert_eq!(hit.body, "2");
    }

    #[tokio::test]
    async fn delete_removes_whole_cache() {
        let storage = MemoryCacheStorage::new();
        storage.put("old", &get("/"), &Response::new(StatusCode::OK, "")).await.unwrap();

        assert!(storage.delete("old").await.unwrap());
        assert!(!storage.delete("old").await.unwrap());
        assert!(storage.keys().await.unwrap().is_empty());
        assert_eq!(storage.len("old"), None);
    }

    #[tokio::test]
    async fn non_get_requests_are_not_cacheable() {
        let storage = MemoryCacheStorage::new();
        let url = Url::parse("http://app.test/form/").unwrap();
        let post = Request::new(Method::POST, url.clone());

        let result = storage
            .put("pages", &post, &Response::new(StatusCode::OK, ""))
            .await;
        assert!(matches!(result, Err(Error::Cache(_))));

        storage
            .put("pages", &Request::get(url), &Response::new(StatusCode::OK, ""))
            .await
            .unwrap();
        assert!(storage.match_in("pages", &post).await.unwrap().is_none());
    }
}
