//! Test doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use tokio_util::sync::CancellationToken;

use crate::cache::{CacheStorage, MemoryCacheStorage};
use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::request::{Request, Response};

pub const ORIGIN: &str = "http://app.test";

pub fn app_url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

pub fn get(path: &str) -> Request {
    Request::get(app_url(path))
}

#[derive(Debug, Clone)]
enum Reply {
    Status(StatusCode, &'static str),
    Fail,
}

/// A scripted fetcher keyed by path. Unscripted paths fail like an
/// unreachable network.
#[derive(Debug, Default)]
pub struct MockFetcher {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ok(self, path: &str, body: &'static str) -> Self {
        self.set_ok(path, body);
        self
    }

    pub fn status(self, path: &str, status: StatusCode) -> Self {
        self.set_status(path, status);
        self
    }

    pub fn fail(self, path: &str) -> Self {
        self.set_fail(path);
        self
    }

    pub fn set_ok(&self, path: &str, body: &'static str) {
        self.set(path, Reply::Status(StatusCode::OK, body));
    }

    pub fn set_status(&self, path: &str, status: StatusCode) {
        self.set(path, Reply::Status(status, ""));
    }

    pub fn set_fail(&self, path: &str) {
        self.set(path, Reply::Fail);
    }

    fn set(&self, path: &str, reply: Reply) {
        self.replies.lock().unwrap().insert(path.to_string(), reply);
    }

    pub fn calls(&self, path: &str) -> usize {
        self.calls.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let path = request.url.path().to_string();
        *self.calls.lock().unwrap().entry(path.clone()).or_default() += 1;
        let reply = self.replies.lock().unwrap().get(&path).cloned();
        match reply {
            Some(Reply::Status(status, body)) => Ok(Response::new(status, body)),
            Some(Reply::Fail) | None => Err(Error::Network(format!("connection refused: {path}"))),
        }
    }
}

/// Memory storage that counts reads and writes, optionally failing puts.
#[derive(Debug, Default)]
pub struct CountingStorage {
    inner: MemoryCacheStorage,
    reads: AtomicUsize,
    writes: AtomicUsize,
    fail_puts: bool,
}

impl CountingStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_puts() -> Self {
        Self {
            fail_puts: true,
            ..Self::default()
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheStorage for CountingStorage {
    async fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys().await
    }

    async fn has(&self, name: &str) -> Result<bool> {
        self.inner.has(name).await
    }

    async fn open(&self, name: &str) -> Result<()> {
        self.inner.open(name).await
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(name).await
    }

    async fn put(&self, name: &str, request: &Request, response: &Response) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_puts {
            return Err(Error::Cache("disk full".into()));
        }
        self.inner.put(name, request, response).await
    }

    async fn match_in(&self, name: &str, request: &Request) -> Result<Option<Response>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.match_in(name, request).await
    }

    async fn match_any(&self, request: &Request) -> Result<Option<Response>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.match_any(request).await
    }
}

/// Memory storage whose puts wait until the gate is opened.
#[derive(Debug, Default)]
pub struct GatedStorage {
    inner: MemoryCacheStorage,
    gate: CancellationToken,
}

impl GatedStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_gate(&self) {
        self.gate.cancel();
    }
}

#[async_trait]
impl CacheStorage for GatedStorage {
    async fn keys(&self) -> Result<Vec<String>> {
        self.inner.keys().await
    }

    async fn has(&self, name: &str) -> Result<bool> {
        self.inner.has(name).await
    }

    async fn open(&self, name: &str) -> Result<()> {
        self.inner.open(name).await
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        self.inner.delete(name).await
    }

    async fn put(&self, name: &str, request: &Request, response: &Response) -> Result<()> {
        self.gate.cancelled().await;
        self.inner.put(name, request, response).await
    }

    async fn match_in(&self, name: &str, request: &Request) -> Result<Option<Response>> {
        self.inner.match_in(name, request).await
    }
}
