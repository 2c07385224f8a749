//! offline-sw - An offline cache and fetch router modelled on a service worker.
//!
//! A [`ServiceWorker`] precaches a fixed list of pages on install, prunes
//! stale caches on activate, and answers same-origin GET requests either
//! cache-first (static assets) or network-first with cache fallback (pages).
//! Caches and the network are supplied through the [`CacheStorage`] and
//! [`Fetcher`] traits.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use offline_sw::{
//!     FetchOutcome, HttpFetcher, MemoryCacheStorage, Request, ServiceWorker, WorkerConfig,
//! };
//!
//! # async fn example() -> offline_sw::Result<()> {
//! let config = WorkerConfig::new().with_origin("http://127.0.0.1:8000");
//! let worker = ServiceWorker::new(config, Arc::new(MemoryCacheStorage::new()), HttpFetcher::new()?)?;
//!
//! worker.on_install().await?;
//! worker.on_activate().await?;
//!
//! let url = "http://127.0.0.1:8000/static/app.css".parse().expect("valid url");
//! match worker.on_fetch(&Request::get(url)).await? {
//!     FetchOutcome::Respond(resp) => println!("{} bytes", resp.body.len()),
//!     FetchOutcome::Passthrough(route) => println!("not intercepted ({route})"),
//! }
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod cache;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod fetch;
#[cfg(feature = "server")]
pub mod proxy;
pub mod request;
pub mod route;
pub mod stats;
pub mod worker;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use cache::{CacheStorage, DiskCacheStorage, MemoryCacheStorage};
pub use config::{
    AppConfig, CacheWriteMode, PrecacheMode, ProxyConfig, StorageConfig, StorageKind, WorkerConfig,
};
pub use dispatch::WorkerHandle;
pub use error::{Error, Result};
pub use fetch::{Fetcher, HttpFetcher};
pub use request::{Request, Response};
pub use route::{Route, RoutePolicy};
pub use stats::{StatsSnapshot, WorkerStats};
pub use worker::{ActivateReport, FetchOutcome, ServiceWorker, WorkerState};
