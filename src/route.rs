//! Request classification for the fetch handler.

use reqwest::{Method, Url};

use crate::config::WorkerConfig;
use crate::error::Result;
use crate::request::Request;

/// What the fetch handler does with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Not a same-origin GET; left to default handling.
    Ignore,
    /// Network-only path; never read from or written to cache.
    Bypass,
    /// Static asset; served from cache when present.
    CacheFirst,
    /// Page; fetched from network with cache fallback.
    NetworkFirst,
}

impl Route {
    /// Returns true if the worker answers this request itself.
    #[must_use]
    pub const fn is_intercepted(self) -> bool {
        matches!(self, Self::CacheFirst | Self::NetworkFirst)
    }

    /// Short label used in logs and stats.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ignore => "ignore",
            Self::Bypass => "bypass",
            Self::CacheFirst => "cache-first",
            Self::NetworkFirst => "network-first",
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Prefix tables and origin used to classify requests.
#[derive(Debug, Clone)]
pub struct RoutePolicy {
    origin: Url,
    network_only: Vec<String>,
    cache_first: Vec<String>,
}

impl RoutePolicy {
    /// Builds the policy from a worker configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured origin is invalid.
    pub fn from_config(config: &WorkerConfig) -> Result<Self> {
        Ok(Self {
            origin: config.origin_url()?,
            network_only: config.network_only.clone(),
            cache_first: config.cache_first.clone(),
        })
    }

    /// Returns the worker's origin.
    #[must_use]
    pub const fn origin(&self) -> &Url {
        &self.origin
    }

    /// Classifies a request. The first matching rule wins:
    /// non-GET or cross-origin, then network-only, then cache-first.
    #[must_use]
    pub fn classify(&self, request: &Request) -> Route {
        if request.method != Method::GET || request.url.origin() != self.origin.origin() {
            return Route::Ignore;
        }
        let path = request.url.path();
        if self.network_only.iter().any(|p| path.starts_with(p.as_str())) {
            return Route::Bypass;
        }
        if self.cache_first.iter().any(|p| path.starts_with(p.as_str())) {
            return Route::CacheFirst;
        }
        Route::NetworkFirst
    }
}
