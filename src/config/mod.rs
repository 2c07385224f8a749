//! Configuration types for the worker, its storage, and the proxy host.

use std::path::{Path, PathBuf};

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How install-time precaching treats individual failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrecacheMode {
    /// All URLs are fetched first; any failure means nothing is stored.
    #[default]
    Atomic,
    /// Every URL that fetches ok is stored on its own.
    BestEffort,
}

/// Whether cache writes run on the response path or beside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheWriteMode {
    /// Writes run as tracked background tasks; the response does not wait.
    #[default]
    Detached,
    /// Writes complete before the response is returned.
    Awaited,
}

/// Configuration for the fetch router and lifecycle manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// The worker's own origin. Requests to any other origin are ignored.
    pub origin: String,
    /// Name of the general cache used for pages.
    pub cache_name: String,
    /// Name of the long-lived static asset cache.
    pub static_cache_name: String,
    /// Paths fetched and stored into the static cache at install.
    pub precache_urls: Vec<String>,
    /// Path prefixes that always go to the network and are never cached.
    pub network_only: Vec<String>,
    /// Path prefixes served cache-first.
    pub cache_first: Vec<String>,
    /// Failure handling during precache.
    pub precache_mode: PrecacheMode,
    /// Cache write scheduling.
    pub write_mode: CacheWriteMode,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            origin: "http://127.0.0.1:8000".to_string(),
            cache_name: "testmakon-v1".to_string(),
            static_cache_name: "testmakon-static-v1".to_string(),
            precache_urls: to_strings(&["/", "/tests/", "/ai/mentor/", "/leaderboard/"]),
            network_only: to_strings(&[
                "/admin/",
                "/tgbot/",
                "/api/",
                "/accounts/login/",
                "/accounts/logout/",
            ]),
            cache_first: to_strings(&["/static/", "/media/"]),
            precache_mode: PrecacheMode::default(),
            write_mode: CacheWriteMode::default(),
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

impl WorkerConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the worker origin.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Sets both cache names.
    #[must_use]
    pub fn with_cache_names(
        mut self,
        cache_name: impl Into<String>,
        static_cache_name: impl Into<String>,
    ) -> Self {
        self.cache_name = cache_name.into();
        self.static_cache_name = static_cache_name.into();
        self
    }

    /// Sets the precache list.
    #[must_use]
    pub fn with_precache_urls(mut self, urls: &[&str]) -> Self {
        self.precache_urls = to_strings(urls);
        self
    }

    /// Sets the network-only prefixes.
    #[must_use]
    pub fn with_network_only(mut self, prefixes: &[&str]) -> Self {
        self.network_only = to_strings(prefixes);
        self
    }

    /// Sets the cache-first prefixes.
    #[must_use]
    pub fn with_cache_first(mut self, prefixes: &[&str]) -> Self {
        self.cache_first = to_strings(prefixes);
        self
    }

    /// Sets the precache failure mode.
    #[must_use]
    pub const fn with_precache_mode(mut self, mode: PrecacheMode) -> Self {
        self.precache_mode = mode;
        self
    }

    /// Sets the cache write mode.
    #[must_use]
    pub const fn with_write_mode(mut self, mode: CacheWriteMode) -> Self {
        self.write_mode = mode;
        self
    }

    /// Parses the configured origin.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the origin is not an absolute http(s) URL.
    pub fn origin_url(&self) -> Result<Url> {
        let url = Url::parse(&self.origin)
            .map_err(|e| Error::Config(format!("origin {:?}: {e}", self.origin)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "origin {:?} must use http or https",
                self.origin
            )));
        }
        Ok(url)
    }

    /// Returns true if `name` is one of the two caches this version owns.
    #[must_use]
    pub fn is_known_cache(&self, name: &str) -> bool {
        name == self.cache_name || name == self.static_cache_name
    }

    /// Checks the configuration for values the worker cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        self.origin_url()?;
        if self.cache_name.is_empty() || self.static_cache_name.is_empty() {
            return Err(Error::Config("cache names must not be empty".into()));
        }
        if self.cache_name == self.static_cache_name {
            return Err(Error::Config(format!(
                "cache names must differ, both are {:?}",
                self.cache_name
            )));
        }
        let paths = self
            .precache_urls
            .iter()
            .chain(&self.network_only)
            .chain(&self.cache_first);
        for path in paths {
            if !path.starts_with('/') {
                return Err(Error::Config(format!("path {path:?} must start with '/'")));
            }
        }
        Ok(())
    }
}

/// Which cache storage backend the host uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageKind {
    /// In-process storage, lost on exit.
    #[default]
    Memory,
    /// Directory-backed storage that survives restarts.
    Disk,
}

/// Cache storage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage backend.
    pub kind: StorageKind,
    /// Root directory for disk storage.
    pub dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let cache_dir = dirs::cache_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            kind: StorageKind::default(),
            dir: cache_dir.join("offline-sw"),
        }
    }
}

/// Proxy server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Proxy bind address.
    pub host: String,
    /// Proxy port.
    pub port: u16,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

/// Complete application configuration combining worker, storage, and proxy settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Worker configuration.
    pub worker: WorkerConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Proxy configuration.
    pub proxy: ProxyConfig,
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses configuration from TOML text. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML or fails validation.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.worker.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file, or defaults when no path is given.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }
}
