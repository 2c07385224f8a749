//! The service worker: lifecycle hooks and the fetch router.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::future;
use tokio_util::task::TaskTracker;

use crate::cache::CacheStorage;
use crate::config::{CacheWriteMode, PrecacheMode, WorkerConfig};
use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::request::{Request, Response};
use crate::route::{Route, RoutePolicy};
use crate::stats::{StatsSnapshot, WorkerStats};

/// Service worker lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Constructed, install not yet run.
    Parsed,
    /// Install is running.
    Installing,
    /// Install finished; ready to activate.
    Installed,
    /// Activate is running.
    Activating,
    /// Active and controlling clients.
    Activated,
    /// Install failed; the worker will never control clients.
    Redundant,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Parsed => "parsed",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Activated => "activated",
            Self::Redundant => "redundant",
        })
    }
}

/// Result of a fetch event.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// The worker did not intercept; the host should send the request itself.
    Passthrough(Route),
    /// The worker answered the request.
    Respond(Response),
}

/// What activation removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivateReport {
    /// Names of the stale caches that were deleted.
    pub deleted: Vec<String>,
}

/// Offline cache manager and fetch router for one origin.
pub struct ServiceWorker<S: CacheStorage + ?Sized, F: Fetcher> {
    config: WorkerConfig,
    policy: RoutePolicy,
    storage: Arc<S>,
    fetcher: F,
    state: Mutex<WorkerState>,
    skip_waiting: AtomicBool,
    clients_claimed: AtomicBool,
    writes: TaskTracker,
    stats: Arc<WorkerStats>,
}

impl<S: CacheStorage + ?Sized + 'static, F: Fetcher> ServiceWorker<S, F> {
    /// Creates a worker in the `Parsed` state.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration does not validate.
    pub fn new(config: WorkerConfig, storage: Arc<S>, fetcher: F) -> Result<Self> {
        config.validate()?;
        let policy = RoutePolicy::from_config(&config)?;
        Ok(Self {
            config,
            policy,
            storage,
            fetcher,
            state: Mutex::new(WorkerState::Parsed),
            skip_waiting: AtomicBool::new(false),
            clients_claimed: AtomicBool::new(false),
            writes: TaskTracker::new(),
            stats: Arc::new(WorkerStats::new()),
        })
    }

    /// Returns the worker configuration.
    #[must_use]
    pub const fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Returns the route policy.
    #[must_use]
    pub const fn policy(&self) -> &RoutePolicy {
        &self.policy
    }

    /// Returns the cache storage.
    #[must_use]
    pub const fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// Returns the network fetcher.
    #[must_use]
    pub const fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        self.state
            .lock()
            .map_or(WorkerState::Redundant, |state| *state)
    }

    /// Returns true once install has asked to skip the waiting phase.
    #[must_use]
    pub fn skips_waiting(&self) -> bool {
        self.skip_waiting.load(Ordering::Acquire)
    }

    /// Returns true once the worker is active and has claimed its clients.
    #[must_use]
    pub fn is_controlling(&self) -> bool {
        self.state() == WorkerState::Activated && self.clients_claimed.load(Ordering::Acquire)
    }

    /// Returns current routing and cache counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn transition(&self, from: WorkerState, to: WorkerState) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| Error::Cache("worker state lock poisoned".into()))?;
        if *state != from {
            return Err(Error::InvalidState {
                expected: from,
                actual: *state,
            });
        }
        log::debug!("Worker state {} -> {to}", *state);
        *state = to;
        Ok(())
    }

    /// Handles the install event: precaches into the static cache and asks
    /// to skip waiting.
    ///
    /// Precache failures are logged and swallowed. Returns the number of
    /// entries stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker is not freshly parsed or the static
    /// cache cannot be opened. The worker is then redundant.
    pub async fn on_install(&self) -> Result<usize> {
        self.transition(WorkerState::Parsed, WorkerState::Installing)?;
        self.skip_waiting.store(true, Ordering::Release);

        let stored = match self.precache().await {
            Ok(stored) => stored,
            Err(e) => {
                self.transition(WorkerState::Installing, WorkerState::Redundant)?;
                return Err(e);
            }
        };

        self.transition(WorkerState::Installing, WorkerState::Installed)?;
        log::info!(
            "Installed; precached {stored}/{} URLs into {}",
            self.config.precache_urls.len(),
            self.config.static_cache_name
        );
        Ok(stored)
    }

    async fn precache(&self) -> Result<usize> {
        let cache = &self.config.static_cache_name;
        self.storage.open(cache).await?;

        let requests = self
            .config
            .precache_urls
            .iter()
            .map(|path| {
                self.policy
                    .origin()
                    .join(path)
                    .map(Request::get)
                    .map_err(|e| Error::Config(format!("precache URL {path:?}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        let results =
            future::join_all(requests.iter().map(|req| self.fetcher.fetch(req))).await;

        let mut fetched = Vec::with_capacity(requests.len());
        for (req, result) in requests.iter().zip(results) {
            match result {
                Ok(resp) if resp.is_storable_for(req) => fetched.push((req, resp)),
                Ok(resp) => log::warn!("Precache of {} returned {}", req.url, resp.status),
                Err(e) => log::warn!("Precache of {} failed: {e}", req.url),
            }
        }

        if self.config.precache_mode == PrecacheMode::Atomic && fetched.len() != requests.len() {
            log::warn!("Precache incomplete; storing nothing");
            return Ok(0);
        }

        let mut stored = 0;
        for (req, resp) in fetched {
            match self.storage.put(cache, req, &resp).await {
                Ok(()) => stored += 1,
                Err(e) => log::warn!("Precache store of {} failed: {e}", req.url),
            }
        }
        Ok(stored)
    }

    /// Handles the activate event: deletes stale caches, then claims clients.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker is not installed or the cache names
    /// cannot be listed. The worker stays installed and activation can be retried.
    pub async fn on_activate(&self) -> Result<ActivateReport> {
        self.transition(WorkerState::Installed, WorkerState::Activating)?;

        let report = match self.prune_stale_caches().await {
            Ok(report) => report,
            Err(e) => {
                self.transition(WorkerState::Activating, WorkerState::Installed)?;
                return Err(e);
            }
        };

        self.transition(WorkerState::Activating, WorkerState::Activated)?;
        self.clients_claimed.store(true, Ordering::Release);
        log::info!(
            "Activated; deleted {} stale cache(s), clients claimed",
            report.deleted.len()
        );
        Ok(report)
    }

    async fn prune_stale_caches(&self) -> Result<ActivateReport> {
        let stale: Vec<String> = self
            .storage
            .keys()
            .await?
            .into_iter()
            .filter(|name| !self.config.is_known_cache(name))
            .collect();

        let results = future::join_all(stale.iter().map(|name| self.storage.delete(name))).await;

        let mut report = ActivateReport::default();
        for (name, result) in stale.into_iter().zip(results) {
            match result {
                Ok(_) => {
                    log::debug!("Deleted stale cache {name}");
                    report.deleted.push(name);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    /// Handles a fetch event.
    ///
    /// Requests are passed through until the worker controls its clients.
    ///
    /// # Errors
    ///
    /// Returns an error when an intercepted request can be served neither
    /// from the network nor from cache.
    pub async fn on_fetch(&self, request: &Request) -> Result<FetchOutcome> {
        let route = self.policy.classify(request);
        if !self.is_controlling() {
            log::debug!("Not controlling yet; passing through {}", request.url);
            return Ok(FetchOutcome::Passthrough(route));
        }
        log::debug!("{} {} -> {route}", request.method, request.url);

        let result = match route {
            Route::Ignore | Route::Bypass => {
                self.stats.record_passthrough(route);
                return Ok(FetchOutcome::Passthrough(route));
            }
            Route::CacheFirst => self.cache_first(request).await,
            Route::NetworkFirst => self.network_first(request).await,
        };

        result.map(FetchOutcome::Respond).inspect_err(|e| {
            self.stats.record_failure();
            log::warn!("{route} request for {} failed: {e}", request.url);
        })
    }

    async fn cache_first(&self, request: &Request) -> Result<Response> {
        let cached = self.lookup(request).await;
        if let Some(resp) = cached {
            self.stats.record_hit();
            return Ok(resp);
        }
        self.stats.record_miss();

        match self.fetcher.fetch(request).await {
            Ok(resp) => {
                if resp.is_storable_for(request) {
                    self.store(&self.config.static_cache_name, request, &resp)
                        .await;
                }
                Ok(resp)
            }
            // Falls back to the lookup above, which was already a miss.
            Err(e) if e.is_network() => {
                log::debug!("Network failed for {} with no cached copy: {e}", request.url);
                Err(Error::NoCachedResponse {
                    url: request.url.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn network_first(&self, request: &Request) -> Result<Response> {
        match self.fetcher.fetch(request).await {
            Ok(resp) => {
                if resp.is_storable_for(request) {
                    self.store(&self.config.cache_name, request, &resp).await;
                }
                Ok(resp)
            }
            Err(e) if e.is_network() => {
                log::debug!("Network failed for {}, trying cache: {e}", request.url);
                match self.lookup(request).await {
                    Some(resp) => {
                        self.stats.record_fallback();
                        Ok(resp)
                    }
                    None => Err(Error::NoCachedResponse {
                        url: request.url.to_string(),
                    }),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Looks a request up across all caches. Storage errors count as a miss.
    async fn lookup(&self, request: &Request) -> Option<Response> {
        match self.storage.match_any(request).await {
            Ok(found) => found,
            Err(e) => {
                log::warn!("Cache lookup for {} failed: {e}", request.url);
                None
            }
        }
    }

    /// Stores a copy of `response`. Failures are logged, never returned.
    async fn store(&self, cache: &str, request: &Request, response: &Response) {
        let storage = Arc::clone(&self.storage);
        let stats = Arc::clone(&self.stats);
        let cache = cache.to_string();
        let request = request.clone();
        let response = response.clone();

        let write = async move {
            let result = storage.put(&cache, &request, &response).await;
            if let Err(ref e) = result {
                log::warn!("Storing {} in {cache} failed: {e}", request.url);
            }
            stats.record_store(result.is_ok());
        };

        match self.config.write_mode {
            CacheWriteMode::Awaited => write.await,
            CacheWriteMode::Detached => {
                self.writes.spawn(write);
            }
        }
    }

    /// Waits for all detached cache writes started so far.
    pub async fn flush(&self) {
        self.writes.close();
        self.writes.wait().await;
        self.writes.reopen();
    }
}
