//! Event loop that feeds lifecycle and fetch events to a worker.
//!
//! Lifecycle events run one at a time and hold back everything queued after
//! them. Fetch events are spawned as soon as they are received, so any
//! number of them interleave.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

use crate::cache::CacheStorage;
use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::request::Request;
use crate::worker::{ActivateReport, FetchOutcome, ServiceWorker};

/// Default capacity of the event queue.
pub const DEFAULT_QUEUE_SIZE: usize = 256;

enum Event {
    Install(oneshot::Sender<Result<usize>>),
    Activate(oneshot::Sender<Result<ActivateReport>>),
    Fetch(Request, oneshot::Sender<Result<FetchOutcome>>),
}

/// Cloneable sender of events to a running worker.
#[derive(Clone)]
pub struct WorkerHandle {
    tx: mpsc::Sender<Event>,
}

impl WorkerHandle {
    /// Spawns the event loop for `worker`.
    ///
    /// The loop ends once every handle is dropped, after in-flight fetches
    /// and detached cache writes have finished.
    pub fn spawn<S, F>(worker: Arc<ServiceWorker<S, F>>, queue_size: usize) -> (Self, JoinHandle<()>)
    where
        S: CacheStorage + ?Sized + 'static,
        F: Fetcher + 'static,
    {
        let (tx, rx) = mpsc::channel(queue_size.max(1));
        let task = tokio::spawn(run(worker, rx));
        (Self { tx }, task)
    }

    async fn send<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Event) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| Error::WorkerStopped)?;
        reply_rx.await.map_err(|_| Error::WorkerStopped)
    }

    /// Dispatches the install event and waits for it to finish.
    ///
    /// # Errors
    ///
    /// Returns the install error, or [`Error::WorkerStopped`].
    pub async fn install(&self) -> Result<usize> {
        self.send(Event::Install).await?
    }

    /// Dispatches the activate event and waits for it to finish.
    ///
    /// # Errors
    ///
    /// Returns the activate error, or [`Error::WorkerStopped`].
    pub async fn activate(&self) -> Result<ActivateReport> {
        self.send(Event::Activate).await?
    }

    /// Installs and, since install always skips waiting, activates straight away.
    ///
    /// # Errors
    ///
    /// Returns the first lifecycle error.
    pub async fn start(&self) -> Result<ActivateReport> {
        self.install().await?;
        self.activate().await
    }

    /// Dispatches a fetch event and waits for its outcome.
    ///
    /// # Errors
    ///
    /// Returns the router's error, or [`Error::WorkerStopped`].
    pub async fn fetch(&self, request: Request) -> Result<FetchOutcome> {
        self.send(|reply| Event::Fetch(request, reply)).await?
    }
}

async fn run<S, F>(worker: Arc<ServiceWorker<S, F>>, mut rx: mpsc::Receiver<Event>)
where
    S: CacheStorage + ?Sized + 'static,
    F: Fetcher + 'static,
{
    let fetches = TaskTracker::new();

    while let Some(event) = rx.recv().await {
        match event {
            Event::Install(reply) => {
                let _ = reply.send(worker.on_install().await);
            }
            Event::Activate(reply) => {
                let _ = reply.send(worker.on_activate().await);
            }
            Event::Fetch(request, reply) => {
                let worker = Arc::clone(&worker);
                fetches.spawn(async move {
                    let _ = reply.send(worker.on_fetch(&request).await);
                });
            }
        }
    }

    fetches.close();
    fetches.wait().await;
    worker.flush().await;
    log::debug!("Worker event loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStorage;
    use crate::config::WorkerConfig;
    use crate::route::Route;
    use crate::testing::{MockFetcher, get};
    use crate::worker::WorkerState;

    fn worker(fetcher: MockFetcher) -> Arc<ServiceWorker<MemoryCacheStorage, MockFetcher>> {
        let config = WorkerConfig::new()
            .with_origin("http://app.test")
            .with_precache_urls(&["/"]);
        Arc::new(ServiceWorker::new(config, Arc::new(MemoryCacheStorage::new()), fetcher).unwrap())
    }

    #[tokio::test]
    async fn start_installs_and_activates() {
        let worker = worker(MockFetcher::new().ok("/", "home"));
        let (handle, task) = WorkerHandle::spawn(Arc::clone(&worker), DEFAULT_QUEUE_SIZE);

        let report = handle.start().await.unwrap();
        assert!(report.deleted.is_empty());
        assert_eq!(worker.state(), WorkerState::Activated);

        drop(handle);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn fetch_before_start_passes_through() {
        let worker = worker(MockFetcher::new());
        let (handle, _task) = WorkerHandle::spawn(worker, DEFAULT_QUEUE_SIZE);

        let outcome = handle.fetch(get("/tests/")).await.unwrap();
        assert!(matches!(outcome, FetchOutcome::Passthrough(Route::NetworkFirst)));
    }

    #[tokio::test]
    async fn concurrent_fetches_each_get_an_outcome() {
        let worker = worker(MockFetcher::new().ok("/", "home").ok("/tests/", "t"));
        let (handle, _task) = WorkerHandle::spawn(Arc::clone(&worker), DEFAULT_QUEUE_SIZE);
        handle.start().await.unwrap();

        let results = futures::future::join_all(
            (0..8).map(|_| handle.fetch(get("/tests/"))),
        )
        .await;
        assert!(results.iter().all(|r| matches!(r, Ok(FetchOutcome::Respond(_)))));
        assert_eq!(worker.fetcher().calls("/tests/"), 8);
    }

    #[tokio::test]
    async fn lifecycle_errors_reach_the_caller() {
        let worker = worker(MockFetcher::new());
        let (handle, _task) = WorkerHandle::spawn(worker, DEFAULT_QUEUE_SIZE);
        assert!(matches!(handle.activate().await, Err(Error::InvalidState { .. })));
    }

    #[tokio::test]
    async fn stopped_loop_reports_worker_stopped() {
        let worker = worker(MockFetcher::new());
        let (handle, task) = WorkerHandle::spawn(worker, DEFAULT_QUEUE_SIZE);
        task.abort();
        let _ = task.await;

        assert!(matches!(handle.fetch(get("/")).await, Err(Error::WorkerStopped)));
    }
}
