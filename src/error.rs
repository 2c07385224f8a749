//! Error types for the offline-sw library.

use thiserror::Error;

use crate::worker::WorkerState;

/// Errors that can occur while routing requests or managing caches.
#[derive(Error, Debug)]
pub enum Error {
    /// The network fetch failed before a response was received.
    #[error("Network error: {0}")]
    Network(String),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A cache fallback was attempted and no entry matched the request.
    #[error("No cached response for {url}")]
    NoCachedResponse {
        /// URL of the request that could not be served.
        url: String,
    },

    /// Cache storage failed.
    #[error("Cache error: {0}")]
    Cache(String),

    /// I/O error during disk cache operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Cache entry metadata could not be encoded or decoded.
    #[error("Cache metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    /// Configuration file could not be parsed.
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration values are invalid.
    #[error("Invalid config: {0}")]
    Config(String),

    /// A lifecycle hook was called in the wrong state.
    #[error("Invalid worker state: expected {expected}, got {actual}")]
    InvalidState {
        /// State the operation requires.
        expected: WorkerState,
        /// State the worker was actually in.
        actual: WorkerState,
    },

    /// The worker event loop has shut down.
    #[error("Worker event loop stopped")]
    WorkerStopped,
}

impl Error {
    /// Returns true if this error means the network could not be reached.
    ///
    /// Only these errors trigger a cache fallback.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Http(_))
    }
}

/// A specialized `Result` type for offline-sw operations.
pub type Result<T> = std::result::Result<T, Error>;
