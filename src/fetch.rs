//! Network fetch abstraction for testability.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::request::{Request, Response};

/// The host's network-fetch primitive.
///
/// A returned `Err` means the network could not be reached. HTTP error
/// statuses come back as `Ok` responses.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Sends the request and reads the full response body.
    async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// Default fetcher implementation using `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Creates a fetcher with a client tuned for proxying one origin.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .tcp_keepalive(Duration::from_secs(30))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client })
    }

    /// Creates a fetcher over an existing client.
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let resp = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .body(request.body.clone())
            .send()
            .await?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.bytes().await?;
        Ok(Response::new(status, body).with_headers(headers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;
    use reqwest::Url;

    async fn spawn_upstream() -> Url {
        let app = Router::new()
            .route("/hello/", get(|| async { "hi" }))
            .route("/missing/", get(|| async { (StatusCode::NOT_FOUND, "nope") }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Url::parse(&format!("http://{addr}")).unwrap()
    }

    #[tokio::test]
    async fn fetches_body_and_status() {
        let origin = spawn_upstream().await;
        let fetcher = HttpFetcher::new().unwrap();

        let resp = fetcher
            .fetch(&Request::get(origin.join("/hello/").unwrap()))
            .await
            .unwrap();
        assert!(resp.is_ok());
        assert_eq!(resp.body, "hi");
    }

    #[tokio::test]
    async fn http_errors_are_responses() {
        let origin = spawn_upstream().await;
        let fetcher = HttpFetcher::new().unwrap();

        let resp = fetcher
            .fetch(&Request::get(origin.join("/missing/").unwrap()))
            .await
            .unwrap();
        assert_eq!(resp.status, reqwest::StatusCode::NOT_FOUND);
        assert!(!resp.is_ok());
    }

    #[tokio::test]
    async fn unreachable_host_is_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let fetcher = HttpFetcher::new().unwrap();
        let url = Url::parse(&format!("http://{addr}/")).unwrap();
        let err = fetcher.fetch(&Request::get(url)).await.unwrap_err();
        assert!(err.is_network());
    }
}
