//! Reverse proxy that hosts the worker in front of the web application.

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::State;
use axum::http::header::{CONNECTION, CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response as HttpResponse};
use axum::routing::get;
use reqwest::Url;
use serde::Serialize;

use crate::cache::CacheStorage;
use crate::dispatch::WorkerHandle;
use crate::error::{Error, Result};
use crate::fetch::{Fetcher, HttpFetcher};
use crate::request::{Request, Response};
use crate::stats::StatsSnapshot;
use crate::worker::{FetchOutcome, ServiceWorker};

/// Largest request body the proxy buffers.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// The worker type the proxy runs.
pub type HostWorker = ServiceWorker<dyn CacheStorage, HttpFetcher>;

#[derive(Clone)]
struct ProxyState {
    worker: Arc<HostWorker>,
    handle: WorkerHandle,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    worker: String,
}

#[derive(Serialize)]
struct StatsResponse {
    origin: String,
    caches: Vec<String>,
    stats: StatsSnapshot,
}

/// Builds the proxy router.
///
/// `/__sw/health` and `/__sw/stats` are answered locally; every other
/// request goes through the worker.
pub fn router(worker: Arc<HostWorker>, handle: WorkerHandle) -> Router {
    Router::new()
        .route("/__sw/health", get(api_health))
        .route("/__sw/stats", get(api_stats))
        .fallback(proxy_request)
        .with_state(ProxyState { worker, handle })
}

async fn api_health(State(state): State<ProxyState>) -> impl IntoResponse {
    axum::Json(HealthResponse {
        status: "ok".to_string(),
        worker: state.worker.state().to_string(),
    })
}

async fn api_stats(State(state): State<ProxyState>) -> HttpResponse {
    match state.worker.storage().keys().await {
        Ok(caches) => axum::Json(StatsResponse {
            origin: state.worker.policy().origin().to_string(),
            caches,
            stats: state.worker.stats(),
        })
        .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn proxy_request(State(state): State<ProxyState>, req: axum::extract::Request) -> HttpResponse {
    let request = match to_worker_request(state.worker.policy().origin(), req).await {
        Ok(request) => request,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    if request.url.origin() != state.worker.policy().origin().origin() {
        log::warn!("Refusing to forward {} {} off the upstream origin", request.method, request.url);
        return (StatusCode::FORBIDDEN, "cross-origin request refused").into_response();
    }

    let result = match state.handle.fetch(request.clone()).await {
        Ok(FetchOutcome::Respond(resp)) => Ok(resp),
        Ok(FetchOutcome::Passthrough(route)) => {
            log::debug!("Forwarding {} {} ({route})", request.method, request.url);
            state.worker.fetcher().fetch(&request).await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(resp) => into_http_response(resp),
        Err(e) => {
            log::warn!("{} {} failed: {e}", request.method, request.url);
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}

/// Resolves the inbound URI against the upstream origin.
///
/// Absolute-form URIs keep their own origin; the handler refuses those that
/// point anywhere but the upstream.
fn resolve_url(origin: &Url, uri: &Uri) -> Result<Url> {
    if uri.scheme().is_some() {
        return Url::parse(&uri.to_string()).map_err(|e| Error::Config(format!("uri {uri}: {e}")));
    }
    let mut url = origin.clone();
    url.set_path(uri.path());
    url.set_query(uri.query());
    Ok(url)
}

fn strip_hop_headers(headers: &mut HeaderMap) {
    for name in [CONNECTION, TRANSFER_ENCODING, CONTENT_LENGTH, HOST] {
        headers.remove(name);
    }
}

async fn to_worker_request(origin: &Url, req: axum::extract::Request) -> Result<Request> {
    let (parts, body) = req.into_parts();
    let url = resolve_url(origin, &parts.uri)?;
    let body = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| Error::Network(format!("reading request body: {e}")))?;

    let mut headers = parts.headers;
    strip_hop_headers(&mut headers);
    Ok(Request::new(parts.method, url)
        .with_headers(headers)
        .with_body(body))
}

fn into_http_response(resp: Response) -> HttpResponse {
    let mut headers = resp.headers;
    strip_hop_headers(&mut headers);
    let mut out = HttpResponse::new(Body::from(resp.body));
    *out.status_mut() = resp.status;
    *out.headers_mut() = headers;
    out
}
