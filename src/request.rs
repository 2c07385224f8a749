//! Request and response values passed between the router, caches, and network.

use bytes::Bytes;
use reqwest::header::{HeaderMap, RANGE};
use reqwest::{Method, StatusCode, Url};

/// An outgoing request seen by the worker.
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method.
    pub method: Method,
    /// Absolute request URL.
    pub url: Url,
    /// Request headers forwarded to the network.
    pub headers: HeaderMap,
    /// Request body; empty for GET.
    pub body: Bytes,
}

impl Request {
    /// Creates a request with no headers.
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Creates a GET request.
    #[must_use]
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Sets the request headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the key this request is stored under in a cache.
    ///
    /// The fragment never reaches the network, so it is not part of the key.
    /// Request headers are not part of it either: `Vary` is ignored, so a
    /// response negotiated for one client (for example a gzip body sent to a
    /// client that advertised `Accept-Encoding`) is replayed as-is to any
    /// later client asking for the same URL.
    #[must_use]
    pub fn cache_key(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        url.into()
    }
}

/// A response from the network or a cache.
///
/// The body is reference counted, so cloning a response to store it leaves
/// the original intact for the caller.
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Bytes,
}

impl Response {
    /// Creates a response with no headers.
    #[must_use]
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Sets the response headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Returns true for a 2xx status.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status.is_success()
    }

    /// Returns true if this response may be stored as the full resource for
    /// `request`: a 2xx status that is not `206 Partial Content`, answering
    /// a request without a `Range` header.
    #[must_use]
    pub fn is_storable_for(&self, request: &Request) -> bool {
        self.is_ok()
            && self.status != StatusCode::PARTIAL_CONTENT
            && !request.headers.contains_key(RANGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_drops_fragment() {
        let req = Request::get(Url::parse("http://a.test/page/?q=1#section").unwrap());
        assert_eq!(req.cache_key(), "http://a.test/page/?q=1");
    }

    #[test]
    fn cache_key_keeps_query() {
        let a = Request::get(Url::parse("http://a.test/static/app.js?v=1").unwrap());
        let b = Request::get(Url::parse("http://a.test/static/app.js?v=2").unwrap());
        assert_ne!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn cache_key_ignores_request_headers() {
        let url = Url::parse("http://a.test/static/app.js").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("accept-encoding", "gzip".parse().unwrap());
        let negotiated = Request::get(url.clone()).with_headers(headers);
        assert_eq!(negotiated.cache_key(), Request::get(url).cache_key());
    }

    #[test]
    fn ok_statuses() {
        assert!(Response::new(StatusCode::OK, "").is_ok());
        assert!(Response::new(StatusCode::NO_CONTENT, "").is_ok());
        assert!(!Response::new(StatusCode::NOT_MODIFIED, "").is_ok());
        assert!(!Response::new(StatusCode::NOT_FOUND, "").is_ok());
        assert!(!Response::new(StatusCode::BAD_GATEWAY, "").is_ok());
    }

    #[test]
    fn partial_content_is_not_storable() {
        let req = Request::get(Url::parse("http://a.test/media/clip.mp4").unwrap());
        assert!(Response::new(StatusCode::OK, "full").is_storable_for(&req));
        assert!(!Response::new(StatusCode::PARTIAL_CONTENT, "fu").is_storable_for(&req));
        assert!(!Response::new(StatusCode::NOT_FOUND, "").is_storable_for(&req));
    }

    #[test]
    fn ranged_request_is_not_storable() {
        let mut headers = HeaderMap::new();
        headers.insert(RANGE, "bytes=0-1".parse().unwrap());
        let req = Request::get(Url::parse("http://a.test/media/clip.mp4").unwrap())
            .with_headers(headers);
        assert!(!Response::new(StatusCode::OK, "full").is_storable_for(&req));
    }

    #[test]
    fn cloned_response_shares_body() {
        let resp = Response::new(StatusCode::OK, "hello");
        let copy = resp.clone();
        assert_eq!(resp.body, copy.body);
        assert_eq!(resp.body.as_ptr(), copy.body.as_ptr());
    }
}
