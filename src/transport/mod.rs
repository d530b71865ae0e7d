//! Transport abstraction between the client and the store's REST API
//!
//! A [`Transport`] executes exactly one HTTP request against a fixed base
//! URL. Every status, including 3xx/4xx/5xx, comes back as a normal
//! [`TransportResponse`]; only timeouts and connection faults are errors.

pub mod hyper_pool;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::error::{Error, Result};

pub use hyper_pool::HyperPool;

/// Characters allowed unencoded in URI path segments per RFC 3986.
/// `/` is encoded too, since bucket and key names are single segments.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'!')
    .remove(b'$')
    .remove(b'&')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b'+')
    .remove(b',')
    .remove(b';')
    .remove(b'=')
    .remove(b':')
    .remove(b'@');

/// Percent-encode a bucket or key for use as one path segment.
pub fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

/// `/buckets/{bucket}/keys/{key}`
pub fn key_path(bucket: &str, key: &str) -> String {
    format!("/buckets/{}/keys/{}", encode_segment(bucket), encode_segment(key))
}

/// `/buckets/{bucket}/counters/{key}`
pub fn counter_path(bucket: &str, key: &str) -> String {
    format!(
        "/buckets/{}/counters/{}",
        encode_segment(bucket),
        encode_segment(key)
    )
}

/// `/buckets/{bucket}/keys?keys=true`
pub fn keys_path(bucket: &str) -> String {
    format!("/buckets/{}/keys?keys=true", encode_segment(bucket))
}

/// `/buckets/{bucket}/props`
pub fn props_path(bucket: &str) -> String {
    format!("/buckets/{}/props", encode_segment(bucket))
}

/// A single request handed to a [`Transport`].
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// HTTP method
    pub method: Method,
    /// Path and query relative to the transport's base URL
    pub path: String,
    /// Optional request body
    pub body: Option<Bytes>,
    /// Request headers
    pub headers: HeaderMap,
}

impl TransportRequest {
    /// Creates a request with no body and no headers.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: HeaderMap::new(),
        }
    }

    /// Attaches a body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets the `Content-Type` header.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if `content_type` is not a valid header value
    pub fn with_content_type(mut self, content_type: &str) -> Result<Self> {
        let value = HeaderValue::from_str(content_type).map_err(|e| {
            Error::Config(format!("invalid content type {:?}: {}", content_type, e))
        })?;
        self.headers.insert(http::header::CONTENT_TYPE, value);
        Ok(self)
    }
}

/// The status, body, and headers of a completed request.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// HTTP status code, never rewritten by the transport
    pub status: StatusCode,
    /// Fully buffered response body
    pub body: Bytes,
    /// Response headers
    pub headers: HeaderMap,
}

impl TransportResponse {
    /// Creates a response with an empty header map.
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
            headers: HeaderMap::new(),
        }
    }

    /// Value of the `Content-Type` header, if present and valid ASCII.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    /// Response body as lossy UTF-8, used for error messages.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Issues requests against one base endpoint.
///
/// Implementations must be safe to share across concurrently running batch
/// units. Redirects must never be followed.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Base URL without a trailing slash.
    fn base_url(&self) -> &str;

    /// Establishes reusable connections. Calling it twice is a no-op.
    async fn connect(&self) -> Result<()>;

    /// Releases pooled connections. Later requests fail until reconnected.
    async fn close(&self);

    /// Executes one request.
    ///
    /// # Errors
    /// [`Error::Timeout`](crate::Error::Timeout) when the request exceeds the
    /// configured timeout, [`Error::Connection`](crate::Error::Connection) for
    /// any lower-level fault.
    async fn request(&self, request: TransportRequest) -> Result<TransportResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        assert_eq!(key_path("users", "alice"), "/buckets/users/keys/alice");
        assert_eq!(counter_path("users", "visits"), "/buckets/users/counters/visits");
        assert_eq!(keys_path("users"), "/buckets/users/keys?keys=true");
        assert_eq!(props_path("users"), "/buckets/users/props");
    }

    #[test]
    fn test_segments_are_percent_encoded() {
        assert_eq!(encode_segment("plain-key_1.2~x"), "plain-key_1.2~x");
        assert_eq!(encode_segment("key with spaces"), "key%20with%20spaces");
        assert_eq!(encode_segment("a/b"), "a%2Fb");
        assert_eq!(encode_segment("q?x#y"), "q%3Fx%23y");
        assert_eq!(encode_segment("user:1"), "user:1");
        assert_eq!(key_path("b", "ключ"), "/buckets/b/keys/%D0%BA%D0%BB%D1%8E%D1%87");
    }

    #[test]
    fn test_request_builders() {
        let req = TransportRequest::new(Method::POST, "/buckets/b/keys/k")
            .with_body("value")
            .with_content_type("application/json")
            .unwrap();
        assert_eq!(req.method, Method::POST);
        assert_eq!(req.body.as_deref(), Some(&b"value"[..]));
        assert_eq!(req.headers.get("content-type").unwrap(), "application/json");

        let result = TransportRequest::new(Method::GET, "/ping").with_content_type("bad\nvalue");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_response_content_type() {
        let mut response = TransportResponse::new(StatusCode::OK, "data");
        assert_eq!(response.content_type(), None);
        let name = http::HeaderName::from_bytes(b"Content-Type").unwrap();
        response
            .headers
            .insert(name, HeaderValue::from_static("text/plain"));
        assert_eq!(response.content_type(), Some("text/plain"));
        assert_eq!(response.body_text(), "data");
    }
}
