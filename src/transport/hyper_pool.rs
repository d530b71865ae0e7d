//! Pooled HTTP/1.1 transport built on hyper

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HttpClient;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, info};

use crate::config::validate_endpoint;
use crate::error::{Error, Result};
use crate::transport::{Transport, TransportRequest, TransportResponse};

type HttpsConnector = hyper_rustls::HttpsConnector<HttpConnector>;
type PooledClient = HttpClient<HttpsConnector, Full<Bytes>>;

/// Build a rustls ClientConfig with the webpki root store.
fn build_tls_config() -> Result<rustls::ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    Ok(rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Config(format!("TLS configuration error: {}", e)))?
        .with_root_certificates(roots)
        .with_no_client_auth())
}

fn build_client() -> Result<PooledClient> {
    let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
        .with_tls_config(build_tls_config()?)
        .https_or_http()
        .enable_http1()
        .build();

    // The legacy client never follows redirects; 3xx reach the caller as-is.
    Ok(HttpClient::builder(TokioExecutor::new()).build(https_connector))
}

/// Connection pool for one store endpoint.
///
/// Plain `http://` and `https://` endpoints are both supported. The inner
/// hyper client is cheap to clone, so concurrent requests only hold the
/// mutex long enough to take a handle.
///
/// # Example
///
/// ```
/// use riak_cache::transport::HyperPool;
/// let pool = HyperPool::new("http://127.0.0.1:8098/", 2000).unwrap();
/// assert_eq!(riak_cache::transport::Transport::base_url(&pool), "http://127.0.0.1:8098");
/// ```
pub struct HyperPool {
    base_url: String,
    timeout_ms: u64,
    client: Mutex<Option<PooledClient>>,
}

impl HyperPool {
    /// Create a pool for `base_url` without connecting.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the timeout is zero
    pub fn new(base_url: &str, timeout_ms: u64) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        validate_endpoint(&base_url)?;
        let _: Uri = base_url
            .parse()
            .map_err(|e| Error::InvalidUrl(format!("Invalid endpoint URL: {}", e)))?;

        if timeout_ms == 0 {
            return Err(Error::Config("timeout must be greater than zero".to_string()));
        }

        Ok(Self {
            base_url,
            timeout_ms,
            client: Mutex::new(None),
        })
    }

    /// Create a pool and connect it immediately.
    pub fn connected(base_url: &str, timeout_ms: u64) -> Result<Self> {
        let pool = Self::new(base_url, timeout_ms)?;
        pool.ensure_connected()?;
        Ok(pool)
    }

    /// Per-request timeout in milliseconds.
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    /// True between `connect()` and `close()`.
    pub fn is_connected(&self) -> bool {
        self.client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn ensure_connected(&self) -> Result<()> {
        let mut slot = self.client.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(build_client()?);
            info!("Connection pool opened for {}", self.base_url);
        }
        Ok(())
    }

    fn handle(&self) -> Result<PooledClient> {
        self.client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| Error::Connection(format!("pool for {} is not connected", self.base_url)))
    }
}

#[async_trait]
impl Transport for HyperPool {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn connect(&self) -> Result<()> {
        self.ensure_connected()
    }

    async fn close(&self) {
        let previous = self
            .client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if previous.is_some() {
            info!("Connection pool closed for {}", self.base_url);
        }
    }

    async fn request(&self, request: TransportRequest) -> Result<TransportResponse> {
        let client = self.handle()?;

        let url = format!("{}{}", self.base_url, request.path);
        let uri: Uri = url
            .parse()
            .map_err(|e| Error::InvalidUrl(format!("Invalid request URL: {}", e)))?;

        let mut builder = Request::builder().method(request.method.clone()).uri(uri);
        if let Some(headers) = builder.headers_mut() {
            headers.extend(request.headers);
        }
        let req = builder
            .body(Full::new(request.body.unwrap_or_default()))
            .map_err(|e| Error::Internal(format!("Failed to build request: {}", e)))?;

        debug!("Sending request: {} {}", request.method, request.path);

        // The timeout covers reading the body as well as the response head.
        let timeout = Duration::from_millis(self.timeout_ms);
        let exchange = async {
            let response = client
                .request(req)
                .await
                .map_err(|e| Error::Connection(format!("Request failed: {}", e)))?;
            let (parts, body) = response.into_parts();
            let collected = body
                .collect()
                .await
                .map_err(|e| Error::Connection(format!("Failed to read body: {}", e)))?;
            Ok::<_, Error>(TransportResponse {
                status: parts.status,
                body: collected.to_bytes(),
                headers: parts.headers,
            })
        };

        let response = tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| Error::Timeout(self.timeout_ms))??;

        debug!(
            "Received {} for {} {}",
            response.status, request.method, request.path
        );
        Ok(response)
    }
}
