//! Key-value client for the Riak HTTP API

use std::sync::{Arc, PoisonError, RwLock};

use bytes::Bytes;
use http::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::batch::{BatchExecutor, BatchOutcome, BatchStrategy};
use crate::codec::{CodecRegistry, APPLICATION_JSON, TEXT_PLAIN};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::transport::{
    counter_path, key_path, keys_path, props_path, HyperPool, Transport, TransportRequest,
    TransportResponse,
};

struct ClientInner {
    bucket: String,
    transport: Arc<dyn Transport>,
    codecs: RwLock<CodecRegistry>,
}

/// Client for one bucket of a Riak store
///
/// Every call issues exactly one request. Statuses the store uses to carry
/// values, including the 300/304 sibling and not-modified responses, are
/// treated as success; 400, 409, 412 and 503 become typed errors; anything
/// else degrades to `None` / `false`.
///
/// Cloning is cheap and clones share the transport and codec registry.
///
/// # Example
/// ```rust,no_run
/// use riak_cache::Client;
///
/// #[tokio::main]
/// async fn main() -> Result<(), riak_cache::Error> {
///     let client = Client::new("sessions")?;
///
///     client.set("user:1", "logged-in").await?;
///     if let Some(value) = client.get("user:1").await? {
///         println!("user:1 = {}", value);
///     }
///
///     let found = client.get_many(["user:1", "user:2"]).await;
///     println!("{} of 2 keys present", found.len());
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
    executor: BatchExecutor,
}

impl Client {
    /// Create a client for `bucket` against the default local endpoint
    ///
    /// # Errors
    /// Returns an error if the bucket name is empty
    pub fn new(bucket: &str) -> Result<Self> {
        Self::with_config(ClientConfig::for_bucket(bucket))
    }

    /// Create a client with custom configuration, backed by a [`HyperPool`]
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let pool = if config.auto_connect {
            HyperPool::connected(&config.url, config.timeout_ms)?
        } else {
            HyperPool::new(&config.url, config.timeout_ms)?
        };
        Ok(Self::with_transport(config.bucket, Arc::new(pool)).with_batch_strategy(config.batch))
    }

    /// Create a client over any transport
    pub fn with_transport(bucket: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                bucket: bucket.into(),
                transport,
                codecs: RwLock::new(CodecRegistry::new()),
            }),
            executor: BatchExecutor::default(),
        }
    }

    /// Use `strategy` for batch operations on this handle
    pub fn with_batch_strategy(mut self, strategy: BatchStrategy) -> Self {
        self.executor = BatchExecutor::new(strategy);
        self
    }

    /// The bucket this client is scoped to
    pub fn bucket(&self) -> &str {
        &self.inner.bucket
    }

    /// The store base URL, without a trailing slash
    pub fn base_url(&self) -> &str {
        self.inner.transport.base_url()
    }

    /// The batch scheduling strategy
    pub fn batch_strategy(&self) -> BatchStrategy {
        self.executor.strategy()
    }

    /// Open the transport's connections if they are not already open
    pub async fn connect(&self) -> Result<()> {
        self.inner.transport.connect().await
    }

    /// Release the transport's connections
    pub async fn close(&self) {
        self.inner.transport.close().await
    }

    // ===== Codec registry =====

    /// Register an encoder/decoder pair for a content type
    pub fn register_codec<E, D>(&self, content_type: &str, encode: E, decode: D)
    where
        E: Fn(&Value) -> Result<Bytes> + Send + Sync + 'static,
        D: Fn(&[u8]) -> Result<Value> + Send + Sync + 'static,
    {
        self.codecs_mut().register(content_type, encode, decode);
    }

    /// Register an encoder for a content type
    pub fn register_encoder<E>(&self, content_type: &str, encode: E)
    where
        E: Fn(&Value) -> Result<Bytes> + Send + Sync + 'static,
    {
        self.codecs_mut().register_encoder(content_type, encode);
    }

    /// Register a decoder for a content type
    pub fn register_decoder<D>(&self, content_type: &str, decode: D)
    where
        D: Fn(&[u8]) -> Result<Value> + Send + Sync + 'static,
    {
        self.codecs_mut().register_decoder(content_type, decode);
    }

    /// Encode a value with this client's registry
    pub fn encode(&self, value: &Value, content_type: &str) -> Result<Bytes> {
        self.inner
            .codecs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .encode(value, content_type)
    }

    /// Decode a payload with this client's registry
    pub fn decode(&self, data: &[u8], content_type: &str) -> Result<Value> {
        self.inner
            .codecs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .decode(data, content_type)
    }

    fn codecs_mut(&self) -> std::sync::RwLockWriteGuard<'_, CodecRegistry> {
        self.inner
            .codecs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        self.inner.transport.request(request).await
    }

    // ===== Single-key operations =====

    /// Retrieve a value by key
    ///
    /// # Returns
    /// The value decoded by the response's content type (`text/plain` when
    /// the store omits it), or None if the store did not return one
    ///
    /// # Errors
    /// [`Error::BadRequest`] on 400, [`Error::ServiceUnavailable`] on 503
    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.fetch(key_path(self.bucket(), key)).await
    }

    /// Retrieve the raw value of a counter
    pub async fn get_counter(&self, key: &str) -> Result<Option<Value>> {
        self.fetch(counter_path(self.bucket(), key)).await
    }

    /// Retrieve a counter as an integer
    pub async fn counter(&self, key: &str) -> Result<Option<i64>> {
        match self.get_counter(key).await? {
            Some(value) => parse_counter(&value).map(Some),
            None => Ok(None),
        }
    }

    /// Retrieve a value and deserialize it into `T`
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn fetch(&self, path: String) -> Result<Option<Value>> {
        let response = self.send(TransportRequest::new(Method::GET, path)).await?;
        match response.status.as_u16() {
            400 => Err(Error::BadRequest(response.body_text())),
            503 => Err(Error::ServiceUnavailable(response.body_text())),
            200 | 300 | 304 => {
                let content_type = response.content_type().unwrap_or(TEXT_PLAIN);
                Ok(Some(self.decode(&response.body, content_type)?))
            }
            status => {
                debug!("No value returned (status {})", status);
                Ok(None)
            }
        }
    }

    /// Store a value as `text/plain`
    ///
    /// # Returns
    /// true if the store accepted the write
    ///
    /// # Errors
    /// [`Error::BadRequest`] on 400, [`Error::PreconditionFailed`] on 412
    pub async fn set(&self, key: &str, value: impl Into<Value>) -> Result<bool> {
        self.set_with_content_type(key, value, TEXT_PLAIN).await
    }

    /// Store a value encoded for `content_type`
    ///
    /// Nothing is sent if `content_type` is not a valid header value or the
    /// encoder fails.
    pub async fn set_with_content_type(
        &self,
        key: &str,
        value: impl Into<Value>,
        content_type: &str,
    ) -> Result<bool> {
        let request = TransportRequest::new(Method::POST, key_path(self.bucket(), key))
            .with_content_type(content_type)?;
        let body = self.encode(&value.into(), content_type)?;
        let response = self.send(request.with_body(body)).await?;
        match response.status.as_u16() {
            400 => Err(Error::BadRequest(response.body_text())),
            412 => Err(Error::PreconditionFailed(response.body_text())),
            status => Ok(matches!(status, 200 | 201 | 204 | 300)),
        }
    }

    /// Serialize `value` and store it as `application/json`
    pub async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<bool> {
        let value = serde_json::to_value(value)?;
        self.set_with_content_type(key, value, APPLICATION_JSON).await
    }

    /// Delete a key
    ///
    /// # Returns
    /// true if the key is gone, including when it never existed
    ///
    /// # Errors
    /// [`Error::BadRequest`] on 400
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let request = TransportRequest::new(Method::DELETE, key_path(self.bucket(), key));
        let response = self.send(request).await?;
        match response.status.as_u16() {
            400 => Err(Error::BadRequest(response.body_text())),
            status => Ok(matches!(status, 204 | 404)),
        }
    }

    /// Add `delta` to a counter
    ///
    /// # Errors
    /// [`Error::Conflict`] on 409, [`Error::BadRequest`] on 400
    pub async fn incr(&self, key: &str, delta: i64) -> Result<bool> {
        let request = TransportRequest::new(Method::POST, counter_path(self.bucket(), key))
            .with_body(delta.to_string());
        let response = self.send(request).await?;
        match response.status.as_u16() {
            409 => Err(Error::Conflict(response.body_text())),
            400 => Err(Error::BadRequest(response.body_text())),
            status => Ok(matches!(status, 200 | 201 | 204 | 300)),
        }
    }

    // ===== Bucket and node operations =====

    /// List every key in the bucket
    ///
    /// Accepts either a bare JSON array or the store's `{"keys": [...]}` body.
    pub async fn keys(&self) -> Result<Option<Vec<String>>> {
        let response = self
            .send(TransportRequest::new(Method::GET, keys_path(self.bucket())))
            .await?;
        if response.status.as_u16() != 200 {
            return Ok(None);
        }
        let listing = self.decode(&response.body, APPLICATION_JSON)?;
        parse_keys(listing).map(Some)
    }

    /// Fetch the bucket properties
    pub async fn props(&self) -> Result<Option<Value>> {
        let response = self
            .send(TransportRequest::new(Method::GET, props_path(self.bucket())))
            .await?;
        if response.status.as_u16() != 200 {
            return Ok(None);
        }
        Ok(Some(self.decode(&response.body, APPLICATION_JSON)?))
    }

    /// Replace the bucket properties
    pub async fn set_props(&self, props: &Value) -> Result<bool> {
        let body = self.encode(props, APPLICATION_JSON)?;
        let request = TransportRequest::new(Method::PUT, props_path(self.bucket()))
            .with_body(body)
            .with_content_type(APPLICATION_JSON)?;
        let response = self.send(request).await?;
        Ok(response.status.as_u16() == 200)
    }

    /// Check that the store answers `/ping`
    pub async fn ping(&self) -> Result<bool> {
        let response = self.send(TransportRequest::new(Method::GET, "/ping")).await?;
        Ok(response.status.as_u16() == 200)
    }

    /// Fetch node statistics
    pub async fn stats(&self) -> Result<Option<Value>> {
        let response = self.send(TransportRequest::new(Method::GET, "/stats")).await?;
        if response.status.as_u16() != 200 {
            return Ok(None);
        }
        Ok(Some(self.decode(&response.body, APPLICATION_JSON)?))
    }

    // ===== Batch operations =====

    /// Retrieve many keys concurrently
    ///
    /// Absent keys land in [`BatchOutcome::missing`], failed ones in
    /// [`BatchOutcome::errors`].
    pub async fn get_many<I, K>(&self, keys: I) -> BatchOutcome<Value>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let jobs = keys.into_iter().map(|k| (k.into(), ())).collect();
        let client = self.clone();
        self.executor
            .run(jobs, move |key, ()| {
                let client = client.clone();
                async move { client.get(&key).await }
            })
            .await
    }

    /// Store many values concurrently as `text/plain`
    ///
    /// Each key maps to whether its write was accepted.
    pub async fn set_many<I, K, V>(&self, values: I) -> BatchOutcome<bool>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let jobs = values
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let client = self.clone();
        self.executor
            .run(jobs, move |key, value: Value| {
                let client = client.clone();
                async move { client.set(&key, value).await.map(Some) }
            })
            .await
    }

    /// Delete many keys concurrently
    pub async fn delete_many<I, K>(&self, keys: I) -> BatchOutcome<bool>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let jobs = keys.into_iter().map(|k| (k.into(), ())).collect();
        let client = self.clone();
        self.executor
            .run(jobs, move |key, ()| {
                let client = client.clone();
                async move { client.delete(&key).await.map(Some) }
            })
            .await
    }

    /// Increment many counters concurrently
    pub async fn incr_many<I, K>(&self, deltas: I) -> BatchOutcome<bool>
    where
        I: IntoIterator<Item = (K, i64)>,
        K: Into<String>,
    {
        let jobs = deltas.into_iter().map(|(k, d)| (k.into(), d)).collect();
        let client = self.clone();
        self.executor
            .run(jobs, move |key, delta| {
                let client = client.clone();
                async move { client.incr(&key, delta).await.map(Some) }
            })
            .await
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url())
            .field("bucket", &self.bucket())
            .field("batch", &self.batch_strategy())
            .finish()
    }
}

fn parse_counter(value: &Value) -> Result<i64> {
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| Error::codec(TEXT_PLAIN, format!("counter value is not an integer: {}", value)))
}

fn parse_keys(listing: Value) -> Result<Vec<String>> {
    let items = match listing {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("keys") {
            Some(Value::Array(items)) => items,
            _ => return Err(Error::codec(APPLICATION_JSON, "key listing has no 'keys' array")),
        },
        other => {
            return Err(Error::codec(
                APPLICATION_JSON,
                format!("unexpected key listing: {}", other),
            ))
        }
    };
    Ok(items
        .into_iter()
        .map(|item| match item {
            Value::String(s) => s,
            other => other.to_string(),
        })
        .collect())
}
