//! Content-type keyed serialization registry
//!
//! Values travel as [`serde_json::Value`]. Each content type maps to an
//! encoder and a decoder; types without one fall back to a plain string
//! coercion so unknown payloads still round-trip as text.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;

use crate::error::{Error, Result};

/// Default content type for writes.
pub const TEXT_PLAIN: &str = "text/plain";
/// Content type used for bucket properties, key listings, and stats.
pub const APPLICATION_JSON: &str = "application/json";

type EncodeFn = dyn Fn(&Value) -> Result<Bytes> + Send + Sync;
type DecodeFn = dyn Fn(&[u8]) -> Result<Value> + Send + Sync;

#[derive(Clone, Default)]
struct Codec {
    encode: Option<Arc<EncodeFn>>,
    decode: Option<Arc<DecodeFn>>,
}

/// Lowercases a content type and strips media-type parameters.
///
/// `"Application/JSON; charset=UTF-8"` becomes `"application/json"`.
pub fn normalize_content_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Registry of encoders and decoders keyed by content type.
///
/// Owned by a single client; two clients never share one.
pub struct CodecRegistry {
    codecs: HashMap<String, Codec>,
}

impl CodecRegistry {
    /// Creates a registry with only `application/json` registered.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(
            APPLICATION_JSON,
            |value| Ok(Bytes::from(serde_json::to_vec(value)?)),
            |data| Ok(serde_json::from_slice(data)?),
        );
        registry
    }

    /// Creates a registry where every content type uses the string fallback.
    pub fn empty() -> Self {
        Self {
            codecs: HashMap::new(),
        }
    }

    /// Registers an encoder/decoder pair, replacing any existing one.
    pub fn register<E, D>(&mut self, content_type: &str, encode: E, decode: D)
    where
        E: Fn(&Value) -> Result<Bytes> + Send + Sync + 'static,
        D: Fn(&[u8]) -> Result<Value> + Send + Sync + 'static,
    {
        self.codecs.insert(
            normalize_content_type(content_type),
            Codec {
                encode: Some(Arc::new(encode)),
                decode: Some(Arc::new(decode)),
            },
        );
    }

    /// Registers only the encoding half for a content type.
    pub fn register_encoder<E>(&mut self, content_type: &str, encode: E)
    where
        E: Fn(&Value) -> Result<Bytes> + Send + Sync + 'static,
    {
        self.codecs
            .entry(normalize_content_type(content_type))
            .or_default()
            .encode = Some(Arc::new(encode));
    }

    /// Registers only the decoding half for a content type.
    pub fn register_decoder<D>(&mut self, content_type: &str, decode: D)
    where
        D: Fn(&[u8]) -> Result<Value> + Send + Sync + 'static,
    {
        self.codecs
            .entry(normalize_content_type(content_type))
            .or_default()
            .decode = Some(Arc::new(decode));
    }

    /// Returns true if an encoder or decoder is registered for the type.
    pub fn contains(&self, content_type: &str) -> bool {
        self.codecs.contains_key(&normalize_content_type(content_type))
    }

    /// Registered content types, sorted.
    pub fn content_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.codecs.keys().cloned().collect();
        types.sort();
        types
    }

    /// Encodes a value for transmission under `content_type`.
    pub fn encode(&self, value: &Value, content_type: &str) -> Result<Bytes> {
        let content_type = normalize_content_type(content_type);
        match self.codecs.get(&content_type).and_then(|c| c.encode.as_ref()) {
            Some(encode) => encode(value).map_err(|e| wrap(&content_type, e)),
            None => Ok(encode_fallback(value)),
        }
    }

    /// Decodes a payload received with `content_type`.
    pub fn decode(&self, data: &[u8], content_type: &str) -> Result<Value> {
        let content_type = normalize_content_type(content_type);
        match self.codecs.get(&content_type).and_then(|c| c.decode.as_ref()) {
            Some(decode) => decode(data).map_err(|e| wrap(&content_type, e)),
            None => Ok(decode_fallback(data)),
        }
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("content_types", &self.content_types())
            .finish()
    }
}

// Strings go out verbatim; anything else as its JSON text.
fn encode_fallback(value: &Value) -> Bytes {
    match value {
        Value::String(s) => Bytes::copy_from_slice(s.as_bytes()),
        other => Bytes::from(other.to_string()),
    }
}

fn decode_fallback(data: &[u8]) -> Value {
    Value::String(String::from_utf8_lossy(data).into_owned())
}

fn wrap(content_type: &str, err: Error) -> Error {
    match err {
        Error::Codec { .. } => err,
        other => Error::codec(content_type, other.to_string()),
    }
}
