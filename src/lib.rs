//! An async client for the Riak HTTP key-value API
//!
//! This library provides a cache-style client scoped to one Riak bucket:
//! plain reads and writes, counters, bucket metadata, node health, and
//! concurrent batch operations over a pooled HTTP/1.1 transport.
//!
//! # Features
//! - Connection pooling over plain HTTP or TLS (rustls)
//! - Pluggable encoders and decoders keyed by content type
//! - Counters with integer parsing
//! - Batch gets, writes, deletes, and increments with per-key outcomes
//! - Bounded batch concurrency
//! - Built-in timeout support
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use riak_cache::{Client, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), riak_cache::Error> {
//!     let client = Client::with_config(ClientConfig {
//!         url: "http://127.0.0.1:8098".to_string(),
//!         ..ClientConfig::for_bucket("sessions")
//!     })?;
//!
//!     // Store a value
//!     client.set("my-key", "Hello, World!").await?;
//!
//!     // Retrieve it
//!     let value = client.get("my-key").await?;
//!     println!("Retrieved: {:?}", value);
//!
//!     // Counters
//!     client.incr("visits", 1).await?;
//!     println!("Visits: {:?}", client.counter("visits").await?);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs, rust_2018_idioms)]

pub mod batch;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod transport;

pub use batch::{BatchExecutor, BatchOutcome, BatchStrategy};
pub use client::Client;
pub use codec::CodecRegistry;
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use serde_json::Value;
pub use transport::{HyperPool, Transport};
