//! Client configuration

use std::env;

use url::Url;

use crate::batch::BatchStrategy;
use crate::error::{Error, Result};

/// Default store endpoint.
pub const DEFAULT_URL: &str = "http://127.0.0.1:8098";
/// Default per-request timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;
/// Default number of concurrent batch workers.
pub const DEFAULT_BATCH_CONCURRENCY: usize = 16;

/// Configuration options for the client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Store base URL (default: http://127.0.0.1:8098)
    pub url: String,
    /// Bucket every key operation is scoped to
    pub bucket: String,
    /// Request timeout in milliseconds (default: 2000)
    pub timeout_ms: u64,
    /// How batch operations are scheduled (default: 16 workers)
    pub batch: BatchStrategy,
    /// Open the connection pool at construction (default: true)
    pub auto_connect: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            bucket: "default".to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            batch: BatchStrategy::Bounded(DEFAULT_BATCH_CONCURRENCY),
            auto_connect: true,
        }
    }
}

impl ClientConfig {
    /// Config for `bucket` with every other field defaulted.
    pub fn for_bucket(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Default::default()
        }
    }

    /// Load configuration from `RIAK_*` environment variables.
    ///
    /// `RIAK_BUCKET` is required. Unparseable optional values fall back to
    /// their defaults.
    pub fn from_env() -> Result<Self> {
        let bucket = env::var("RIAK_BUCKET")
            .map_err(|_| Error::Config("RIAK_BUCKET environment variable must be set".to_string()))?;
        let url = env::var("RIAK_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
        let timeout_ms = env::var("RIAK_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .unwrap_or(DEFAULT_TIMEOUT_MS);
        let batch = env::var("RIAK_BATCH_CONCURRENCY")
            .ok()
            .and_then(|s| parse_batch_strategy(&s))
            .unwrap_or(BatchStrategy::Bounded(DEFAULT_BATCH_CONCURRENCY));
        let auto_connect = env::var("RIAK_AUTO_CONNECT")
            .ok()
            .and_then(|s| parse_bool(&s))
            .unwrap_or(true);

        let config = ClientConfig {
            url,
            bucket,
            timeout_ms,
            batch,
            auto_connect,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the URL, bucket, and timeout before building a client.
    pub fn validate(&self) -> Result<()> {
        validate_endpoint(&self.url)?;
        if self.bucket.is_empty() {
            return Err(Error::Config("bucket cannot be empty".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(Error::Config("timeout must be greater than zero".to_string()));
        }
        Ok(())
    }
}

/// Check that `url` is an absolute `http://` or `https://` URL.
pub(crate) fn validate_endpoint(url: &str) -> Result<()> {
    let parsed = Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{}: {}", url, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::InvalidUrl(format!(
            "unsupported scheme '{}' in {}",
            parsed.scheme(),
            url
        )));
    }
    Ok(())
}

/// Parse a batch concurrency setting: `sequential`, `unbounded`, or a worker count.
pub fn parse_batch_strategy(s: &str) -> Option<BatchStrategy> {
    match s.trim().to_ascii_lowercase().as_str() {
        "sequential" => Some(BatchStrategy::Sequential),
        "unbounded" => Some(BatchStrategy::Unbounded),
        n => n
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .map(BatchStrategy::Bounded),
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        env::remove_var("RIAK_URL");
        env::remove_var("RIAK_BUCKET");
        env::remove_var("RIAK_TIMEOUT_MS");
        env::remove_var("RIAK_BATCH_CONCURRENCY");
        env::remove_var("RIAK_AUTO_CONNECT");
    }

    #[test]
    fn test_parse_batch_strategy() {
        assert_eq!(parse_batch_strategy("sequential"), Some(BatchStrategy::Sequential));
        assert_eq!(parse_batch_strategy(" Unbounded "), Some(BatchStrategy::Unbounded));
        assert_eq!(parse_batch_strategy("8"), Some(BatchStrategy::Bounded(8)));
        assert_eq!(parse_batch_strategy("0"), None);
        assert_eq!(parse_batch_strategy("-3"), None);
        assert_eq!(parse_batch_strategy("lots"), None);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.url, "http://127.0.0.1:8098");
        assert_eq!(config.timeout_ms, 2000);
        assert_eq!(config.batch, BatchStrategy::Bounded(16));
        assert!(config.auto_connect);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ClientConfig::for_bucket("users");
        config.url = "ftp://127.0.0.1".to_string();
        assert!(matches!(config.validate(), Err(Error::InvalidUrl(_))));

        config.url = "not a url".to_string();
        assert!(matches!(config.validate(), Err(Error::InvalidUrl(_))));

        let mut config = ClientConfig::for_bucket("");
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        config.bucket = "users".to_string();
        config.timeout_ms = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    #[serial]
    fn test_config_from_env_default() {
        clear_env();
        env::set_var("RIAK_BUCKET", "sessions");

        let config = ClientConfig::from_env().unwrap();
        assert_eq!(config.bucket, "sessions");
        assert_eq!(config.url, DEFAULT_URL);
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(config.batch, BatchStrategy::Bounded(DEFAULT_BATCH_CONCURRENCY));
        assert!(config.auto_connect);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_config_from_env_overrides() {
        clear_env();
        env::set_var("RIAK_BUCKET", "sessions");
        env::set_var("RIAK_URL", "https://riak.internal:8098");
        env::set_var("RIAK_TIMEOUT_MS", "500");
        env::set_var("RIAK_BATCH_CONCURRENCY", "unbounded");
        env::set_var("RIAK_AUTO_CONNECT", "false");

        let config = ClientConfig::from_env().unwrap();
        assert_eq!(config.url, "https://riak.internal:8098");
        assert_eq!(config.timeout_ms, 500);
        assert_eq!(config.batch, BatchStrategy::Unbounded);
        assert!(!config.auto_connect);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_config_invalid_optional_values_fall_back() {
        clear_env();
        env::set_var("RIAK_BUCKET", "sessions");
        env::set_var("RIAK_TIMEOUT_MS", "soon");
        env::set_var("RIAK_BATCH_CONCURRENCY", "0");
        env::set_var("RIAK_AUTO_CONNECT", "perhaps");

        let config = ClientConfig::from_env().unwrap();
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(config.batch, BatchStrategy::Bounded(DEFAULT_BATCH_CONCURRENCY));
        assert!(config.auto_connect);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_config_missing_bucket() {
        clear_env();

        let result = ClientConfig::from_env();
        match result {
            Err(Error::Config(msg)) => assert!(msg.contains("RIAK_BUCKET")),
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_url_from_env() {
        clear_env();
        env::set_var("RIAK_BUCKET", "sessions");
        env::set_var("RIAK_URL", "riak-without-scheme");

        assert!(matches!(ClientConfig::from_env(), Err(Error::InvalidUrl(_))));

        clear_env();
    }
}
