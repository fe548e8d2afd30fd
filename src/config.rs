use std::time::Duration;

use anyhow::Context;

#[derive(Clone, Debug)]
pub struct Config {
    pub base_url: String,
    pub http_timeout: Duration,
    pub cache_ttl: Duration,
    pub schema_ttl: Duration,
    pub notify_ttl: Duration,
    pub read_retries: u32,
    pub session_file: Option<String>,
}

impl Config {
    /// Defaults suitable for embedding and tests; only the endpoint varies.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http_timeout: Duration::from_millis(10_000),
            cache_ttl: Duration::from_millis(30_000),
            schema_ttl: Duration::from_millis(300_000),
            notify_ttl: Duration::from_millis(5_000),
            read_retries: 2,
            session_file: None,
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let base_url =
            std::env::var("AUTOMART_API_BASE_URL").context("AUTOMART_API_BASE_URL must be set")?;
        let http_timeout_ms: u64 = std::env::var("AUTOMART_HTTP_TIMEOUT_MS")
            .unwrap_or_else(|_| "10000".into())
            .parse()
            .context("AUTOMART_HTTP_TIMEOUT_MS must be a number")?;
        let cache_ttl_ms: u64 = std::env::var("AUTOMART_CACHE_TTL_MS")
            .unwrap_or_else(|_| "30000".into())
            .parse()
            .context("AUTOMART_CACHE_TTL_MS must be a number")?;
        let schema_ttl_ms: u64 = std::env::var("AUTOMART_SCHEMA_TTL_MS")
            .unwrap_or_else(|_| "300000".into())
            .parse()
            .context("AUTOMART_SCHEMA_TTL_MS must be a number")?;
        let notify_ttl_ms: u64 = std::env::var("AUTOMART_NOTIFY_TTL_MS")
            .unwrap_or_else(|_| "5000".into())
            .parse()
            .context("AUTOMART_NOTIFY_TTL_MS must be a number")?;
        let read_retries: u32 = std::env::var("AUTOMART_READ_RETRIES")
            .unwrap_or_else(|_| "2".into())
            .parse()
            .context("AUTOMART_READ_RETRIES must be a number")?;
        let session_file = std::env::var("AUTOMART_SESSION_FILE").ok();

        Ok(Self {
            base_url,
            http_timeout: Duration::from_millis(http_timeout_ms),
            cache_ttl: Duration::from_millis(cache_ttl_ms),
            schema_ttl: Duration::from_millis(schema_ttl_ms),
            notify_ttl: Duration::from_millis(notify_ttl_ms),
            read_retries,
            session_file,
        })
    }
}
