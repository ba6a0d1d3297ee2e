//! Configuration management for the attribution engine
//!
//! Loads configuration from environment variables with sensible defaults.

use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Redis connection URL
    pub redis_url: String,

    /// How long an advisory asset lock lives if it is never released
    pub lock_ttl: Duration,

    /// How long an operation waits for a busy asset before giving up
    pub lock_wait: Duration,

    /// Pause between lock attempts
    pub lock_retry: Duration,

    /// Page size used when a listing does not ask for one
    pub default_page_size: u32,

    /// Largest page size a listing may ask for
    pub max_page_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            lock_ttl: Duration::from_millis(5000),
            lock_wait: Duration::from_millis(2000),
            lock_retry: Duration::from_millis(25),
            default_page_size: 10,
            max_page_size: 100,
        }
    }
}

fn millis(name: &str, default: u64) -> Result<Duration> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    let ms: u64 = raw
        .trim()
        .parse()
        .with_context(|| format!("Invalid {}", name))?;
    Ok(Duration::from_millis(ms))
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (for local development)
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        let config = Config {
            redis_url: env::var("REDIS_URL").unwrap_or(defaults.redis_url),

            lock_ttl: millis("LOCK_TTL_MS", 5000)?,
            lock_wait: millis("LOCK_WAIT_MS", 2000)?,
            lock_retry: millis("LOCK_RETRY_MS", 25)?,

            default_page_size: env::var("DEFAULT_PAGE_SIZE")
                .unwrap_or_else(|_| defaults.default_page_size.to_string())
                .parse()
                .context("Invalid DEFAULT_PAGE_SIZE")?,

            max_page_size: env::var("MAX_PAGE_SIZE")
                .unwrap_or_else(|_| defaults.max_page_size.to_string())
                .parse()
                .context("Invalid MAX_PAGE_SIZE")?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.lock_ttl.is_zero() {
            anyhow::bail!("LOCK_TTL_MS must be greater than 0");
        }

        if self.lock_retry.is_zero() {
            anyhow::bail!("LOCK_RETRY_MS must be greater than 0");
        }

        if self.default_page_size == 0 || self.max_page_size == 0 {
            anyhow::bail!("Page sizes must be greater than 0");
        }

        if self.default_page_size > self.max_page_size {
            anyhow::bail!(
                "DEFAULT_PAGE_SIZE ({}) exceeds MAX_PAGE_SIZE ({})",
                self.default_page_size,
                self.max_page_size
            );
        }

        Ok(())
    }
}
