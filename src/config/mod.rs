use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::DEFAULT_MAX_CACHE_BYTES;
use crate::fetch::retry::{RetryPolicy, DEFAULT_MAX_RETRIES};
use crate::fetch::strategy::DEFAULT_LANGUAGE;
use crate::identity::DEFAULT_MAX_URL_LENGTH;
use crate::throttle::{Backoff, RateLimiter, DEFAULT_MIN_INTERVAL};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Upstream access settings
    pub upstream: UpstreamConfig,

    /// Request pacing and retries
    pub throttle: ThrottleConfig,

    /// On-disk artifact cache
    pub cache: CacheConfig,

    /// Application settings
    pub app: AppConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Path or name of the yt-dlp executable
    pub yt_dlp_path: String,

    /// Timeout for caption downloads
    pub request_timeout_secs: u64,

    /// Longest URL accepted
    pub max_url_length: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Minimum spacing between any two upstream requests
    pub min_interval_ms: u64,

    pub backoff_base_ms: u64,

    pub backoff_jitter_ms: u64,

    /// Attempts per upstream request before giving up on it
    pub max_retries: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,

    /// Cache root; defaults to the platform cache directory
    pub directory: Option<PathBuf>,

    pub max_size_mb: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Language tried first when none is given
    pub default_language: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upstream: UpstreamConfig {
                yt_dlp_path: "yt-dlp".to_string(),
                request_timeout_secs: 30,
                max_url_length: DEFAULT_MAX_URL_LENGTH,
            },
            throttle: ThrottleConfig {
                min_interval_ms: DEFAULT_MIN_INTERVAL.as_millis() as u64,
                backoff_base_ms: 1000,
                backoff_jitter_ms: 1000,
                max_retries: DEFAULT_MAX_RETRIES,
            },
            cache: CacheConfig {
                enabled: true,
                directory: None,
                max_size_mb: DEFAULT_MAX_CACHE_BYTES / (1024 * 1024),
            },
            app: AppConfig {
                default_language: DEFAULT_LANGUAGE.to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from file or create default
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Self::default();
            config.save().await?;
            Ok(config)
        }
    }

    /// Load and validate a specific config file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs_err::read_to_string(path).context("Failed to read config file")?;

        let config: Config = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;

        fs_err::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir().context("Could not determine config directory")?;

        Ok(config_dir.join("tubescribe").join("config.yaml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.throttle.max_retries == 0 {
            anyhow::bail!("throttle.max_retries must be at least 1");
        }

        if self.cache.max_size_mb == 0 {
            anyhow::bail!("cache.max_size_mb must be greater than 0");
        }

        if self.upstream.max_url_length == 0 {
            anyhow::bail!("upstream.max_url_length must be greater than 0");
        }

        if self.upstream.yt_dlp_path.trim().is_empty() {
            anyhow::bail!("upstream.yt_dlp_path must be set");
        }

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  yt-dlp: {}", self.upstream.yt_dlp_path);
        println!("  Request Timeout: {}s", self.upstream.request_timeout_secs);
        println!("  Min Request Interval: {}ms", self.throttle.min_interval_ms);
        println!(
            "  Backoff: {}ms base + up to {}ms jitter",
            self.throttle.backoff_base_ms, self.throttle.backoff_jitter_ms
        );
        println!("  Max Retries: {}", self.throttle.max_retries);
        println!("  Cache Enabled: {}", self.cache.enabled);
        match self.cache_dir() {
            Ok(dir) => println!("  Cache Directory: {}", dir.display()),
            Err(_) => println!("  Cache Directory: (unavailable)"),
        }
        println!("  Cache Limit: {} MB", self.cache.max_size_mb);
        println!("  Default Language: {}", self.app.default_language);
    }

    /// Cache root: explicit setting, else the platform cache directory
    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.cache.directory {
            return Ok(dir.clone());
        }

        let cache_dir = dirs::cache_dir().context("Could not determine cache directory")?;
        Ok(cache_dir.join("tubescribe"))
    }

    pub fn max_cache_bytes(&self) -> u64 {
        self.cache.max_size_mb.saturating_mul(1024 * 1024)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.throttle.max_retries,
            backoff: Backoff::new(
                Duration::from_millis(self.throttle.backoff_base_ms),
                Duration::from_millis(self.throttle.backoff_jitter_ms),
            ),
        }
    }

    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::new(Duration::from_millis(self.throttle.min_interval_ms))
    }
}
