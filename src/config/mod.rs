//! Configuration management for the lichtv aggregator
//!
//! This module handles loading and validating configuration from environment
//! variables, files, and command-line arguments.

use anyhow::{Context, Result};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source fetching configuration
    pub fetch: FetchConfig,

    /// Schedule window and timezone configuration
    pub schedule: ScheduleConfig,

    /// Output document configuration
    pub output: OutputConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Fetch-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Maximum number of sources fetched concurrently
    pub max_concurrent_sources: usize,

    /// Rate limit (requests per second)
    pub rate_limit: u32,

    /// Per-source request timeout in seconds
    pub request_timeout_secs: u64,

    /// Maximum retry attempts per source
    pub max_retries: u32,

    /// Optional upstream HTTP proxy for sources that block direct fetches
    pub proxy: Option<String>,

    /// Fixed User-Agent; a browser-like pool is rotated when unset
    pub user_agent: Option<String>,
}

/// Schedule window and timezone configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Local timezone offset from UTC in hours (e.g. 7 for Asia/Ho_Chi_Minh)
    pub tz_offset_hours: i32,

    /// Forward window length in days
    pub window_days: i64,

    /// Path to the channel registry file
    pub channels_path: PathBuf,
}

/// Output document configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output XMLTV document path
    pub path: PathBuf,

    /// Language attribute for display names, titles and descriptions
    pub language: String,

    /// Title used for programmes whose source carried none
    pub placeholder_title: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let max_concurrent_sources = std::env::var("LICHTV_MAX_CONCURRENT_SOURCES")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(4);

        let rate_limit = std::env::var("LICHTV_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(4);

        let request_timeout_secs = std::env::var("LICHTV_REQUEST_TIMEOUT")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30);

        let max_retries = std::env::var("LICHTV_MAX_RETRIES")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(2);

        let proxy = std::env::var("LICHTV_PROXY").ok().filter(|s| !s.is_empty());

        let user_agent = std::env::var("LICHTV_USER_AGENT")
            .ok()
            .filter(|s| !s.is_empty());

        let tz_offset_hours = std::env::var("LICHTV_TZ_OFFSET")
            .ok()
            .and_then(|v| v.parse::<i32>().ok())
            .unwrap_or(7);

        let window_days = std::env::var("LICHTV_WINDOW_DAYS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(2);

        let channels_path = std::env::var("LICHTV_CHANNELS_FILE")
            .unwrap_or_else(|_| String::from("channels.txt"))
            .into();

        let output_path = std::env::var("LICHTV_OUTPUT_FILE")
            .unwrap_or_else(|_| String::from("docs/epg.xml"))
            .into();

        let language = std::env::var("LICHTV_LANGUAGE").unwrap_or_else(|_| String::from("vi"));

        let placeholder_title = std::env::var("LICHTV_PLACEHOLDER_TITLE")
            .unwrap_or_else(|_| String::from("Chưa có tiêu đề"));

        let log_level = std::env::var("LICHTV_LOG_LEVEL").unwrap_or_else(|_| String::from("info"));

        let log_format =
            std::env::var("LICHTV_LOG_FORMAT").unwrap_or_else(|_| String::from("text"));

        Ok(Self {
            fetch: FetchConfig {
                max_concurrent_sources,
                rate_limit,
                request_timeout_secs,
                max_retries,
                proxy,
                user_agent,
            },
            schedule: ScheduleConfig {
                tz_offset_hours,
                window_days,
                channels_path,
            },
            output: OutputConfig {
                path: output_path,
                language,
                placeholder_title,
            },
            logging: LoggingConfig {
                level: log_level,
                format: log_format,
            },
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.fetch.max_concurrent_sources == 0 {
            anyhow::bail!("max_concurrent_sources must be greater than 0");
        }

        if self.fetch.rate_limit == 0 {
            anyhow::bail!("rate_limit must be greater than 0");
        }

        if self.schedule.window_days <= 0 {
            anyhow::bail!("window_days must be positive");
        }

        if !(-14..=14).contains(&self.schedule.tz_offset_hours) {
            anyhow::bail!("tz_offset_hours must be within -14..=14");
        }

        Ok(())
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.request_timeout_secs)
    }

    /// Get the configured local timezone as a fixed offset
    #[must_use]
    pub fn timezone(&self) -> FixedOffset {
        // validate() bounds the offset, so the construction cannot fail
        FixedOffset::east_opt(self.schedule.tz_offset_hours * 3600)
            .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is always valid"))
    }

    /// Get the forward window length
    #[must_use]
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::days(self.schedule.window_days)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fetch: FetchConfig {
                max_concurrent_sources: 4,
                rate_limit: 4,
                request_timeout_secs: 30,
                max_retries: 2,
                proxy: None,
                user_agent: None,
            },
            schedule: ScheduleConfig {
                tz_offset_hours: 7,
                window_days: 2,
                channels_path: PathBuf::from("channels.txt"),
            },
            output: OutputConfig {
                path: PathBuf::from("docs/epg.xml"),
                language: String::from("vi"),
                placeholder_title: String::from("Chưa có tiêu đề"),
            },
            logging: LoggingConfig {
                level: String::from("info"),
                format: String::from("text"),
            },
        }
    }
}
