//! # Configuration Management
//!
//! Tuning knobs for scanning, decoding and compressed stream access.
//! Every section has a `Default` so an empty TOML file is a valid config.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub scan: ScanConfig,
    pub decode: DecodeConfig,
    pub stream: StreamConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::Io {
            message: format!("Failed to read config {}", path.display()),
            source: e,
        })?;
        let config: Config = toml::from_str(&text).map_err(|e| Error::Configuration {
            message: format!("{}: {}", path.display(), e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the scanner and decoder cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.scan.queue_capacity == 0 {
            return Err(Error::Configuration {
                message: "scan.queue_capacity must be at least 1".to_string(),
            });
        }
        if self.scan.batch_size == 0 {
            return Err(Error::Configuration {
                message: "scan.batch_size must be at least 1".to_string(),
            });
        }
        if self.scan.progress_interval_ms == 0 {
            return Err(Error::Configuration {
                message: "scan.progress_interval_ms must be non-zero".to_string(),
            });
        }
        if self.stream.block_size < 4096 {
            return Err(Error::Configuration {
                message: format!("stream.block_size too small: {}", self.stream.block_size),
            });
        }
        if self.stream.block_cache_blocks == 0 {
            return Err(Error::Configuration {
                message: "stream.block_cache_blocks must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Background scan configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Bounded channel capacity between producer and consumer, in batches
    pub queue_capacity: usize,
    /// Records per batch sent over the channel
    pub batch_size: usize,
    /// Progress reporting cadence
    pub progress_interval_ms: u64,
    /// Files at least this large are scanned in a worker process when one is configured
    pub process_threshold_bytes: u64,
    /// Path of the `stdfdb` executable used by the process backend
    pub worker_exe: Option<PathBuf>,
}

impl ScanConfig {
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 16,
            batch_size: 1024,
            progress_interval_ms: 100,
            process_threshold_bytes: 4 * 1024 * 1024 * 1024, // 4GB
            worker_exe: None,
        }
    }
}

/// On-demand decoder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    /// Maximum decoded records kept per file handle
    pub cache_entries: usize,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            cache_entries: 65_536,
        }
    }
}

/// Compressed stream access configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Decompressed bytes per spill block
    pub block_size: usize,
    /// Decompressed blocks kept in memory by a random-access reader
    pub block_cache_blocks: usize,
    /// zstd level used for spill blocks
    pub spill_level: i32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            block_size: 1024 * 1024, // 1MB
            block_cache_blocks: 16,
            spill_level: 1,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::str::FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(Error::Configuration {
                message: format!("Unknown log level: {}", other),
            }),
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}
