//! Configuration module for chunkdrive.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::{DriveError, Result};

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/chunkdrive.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Blob channel (transport) configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// Base URL of the channel API.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Bot token used to authorize every call.
    #[serde(default)]
    pub bot_token: String,
    /// Channel that receives one message per chunk.
    #[serde(default)]
    pub channel_id: String,
    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Total request timeout in seconds.
    #[serde(default = "default_total_timeout")]
    pub total_timeout_secs: u64,
    /// Maximum bytes per uploaded chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size_bytes: usize,
}

fn default_api_base() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_total_timeout() -> u64 {
    120
}

fn default_chunk_size() -> usize {
    8 * 1024 * 1024 // 8MB
}

impl TransportConfig {
    /// Whether both the token and the channel are set.
    pub fn has_credentials(&self) -> bool {
        !self.bot_token.is_empty() && !self.channel_id.is_empty()
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            bot_token: String::new(),
            channel_id: String::new(),
            connect_timeout_secs: default_connect_timeout(),
            total_timeout_secs: default_total_timeout(),
            chunk_size_bytes: default_chunk_size(),
        }
    }
}

/// Retry policy for transport calls.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per call, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay for server errors; attempt `n` waits `n * base`.
    #[serde(default = "default_server_error_base_delay")]
    pub server_error_base_delay_ms: u64,
    /// Extra wait added on top of every retry delay.
    #[serde(default = "default_rate_limit_buffer")]
    pub rate_limit_buffer_ms: u64,
    /// Wait used when a rate-limit response carries no retry-after.
    #[serde(default = "default_retry_after")]
    pub default_retry_after_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_server_error_base_delay() -> u64 {
    2000
}

fn default_rate_limit_buffer() -> u64 {
    100
}

fn default_retry_after() -> u64 {
    1000
}

impl RetryConfig {
    /// Delay before retrying after the `attempt`-th server error (1-based).
    pub fn server_error_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.server_error_base_delay_ms * u64::from(attempt))
    }

    /// Fixed buffer added to every retry wait.
    pub fn buffer(&self) -> Duration {
        Duration::from_millis(self.rate_limit_buffer_ms)
    }

    /// Fallback retry-after.
    pub fn default_retry_after(&self) -> Duration {
        Duration::from_millis(self.default_retry_after_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            server_error_base_delay_ms: default_server_error_base_delay(),
            rate_limit_buffer_ms: default_rate_limit_buffer(),
            default_retry_after_ms: default_retry_after(),
        }
    }
}

/// Bulk delete batching.
#[derive(Debug, Clone, Deserialize)]
pub struct BulkDeleteConfig {
    /// Deletes issued concurrently per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause between consecutive batches in milliseconds.
    #[serde(default = "default_batch_pause")]
    pub batch_pause_ms: u64,
}

fn default_batch_size() -> usize {
    3
}

fn default_batch_pause() -> u64 {
    600
}

impl BulkDeleteConfig {
    /// Pause between batches.
    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }
}

impl Default for BulkDeleteConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_pause_ms: default_batch_pause(),
        }
    }
}

/// Bearer token verification.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret used to verify bearer tokens.
    #[serde(default)]
    pub jwt_secret: String,
    /// Expected `aud` claim, if any.
    #[serde(default)]
    pub audience: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/chunkdrive.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,
    /// Retry policy.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Bulk delete batching.
    #[serde(default)]
    pub bulk_delete: BulkDeleteConfig,
    /// Token verification.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(DriveError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| DriveError::Validation(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `CHUNKDRIVE_BOT_TOKEN`: transport bot token
    /// - `CHUNKDRIVE_CHANNEL_ID`: transport channel
    /// - `CHUNKDRIVE_JWT_SECRET`: bearer token secret
    pub fn apply_env_overrides(&mut self) {
        if let Some(token) = non_empty_env("CHUNKDRIVE_BOT_TOKEN") {
            self.transport.bot_token = token;
        }
        if let Some(channel) = non_empty_env("CHUNKDRIVE_CHANNEL_ID") {
            self.transport.channel_id = channel;
        }
        if let Some(secret) = non_empty_env("CHUNKDRIVE_JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
    }

    /// Validate the configuration.
    ///
    /// Missing transport credentials are allowed here; they fail the first upload instead.
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(DriveError::Validation(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.bulk_delete.batch_size == 0 {
            return Err(DriveError::Validation(
                "bulk_delete.batch_size must be at least 1".to_string(),
            ));
        }
        if self.transport.chunk_size_bytes == 0 {
            return Err(DriveError::Validation(
                "transport.chunk_size_bytes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
