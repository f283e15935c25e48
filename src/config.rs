//! Configuration types for drive-mirror

use crate::error::{Error, Result};
use crate::format::{ExportFormat, NativeKind};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::PathBuf, time::Duration};

/// Run behavior configuration (destination, concurrency, shutdown)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Directory the timestamped run directories are created in (default: "./mirror")
    #[serde(default = "default_destination_dir")]
    pub destination_dir: PathBuf,

    /// Prefix of the run directory name (default: "DriveMirror")
    ///
    /// The run directory is named `<prefix> - YYYY-MM-DD HH-MM-SS`.
    #[serde(default = "default_run_dir_prefix")]
    pub run_dir_prefix: String,

    /// Number of concurrent transfer workers (default: 4)
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// How long in-flight transfers get to stop after cancellation before
    /// they are aborted (default: 5 seconds)
    #[serde(default = "default_shutdown_grace", with = "duration_serde")]
    pub shutdown_grace: Duration,

    /// Capacity of the event broadcast channel (default: 1000)
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            destination_dir: default_destination_dir(),
            run_dir_prefix: default_run_dir_prefix(),
            worker_count: default_worker_count(),
            shutdown_grace: default_shutdown_grace(),
            event_buffer: default_event_buffer(),
        }
    }
}

/// Per-content-type export format choices
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Content type -> output format. Unmapped content types are downloaded
    /// as-is ([`ExportFormat::Native`]).
    #[serde(default = "default_formats")]
    pub formats: HashMap<String, ExportFormat>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            formats: default_formats(),
        }
    }
}

impl ExportConfig {
    /// The format configured for a content type
    pub fn format_for(&self, content_type: &str) -> ExportFormat {
        self.formats
            .get(content_type)
            .copied()
            .unwrap_or(ExportFormat::Native)
    }

    /// Set the format for a native kind
    pub fn set(&mut self, kind: NativeKind, format: ExportFormat) {
        self.formats.insert(kind.content_type().to_string(), format);
    }
}

/// Request rate limiting toward the document service
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests per second on the export-link fallback path (None = unlimited, default: 10)
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: Option<u64>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_requests_per_second(),
        }
    }
}

/// HTTP settings for the bearer export-link fetch
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Connect timeout (default: 15 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
        }
    }
}

/// Retry configuration for folder listing calls
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Main configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Run behavior
    #[serde(default)]
    pub mirror: MirrorConfig,

    /// Export formats per content type
    #[serde(default)]
    pub export: ExportConfig,

    /// Request rate limiting
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Bearer fetch settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Listing retry policy
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Check the configuration for values a run cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.mirror.worker_count == 0 {
            return Err(Error::Config {
                message: "worker_count must be at least 1".to_string(),
                key: Some("mirror.worker_count".to_string()),
            });
        }

        if self.mirror.run_dir_prefix.trim().is_empty() {
            return Err(Error::Config {
                message: "run_dir_prefix must not be empty".to_string(),
                key: Some("mirror.run_dir_prefix".to_string()),
            });
        }

        if self.mirror.event_buffer == 0 {
            return Err(Error::Config {
                message: "event_buffer must be at least 1".to_string(),
                key: Some("mirror.event_buffer".to_string()),
            });
        }

        for (content_type, format) in &self.export.formats {
            if *format == ExportFormat::Native {
                continue;
            }
            if let Some(kind) = NativeKind::from_content_type(content_type)
                && !format.is_offered_for(kind)
            {
                return Err(Error::Config {
                    message: format!("{} cannot be exported as {}", content_type, format.label()),
                    key: Some(format!("export.formats.{}", content_type)),
                });
            }
        }

        Ok(())
    }

    /// Load a configuration from JSON, filling in defaults and validating it
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

// Default value functions
fn default_destination_dir() -> PathBuf {
    PathBuf::from("mirror")
}

fn default_run_dir_prefix() -> String {
    "DriveMirror".to_string()
}

fn default_worker_count() -> usize {
    4
}

fn default_shutdown_grace() -> Duration {
    Duration::from_secs(5)
}

fn default_event_buffer() -> usize {
    1000
}

fn default_formats() -> HashMap<String, ExportFormat> {
    NativeKind::ALL
        .into_iter()
        .map(|kind| (kind.content_type().to_string(), kind.default_format()))
        .collect()
}

fn default_requests_per_second() -> Option<u64> {
    Some(10)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper (as seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
