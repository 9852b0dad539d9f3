//! Configuration types for thingmirror

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Longest file path the mirror will create (Windows-safe default)
pub const DEFAULT_MAX_PATH_LENGTH: usize = 250;

/// Smallest accepted `max_path_length`; anything shorter cannot hold a suffixed name
const MIN_MAX_PATH_LENGTH: usize = 32;

/// Mirror behaviour (target tree, concurrency, archive options)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Root directory of the local mirror (default: current directory)
    #[serde(default = "default_target_dir")]
    pub target_dir: PathBuf,

    /// Number of queue workers for directly requested things (default: 1)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Stop a grouping traversal at the first thing that is already current
    ///
    /// Relies on the remote listing being ordered newest-first; the listing
    /// order is not verified.
    #[serde(default)]
    pub quick: bool,

    /// Compress each finished snapshot into a single archive and delete the directory
    #[serde(default)]
    pub compress: bool,

    /// Maximum length of any file path created inside a snapshot (default: 250)
    #[serde(default = "default_max_path_length")]
    pub max_path_length: usize,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            target_dir: default_target_dir(),
            workers: default_workers(),
            quick: false,
            compress: false,
            max_path_length: default_max_path_length(),
        }
    }
}

/// Remote API access
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the REST API (default: "https://api.thingiverse.com")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API access token; takes precedence over `api_key_file`
    #[serde(default)]
    pub api_key: Option<String>,

    /// File holding the API access token (default: "api.key")
    #[serde(default = "default_api_key_file")]
    pub api_key_file: PathBuf,

    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            api_key_file: default_api_key_file(),
            timeout: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Retry configuration for transient remote failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_ms_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_ms_serde")]
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

/// Main configuration for [`Mirror`](crate::Mirror)
///
/// Fields are organized into sub-configs:
/// - [`mirror`](MirrorConfig) - target tree, workers, quick/compress
/// - [`api`](ApiConfig) - endpoint, credential, timeouts
/// - [`retry`](RetryConfig) - backoff for transient failures
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Mirror behaviour
    #[serde(default)]
    pub mirror: MirrorConfig,

    /// Remote API access
    #[serde(default)]
    pub api: ApiConfig,

    /// Retry policy for remote requests
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Load a configuration from a JSON file
    ///
    /// Missing fields fall back to their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read config file '{}': {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that values are usable
    pub fn validate(&self) -> Result<()> {
        if self.mirror.workers == 0 {
            return Err(Error::Config {
                message: "at least one worker is required".to_string(),
                key: Some("workers".to_string()),
            });
        }
        if self.mirror.max_path_length < MIN_MAX_PATH_LENGTH {
            return Err(Error::Config {
                message: format!(
                    "max_path_length must be at least {} (got {})",
                    MIN_MAX_PATH_LENGTH, self.mirror.max_path_length
                ),
                key: Some("max_path_length".to_string()),
            });
        }
        Ok(())
    }

    /// Resolve the API credential
    ///
    /// Uses `api.api_key` when set, otherwise the trimmed contents of
    /// `api.api_key_file`. Having neither is a configuration error.
    pub fn resolve_api_key(&self) -> Result<String> {
        if let Some(key) = self.api.api_key.as_deref().map(str::trim)
            && !key.is_empty()
        {
            return Ok(key.to_string());
        }

        match std::fs::read_to_string(&self.api.api_key_file) {
            Ok(content) if !content.trim().is_empty() => Ok(content.trim().to_string()),
            Ok(_) => Err(Error::Config {
                message: format!(
                    "API key file '{}' is empty",
                    self.api.api_key_file.display()
                ),
                key: Some("api_key_file".to_string()),
            }),
            Err(e) => Err(Error::Config {
                message: format!(
                    "either specify the API key on the command line or in '{}': {}",
                    self.api.api_key_file.display(),
                    e
                ),
                key: Some("api_key".to_string()),
            }),
        }
    }
}

fn default_target_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_workers() -> usize {
    1
}

fn default_max_path_length() -> usize {
    DEFAULT_MAX_PATH_LENGTH
}

fn default_base_url() -> String {
    "https://api.thingiverse.com".to_string()
}

fn default_api_key_file() -> PathBuf {
    PathBuf::from("api.key")
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    format!("thingmirror/{}", env!("CARGO_PKG_VERSION"))
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

fn default_true() -> bool {
    true
}

// Duration serialization helper (whole seconds)
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

// Duration serialization helper (milliseconds)
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
