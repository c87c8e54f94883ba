//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries all
//! sub-configs for scanning, tools, integrity checking, duplicate detection,
//! and recovery. Every section defaults sensibly so a completely empty `{}`
//! file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scan: ScanConfig,
    pub tools: ToolsConfig,
    pub integrity: IntegrityConfig,
    pub duplicates: DuplicateConfig,
    pub recovery: RecoveryConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.scan.max_concurrency == 0 {
            warnings.push("scan.max_concurrency is 0; no files will ever be probed".into());
        }
        if self.scan.batch_size == 0 {
            warnings.push("scan.batch_size is 0; every record flushes individually".into());
        }
        if self.integrity.concurrency == 0 {
            warnings.push("integrity.concurrency is 0; verification will stall".into());
        }
        if self.duplicates.partial_hash_window == 0 {
            warnings.push("duplicates.partial_hash_window is 0; partial hashes are empty".into());
        }
        if let Some(ref p) = self.tools.ffprobe_path {
            if !p.exists() {
                warnings.push(format!("tools.ffprobe_path does not exist: {}", p.display()));
            }
        }
        if let Some(ref p) = self.tools.ffmpeg_path {
            if !p.exists() {
                warnings.push(format!("tools.ffmpeg_path does not exist: {}", p.display()));
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// ScanConfig
// ---------------------------------------------------------------------------

/// Scan engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Maximum number of in-flight probe operations.
    pub max_concurrency: usize,
    /// Number of records accumulated before a transactional flush.
    pub batch_size: usize,
    /// Seconds between durable checkpoint rewrites during an active scan.
    pub checkpoint_interval_secs: u64,
    /// Probe retry attempts after the initial failure.
    pub max_retries: u32,
    /// Base backoff delay in milliseconds; doubles per retry.
    pub retry_backoff_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 12,
            batch_size: 50,
            checkpoint_interval_secs: 10,
            max_retries: 3,
            retry_backoff_ms: 500,
        }
    }
}

impl ScanConfig {
    /// Backoff delay before the given retry attempt (1-based).
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(1 << exponent))
    }

    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.checkpoint_interval_secs)
    }
}

// ---------------------------------------------------------------------------
// ToolsConfig
// ---------------------------------------------------------------------------

/// External tool locations and limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Explicit ffprobe path; overrides discovery when set and existing.
    pub ffprobe_path: Option<PathBuf>,
    /// Explicit ffmpeg path; overrides discovery when set and existing.
    pub ffmpeg_path: Option<PathBuf>,
    /// Hard wall-clock limit for one probe invocation, in seconds.
    pub probe_timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffprobe_path: None,
            ffmpeg_path: None,
            probe_timeout_secs: 15,
        }
    }
}

impl ToolsConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// IntegrityConfig
// ---------------------------------------------------------------------------

/// Integrity checker tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrityConfig {
    /// Maximum number of concurrent decode passes.
    pub concurrency: usize,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

// ---------------------------------------------------------------------------
// DuplicateConfig
// ---------------------------------------------------------------------------

/// Duplicate detector tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicateConfig {
    /// Bytes hashed per window in the partial-hash method.
    pub partial_hash_window: u64,
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            partial_hash_window: 64 * 1024,
        }
    }
}

// ---------------------------------------------------------------------------
// RecoveryConfig
// ---------------------------------------------------------------------------

/// Crash-recovery tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Checkpoints older than this are pruned and their sessions failed.
    pub stale_checkpoint_hours: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            stale_checkpoint_hours: 24,
        }
    }
}

impl RecoveryConfig {
    pub fn stale_age(&self) -> chrono::Duration {
        chrono::Duration::hours(self.stale_checkpoint_hours as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_is_valid() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config.scan.max_concurrency, 12);
        assert_eq!(config.scan.batch_size, 50);
        assert_eq!(config.scan.checkpoint_interval_secs, 10);
        assert_eq!(config.tools.probe_timeout_secs, 15);
        assert_eq!(config.integrity.concurrency, 4);
        assert_eq!(config.duplicates.partial_hash_window, 64 * 1024);
        assert_eq!(config.recovery.stale_checkpoint_hours, 24);
    }

    #[test]
    fn partial_override() {
        let config = Config::from_json(r#"{"scan": {"max_concurrency": 4}}"#).unwrap();
        assert_eq!(config.scan.max_concurrency, 4);
        assert_eq!(config.scan.batch_size, 50);
    }

    #[test]
    fn invalid_json_is_error() {
        assert!(Config::from_json("not json").is_err());
    }

    #[test]
    fn load_missing_file_falls_back() {
        let config = Config::load_or_default(Some(Path::new("/nonexistent/config.json")));
        assert_eq!(config.scan.max_concurrency, 12);
    }

    #[test]
    fn backoff_doubles() {
        let scan = ScanConfig::default();
        assert_eq!(scan.backoff_for_attempt(1), Duration::from_millis(500));
        assert_eq!(scan.backoff_for_attempt(2), Duration::from_millis(1000));
        assert_eq!(scan.backoff_for_attempt(3), Duration::from_millis(2000));
    }

    #[test]
    fn validate_flags_zero_concurrency() {
        let mut config = Config::default();
        config.scan.max_concurrency = 0;
        let warnings = config.validate();
        assert!(warnings.iter().any(|w| w.contains("max_concurrency")));
    }
}
