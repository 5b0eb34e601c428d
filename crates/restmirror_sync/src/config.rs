//! Configuration for the overlay, the synchronizer and retention.
//!
//! Every struct deserializes from JSON with durations given in whole
//! seconds, and every field is optional in the file.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Read-through settings for the network overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// How long a synced record is served without a remote refresh.
    #[serde(rename = "cache_ttl_seconds", with = "seconds")]
    pub cache_ttl: Duration,
    /// How long an identical list request is skipped after a fetch.
    #[serde(rename = "list_cache_seconds", with = "seconds")]
    pub list_cache_time: Duration,
    /// Timeout for remote reads.
    #[serde(rename = "read_timeout_seconds", with = "seconds")]
    pub read_timeout: Duration,
}

impl OverlayConfig {
    /// Creates the default overlay configuration.
    pub fn new() -> Self {
        Self {
            cache_ttl: Duration::from_secs(300),
            list_cache_time: Duration::from_secs(5),
            read_timeout: Duration::from_secs(10),
        }
    }

    /// Sets the single-record cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Sets the list request cache window.
    pub fn with_list_cache_time(mut self, window: Duration) -> Self {
        self.list_cache_time = window;
        self
    }

    /// Sets the read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Replay settings for the outbox synchronizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboxConfig {
    /// Timeout for replayed writes.
    #[serde(rename = "write_timeout_seconds", with = "seconds")]
    pub write_timeout: Duration,
    /// Whether replay starts paused until `start_sync` is called.
    pub start_paused: bool,
}

impl OutboxConfig {
    /// Creates the default outbox configuration.
    pub fn new() -> Self {
        Self {
            write_timeout: Duration::from_secs(30),
            start_paused: false,
        }
    }

    /// Sets the write timeout.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Starts the synchronizer paused.
    pub fn paused(mut self) -> Self {
        self.start_paused = true;
        self
    }
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// How long synced records are kept, per registered mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    /// Synced records older than this are evicted.
    pub evict_after_seconds: u64,
    /// Skip-trim keeps this many of the newest synced records.
    pub trim_keep_count: usize,
}

impl RetentionPolicy {
    /// Creates a policy.
    pub fn new(evict_after_seconds: u64, trim_keep_count: usize) -> Self {
        Self {
            evict_after_seconds,
            trim_keep_count,
        }
    }

    /// Returns the eviction age in milliseconds.
    pub fn evict_after_millis(&self) -> i64 {
        i64::try_from(self.evict_after_seconds.saturating_mul(1000)).unwrap_or(i64::MAX)
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::new(7 * 24 * 60 * 60, 1000)
    }
}

/// Aggregate configuration, loadable from a JSON file.
///
/// ```rust
/// use restmirror_sync::MirrorConfig;
/// use std::time::Duration;
///
/// let config = MirrorConfig::from_json_str(r#"{"overlay": {"cache_ttl_seconds": 60}}"#).unwrap();
/// assert_eq!(config.overlay.cache_ttl, Duration::from_secs(60));
/// assert_eq!(config.overlay.read_timeout, Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Overlay settings.
    pub overlay: OverlayConfig,
    /// Outbox settings.
    pub outbox: OutboxConfig,
    /// Default retention for registered mirrors.
    pub retention: RetentionPolicy,
}

impl MirrorConfig {
    /// Parses a JSON document.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the JSON does not match the expected shape.
    pub fn from_json_str(json: &str) -> SyncResult<Self> {
        serde_json::from_str(json).map_err(|e| SyncError::Config(e.to_string()))
    }

    /// Reads and parses a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the file cannot be read or parsed.
    pub fn from_json_file(path: &Path) -> SyncResult<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }
}

mod seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
