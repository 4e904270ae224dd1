//! Configuration types shared across crates.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use time::Duration;

/// Index backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IndexConfig {
    /// SQLite-backed relational index.
    Sqlite {
        /// Path to the database file.
        path: PathBuf,
    },
    /// Embedded ordered-map index (sled).
    Sled {
        /// Path to the sled database directory.
        path: PathBuf,
    },
}

/// Blob storage configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for committed blobs.
    pub base_path: PathBuf,
    /// Directory for in-flight uploads; must be on the same filesystem as
    /// `base_path` so the commit rename stays atomic.
    pub tmp_path: PathBuf,
}

impl StorageConfig {
    /// Storage layout rooted at a single directory: `<root>/blobs` + `<root>/tmp`.
    pub fn rooted(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            base_path: root.join("blobs"),
            tmp_path: root.join("tmp"),
        }
    }
}

/// Eviction policy for a single cache instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CachePolicy {
    /// Capacity bound: entry count for the generic cache, total bytes for the
    /// content cache. `None` disables capacity eviction.
    #[serde(default)]
    pub size: Option<u64>,
    /// Idle expiry: entries not accessed for this many seconds are evicted.
    #[serde(default)]
    pub expires_after_access_secs: Option<u64>,
    /// Write expiry: entries expire this many seconds after every write,
    /// overriding caller-supplied deadlines.
    #[serde(default)]
    pub expires_after_write_secs: Option<u64>,
    /// Maximum rows touched per eviction pass per clean-up run.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
}

impl CachePolicy {
    /// Idle expiry as a Duration.
    pub fn expires_after_access(&self) -> Option<Duration> {
        self.expires_after_access_secs.map(secs_to_duration)
    }

    /// Write expiry as a Duration.
    pub fn expires_after_write(&self) -> Option<Duration> {
        self.expires_after_write_secs.map(secs_to_duration)
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            size: None,
            expires_after_access_secs: None,
            expires_after_write_secs: None,
            batch_size: default_batch_size(),
        }
    }
}

/// Periodic sweep configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Seconds between clean-up runs.
    #[serde(default = "default_sweep_period_secs")]
    pub period_secs: u64,
}

impl SweepConfig {
    /// Sweep period as a std Duration (for tokio timers).
    pub fn period(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.period_secs.max(1))
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            period_secs: default_sweep_period_secs(),
        }
    }
}

/// A named content cache declaration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContentCacheConfig {
    /// Logical cache name; also the table/tree name prefix.
    pub name: String,
    /// Eviction policy.
    #[serde(default)]
    pub policy: CachePolicy,
}

/// Top-level application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    /// Index backend.
    pub index: IndexConfig,
    /// Blob storage layout.
    pub storage: StorageConfig,
    /// Content caches to construct at startup.
    #[serde(default)]
    pub caches: Vec<ContentCacheConfig>,
    /// Sweep cadence.
    #[serde(default)]
    pub sweep: SweepConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file merged with `DARKROOM_`-prefixed
    /// environment variables (env wins).
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::prefixed("DARKROOM_").split("__"));
        figment
            .extract()
            .map_err(|e| crate::Error::Config(e.to_string()))
    }
}

fn default_batch_size() -> u32 {
    100
}

fn default_sweep_period_secs() -> u64 {
    60
}

fn secs_to_duration(secs: u64) -> Duration {
    // Saturate at i64::MAX to prevent overflow wrapping to negative
    Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX))
}
