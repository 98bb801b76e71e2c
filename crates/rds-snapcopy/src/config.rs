use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{CopierError, Result};

/// Provider cap on concurrent cross-region snapshot copies.
pub const MAX_COPY_IN_FLIGHT_LIMIT: usize = 6;

/// Smallest page size the provider accepts for listing calls.
pub const MIN_PAGE_SIZE: i32 = 20;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Levels accepted from older deployments; all of them mean `error`.
const LEGACY_ERROR_LEVELS: &[&str] = &["dpanic", "panic", "fatal"];

/// Delays and ceilings applied to provider calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pacing {
    /// Pause after every listing page and per-item call.
    pub anti_rate_limit_ms: u64,
    /// Interval between status polls of an in-flight copy.
    pub poll_interval_ms: u64,
    /// Validity window of a pre-signed copy request.
    pub presign_expiry_secs: u64,
    /// Page-count ceiling for paginated listings.
    pub max_pages: usize,
    /// Page size for instance listings.
    pub instance_page_size: i32,
    /// Page size for snapshot listings.
    pub snapshot_page_size: i32,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            anti_rate_limit_ms: 10,
            poll_interval_ms: 10_000,
            presign_expiry_secs: 100,
            max_pages: 1000,
            instance_page_size: 50,
            snapshot_page_size: 20,
        }
    }
}

impl Pacing {
    /// Anti-rate-limit delay.
    pub fn anti_rate_limit(&self) -> Duration {
        Duration::from_millis(self.anti_rate_limit_ms)
    }

    /// Copy status poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Pre-signed URL validity.
    pub fn presign_expiry(&self) -> Duration {
        Duration::from_secs(self.presign_expiry_secs)
    }

    /// Pacing for in-process regions: no rate-limit pause, 1ms polls.
    pub fn immediate() -> Self {
        Self {
            anti_rate_limit_ms: 0,
            poll_interval_ms: 1,
            ..Self::default()
        }
    }
}

/// Process-wide copier configuration. Read-only once populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CopierConfig {
    /// Log intended copies and deletions without performing them.
    pub dry_run: bool,
    /// Tag key marking instances whose snapshots are copied.
    pub tag: String,
    /// Default log level when `RUST_LOG` is unset.
    pub log_level: String,
    /// Number of copy workers.
    pub max_copy_in_flight: usize,
    /// Copies to keep per instance in the target region; 0 keeps all.
    pub max_snapshots: usize,
    /// Minutes to sleep between iterations.
    pub run_every_mins: u64,
    /// Region snapshots are copied from.
    pub source_region: String,
    /// Region snapshots are copied into.
    pub target_region: String,
    /// KMS key for encrypting copies at the target.
    pub target_kms_key: Option<String>,
    /// Upper bound on waiting for one copy; `None` waits indefinitely.
    pub max_copy_wait_secs: Option<u64>,
    /// Provider call pacing.
    pub pacing: Pacing,
}

impl Default for CopierConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            tag: String::new(),
            log_level: String::from("info"),
            max_copy_in_flight: 2,
            max_snapshots: 0,
            run_every_mins: 0,
            source_region: String::new(),
            target_region: String::new(),
            target_kms_key: None,
            max_copy_wait_secs: None,
            pacing: Pacing::default(),
        }
    }
}

impl CopierConfig {
    /// Load a config from a `.toml` or `.json` file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        let mut config: CopierConfig = match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents).map_err(|e| CopierError::config(e.to_string()))?,
            "json" => serde_json::from_str(&contents).map_err(|e| CopierError::config(e.to_string()))?,
            _ => {
                return Err(CopierError::config(format!(
                    "unsupported config file extension: {}",
                    ext
                )))
            }
        };
        config.normalize();
        Ok(config)
    }

    /// Collapse an empty KMS key into "unencrypted" and fold log level
    /// spellings onto the supported set.
    pub fn normalize(&mut self) {
        if self.target_kms_key.as_deref().is_some_and(|k| k.trim().is_empty()) {
            self.target_kms_key = None;
        }
        self.log_level = self.log_level.trim().to_lowercase();
        if LEGACY_ERROR_LEVELS.contains(&self.log_level.as_str()) {
            self.log_level = String::from("error");
        }
    }

    /// Whether copies are re-encrypted at the target.
    pub fn encrypted(&self) -> bool {
        self.target_kms_key.is_some()
    }

    /// Sleep between iterations.
    pub fn run_every(&self) -> Duration {
        Duration::from_secs(self.run_every_mins.saturating_mul(60))
    }

    /// Poll ceiling for a single copy, if any.
    pub fn max_copy_wait(&self) -> Option<Duration> {
        self.max_copy_wait_secs.map(Duration::from_secs)
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.source_region.is_empty() {
            return Err(CopierError::config("source region is required"));
        }
        if self.target_region.is_empty() {
            return Err(CopierError::config("target region is required"));
        }
        if self.source_region == self.target_region {
            return Err(CopierError::config(format!(
                "source and target region are both {}",
                self.source_region
            )));
        }
        if self.tag.is_empty() {
            return Err(CopierError::config("tag is required"));
        }
        if self.max_copy_in_flight == 0 || self.max_copy_in_flight > MAX_COPY_IN_FLIGHT_LIMIT {
            return Err(CopierError::config(format!(
                "max copies in flight must be between 1 and {}, got {}",
                MAX_COPY_IN_FLIGHT_LIMIT, self.max_copy_in_flight
            )));
        }
        if self.pacing.instance_page_size < MIN_PAGE_SIZE || self.pacing.snapshot_page_size < MIN_PAGE_SIZE {
            return Err(CopierError::config(format!(
                "page sizes must be at least {}",
                MIN_PAGE_SIZE
            )));
        }
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(CopierError::config(format!("unknown log level: {}", self.log_level)));
        }
        Ok(())
    }
}
