/// Pipeline configuration.
///
/// Every numeric threshold in the pipeline lives here so it can be tuned
/// without a rebuild. The stall-detection constants in particular are
/// heuristic policy, validated empirically against real cloud-storage
/// providers rather than derived from any model.
///
/// All durations are stored in milliseconds. Every field has a default, so
/// a config file only needs to mention what it overrides.
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub walker: WalkerConfig,
    pub stall: StallPolicy,
    pub worker: WorkerConfig,
    pub hashing: HashingConfig,
    pub render: RenderConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkerConfig {
    /// Entries requested per directory page from the host reader.
    pub page_size: usize,
    /// Skip OS metadata files (`Thumbs.db`, `desktop.ini`, `.DS_Store`) and
    /// files carrying the system attribute.
    pub skip_system_files: bool,
    /// Skip dot-files and files carrying the hidden attribute.
    pub skip_hidden_files: bool,
    /// Skip editor temp files (`~$draft.tmp`) and files carrying the
    /// temporary attribute.
    pub skip_temporary_files: bool,
    /// Skip files the platform reports as cloud placeholders.
    pub skip_cloud_placeholders: bool,
    /// How often the walker re-checks cancellation while a read is pending.
    pub poll_interval_ms: u64,
    /// Minimum gap between two walk progress events.
    pub progress_interval_ms: u64,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            skip_system_files: true,
            skip_hidden_files: true,
            skip_temporary_files: true,
            skip_cloud_placeholders: false,
            poll_interval_ms: 25,
            progress_interval_ms: 250,
        }
    }
}

/// Sampling policy for the cloud-stall detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StallPolicy {
    pub enabled: bool,
    /// Delay before the first sample of a directory.
    pub initial_delay_ms: u64,
    /// Gap between subsequent samples.
    pub sample_interval_ms: u64,
    /// Samples taken before a verdict is possible.
    pub sample_count: usize,
    /// A directory is never classified as stalled before this much time.
    pub min_elapsed_ms: u64,
}

impl Default for StallPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay_ms: 2_000,
            sample_interval_ms: 1_000,
            sample_count: 3,
            min_elapsed_ms: 4_000,
        }
    }
}

impl StallPolicy {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Use the background worker at all. `false` selects the synchronous strategy.
    pub enabled: bool,
    pub health_check_interval_ms: u64,
    pub health_check_timeout_ms: u64,
    /// Consecutive failed pings before the worker is marked unhealthy.
    pub unhealthy_threshold: u32,
    pub max_restart_attempts: u32,
    /// Base delay for exponential restart backoff (`base * 2^attempt`).
    pub restart_backoff_ms: u64,
    pub timeout_min_ms: u64,
    pub timeout_max_ms: u64,
    /// Fixed part of a batch timeout before payload scaling.
    pub timeout_base_ms: u64,
    /// Assumed worst-case hashing throughput used to size timeouts.
    pub timeout_bytes_per_ms: u64,
    /// Maximum entries retained in the supervisor error log.
    pub error_log_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            health_check_interval_ms: 30_000,
            health_check_timeout_ms: 5_000,
            unhealthy_threshold: 3,
            max_restart_attempts: 3,
            restart_backoff_ms: 1_000,
            timeout_min_ms: 30_000,
            timeout_max_ms: 300_000,
            timeout_base_ms: 10_000,
            // ~10 MB/s
            timeout_bytes_per_ms: 10_000,
            error_log_capacity: 50,
        }
    }
}

impl WorkerConfig {
    /// Batch timeout proportional to payload size, clamped to `[min, max]`.
    pub fn timeout_for(&self, payload_bytes: u64) -> Duration {
        let per_ms = self.timeout_bytes_per_ms.max(1);
        let scaled = self
            .timeout_base_ms
            .saturating_add(payload_bytes / per_ms);
        Duration::from_millis(scaled.clamp(self.timeout_min_ms, self.timeout_max_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashingConfig {
    /// Read buffer for streaming digests.
    pub buffer_size: usize,
    /// Hashing threads. `0` means one per CPU, capped at 8.
    pub threads: usize,
    /// Minimum gap between two hash progress events.
    pub progress_interval_ms: u64,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            buffer_size: 256 * 1024,
            threads: 0,
            progress_interval_ms: 100,
        }
    }
}

impl HashingConfig {
    pub fn effective_threads(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get().clamp(1, 8)
        } else {
            self.threads
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Queues larger than this are rendered in two passes.
    pub chunk_threshold: usize,
    /// Items shown in the first pass.
    pub initial_chunk: usize,
    /// Pause between the first pass and the full replace.
    pub chunk_pause_ms: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            chunk_threshold: 500,
            initial_chunk: 100,
            chunk_pause_ms: 16,
        }
    }
}

impl PipelineConfig {
    /// Load a JSON config file. Missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations that would make the pipeline misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.walker.page_size == 0 {
            return Err(ConfigError::Invalid("walker.page_size must be > 0".into()));
        }
        if self.stall.sample_count < 2 {
            return Err(ConfigError::Invalid(
                "stall.sample_count must be >= 2 to compute a rate".into(),
            ));
        }
        if self.stall.sample_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "stall.sample_interval_ms must be > 0".into(),
            ));
        }
        if self.worker.timeout_min_ms > self.worker.timeout_max_ms {
            return Err(ConfigError::Invalid(
                "worker.timeout_min_ms must not exceed worker.timeout_max_ms".into(),
            ));
        }
        if self.worker.unhealthy_threshold == 0 {
            return Err(ConfigError::Invalid(
                "worker.unhealthy_threshold must be > 0".into(),
            ));
        }
        if self.render.initial_chunk == 0 {
            return Err(ConfigError::Invalid("render.initial_chunk must be > 0".into()));
        }
        Ok(())
    }
}
