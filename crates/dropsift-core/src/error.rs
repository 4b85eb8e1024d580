/// Error taxonomy for the intake pipeline.
///
/// Errors are layered by blast radius:
/// - [`ValidationError`] rejects one call and nothing else.
/// - [`HashingError`] is absorbed per file; the file passes through unhashed.
/// - [`WorkerError`] is channel- or supervisor-level and escalates exactly
///   one level, to the restart/fallback decision.
/// - [`PipelineError`] is the only error a caller of the entry points sees
///   when every processing path has failed.
///
/// Stall diagnostics and cancellation are *not* errors; see
/// [`crate::stall::StallDiagnostic`] and [`crate::walker::WalkOutcome`].
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Malformed input handed to one of the pipeline entry points.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("file at index {index} has an empty file name")]
    EmptyFileName { index: usize },

    #[error("file at index {index} has an invalid path '{path}': {reason}")]
    InvalidPath {
        index: usize,
        path: String,
        reason: &'static str,
    },

    #[error("original index {original_index} is used by more than one file")]
    DuplicateIndex { original_index: usize },
}

/// A single file's digest could not be computed.
#[derive(Debug, Error)]
pub enum HashingError {
    #[error("failed to read '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("'{path}' changed size while hashing (expected {expected} bytes, read {actual})")]
    SizeMismatch {
        path: String,
        expected: u64,
        actual: u64,
    },
}

impl HashingError {
    /// Path of the file that failed.
    pub fn path(&self) -> &str {
        match self {
            Self::Read { path, .. } | Self::SizeMismatch { path, .. } => path,
        }
    }
}

/// Failure of the background worker or of the channel to it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkerError {
    #[error("worker thread could not be spawned: {0}")]
    Spawn(String),

    #[error("worker is not ready")]
    NotReady,

    #[error("worker disconnected (crashed or terminated)")]
    Disconnected,

    #[error("request {request_id} timed out after {timeout:?}")]
    Timeout { request_id: u64, timeout: Duration },

    #[error("malformed response: expected id {expected}, got {actual}")]
    MalformedResponse { expected: u64, actual: u64 },

    #[error("worker reported an error: {0}")]
    Remote(String),

    #[error("restart attempts exhausted after {attempts} tries")]
    RestartsExhausted { attempts: u32 },
}

/// Bad configuration, bad input, or no processing path (worker or main
/// thread) succeeded.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("processing failed on every available path: {0}")]
    Exhausted(String),
}

/// Configuration loading and validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Writing an export or summary failed.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON summary failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
