/// DropSift Core: folder walking, cloud-stall detection, deduplication,
/// and the upload queue.
///
/// This crate contains all intake logic with zero UI dependencies. Any
/// frontend (the `DropSift` CLI, a desktop shell) drives it through
/// [`pipeline::Pipeline`] and listens through a [`progress::PipelineObserver`].
///
/// # Modules
///
/// - [`model`]: File references, metadata, MIME inference.
/// - [`hash`]: SHA-256 content digests.
/// - [`dedup`]: Size-then-hash deduplication and best-copy selection.
/// - [`worker`]: Supervised background worker and processing strategies.
/// - [`walker`]: Paged, cancellable folder enumeration.
/// - [`stall`]: Detection of folders that never yield files.
/// - [`render`]: Chunked queue materialisation and the upload queue.
/// - [`analysis`]: Pre-flight counts and time estimates.
/// - [`report`]: CSV export and JSON run summaries.
/// - [`platform`]: Hidden, system, temporary and cloud placeholder attributes.
pub mod analysis;
pub mod config;
pub mod dedup;
pub mod error;
pub mod hash;
pub mod model;
pub mod pipeline;
pub mod platform;
pub mod progress;
pub mod render;
pub mod report;
pub mod stall;
pub mod walker;
pub mod worker;

pub use config::PipelineConfig;
pub use dedup::{DedupOutcome, DedupReport};
pub use error::{ConfigError, PipelineError, ValidationError, WorkerError};
pub use model::{FileReference, FileStatus};
pub use pipeline::Pipeline;
pub use progress::{PipelineEvent, PipelineObserver, SilentObserver};
pub use walker::{CancelToken, WalkOutcome};
