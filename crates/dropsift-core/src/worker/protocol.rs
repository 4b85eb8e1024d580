/// Messages exchanged between callers and the worker thread.
///
/// Each request carries its own reply sender, so concurrent callers (a
/// batch in flight and a health ping) never read each other's responses.
/// The id is still echoed back and checked: a response with a foreign id
/// is treated as malformed.
use crate::dedup::DedupOutcome;
use crate::model::FileReference;
use crate::progress::HashProgress;
use crossbeam_channel::Sender;

/// A request sent to the worker.
#[derive(Debug)]
pub struct WorkerRequest {
    pub id: u64,
    pub kind: RequestKind,
    pub reply: Sender<WorkerResponse>,
}

#[derive(Debug)]
pub enum RequestKind {
    /// Deduplicate a batch. File handles are shared, not copied.
    ProcessFiles {
        run_id: u64,
        files: Vec<FileReference>,
    },
    /// Liveness ping, answered immediately when the worker is idle.
    HealthCheck,
    /// Exit the worker loop after the current request.
    Shutdown,
}

impl RequestKind {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::ProcessFiles { .. } => "PROCESS_FILES",
            Self::HealthCheck => "HEALTH_CHECK",
            Self::Shutdown => "SHUTDOWN",
        }
    }
}

/// A response from the worker, correlated by `id`.
#[derive(Debug)]
pub struct WorkerResponse {
    pub id: u64,
    pub kind: ResponseKind,
}

#[derive(Debug)]
pub enum ResponseKind {
    /// Streamed while a batch is hashing. Not terminal.
    ProgressUpdate(HashProgress),
    /// Terminal success for `ProcessFiles`.
    ProcessingComplete(Box<DedupOutcome>),
    /// Terminal failure for `ProcessFiles`.
    Error(String),
    HealthCheckResponse { worker_id: u64 },
}

impl ResponseKind {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::ProgressUpdate(_) => "PROGRESS_UPDATE",
            Self::ProcessingComplete(_) => "PROCESSING_COMPLETE",
            Self::Error(_) => "ERROR",
            Self::HealthCheckResponse { .. } => "HEALTH_CHECK_RESPONSE",
        }
    }
}
