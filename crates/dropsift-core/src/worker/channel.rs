/// Request/response over the worker inbox.
///
/// The channel knows nothing about restarts or health; it asks its
/// [`EndpointGate`] for an endpoint, sends one request, and waits for the
/// terminal response while forwarding progress. An unavailable endpoint is
/// reported as [`SendError::Fallback`], never as a hard failure.
use super::protocol::{RequestKind, ResponseKind, WorkerRequest, WorkerResponse};
use super::supervisor::{EndpointGate, Gate};
use crate::dedup::DedupOutcome;
use crate::error::WorkerError;
use crate::model::FileReference;
use crate::progress::HashProgress;
use crossbeam_channel::{RecvTimeoutError, SendTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, trace};

/// Per-request options.
#[derive(Debug, Clone, Copy)]
pub struct SendOptions {
    pub timeout: Duration,
    /// Dispatch even when the worker is marked unhealthy.
    pub allow_unhealthy: bool,
}

impl SendOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            allow_unhealthy: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum SendError {
    /// No usable worker right now; run the work on the calling thread.
    #[error("worker unavailable: {0}")]
    Fallback(String),

    #[error(transparent)]
    Worker(#[from] WorkerError),
}

pub struct WorkerChannel {
    gate: Arc<dyn EndpointGate>,
}

impl WorkerChannel {
    pub fn new(gate: Arc<dyn EndpointGate>) -> Self {
        Self { gate }
    }

    /// Send one request and wait for its terminal response.
    ///
    /// `ProgressUpdate`s for this request are passed to `on_progress` as
    /// they arrive. The timeout covers the whole exchange.
    pub fn send(
        &self,
        kind: RequestKind,
        options: SendOptions,
        on_progress: &dyn Fn(&HashProgress),
    ) -> Result<ResponseKind, SendError> {
        let endpoint = match self.gate.acquire(options.allow_unhealthy) {
            Gate::Ready(endpoint) => endpoint,
            Gate::Unavailable(reason) => return Err(SendError::Fallback(reason)),
        };

        let id = self.gate.next_request_id();
        let tag = kind.tag();
        let deadline = Instant::now() + options.timeout;
        let (reply, rx) = crossbeam_channel::unbounded::<WorkerResponse>();
        debug!(worker_id = endpoint.worker_id, request_id = id, "sending {tag}");

        endpoint
            .tx
            .send_timeout(WorkerRequest { id, kind, reply }, options.timeout)
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => WorkerError::Timeout {
                    request_id: id,
                    timeout: options.timeout,
                },
                SendTimeoutError::Disconnected(_) => WorkerError::Disconnected,
            })?;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let response = match rx.recv_timeout(remaining) {
                Ok(response) => response,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(WorkerError::Timeout {
                        request_id: id,
                        timeout: options.timeout,
                    }
                    .into())
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(WorkerError::Disconnected.into())
                }
            };
            if response.id != id {
                return Err(WorkerError::MalformedResponse {
                    expected: id,
                    actual: response.id,
                }
                .into());
            }
            match response.kind {
                ResponseKind::ProgressUpdate(progress) => {
                    trace!(request_id = id, "progress {}/{}", progress.current, progress.total);
                    on_progress(&progress);
                }
                terminal => {
                    debug!(request_id = id, "{tag} answered with {}", terminal.tag());
                    return Ok(terminal);
                }
            }
        }
    }

    /// Deduplicate a batch on the worker.
    pub fn process_files(
        &self,
        run_id: u64,
        files: Vec<FileReference>,
        options: SendOptions,
        on_progress: &dyn Fn(&HashProgress),
    ) -> Result<DedupOutcome, SendError> {
        match self.send(
            RequestKind::ProcessFiles { run_id, files },
            options,
            on_progress,
        )? {
            ResponseKind::ProcessingComplete(outcome) => Ok(*outcome),
            ResponseKind::Error(message) => Err(WorkerError::Remote(message).into()),
            other => Err(WorkerError::Remote(format!(
                "unexpected {} in reply to a batch",
                other.tag()
            ))
            .into()),
        }
    }
}
