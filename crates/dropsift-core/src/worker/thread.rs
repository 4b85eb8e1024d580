/// The background worker thread and how it is spawned.
///
/// The worker owns a bounded rayon pool for hashing and serves requests
/// one at a time from its inbox. It exits when the inbox disconnects or a
/// `Shutdown` request arrives. A panic inside a batch is caught and turned
/// into an `Error` response so one bad batch does not kill the thread.
use super::protocol::{RequestKind, ResponseKind, WorkerRequest, WorkerResponse};
use crate::dedup::{self, ProcessingPath, RunContext};
use crate::error::WorkerError;
use crate::hash::ContentHasher;
use crate::progress::HashProgress;
use crossbeam_channel::{Receiver, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Inbox depth. Callers block briefly rather than queue unbounded batches.
pub const WORKER_INBOX_CAPACITY: usize = 16;

/// A live worker as seen by the supervisor.
pub struct WorkerHandle {
    pub worker_id: u64,
    tx: Sender<WorkerRequest>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn new(
        worker_id: u64,
        tx: Sender<WorkerRequest>,
        join: Option<thread::JoinHandle<()>>,
    ) -> Self {
        Self {
            worker_id,
            tx,
            join,
        }
    }

    pub fn sender(&self) -> Sender<WorkerRequest> {
        self.tx.clone()
    }

    /// Ask the worker to exit and detach from it.
    ///
    /// The thread is not joined: a worker stuck in a long read would block
    /// the caller. Dropping the sender disconnects the inbox, so an idle
    /// worker exits immediately and a busy one exits after its batch.
    pub fn terminate(mut self) {
        let (reply, _) = crossbeam_channel::bounded(1);
        let _ = self.tx.try_send(WorkerRequest {
            id: 0,
            kind: RequestKind::Shutdown,
            reply,
        });
        if let Some(join) = self.join.take() {
            if join.is_finished() {
                let _ = join.join();
            }
        }
        debug!(worker_id = self.worker_id, "worker terminated");
    }
}

/// Creates workers. The supervisor calls this on start and on every restart.
pub trait WorkerSpawner: Send + Sync {
    fn spawn(&self, worker_id: u64) -> Result<WorkerHandle, WorkerError>;
}

/// Spawns the real hashing worker on a named OS thread.
pub struct ThreadSpawner {
    hasher: Arc<dyn ContentHasher>,
    hash_threads: usize,
    progress_interval: Duration,
    init_timeout: Duration,
}

impl ThreadSpawner {
    pub fn new(
        hasher: Arc<dyn ContentHasher>,
        hash_threads: usize,
        progress_interval: Duration,
    ) -> Self {
        Self {
            hasher,
            hash_threads,
            progress_interval,
            init_timeout: Duration::from_secs(5),
        }
    }
}

impl WorkerSpawner for ThreadSpawner {
    fn spawn(&self, worker_id: u64) -> Result<WorkerHandle, WorkerError> {
        let (tx, rx) = crossbeam_channel::bounded::<WorkerRequest>(WORKER_INBOX_CAPACITY);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), String>>(1);
        let hasher = Arc::clone(&self.hasher);
        let threads = self.hash_threads;
        let progress_interval = self.progress_interval;

        let join = thread::Builder::new()
            .name(format!("dropsift-worker-{worker_id}"))
            .spawn(move || {
                let pool = match dedup::hashing_pool(threads, &format!("dropsift-hash-{worker_id}"))
                {
                    Ok(pool) => pool,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                run_worker(worker_id, rx, hasher.as_ref(), &pool, progress_interval);
            })
            .map_err(|e| WorkerError::Spawn(e.to_string()))?;

        match ready_rx.recv_timeout(self.init_timeout) {
            Ok(Ok(())) => {
                info!(worker_id, "worker ready");
                Ok(WorkerHandle::new(worker_id, tx, Some(join)))
            }
            Ok(Err(msg)) => Err(WorkerError::Spawn(msg)),
            Err(_) => Err(WorkerError::Spawn(format!(
                "worker {worker_id} did not initialise within {:?}",
                self.init_timeout
            ))),
        }
    }
}

/// Serve requests until the inbox closes or `Shutdown` arrives.
pub fn run_worker(
    worker_id: u64,
    inbox: Receiver<WorkerRequest>,
    hasher: &dyn ContentHasher,
    pool: &rayon::ThreadPool,
    progress_interval: Duration,
) {
    for request in inbox.iter() {
        let WorkerRequest { id, kind, reply } = request;
        match kind {
            RequestKind::HealthCheck => {
                let _ = reply.send(WorkerResponse {
                    id,
                    kind: ResponseKind::HealthCheckResponse { worker_id },
                });
            }
            RequestKind::Shutdown => {
                debug!(worker_id, "worker received shutdown");
                break;
            }
            RequestKind::ProcessFiles { run_id, files } => {
                debug!(worker_id, request_id = id, "processing {} files", files.len());
                let progress_reply = reply.clone();
                let progress = move |p: HashProgress| {
                    let _ = progress_reply.send(WorkerResponse {
                        id,
                        kind: ResponseKind::ProgressUpdate(p),
                    });
                };
                let result = catch_unwind(AssertUnwindSafe(|| {
                    let mut ctx = RunContext::new(run_id);
                    dedup::deduplicate(
                        files,
                        hasher,
                        pool,
                        &mut ctx,
                        ProcessingPath::Worker,
                        progress_interval,
                        &progress,
                    )
                }));
                let kind = match result {
                    Ok(outcome) => ResponseKind::ProcessingComplete(Box::new(outcome)),
                    Err(panic) => {
                        let msg = panic_message(panic.as_ref());
                        error!(worker_id, request_id = id, "batch panicked: {msg}");
                        ResponseKind::Error(msg)
                    }
                };
                if reply.send(WorkerResponse { id, kind }).is_err() {
                    warn!(worker_id, request_id = id, "caller went away before the result");
                }
            }
        }
    }
    debug!(worker_id, "worker loop exited");
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_owned()
    }
}
