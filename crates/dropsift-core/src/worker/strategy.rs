/// Where deduplication runs: on the background worker or on the caller.
///
/// The strategy is picked once by [`select_strategy`]. The worker strategy
/// keeps a synchronous strategy alongside it and drops to it whenever the
/// channel signals a fallback or a restart fails, so a batch always
/// completes on some path.
use super::channel::{SendError, SendOptions, WorkerChannel};
use super::supervisor::{WorkerRecord, WorkerSupervisor};
use super::thread::{ThreadSpawner, WorkerSpawner};
use crate::config::{PipelineConfig, WorkerConfig};
use crate::dedup::{self, DedupOutcome, ProcessingPath, RunContext};
use crate::error::PipelineError;
use crate::hash::ContentHasher;
use crate::model::FileReference;
use crate::progress::{HashProgress, PipelineObserver};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub trait ProcessingStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn process(
        &self,
        files: Vec<FileReference>,
        run_id: u64,
        observer: &dyn PipelineObserver,
    ) -> Result<DedupOutcome, PipelineError>;

    /// Worker bookkeeping, if this strategy has a worker.
    fn worker_record(&self) -> Option<WorkerRecord> {
        None
    }
}

/// Runs the algorithm on the calling thread (plus its own hashing pool).
pub struct SyncStrategy {
    hasher: Arc<dyn ContentHasher>,
    pool: rayon::ThreadPool,
    progress_interval: Duration,
}

impl SyncStrategy {
    pub fn new(
        hasher: Arc<dyn ContentHasher>,
        threads: usize,
        progress_interval: Duration,
    ) -> Result<Self, PipelineError> {
        let pool = dedup::hashing_pool(threads, "dropsift-hash-main")
            .map_err(|e| PipelineError::Exhausted(format!("hashing pool: {e}")))?;
        Ok(Self {
            hasher,
            pool,
            progress_interval,
        })
    }
}

impl ProcessingStrategy for SyncStrategy {
    fn name(&self) -> &'static str {
        "main-thread"
    }

    fn process(
        &self,
        files: Vec<FileReference>,
        run_id: u64,
        observer: &dyn PipelineObserver,
    ) -> Result<DedupOutcome, PipelineError> {
        let progress = |p: HashProgress| observer.on_hash_progress(&p);
        catch_unwind(AssertUnwindSafe(|| {
            let mut ctx = RunContext::new(run_id);
            dedup::deduplicate(
                files,
                self.hasher.as_ref(),
                &self.pool,
                &mut ctx,
                ProcessingPath::MainThread,
                self.progress_interval,
                &progress,
            )
        }))
        .map_err(|_| PipelineError::Exhausted("main-thread deduplication panicked".into()))
    }
}

/// Dispatches batches to the supervised worker.
pub struct WorkerStrategy {
    supervisor: Arc<WorkerSupervisor>,
    channel: WorkerChannel,
    fallback: SyncStrategy,
    config: WorkerConfig,
}

impl WorkerStrategy {
    pub fn new(supervisor: Arc<WorkerSupervisor>, fallback: SyncStrategy, config: WorkerConfig) -> Self {
        let channel = WorkerChannel::new(Arc::clone(&supervisor) as _);
        Self {
            supervisor,
            channel,
            fallback,
            config,
        }
    }

    pub fn supervisor(&self) -> &Arc<WorkerSupervisor> {
        &self.supervisor
    }

    fn fall_back(
        &self,
        files: Vec<FileReference>,
        run_id: u64,
        observer: &dyn PipelineObserver,
        reason: &str,
    ) -> Result<DedupOutcome, PipelineError> {
        info!(run_id, "running on the main thread: {reason}");
        self.supervisor.record_fallback();
        observer.on_fallback(reason);
        self.fallback.process(files, run_id, observer)
    }
}

impl ProcessingStrategy for WorkerStrategy {
    fn name(&self) -> &'static str {
        "worker"
    }

    fn process(
        &self,
        files: Vec<FileReference>,
        run_id: u64,
        observer: &dyn PipelineObserver,
    ) -> Result<DedupOutcome, PipelineError> {
        let payload: u64 = files.iter().map(FileReference::size).sum();
        let options = SendOptions::with_timeout(self.config.timeout_for(payload));
        let on_progress = |p: &HashProgress| observer.on_hash_progress(p);

        // Bounded: every retry consumes a restart attempt.
        loop {
            if self.supervisor.needs_restart() {
                if let Err(e) = self.supervisor.restart() {
                    let reason = format!("worker not running; {e}");
                    return self.fall_back(files, run_id, observer, &reason);
                }
            }
            let started = Instant::now();
            let sent = {
                let _batch = self.supervisor.begin_batch();
                self.channel
                    .process_files(run_id, files.clone(), options, &on_progress)
            };
            match sent {
                Ok(outcome) => {
                    self.supervisor.record_dispatch();
                    self.supervisor.record_success(started.elapsed());
                    return Ok(outcome);
                }
                Err(SendError::Fallback(reason)) => {
                    return self.fall_back(files, run_id, observer, &reason);
                }
                Err(SendError::Worker(err)) => {
                    warn!(run_id, "worker batch failed: {err}");
                    self.supervisor.record_dispatch();
                    self.supervisor.record_failure(&err);
                    if let Err(restart_err) = self.supervisor.restart() {
                        let reason = format!("{err}; {restart_err}");
                        return self.fall_back(files, run_id, observer, &reason);
                    }
                }
            }
        }
    }

    fn worker_record(&self) -> Option<WorkerRecord> {
        Some(self.supervisor.record())
    }
}

/// Pick the processing strategy for this session.
pub fn select_strategy(
    config: &PipelineConfig,
    hasher: Arc<dyn ContentHasher>,
) -> Result<Box<dyn ProcessingStrategy>, PipelineError> {
    let spawner = ThreadSpawner::new(
        Arc::clone(&hasher),
        config.hashing.effective_threads(),
        Duration::from_millis(config.hashing.progress_interval_ms),
    );
    select_strategy_with(config, hasher, Box::new(spawner))
}

/// [`select_strategy`] with a caller-supplied worker spawner.
pub fn select_strategy_with(
    config: &PipelineConfig,
    hasher: Arc<dyn ContentHasher>,
    spawner: Box<dyn WorkerSpawner>,
) -> Result<Box<dyn ProcessingStrategy>, PipelineError> {
    let fallback = SyncStrategy::new(
        hasher,
        config.hashing.effective_threads(),
        Duration::from_millis(config.hashing.progress_interval_ms),
    )?;
    if !config.worker.enabled {
        info!("background worker disabled, using main-thread strategy");
        return Ok(Box::new(fallback));
    }

    let supervisor = WorkerSupervisor::start(spawner, config.worker.clone());
    if !supervisor.is_available() {
        warn!("background worker unavailable, using main-thread strategy");
        supervisor.shutdown();
        return Ok(Box::new(fallback));
    }
    supervisor.start_monitor();
    Ok(Box::new(WorkerStrategy::new(
        supervisor,
        fallback,
        config.worker.clone(),
    )))
}
