/// Worker lifecycle and health.
///
/// The supervisor is the single owner of the [`WorkerRecord`]. It creates
/// the worker, pings it on a fixed interval, counts consecutive failed
/// pings, and restarts it (terminate, then re-spawn) up to a fixed number
/// of attempts. Callers never touch the record; the request/response side
/// only asks the narrow [`EndpointGate`] question "is there a usable
/// endpoint right now?".
///
/// Health state machine:
///
/// ```text
///            N consecutive failed pings
///   Healthy ─────────────────────────────► Unhealthy
///      ▲                                      │
///      └──── successful ping / restart ───────┘
/// ```
///
/// A worker busy with a batch does not answer pings until the batch ends,
/// so pings are skipped while a batch is outstanding; the batch deadline
/// covers liveness in that window.
///
/// A failed re-spawn leaves the worker stopped but restartable. Exceeding
/// the restart ceiling makes it permanently unavailable for the session;
/// every caller then takes the main-thread path.
use super::protocol::{RequestKind, ResponseKind, WorkerRequest, WorkerResponse};
use super::thread::{WorkerHandle, WorkerSpawner};
use crate::config::WorkerConfig;
use crate::error::WorkerError;
use chrono::{DateTime, Local};
use crossbeam_channel::{RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Correlation ids for health pings start here, well clear of batch ids.
const HEALTH_ID_BASE: u64 = 1 << 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

/// Running counters for the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub batches_sent: u64,
    pub batches_completed: u64,
    pub batches_failed: u64,
    pub timeouts: u64,
    pub health_checks: u64,
    pub health_failures: u64,
    pub restarts: u64,
    pub fallbacks: u64,
    pub last_batch_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorLogEntry {
    pub at: DateTime<Local>,
    pub worker_id: u64,
    pub message: String,
}

/// Everything the supervisor knows about its worker.
#[derive(Debug, Clone)]
pub struct WorkerRecord {
    /// Id of the current (or last) worker instance.
    pub id: u64,
    pub restart_attempts: u32,
    pub last_restart_at: Option<Instant>,
    pub error_log: VecDeque<ErrorLogEntry>,
    pub stats: WorkerStats,
    pub health: HealthState,
    pub consecutive_health_failures: u32,
    /// `false` once init failed with no restart left, or restarts ran out.
    pub available: bool,
}

/// A usable way to reach the worker right now.
#[derive(Clone)]
pub struct Endpoint {
    pub worker_id: u64,
    pub tx: Sender<WorkerRequest>,
}

/// Answer to "can I dispatch right now?".
pub enum Gate {
    Ready(Endpoint),
    /// Not a hard failure: the caller should take the fallback path.
    Unavailable(String),
}

/// The only thing the request/response channel needs from lifecycle management.
pub trait EndpointGate: Send + Sync {
    fn acquire(&self, allow_unhealthy: bool) -> Gate;
    fn next_request_id(&self) -> u64;
}

struct Inner {
    record: WorkerRecord,
    handle: Option<WorkerHandle>,
    next_worker_id: u64,
}

pub struct WorkerSupervisor {
    spawner: Box<dyn WorkerSpawner>,
    config: WorkerConfig,
    inner: Mutex<Inner>,
    next_request_id: AtomicU64,
    next_health_id: AtomicU64,
    batches_in_flight: AtomicUsize,
    monitor: Mutex<Option<MonitorHandle>>,
}

/// Marks a batch as outstanding until dropped.
pub struct BatchGuard<'a> {
    supervisor: &'a WorkerSupervisor,
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.supervisor.batches_in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Stops the periodic health monitor when dropped.
struct MonitorHandle {
    stop_tx: Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(join) = self.join.take() {
            // Never join from the monitor thread itself.
            if join.thread().id() != thread::current().id() {
                let _ = join.join();
            }
        }
    }
}

impl WorkerSupervisor {
    /// Create the supervisor and try to spawn the first worker.
    ///
    /// A failed first spawn is recorded, not returned: the supervisor
    /// simply reports itself unavailable so callers fall back.
    pub fn start(spawner: Box<dyn WorkerSpawner>, config: WorkerConfig) -> Arc<Self> {
        let first = spawner.spawn(1);
        let mut record = WorkerRecord {
            id: 1,
            restart_attempts: 0,
            last_restart_at: None,
            error_log: VecDeque::with_capacity(config.error_log_capacity),
            stats: WorkerStats::default(),
            health: HealthState::Healthy,
            consecutive_health_failures: 0,
            available: true,
        };
        let handle = match first {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!("worker failed to initialise: {e}");
                record.available = false;
                push_error(&mut record, config.error_log_capacity, 1, e.to_string());
                None
            }
        };

        Arc::new(Self {
            spawner,
            config,
            inner: Mutex::new(Inner {
                record,
                handle,
                next_worker_id: 2,
            }),
            next_request_id: AtomicU64::new(1),
            next_health_id: AtomicU64::new(HEALTH_ID_BASE),
            batches_in_flight: AtomicUsize::new(0),
            monitor: Mutex::new(None),
        })
    }

    /// Start pinging the worker every `health_check_interval_ms`.
    ///
    /// The monitor holds only a weak reference, so dropping the last
    /// strong `Arc` ends it.
    pub fn start_monitor(self: &Arc<Self>) {
        let interval = Duration::from_millis(self.config.health_check_interval_ms);
        if interval.is_zero() {
            return;
        }
        let weak: Weak<Self> = Arc::downgrade(self);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let spawned = thread::Builder::new()
            .name("dropsift-health".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
                let Some(supervisor) = weak.upgrade() else {
                    break;
                };
                supervisor.monitor_tick();
            });
        match spawned {
            Ok(join) => {
                *self.monitor.lock() = Some(MonitorHandle {
                    stop_tx,
                    join: Some(join),
                });
            }
            Err(e) => warn!("health monitor could not start: {e}"),
        }
    }

    /// One monitor iteration: ping, and restart if the worker went unhealthy
    /// or is not running after a failed re-spawn.
    fn monitor_tick(&self) {
        if self.is_busy() {
            return;
        }
        let (restartable, running) = {
            let inner = self.inner.lock();
            (inner.record.available, inner.handle.is_some())
        };
        if !restartable {
            return;
        }
        if running {
            self.check_health();
        }
        if !running || self.health() == HealthState::Unhealthy {
            if let Err(e) = self.restart() {
                warn!("health monitor could not restart worker: {e}");
            }
        }
    }

    /// Mark a batch as outstanding for the lifetime of the guard.
    pub fn begin_batch(&self) -> BatchGuard<'_> {
        self.batches_in_flight.fetch_add(1, Ordering::AcqRel);
        BatchGuard { supervisor: self }
    }

    /// `true` while at least one batch is outstanding.
    pub fn is_busy(&self) -> bool {
        self.batches_in_flight.load(Ordering::Acquire) > 0
    }

    /// Ping the worker once and update the health state.
    ///
    /// Returns `false` only for a failed ping. While a batch is outstanding
    /// the worker is not pinged and the health state is left as it is.
    pub fn check_health(&self) -> bool {
        if self.is_busy() {
            debug!("worker busy with a batch, health check deferred");
            return true;
        }
        let endpoint = {
            let mut inner = self.inner.lock();
            inner.record.stats.health_checks += 1;
            match (&inner.handle, inner.record.available) {
                (Some(handle), true) => Some(Endpoint {
                    worker_id: handle.worker_id,
                    tx: handle.sender(),
                }),
                _ => None,
            }
        };

        let outcome = match endpoint {
            Some(endpoint) => self.ping(&endpoint),
            None => Err(WorkerError::NotReady),
        };

        let mut inner = self.inner.lock();
        let capacity = self.config.error_log_capacity;
        let record = &mut inner.record;
        match outcome {
            Ok(()) => {
                if record.health == HealthState::Unhealthy {
                    info!(worker_id = record.id, "worker healthy again");
                }
                record.consecutive_health_failures = 0;
                record.health = HealthState::Healthy;
                true
            }
            // A batch dispatched while the ping was queued delays the pong.
            Err(_) if self.is_busy() => true,
            Err(e) => {
                record.stats.health_failures += 1;
                record.consecutive_health_failures += 1;
                let id = record.id;
                push_error(record, capacity, id, format!("health check failed: {e}"));
                if record.consecutive_health_failures >= self.config.unhealthy_threshold
                    && record.health == HealthState::Healthy
                {
                    warn!(
                        worker_id = record.id,
                        "worker unhealthy after {} failed health checks",
                        record.consecutive_health_failures
                    );
                    record.health = HealthState::Unhealthy;
                }
                false
            }
        }
    }

    fn ping(&self, endpoint: &Endpoint) -> Result<(), WorkerError> {
        let id = self.next_health_id.fetch_add(1, Ordering::Relaxed);
        let timeout = Duration::from_millis(self.config.health_check_timeout_ms);
        let (reply, rx) = crossbeam_channel::bounded::<WorkerResponse>(1);
        endpoint
            .tx
            .send_timeout(
                WorkerRequest {
                    id,
                    kind: RequestKind::HealthCheck,
                    reply,
                },
                timeout,
            )
            .map_err(|_| WorkerError::Disconnected)?;
        match rx.recv_timeout(timeout) {
            Ok(WorkerResponse {
                id: got,
                kind: ResponseKind::HealthCheckResponse { .. },
            }) if got == id => Ok(()),
            Ok(resp) => Err(WorkerError::MalformedResponse {
                expected: id,
                actual: resp.id,
            }),
            Err(RecvTimeoutError::Timeout) => Err(WorkerError::Timeout {
                request_id: id,
                timeout,
            }),
            Err(RecvTimeoutError::Disconnected) => Err(WorkerError::Disconnected),
        }
    }

    /// Terminate the current worker and spawn a fresh one.
    ///
    /// Each call consumes one attempt. Waits `restart_backoff_ms * 2^n`
    /// before re-spawning, where `n` is the number of earlier attempts.
    pub fn restart(&self) -> Result<(), WorkerError> {
        let (old, attempt, worker_id) = {
            let mut inner = self.inner.lock();
            let record = &mut inner.record;
            if record.restart_attempts >= self.config.max_restart_attempts {
                if record.available {
                    error!(
                        "worker restarts exhausted after {} attempts, using main thread for the rest of the session",
                        record.restart_attempts
                    );
                }
                record.available = false;
                return Err(WorkerError::RestartsExhausted {
                    attempts: record.restart_attempts,
                });
            }
            record.restart_attempts += 1;
            record.stats.restarts += 1;
            record.last_restart_at = Some(Instant::now());
            let attempt = record.restart_attempts;
            let worker_id = inner.next_worker_id;
            inner.next_worker_id += 1;
            (inner.handle.take(), attempt, worker_id)
        };

        if let Some(old) = old {
            old.terminate();
        }

        let backoff = Duration::from_millis(
            self.config
                .restart_backoff_ms
                .saturating_mul(1u64 << (attempt - 1).min(16)),
        );
        if !backoff.is_zero() {
            debug!("waiting {backoff:?} before restart attempt {attempt}");
            thread::sleep(backoff);
        }

        let spawned = self.spawner.spawn(worker_id);
        let mut inner = self.inner.lock();
        let capacity = self.config.error_log_capacity;
        match spawned {
            Ok(handle) => {
                info!(worker_id, attempt, "worker restarted");
                inner.handle = Some(handle);
                let record = &mut inner.record;
                record.id = worker_id;
                record.health = HealthState::Healthy;
                record.consecutive_health_failures = 0;
                record.available = true;
                Ok(())
            }
            Err(e) => {
                let record = &mut inner.record;
                record.id = worker_id;
                record.health = HealthState::Unhealthy;
                // Stay restartable while attempts remain.
                if record.restart_attempts >= self.config.max_restart_attempts {
                    error!(
                        worker_id,
                        "worker re-spawn failed on the last attempt, using main thread for the rest of the session"
                    );
                    record.available = false;
                } else {
                    warn!(worker_id, attempt, "worker re-spawn failed: {e}");
                }
                push_error(record, capacity, worker_id, format!("restart failed: {e}"));
                Err(e)
            }
        }
    }

    /// Record a failed batch in the error log and counters.
    pub fn record_failure(&self, err: &WorkerError) {
        let mut inner = self.inner.lock();
        let capacity = self.config.error_log_capacity;
        let record = &mut inner.record;
        record.stats.batches_failed += 1;
        if matches!(err, WorkerError::Timeout { .. }) {
            record.stats.timeouts += 1;
        }
        let id = record.id;
        push_error(record, capacity, id, err.to_string());
    }

    pub fn record_dispatch(&self) {
        self.inner.lock().record.stats.batches_sent += 1;
    }

    /// A completed batch also proves the worker is alive.
    pub fn record_success(&self, elapsed: Duration) {
        let mut inner = self.inner.lock();
        let record = &mut inner.record;
        record.stats.batches_completed += 1;
        record.stats.last_batch_ms = elapsed.as_millis() as u64;
        record.consecutive_health_failures = 0;
    }

    pub fn record_fallback(&self) {
        self.inner.lock().record.stats.fallbacks += 1;
    }

    pub fn health(&self) -> HealthState {
        self.inner.lock().record.health
    }

    /// `true` if a worker is running and usable for this session.
    pub fn is_available(&self) -> bool {
        let inner = self.inner.lock();
        inner.record.available && inner.handle.is_some()
    }

    /// `true` if the last re-spawn failed but attempts remain.
    pub fn needs_restart(&self) -> bool {
        let inner = self.inner.lock();
        inner.record.available && inner.handle.is_none()
    }

    /// Snapshot of the record for statistics and diagnostics.
    pub fn record(&self) -> WorkerRecord {
        self.inner.lock().record.clone()
    }

    /// Stop the monitor and terminate the worker.
    pub fn shutdown(&self) {
        drop(self.monitor.lock().take());
        let handle = {
            let mut inner = self.inner.lock();
            inner.record.available = false;
            inner.handle.take()
        };
        if let Some(handle) = handle {
            handle.terminate();
        }
    }
}

impl EndpointGate for WorkerSupervisor {
    fn acquire(&self, allow_unhealthy: bool) -> Gate {
        let inner = self.inner.lock();
        let record = &inner.record;
        if !record.available {
            return Gate::Unavailable("worker unavailable for this session".into());
        }
        if record.health == HealthState::Unhealthy && !allow_unhealthy {
            return Gate::Unavailable(format!(
                "worker unhealthy after {} failed health checks",
                record.consecutive_health_failures
            ));
        }
        match &inner.handle {
            Some(handle) => Gate::Ready(Endpoint {
                worker_id: handle.worker_id,
                tx: handle.sender(),
            }),
            None => Gate::Unavailable("worker not running".into()),
        }
    }

    fn next_request_id(&self) -> u64 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }
}

impl Drop for WorkerSupervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn push_error(record: &mut WorkerRecord, capacity: usize, worker_id: u64, message: String) {
    if capacity == 0 {
        return;
    }
    while record.error_log.len() >= capacity {
        record.error_log.pop_front();
    }
    record.error_log.push_back(ErrorLogEntry {
        at: Local::now(),
        worker_id,
        message,
    });
}
