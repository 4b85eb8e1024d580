/// Background deduplication worker.
///
/// - [`protocol`]: request/response messages.
/// - [`thread`]: the worker loop and how it is spawned.
/// - [`supervisor`]: lifecycle, health checks, restarts, statistics.
/// - [`channel`]: one request, one terminal response, with a timeout.
/// - [`strategy`]: worker-backed or main-thread processing, chosen once.
pub mod channel;
pub mod protocol;
pub mod strategy;
pub mod supervisor;
pub mod thread;

pub use channel::{SendError, SendOptions, WorkerChannel};
pub use protocol::{RequestKind, ResponseKind, WorkerRequest, WorkerResponse};
pub use strategy::{
    select_strategy, select_strategy_with, ProcessingStrategy, SyncStrategy, WorkerStrategy,
};
pub use supervisor::{
    Endpoint, EndpointGate, ErrorLogEntry, Gate, HealthState, WorkerRecord, WorkerStats,
    WorkerSupervisor,
};
pub use thread::{ThreadSpawner, WorkerHandle, WorkerSpawner};
