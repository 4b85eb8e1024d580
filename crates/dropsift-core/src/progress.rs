/// Progress reporting: push-style hooks for walking and hashing.
///
/// Callers implement [`PipelineObserver`] (every hook defaults to a no-op)
/// and inject it once per call. [`ChannelObserver`] forwards every hook as
/// a [`PipelineEvent`] over a bounded crossbeam channel for frontends that
/// drain events once per frame.
use crate::stall::StallDiagnostic;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use serde::Serialize;
use std::time::{Duration, Instant};

/// Maximum number of events that may queue up in an observer channel.
///
/// Events are sent with `try_send`; a frontend that falls behind loses
/// intermediate progress rather than stalling the pipeline.
pub const EVENT_CHANNEL_CAPACITY: usize = 4_096;

/// Hashing progress, emitted at a throttled rate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HashProgress {
    pub current: usize,
    pub total: usize,
    pub percentage: f32,
    pub current_file: String,
}

impl HashProgress {
    pub fn new(current: usize, total: usize, current_file: impl Into<String>) -> Self {
        let percentage = if total == 0 {
            100.0
        } else {
            (current as f32 / total as f32 * 100.0).min(100.0)
        };
        Self {
            current,
            total,
            percentage,
            current_file: current_file.into(),
        }
    }
}

/// One sample of a running walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WalkProgress {
    pub elapsed_ms: u64,
    pub files_discovered: usize,
}

/// Named hooks the pipeline calls while it runs.
pub trait PipelineObserver: Send + Sync {
    fn on_walk_progress(&self, _progress: &WalkProgress) {}
    fn on_skipped_folder(&self, _diagnostic: &StallDiagnostic) {}
    fn on_hash_progress(&self, _progress: &HashProgress) {}
    fn on_hashing_failure(&self, _path: &str, _message: &str) {}
    fn on_fallback(&self, _reason: &str) {}
}

/// Observer that ignores everything.
pub struct SilentObserver;

impl PipelineObserver for SilentObserver {}

/// Every observer hook as a message.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Walk(WalkProgress),
    SkippedFolder(StallDiagnostic),
    Hash(HashProgress),
    HashingFailed { path: String, message: String },
    Fallback { reason: String },
}

/// Forwards hooks into a bounded channel.
pub struct ChannelObserver {
    tx: Sender<PipelineEvent>,
}

impl ChannelObserver {
    pub fn new(tx: Sender<PipelineEvent>) -> Self {
        Self { tx }
    }

    fn push(&self, event: PipelineEvent) {
        let _ = self.tx.try_send(event);
    }
}

/// Create a channel observer and the receiver that drains it.
pub fn channel_observer() -> (ChannelObserver, Receiver<PipelineEvent>) {
    let (tx, rx) = crossbeam_channel::bounded(EVENT_CHANNEL_CAPACITY);
    (ChannelObserver::new(tx), rx)
}

impl PipelineObserver for ChannelObserver {
    fn on_walk_progress(&self, progress: &WalkProgress) {
        self.push(PipelineEvent::Walk(*progress));
    }

    fn on_skipped_folder(&self, diagnostic: &StallDiagnostic) {
        self.push(PipelineEvent::SkippedFolder(diagnostic.clone()));
    }

    fn on_hash_progress(&self, progress: &HashProgress) {
        self.push(PipelineEvent::Hash(progress.clone()));
    }

    fn on_hashing_failure(&self, path: &str, message: &str) {
        self.push(PipelineEvent::HashingFailed {
            path: path.to_owned(),
            message: message.to_owned(),
        });
    }

    fn on_fallback(&self, reason: &str) {
        self.push(PipelineEvent::Fallback {
            reason: reason.to_owned(),
        });
    }
}

/// Rate limiter shared by every thread that reports the same counter.
///
/// The final update (`current == total`) always passes.
pub struct Throttle {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /// `true` if an update should be emitted now.
    pub fn ready(&self, is_final: bool) -> bool {
        let now = Instant::now();
        let mut last = self.last.lock();
        let due = match *last {
            None => true,
            Some(prev) => now.duration_since(prev) >= self.interval,
        };
        if due || is_final {
            *last = Some(now);
            true
        } else {
            false
        }
    }
}
