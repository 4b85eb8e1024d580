/// Cloud-stall detection.
///
/// Cloud "files-on-demand" folders can hand back a directory reader that
/// never yields a page. The walk would then hang with no error. The
/// detector watches the innermost active directory only: after an initial
/// delay it samples how many files have been discovered, and once enough
/// samples are in it decides whether the directory is progressing,
/// completed, or stalled. A stalled directory has its cancel token fired;
/// the walker skips it and carries on with its siblings.
///
/// When a child is cancelled, its parent becomes innermost again and gets
/// a fresh sampling window.
pub mod detector;
pub mod tracker;

pub use detector::{StallDetector, StallVerdict};
pub use tracker::{ActiveScope, WalkTracker};

use crate::config::StallPolicy;
use crate::progress::WalkProgress;
use crossbeam_channel::{RecvTimeoutError, Sender};
use serde::Serialize;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Why a folder was left out of the walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StallDiagnostic {
    /// Selection-relative folder path.
    pub folder: String,
    pub elapsed_ms: u64,
    pub samples: usize,
    pub message: String,
}

impl StallDiagnostic {
    pub fn new(folder: &str, elapsed_ms: u64, samples: usize) -> Self {
        Self {
            folder: folder.to_owned(),
            elapsed_ms,
            samples,
            message: format!(
                "'{folder}' yielded no files after {:.1}s; it is most likely stored only in the cloud (files-on-demand) and was skipped",
                elapsed_ms as f64 / 1000.0
            ),
        }
    }
}

/// The sampling window for one innermost-directory generation.
struct Window {
    generation: u64,
    path: String,
    started: Instant,
    baseline: usize,
    next_sample: Instant,
    detector: StallDetector,
    settled: bool,
}

/// Runs the detector on its own thread until stopped.
pub struct StallSampler {
    stop_tx: Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl StallSampler {
    /// Start sampling `tracker`. `tick` bounds how late a sample can be.
    pub fn spawn(
        tracker: Arc<WalkTracker>,
        policy: StallPolicy,
        tick: Duration,
    ) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let tick = tick.max(Duration::from_millis(1));
        let join = thread::Builder::new()
            .name("dropsift-stall".into())
            .spawn(move || {
                let mut window: Option<Window> = None;
                loop {
                    match stop_rx.recv_timeout(tick) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    sample_once(&tracker, &policy, &mut window);
                }
            })?;
        Ok(Self {
            stop_tx,
            join: Some(join),
        })
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                warn!("stall sampler panicked");
            }
        }
    }
}

impl Drop for StallSampler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn sample_once(tracker: &WalkTracker, policy: &StallPolicy, window: &mut Option<Window>) {
    let Some((generation, scope)) = tracker.innermost() else {
        *window = None;
        return;
    };

    let now = Instant::now();
    let fresh = window.as_ref().map_or(true, |w| w.generation != generation);
    if fresh {
        *window = Some(Window {
            generation,
            path: scope.path,
            started: now,
            baseline: tracker.discovered(),
            next_sample: now + policy.initial_delay(),
            detector: StallDetector::new(policy.clone()),
            settled: false,
        });
    }
    let Some(w) = window.as_mut() else {
        return;
    };
    if w.settled || now < w.next_sample {
        return;
    }

    let sample = WalkProgress {
        elapsed_ms: now.duration_since(w.started).as_millis() as u64,
        files_discovered: tracker.discovered().saturating_sub(w.baseline),
    };
    let verdict = w.detector.observe(sample, tracker.is_finished());
    match verdict {
        StallVerdict::Pending => w.next_sample = now + policy.sample_interval(),
        StallVerdict::Progressing | StallVerdict::Completed => {
            debug!(folder = %w.path, ?verdict, "stall detector standing down");
            w.settled = true;
        }
        StallVerdict::Stalled => {
            w.settled = true;
            if tracker.cancel_if_current(w.generation) {
                let diagnostic =
                    StallDiagnostic::new(&w.path, sample.elapsed_ms, w.detector.samples().len());
                warn!("{}", diagnostic.message);
                tracker.push_stall(diagnostic);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::walker::CancelToken;

    fn fast_policy() -> StallPolicy {
        StallPolicy {
            enabled: true,
            initial_delay_ms: 20,
            sample_interval_ms: 10,
            sample_count: 3,
            min_elapsed_ms: 60,
        }
    }

    fn wait_until(mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn silent_directory_is_cancelled() {
        let tracker = Arc::new(WalkTracker::new());
        let root = CancelToken::new();
        let child = root.child();
        tracker.enter("sel", root.clone());
        tracker.enter("sel/cloud", child.clone());

        let sampler =
            StallSampler::spawn(Arc::clone(&tracker), fast_policy(), Duration::from_millis(2))
                .unwrap();
        assert!(wait_until(|| child.is_cancelled()));
        sampler.stop();

        assert!(!root.is_cancelled());
        let diagnostic = tracker.take_stall("sel/cloud").unwrap();
        assert!(diagnostic.elapsed_ms >= 60);
        assert!(diagnostic.message.contains("cloud"));
    }

    #[test]
    fn discovering_directory_is_left_alone() {
        let tracker = Arc::new(WalkTracker::new());
        let token = CancelToken::new();
        tracker.enter("sel/local", token.clone());

        let sampler =
            StallSampler::spawn(Arc::clone(&tracker), fast_policy(), Duration::from_millis(2))
                .unwrap();
        for _ in 0..30 {
            tracker.record_file();
            thread::sleep(Duration::from_millis(5));
        }
        sampler.stop();
        assert!(!token.is_cancelled());
        assert!(tracker.take_stall("sel/local").is_none());
    }

    /// After a stalled child is popped, the parent gets a new window.
    #[test]
    fn parent_window_restarts_after_child() {
        let policy = fast_policy();
        let tracker = WalkTracker::new();
        let parent = CancelToken::new();
        tracker.enter("sel", parent.clone());
        let mut window = None;

        sample_once(&tracker, &policy, &mut window);
        let first = window.as_ref().map(|w| w.generation);

        tracker.enter("sel/cloud", parent.child());
        tracker.exit();
        sample_once(&tracker, &policy, &mut window);
        let w = window.as_ref().unwrap();
        assert_ne!(Some(w.generation), first);
        assert_eq!(w.path, "sel");
        assert!(w.detector.samples().is_empty());
    }
}
