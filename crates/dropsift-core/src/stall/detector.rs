/// Progress-rate classification of one directory window.
///
/// The detector is a pure state machine: feed it samples, read the
/// verdict. It never looks at the clock itself, so the threshold rules can
/// be tested without sleeping.
use crate::config::StallPolicy;
use crate::progress::WalkProgress;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallVerdict {
    /// Not enough evidence yet; sample again after the interval.
    Pending,
    /// Files are arriving (or already arrived). Stand down.
    Progressing,
    /// The directory finished enumerating. Stand down.
    Completed,
    /// Nothing discovered for at least the minimum elapsed time.
    Stalled,
}

#[derive(Debug, Clone)]
pub struct StallDetector {
    policy: StallPolicy,
    samples: Vec<WalkProgress>,
}

impl StallDetector {
    pub fn new(policy: StallPolicy) -> Self {
        Self {
            samples: Vec::with_capacity(policy.sample_count),
            policy,
        }
    }

    /// Samples seen so far, oldest first.
    pub fn samples(&self) -> &[WalkProgress] {
        &self.samples
    }

    /// Files per second across the last `sample_count` samples.
    pub fn discovery_rate(&self) -> f64 {
        let window = self.policy.sample_count.max(2);
        if self.samples.len() < 2 {
            return 0.0;
        }
        let first = self.samples[self.samples.len().saturating_sub(window)];
        let last = self.samples[self.samples.len() - 1];
        let dt = last.elapsed_ms.saturating_sub(first.elapsed_ms);
        if dt == 0 {
            return 0.0;
        }
        let df = last.files_discovered.saturating_sub(first.files_discovered);
        df as f64 * 1000.0 / dt as f64
    }

    /// Append a sample and classify.
    pub fn observe(&mut self, sample: WalkProgress, walk_completed: bool) -> StallVerdict {
        self.samples.push(sample);
        if walk_completed {
            return StallVerdict::Completed;
        }
        if self.samples.len() < self.policy.sample_count {
            return StallVerdict::Pending;
        }
        if self.discovery_rate() > 0.0 || sample.files_discovered > 0 {
            return StallVerdict::Progressing;
        }
        if sample.elapsed_ms >= self.policy.min_elapsed_ms {
            StallVerdict::Stalled
        } else {
            StallVerdict::Pending
        }
    }
}
