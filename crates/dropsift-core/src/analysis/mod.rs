/// Pre-flight analysis of a selection.
///
/// Cheap to compute (sizes only, nothing is read) and used to tell the user
/// how much work deduplication will be before it starts.
use crate::model::FileReference;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

/// Calibrated per-item costs, in microseconds.
///
/// Measured on real uploads: size analysis is per file, hashing is per
/// duplicate candidate, and resolution/queue building is per file.
const SIZE_ANALYSIS_US_PER_FILE: u64 = 10;
const HASHING_US_PER_CANDIDATE: u64 = 4_843;
const RESOLUTION_US_PER_FILE: u64 = 4_186;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessingEstimate {
    pub size_analysis: Duration,
    pub hashing: Duration,
    pub resolution: Duration,
}

impl ProcessingEstimate {
    pub fn total(&self) -> Duration {
        self.size_analysis + self.hashing + self.resolution
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FolderAnalysis {
    pub total_files: usize,
    pub total_bytes: u64,
    /// Files sharing their byte size with at least one other file.
    pub duplicate_candidates: usize,
    /// Distinct sizes held by more than one file.
    pub colliding_sizes: usize,
    pub estimate: ProcessingEstimate,
}

/// Expected wall time for a run over `files` files with `candidates` to hash.
pub fn estimate_processing_time(files: usize, candidates: usize) -> ProcessingEstimate {
    let files = files as u64;
    let candidates = candidates as u64;
    ProcessingEstimate {
        size_analysis: Duration::from_micros(files * SIZE_ANALYSIS_US_PER_FILE),
        hashing: Duration::from_micros(candidates * HASHING_US_PER_CANDIDATE),
        resolution: Duration::from_micros(files * RESOLUTION_US_PER_FILE),
    }
}

pub fn analyze_selection(files: &[FileReference]) -> FolderAnalysis {
    let mut by_size: HashMap<u64, usize> = HashMap::with_capacity(files.len());
    let mut total_bytes = 0u64;
    for file in files {
        *by_size.entry(file.size()).or_default() += 1;
        total_bytes += file.size();
    }
    let (colliding_sizes, duplicate_candidates) = by_size
        .values()
        .filter(|&&n| n > 1)
        .fold((0, 0), |(sizes, files), &n| (sizes + 1, files + n));

    FolderAnalysis {
        total_files: files.len(),
        total_bytes,
        duplicate_candidates,
        colliding_sizes,
        estimate: estimate_processing_time(files.len(), duplicate_candidates),
    }
}

/// Human-readable byte count, binary units with short labels.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit >= 2 {
        format!("{value:.2} {}", UNITS[unit])
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// `1.2s`, `3m 04s`: coarse enough for an estimate.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else {
        format!("{}m {:02}s", secs / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_uses_three_phases() {
        let e = estimate_processing_time(1_000, 200);
        assert_eq!(e.size_analysis, Duration::from_millis(10));
        assert_eq!(e.hashing, Duration::from_micros(968_600));
        assert_eq!(e.resolution, Duration::from_millis(4_186));
        assert_eq!(e.total(), Duration::from_micros(5_164_600));
    }

    #[test]
    fn analysis_counts_size_collisions() {
        let files = vec![
            FileReference::in_memory(0, "s/a", &b"1234"[..], 0),
            FileReference::in_memory(1, "s/b", &b"5678"[..], 0),
            FileReference::in_memory(2, "s/c", &b"90"[..], 0),
            FileReference::in_memory(3, "s/d", &b"ab"[..], 0),
            FileReference::in_memory(4, "s/e", &b"x"[..], 0),
        ];
        let a = analyze_selection(&files);
        assert_eq!(a.total_files, 5);
        assert_eq!(a.total_bytes, 13);
        assert_eq!(a.duplicate_candidates, 4);
        assert_eq!(a.colliding_sizes, 2);
    }

    #[test]
    fn sizes_format_with_units() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(1_073_741_824), "1.00 GB");
    }

    #[test]
    fn durations_format_coarsely() {
        assert_eq!(format_duration(Duration::from_millis(1_240)), "1.2s");
        assert_eq!(format_duration(Duration::from_secs(184)), "3m 04s");
    }
}
