/// Content deduplication (size-first, then full SHA-256).
///
/// Strategy:
/// 1. Group files by exact byte size. A file with a unique size cannot be a
///    duplicate and goes straight to `ready` without being read.
/// 2. Hash every member of a size group with two or more files. Members are
///    hashed on a bounded rayon pool.
/// 3. Group hashed files by `digest:size`. A singleton is unique.
/// 4. Inside a hash group, files with identical (name, size, mtime) are the
///    same file selected twice: they collapse to one representative and are
///    never reported as duplicates. If several distinct files remain, the
///    best copy (see [`selection`]) is `ready` and the rest are `duplicate`.
///
/// A file that fails to hash is passed through to `ready` unhashed.
pub mod selection;

use crate::error::{HashingError, ValidationError};
use crate::hash::{bucket_key, ContentHasher};
use crate::model::{FileReference, FileStatus, IdentityKey};
use crate::progress::{HashProgress, Throttle};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub use selection::{select_best, selection_order};

/// Which path produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingPath {
    Worker,
    MainThread,
}

/// Wall time spent in each phase of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PhaseTimings {
    pub size_analysis: Duration,
    pub hashing: Duration,
    pub resolution: Duration,
    pub total: Duration,
}

/// Explicit per-run state threaded through one deduplication.
///
/// Replaces any process-wide timing state: everything a run measures lives
/// here and is returned in the [`DedupReport`].
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: u64,
    started: Instant,
    pub timings: PhaseTimings,
}

impl RunContext {
    pub fn new(run_id: u64) -> Self {
        Self {
            run_id,
            started: Instant::now(),
            timings: PhaseTimings::default(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// A per-file hashing failure, absorbed into the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HashFailure {
    pub path: String,
    pub message: String,
}

/// What one deduplication run did.
#[derive(Debug, Clone, Serialize)]
pub struct DedupReport {
    pub run_id: u64,
    pub path: ProcessingPath,
    pub files_in: usize,
    /// Files that skipped hashing because their size was unique.
    pub unique_by_size: usize,
    pub hashes_computed: usize,
    pub hash_failures: Vec<HashFailure>,
    /// Extra copies of the same file selected twice, silently dropped.
    pub collapsed: usize,
    /// Hash groups that contained more than one distinct file.
    pub duplicate_groups: usize,
    pub timings: PhaseTimings,
}

/// Classified result of one run.
#[derive(Debug, Clone)]
pub struct DedupOutcome {
    pub ready: Vec<FileReference>,
    pub duplicate: Vec<FileReference>,
    pub report: DedupReport,
}

/// Final fate of each input slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fate {
    Ready,
    Duplicate,
    Collapsed,
}

/// Reject malformed input before any work is done.
pub fn validate_input(files: &[FileReference]) -> Result<(), ValidationError> {
    let mut seen = HashSet::with_capacity(files.len());
    for (index, file) in files.iter().enumerate() {
        if file.file_name().is_empty() {
            return Err(ValidationError::EmptyFileName { index });
        }
        let invalid = |reason| ValidationError::InvalidPath {
            index,
            path: file.path.clone(),
            reason,
        };
        if file.path.is_empty() {
            return Err(invalid("path is empty"));
        }
        if file.path.starts_with('/') {
            return Err(invalid("path must be relative to the selection"));
        }
        if file.path.contains('\\') {
            return Err(invalid("path must use '/' separators"));
        }
        if file.path.split('/').any(|c| c == ".." || c.is_empty()) {
            return Err(invalid("path has an empty or parent component"));
        }
        if !seen.insert(file.original_index) {
            return Err(ValidationError::DuplicateIndex {
                original_index: file.original_index,
            });
        }
    }
    Ok(())
}

/// Classify `files` into ready and duplicate.
///
/// `progress` is called at most once per `progress_interval` (plus a final
/// update) from whichever pool thread finished a digest.
pub fn deduplicate(
    mut files: Vec<FileReference>,
    hasher: &dyn ContentHasher,
    pool: &rayon::ThreadPool,
    ctx: &mut RunContext,
    path: ProcessingPath,
    progress_interval: Duration,
    progress: &(dyn Fn(HashProgress) + Sync),
) -> DedupOutcome {
    let files_in = files.len();
    let mut fate = vec![Fate::Ready; files_in];

    // ── Phase 1: size partition ─────────────────────────────────────────
    let phase = Instant::now();
    let mut by_size: HashMap<u64, Vec<usize>> = HashMap::with_capacity(files_in);
    for (slot, file) in files.iter().enumerate() {
        by_size.entry(file.size()).or_default().push(slot);
    }
    let mut candidates: Vec<usize> = by_size
        .values()
        .filter(|slots| slots.len() > 1)
        .flatten()
        .copied()
        .collect();
    candidates.sort_unstable();
    let unique_by_size = files_in - candidates.len();
    ctx.timings.size_analysis = phase.elapsed();
    debug!(
        run_id = ctx.run_id,
        "size analysis: {} files, {} unique by size, {} candidates",
        files_in,
        unique_by_size,
        candidates.len()
    );

    // ── Phase 2: hash verification ──────────────────────────────────────
    let phase = Instant::now();
    let total = candidates.len();
    let done = AtomicUsize::new(0);
    let throttle = Throttle::new(progress_interval);
    let digests: Vec<(usize, Result<String, HashingError>)> = {
        let files = &files;
        pool.install(|| {
            candidates
                .par_iter()
                .map(|&slot| {
                    let result = hasher.digest(&files[slot]);
                    let current = done.fetch_add(1, Ordering::Relaxed) + 1;
                    if throttle.ready(current == total) {
                        progress(HashProgress::new(current, total, files[slot].path.clone()));
                    }
                    (slot, result)
                })
                .collect()
        })
    };
    ctx.timings.hashing = phase.elapsed();

    // ── Phase 3: hash partition ─────────────────────────────────────────
    let phase = Instant::now();
    let mut hash_failures = Vec::new();
    let mut by_hash: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (slot, result) in digests {
        match result {
            Ok(digest) => {
                let key = bucket_key(&digest, files[slot].size());
                files[slot].set_hash(digest);
                by_hash.entry(key).or_default().push(slot);
            }
            Err(err) => {
                warn!("hashing failed, passing file through as unique: {err}");
                hash_failures.push(HashFailure {
                    path: err.path().to_owned(),
                    message: err.to_string(),
                });
            }
        }
    }

    // ── Phase 4: same-file vs duplicate resolution ──────────────────────
    let mut collapsed = 0usize;
    let mut duplicate_groups = 0usize;
    for slots in by_hash.values().filter(|slots| slots.len() > 1) {
        let mut by_identity: BTreeMap<IdentityKey, Vec<usize>> = BTreeMap::new();
        for &slot in slots {
            by_identity
                .entry(files[slot].identity_key())
                .or_default()
                .push(slot);
        }

        // One representative per identity: the earliest selected copy.
        let mut representatives = Vec::with_capacity(by_identity.len());
        for members in by_identity.values() {
            let keep = members
                .iter()
                .copied()
                .min_by_key(|&slot| files[slot].original_index)
                .unwrap_or(members[0]);
            for &slot in members {
                if slot != keep {
                    fate[slot] = Fate::Collapsed;
                    collapsed += 1;
                }
            }
            representatives.push(keep);
        }

        if representatives.len() > 1 {
            duplicate_groups += 1;
            let best = select_best(representatives.iter().copied(), |&slot| &files[slot])
                .unwrap_or(representatives[0]);
            for &slot in &representatives {
                if slot != best {
                    fate[slot] = Fate::Duplicate;
                }
            }
        }
    }

    let mut ready = Vec::with_capacity(files_in);
    let mut duplicate = Vec::new();
    for (mut file, fate) in files.into_iter().zip(fate) {
        match fate {
            Fate::Ready => {
                file.classify(FileStatus::Ready);
                ready.push(file);
            }
            Fate::Duplicate => {
                file.classify(FileStatus::Duplicate);
                duplicate.push(file);
            }
            Fate::Collapsed => {}
        }
    }
    ready.sort_by_key(|f| f.original_index);
    duplicate.sort_by_key(|f| f.original_index);
    ctx.timings.resolution = phase.elapsed();
    ctx.timings.total = ctx.elapsed();

    debug!(
        run_id = ctx.run_id,
        "resolution: {} ready, {} duplicate, {} collapsed in {:?}",
        ready.len(),
        duplicate.len(),
        collapsed,
        ctx.timings.total
    );

    DedupOutcome {
        ready,
        duplicate,
        report: DedupReport {
            run_id: ctx.run_id,
            path,
            files_in,
            unique_by_size,
            hashes_computed: total,
            hash_failures,
            collapsed,
            duplicate_groups,
            timings: ctx.timings,
        },
    }
}

/// Build the bounded pool used for hashing.
pub fn hashing_pool(threads: usize, name: &str) -> Result<rayon::ThreadPool, rayon::ThreadPoolBuildError> {
    let prefix = name.to_owned();
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .thread_name(move |i| format!("{prefix}-{i}"))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{CountingHasher, Sha256Hasher};
    use std::io;
    use std::sync::Arc;

    fn run(files: Vec<FileReference>, hasher: &dyn ContentHasher) -> DedupOutcome {
        let pool = hashing_pool(2, "test-hash").unwrap();
        let mut ctx = RunContext::new(1);
        deduplicate(
            files,
            hasher,
            &pool,
            &mut ctx,
            ProcessingPath::MainThread,
            Duration::ZERO,
            &|_| {},
        )
    }

    fn indices(files: &[FileReference]) -> Vec<usize> {
        files.iter().map(|f| f.original_index).collect()
    }

    /// Twenty distinct sizes: nothing is hashed and everything is ready.
    #[test]
    fn unique_sizes_are_never_hashed() {
        let files: Vec<_> = (0..20)
            .map(|i| FileReference::in_memory(i, &format!("f{i}.bin"), vec![0u8; i + 1], 0))
            .collect();
        let hasher = CountingHasher::new(Sha256Hasher::default());
        let out = run(files, &hasher);
        assert_eq!(hasher.calls(), 0);
        assert_eq!(out.ready.len(), 20);
        assert!(out.duplicate.is_empty());
        assert_eq!(out.report.unique_by_size, 20);
        assert!(out.ready.iter().all(|f| f.hash().is_none()));
    }

    /// Same size, different content: both hashed, both ready.
    #[test]
    fn size_collision_with_different_content() {
        let files = vec![
            FileReference::in_memory(0, "a.bin", &b"aaaa"[..], 0),
            FileReference::in_memory(1, "b.bin", &b"bbbb"[..], 0),
            FileReference::in_memory(2, "c.bin", &b"unique size"[..], 0),
        ];
        let hasher = CountingHasher::new(Sha256Hasher::default());
        let out = run(files, &hasher);
        assert_eq!(hasher.calls(), 2);
        assert_eq!(indices(&out.ready), vec![0, 1, 2]);
        assert!(out.ready[0].hash().is_some());
        assert!(out.ready[2].hash().is_none());
    }

    /// The same file picked up twice collapses without a duplicate entry.
    #[test]
    fn same_file_selected_twice_collapses() {
        let files = vec![
            FileReference::in_memory(0, "one/photo.jpg", &b"pixels"[..], 1_000),
            FileReference::in_memory(1, "two/photo.jpg", &b"pixels"[..], 1_000),
        ];
        let out = run(files, &Sha256Hasher::default());
        assert_eq!(indices(&out.ready), vec![0]);
        assert!(out.duplicate.is_empty());
        assert_eq!(out.report.collapsed, 1);
        assert_eq!(out.report.duplicate_groups, 0);
    }

    /// Same content, different mtime: the earlier copy is kept.
    #[test]
    fn earlier_copy_wins_over_later() {
        let files = vec![
            FileReference::in_memory(0, "new.jpg", &b"pixels"[..], 2_000),
            FileReference::in_memory(1, "old.jpg", &b"pixels"[..], 1_000),
        ];
        let out = run(files, &Sha256Hasher::default());
        assert_eq!(indices(&out.ready), vec![1]);
        assert_eq!(indices(&out.duplicate), vec![0]);
        assert_eq!(out.ready[0].status(), Some(FileStatus::Ready));
        assert_eq!(out.duplicate[0].status(), Some(FileStatus::Duplicate));
    }

    /// Collapsed copies and true duplicates in one hash group.
    #[test]
    fn mixed_group_collapses_then_selects() {
        let files = vec![
            FileReference::in_memory(0, "a/x.txt", &b"same"[..], 50),
            FileReference::in_memory(1, "b/x.txt", &b"same"[..], 50),
            FileReference::in_memory(2, "c/y.txt", &b"same"[..], 10),
        ];
        let out = run(files, &Sha256Hasher::default());
        assert_eq!(indices(&out.ready), vec![2]);
        assert_eq!(indices(&out.duplicate), vec![0]);
        assert_eq!(out.report.collapsed, 1);
    }

    #[derive(Debug)]
    struct Unreadable;

    impl crate::model::FileSource for Unreadable {
        fn open(&self) -> io::Result<Box<dyn io::Read + Send>> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "locked"))
        }
    }

    /// A hashing failure passes the file through instead of aborting.
    #[test]
    fn hash_failure_passes_file_through() {
        let broken = FileReference::new(
            Arc::new(Unreadable),
            0,
            "locked.bin",
            crate::model::FileMetadata::new("locked.bin", 4, 0),
        );
        let files = vec![
            broken,
            FileReference::in_memory(1, "ok.bin", &b"abcd"[..], 0),
        ];
        let out = run(files, &Sha256Hasher::default());
        assert_eq!(indices(&out.ready), vec![0, 1]);
        assert_eq!(out.report.hash_failures.len(), 1);
        assert_eq!(out.report.hash_failures[0].path, "locked.bin");
        assert!(out.ready[0].hash().is_none());
    }

    /// Identical metadata for every file except index: stable result.
    #[test]
    fn repeated_runs_pick_same_representative() {
        let make = || {
            (0..6)
                .map(|i| {
                    FileReference::in_memory(i, &format!("dir{i}/n{}.dat", i % 3), &b"blob"[..], 5)
                })
                .collect::<Vec<_>>()
        };
        let first = run(make(), &Sha256Hasher::default());
        for _ in 0..5 {
            let again = run(make(), &Sha256Hasher::default());
            assert_eq!(indices(&again.ready), indices(&first.ready));
            assert_eq!(indices(&again.duplicate), indices(&first.duplicate));
        }
        assert_eq!(first.ready.len(), 1);
    }

    #[test]
    fn progress_reaches_total() {
        let files = vec![
            FileReference::in_memory(0, "a.bin", &b"aa"[..], 0),
            FileReference::in_memory(1, "b.bin", &b"bb"[..], 0),
        ];
        let pool = hashing_pool(1, "test-hash").unwrap();
        let mut ctx = RunContext::new(9);
        let last = parking_lot::Mutex::new(None);
        let out = deduplicate(
            files,
            &Sha256Hasher::default(),
            &pool,
            &mut ctx,
            ProcessingPath::MainThread,
            Duration::from_secs(60),
            &|p| *last.lock() = Some(p),
        );
        let last = last.into_inner().unwrap();
        assert_eq!(last.current, 2);
        assert_eq!(last.total, 2);
        assert_eq!(out.report.run_id, 9);
    }

    #[test]
    fn validation_rejects_bad_paths_and_indices() {
        let ok = FileReference::in_memory(0, "a/b.txt", &b"x"[..], 0);
        assert!(validate_input(std::slice::from_ref(&ok)).is_ok());

        let abs = FileReference::in_memory(0, "/etc/passwd", &b"x"[..], 0);
        assert!(matches!(
            validate_input(&[abs]),
            Err(ValidationError::InvalidPath { .. })
        ));

        let escape = FileReference::in_memory(0, "a/../b.txt", &b"x"[..], 0);
        assert!(validate_input(&[escape]).is_err());

        let twin = FileReference::in_memory(0, "c.txt", &b"y"[..], 0);
        assert_eq!(
            validate_input(&[ok, twin]),
            Err(ValidationError::DuplicateIndex { original_index: 0 })
        );
    }
}
