/// End-to-end tests for walk → deduplicate → render on real temp trees.
///
/// Each test builds its own folder, drives a [`Pipeline`] the way the CLI
/// does, and checks the classified queue.
use dropsift_core::config::PipelineConfig;
use dropsift_core::dedup::ProcessingPath;
use dropsift_core::hash::{ContentHasher, CountingHasher, Sha256Hasher};
use dropsift_core::progress::{channel_observer, PipelineEvent};
use dropsift_core::render::{QueueItem, QueueRenderer, QueueView, UploadQueue};
use dropsift_core::report::write_queue_csv;
use dropsift_core::worker::{
    SyncStrategy, WorkerHandle, WorkerRequest, WorkerSpawner, WorkerStrategy, WorkerSupervisor,
};
use dropsift_core::{
    FileReference, FileStatus, Pipeline, PipelineObserver, SilentObserver, WorkerError,
};
use parking_lot::Mutex;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

// ── Helpers ──────────────────────────────────────────────────────────

fn write_file(path: &Path, bytes: &[u8], modified_secs: u64) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, bytes).unwrap();
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(modified_secs))
        .unwrap();
}

fn main_thread_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.worker.enabled = false;
    config
}

fn worker_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.worker.health_check_interval_ms = 0;
    config.worker.health_check_timeout_ms = 50;
    config.worker.restart_backoff_ms = 0;
    config
}

/// A main-thread pipeline whose hasher counts calls.
fn counting_pipeline() -> (Pipeline, Arc<CountingHasher<Sha256Hasher>>) {
    let config = main_thread_config();
    let counter = Arc::new(CountingHasher::new(Sha256Hasher::default()));
    let hasher: Arc<dyn ContentHasher> = counter.clone();
    let strategy = SyncStrategy::new(hasher, 2, Duration::ZERO).unwrap();
    (Pipeline::with_strategy(config, Box::new(strategy)).unwrap(), counter)
}

fn paths(files: &[FileReference]) -> Vec<String> {
    let mut out: Vec<_> = files.iter().map(|f| f.path.clone()).collect();
    out.sort_unstable();
    out
}

/// A small tree with one duplicate pair, one same-file pair and noise.
fn mixed_tree(root: &Path) {
    write_file(&root.join("a/holiday.jpg"), b"beach beach beach", 2_000);
    write_file(&root.join("b/holiday-copy.jpg"), b"beach beach beach", 1_000);
    write_file(&root.join("a/notes.txt"), b"same notes", 500);
    write_file(&root.join("c/notes.txt"), b"same notes", 500);
    write_file(&root.join("c/unique.bin"), b"nothing else is this long", 10);
    write_file(&root.join("d/lookalike.txt"), b"beach beach beacH", 10);
}

/// Workers that never reply.
struct DeafSpawner;

impl WorkerSpawner for DeafSpawner {
    fn spawn(&self, worker_id: u64) -> Result<WorkerHandle, WorkerError> {
        let (tx, rx) = crossbeam_channel::unbounded::<WorkerRequest>();
        let join = thread::spawn(move || {
            let mut held = Vec::new();
            for request in rx.iter() {
                held.push(request.reply);
            }
        });
        Ok(WorkerHandle::new(worker_id, tx, Some(join)))
    }
}

#[derive(Default)]
struct FallbackLog {
    reasons: Mutex<Vec<String>>,
}

impl PipelineObserver for FallbackLog {
    fn on_fallback(&self, reason: &str) {
        self.reasons.lock().push(reason.to_owned());
    }
}

// ── Scenarios ────────────────────────────────────────────────────────

#[test]
fn distinct_sizes_are_never_hashed() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("sizes");
    for i in 0..20 {
        write_file(&root.join(format!("f{i:02}.dat")), &vec![b'x'; i + 1], 100);
    }
    let (pipeline, counter) = counting_pipeline();

    let walked = pipeline.walk_selection(&root, &SilentObserver);
    assert_eq!(walked.files.len(), 20);
    let outcome = pipeline.run_deduplication(walked.files, &SilentObserver).unwrap();

    assert_eq!(counter.calls(), 0);
    assert_eq!(outcome.report.hashes_computed, 0);
    assert_eq!(outcome.report.unique_by_size, 20);
    assert_eq!(outcome.ready.len(), 20);
    assert!(outcome.duplicate.is_empty());
    assert!(outcome.ready.iter().all(|f| f.status() == Some(FileStatus::Ready)));
}

#[test]
fn same_file_from_two_folders_collapses_to_one_ready() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("twice");
    write_file(&root.join("left/report.pdf"), b"%PDF quarterly", 1_700_000_000);
    write_file(&root.join("right/report.pdf"), b"%PDF quarterly", 1_700_000_000);
    let (pipeline, _) = counting_pipeline();

    let walked = pipeline.walk_selection(&root, &SilentObserver);
    let outcome = pipeline.run_deduplication(walked.files, &SilentObserver).unwrap();

    assert_eq!(outcome.ready.len(), 1);
    assert!(outcome.duplicate.is_empty());
    assert_eq!(outcome.report.collapsed, 1);
    assert_eq!(outcome.ready[0].file_name(), "report.pdf");
}

#[test]
fn earlier_modified_copy_is_kept() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("copies");
    write_file(&root.join("new.jpg"), b"identical pixels", 1_700_000_000);
    write_file(&root.join("old.jpg"), b"identical pixels", 1_500_000_000);
    let (pipeline, counter) = counting_pipeline();

    let walked = pipeline.walk_selection(&root, &SilentObserver);
    let outcome = pipeline.run_deduplication(walked.files, &SilentObserver).unwrap();

    assert_eq!(counter.calls(), 2);
    assert_eq!(paths(&outcome.ready), vec!["copies/old.jpg"]);
    assert_eq!(paths(&outcome.duplicate), vec!["copies/new.jpg"]);
    assert_eq!(outcome.report.duplicate_groups, 1);
    let kept = &outcome.ready[0];
    let dropped = &outcome.duplicate[0];
    assert_eq!(kept.hash(), dropped.hash());
    assert!(kept.hash().is_some());
}

#[test]
fn unhealthy_worker_run_uses_main_thread() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("mixed");
    mixed_tree(&root);

    let config = worker_config();
    let supervisor = WorkerSupervisor::start(Box::new(DeafSpawner), config.worker.clone());
    for _ in 0..3 {
        assert!(!supervisor.check_health());
    }
    let hasher: Arc<dyn ContentHasher> = Arc::new(Sha256Hasher::default());
    let fallback = SyncStrategy::new(hasher, 2, Duration::ZERO).unwrap();
    let strategy = WorkerStrategy::new(supervisor, fallback, config.worker.clone());
    let pipeline = Pipeline::with_strategy(config, Box::new(strategy)).unwrap();
    let log = FallbackLog::default();

    let walked = pipeline.walk_selection(&root, &SilentObserver);
    let outcome = pipeline.run_deduplication(walked.files, &log).unwrap();

    assert_eq!(outcome.report.path, ProcessingPath::MainThread);
    assert_eq!(log.reasons.lock().len(), 1);
    assert_eq!(
        paths(&outcome.duplicate),
        vec!["mixed/a/holiday.jpg".to_owned()]
    );
    assert_eq!(outcome.ready.len(), 4);
    assert_eq!(outcome.report.collapsed, 1);
    assert_eq!(pipeline.worker_record().unwrap().stats.fallbacks, 1);
}

// ── Properties ───────────────────────────────────────────────────────

#[test]
fn worker_and_main_thread_agree_on_real_tree() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("mixed");
    mixed_tree(&root);

    let on_worker = Pipeline::new(worker_config()).unwrap();
    let on_main = Pipeline::new(main_thread_config()).unwrap();
    assert_eq!(on_worker.strategy_name(), "worker");

    let files = on_main.walk_selection(&root, &SilentObserver).files;
    let a = on_worker.run_deduplication(files.clone(), &SilentObserver).unwrap();
    let b = on_main.run_deduplication(files, &SilentObserver).unwrap();

    assert_eq!(a.report.path, ProcessingPath::Worker);
    assert_eq!(b.report.path, ProcessingPath::MainThread);
    assert_eq!(paths(&a.ready), paths(&b.ready));
    assert_eq!(paths(&a.duplicate), paths(&b.duplicate));
    assert_eq!(a.report.hashes_computed, b.report.hashes_computed);
}

#[test]
fn repeated_runs_classify_identically() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("mixed");
    mixed_tree(&root);
    let pipeline = Pipeline::new(main_thread_config()).unwrap();
    let files = pipeline.walk_selection(&root, &SilentObserver).files;

    let first = pipeline.run_deduplication(files.clone(), &SilentObserver).unwrap();
    let second = pipeline.run_deduplication(files, &SilentObserver).unwrap();

    let indices = |v: &[FileReference]| v.iter().map(|f| f.original_index).collect::<Vec<_>>();
    assert_eq!(indices(&first.ready), indices(&second.ready));
    assert_eq!(indices(&first.duplicate), indices(&second.duplicate));
}

#[test]
fn tie_break_is_stable_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("ties");
    // Same content and mtime, different names: the name decides.
    write_file(&root.join("b.png"), b"same bytes here", 1_000);
    write_file(&root.join("a.png"), b"same bytes here", 1_000);
    write_file(&root.join("c.png"), b"same bytes here", 1_000);
    let pipeline = Pipeline::new(main_thread_config()).unwrap();
    let files = pipeline.walk_selection(&root, &SilentObserver).files;

    for _ in 0..5 {
        let outcome = pipeline.run_deduplication(files.clone(), &SilentObserver).unwrap();
        assert_eq!(paths(&outcome.ready), vec!["ties/a.png"]);
        assert_eq!(outcome.duplicate.len(), 2);
    }
}

/// Counts every replace and keeps the last one.
#[derive(Default)]
struct RecordingView {
    passes: usize,
    last: Vec<QueueItem>,
}

impl QueueView for RecordingView {
    fn replace_all(&mut self, items: &[QueueItem]) {
        self.passes += 1;
        self.last = items.to_vec();
    }
}

#[test]
fn rendered_queue_matches_classification_above_and_below_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("mixed");
    mixed_tree(&root);
    let pipeline = Pipeline::new(main_thread_config()).unwrap();
    let files = pipeline.walk_selection(&root, &SilentObserver).files;
    let outcome = pipeline.run_deduplication(files, &SilentObserver).unwrap();

    let mut expected: Vec<_> = outcome
        .ready
        .iter()
        .chain(outcome.duplicate.iter())
        .map(|f| f.path.clone())
        .collect();
    expected.sort_unstable();

    let mut whole = RecordingView::default();
    assert_eq!(pipeline.render(&outcome, &mut whole), 1);

    let mut chunked = RecordingView::default();
    let renderer = QueueRenderer::new(dropsift_core::config::RenderConfig {
        chunk_threshold: 2,
        initial_chunk: 1,
        chunk_pause_ms: 0,
    });
    assert_eq!(renderer.materialize(&outcome.ready, &outcome.duplicate, &mut chunked), 2);

    for view in [&whole, &chunked] {
        let mut got: Vec<_> = view.last.iter().map(|i| i.path.clone()).collect();
        got.sort_unstable();
        assert_eq!(got, expected);
    }
    assert_eq!(chunked.passes, 2);
}

#[test]
fn queue_exports_as_csv() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("mixed");
    mixed_tree(&root);
    let pipeline = Pipeline::new(main_thread_config()).unwrap();
    let files = pipeline.walk_selection(&root, &SilentObserver).files;
    let outcome = pipeline.run_deduplication(files, &SilentObserver).unwrap();
    let mut queue = UploadQueue::new();
    pipeline.render(&outcome, &mut queue);

    let mut buf = Vec::new();
    write_queue_csv(queue.items(), &mut buf).unwrap();
    let text = String::from_utf8(buf).unwrap();

    assert_eq!(text.lines().count(), queue.len() + 1);
    assert_eq!(text.lines().filter(|l| l.contains(",duplicate,")).count(), 1);
    assert!(text.contains("mixed/b/holiday-copy.jpg"));
}

#[test]
fn observer_sees_walk_and_hash_progress() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("mixed");
    mixed_tree(&root);
    let pipeline = Pipeline::new(main_thread_config()).unwrap();
    let (observer, rx) = channel_observer();

    let files = pipeline.walk_selection(&root, &observer).files;
    pipeline.run_deduplication(files, &observer).unwrap();

    let events: Vec<_> = rx.try_iter().collect();
    let last_walk = events.iter().rev().find_map(|e| match e {
        PipelineEvent::Walk(p) => Some(*p),
        _ => None,
    });
    assert_eq!(last_walk.map(|p| p.files_discovered), Some(6));
    assert!(events.iter().any(|e| matches!(e, PipelineEvent::Hash(_))));
    assert!(!events
        .iter()
        .any(|e| matches!(e, PipelineEvent::SkippedFolder(_) | PipelineEvent::Fallback { .. })));
}

#[test]
fn unreadable_file_is_reported_and_kept_ready() {
    let (pipeline, _) = counting_pipeline();
    let dir = tempfile::tempdir().unwrap();
    let present = dir.path().join("here.txt");
    write_file(&present, b"four", 1);
    let files = vec![
        FileReference::new(
            Arc::new(dropsift_core::model::DiskFile::new(&present)),
            0,
            "sel/here.txt",
            dropsift_core::model::FileMetadata::new("here.txt", 4, 1_000),
        ),
        FileReference::new(
            Arc::new(dropsift_core::model::DiskFile::new(dir.path().join("gone.txt"))),
            1,
            "sel/gone.txt",
            dropsift_core::model::FileMetadata::new("gone.txt", 4, 2_000),
        ),
    ];
    let (observer, rx) = channel_observer();

    let outcome = pipeline.run_deduplication(files, &observer).unwrap();

    assert_eq!(outcome.ready.len(), 2);
    assert_eq!(outcome.report.hash_failures.len(), 1);
    assert_eq!(outcome.report.hash_failures[0].path, "sel/gone.txt");
    assert!(rx
        .try_iter()
        .any(|e| matches!(e, PipelineEvent::HashingFailed { path, .. } if path == "sel/gone.txt")));
}
