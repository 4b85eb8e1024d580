/// The two entry points: walk a selection, deduplicate a file list.
///
/// A [`Pipeline`] is built once per session. It picks the processing
/// strategy up front (worker or main thread) and hands out run ids, so
/// every deduplication carries its own [`crate::dedup::RunContext`].
use crate::config::PipelineConfig;
use crate::dedup::{validate_input, DedupOutcome};
use crate::error::PipelineError;
use crate::hash::{ContentHasher, Sha256Hasher};
use crate::model::FileReference;
use crate::progress::PipelineObserver;
use crate::render::{QueueRenderer, QueueView};
use crate::walker::{CancelToken, DirectoryHandle, FolderWalker, FsDirectory, WalkOutcome};
use crate::worker::{select_strategy, ProcessingStrategy, WorkerRecord};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

pub struct Pipeline {
    config: PipelineConfig,
    strategy: Box<dyn ProcessingStrategy>,
    walker: FolderWalker,
    renderer: QueueRenderer,
    next_run_id: AtomicU64,
}

impl Pipeline {
    /// Build a pipeline with the SHA-256 hasher and the best available strategy.
    ///
    /// The config is validated before any worker is spawned.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let hasher: Arc<dyn ContentHasher> = Arc::new(Sha256Hasher::new(config.hashing.buffer_size));
        let strategy = select_strategy(&config, hasher)?;
        Self::with_strategy(config, strategy)
    }

    pub fn with_strategy(
        config: PipelineConfig,
        strategy: Box<dyn ProcessingStrategy>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        info!("Processing strategy: {}", strategy.name());
        Ok(Self {
            walker: FolderWalker::new(config.walker.clone(), config.stall.clone()),
            renderer: QueueRenderer::new(config.render.clone()),
            config,
            strategy,
            next_run_id: AtomicU64::new(1),
        })
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn worker_record(&self) -> Option<WorkerRecord> {
        self.strategy.worker_record()
    }

    /// Walk a local folder.
    pub fn walk_selection(&self, root: &Path, observer: &dyn PipelineObserver) -> WalkOutcome {
        let root = Arc::new(FsDirectory::new(root, self.config.walker.page_size));
        self.walk_directory(root, &CancelToken::new(), observer)
    }

    /// Walk any host directory handle under the caller's cancel token.
    pub fn walk_directory(
        &self,
        root: Arc<dyn DirectoryHandle>,
        cancel: &CancelToken,
        observer: &dyn PipelineObserver,
    ) -> WalkOutcome {
        self.walker.walk(root, cancel, observer)
    }

    /// Classify `files` into ready and duplicate.
    ///
    /// Fails only on malformed input or when no processing path is left.
    /// Per-file hashing failures are reported to the observer and in the
    /// outcome's report.
    pub fn run_deduplication(
        &self,
        files: Vec<FileReference>,
        observer: &dyn PipelineObserver,
    ) -> Result<DedupOutcome, PipelineError> {
        validate_input(&files)?;
        let run_id = self.next_run_id.fetch_add(1, Ordering::Relaxed);
        info!(run_id, "Deduplicating {} files", files.len());

        let outcome = self.strategy.process(files, run_id, observer)?;
        for failure in &outcome.report.hash_failures {
            observer.on_hashing_failure(&failure.path, &failure.message);
        }
        info!(
            run_id,
            "Deduplication done: {} ready, {} duplicate, {} collapsed in {:?} ({:?})",
            outcome.ready.len(),
            outcome.duplicate.len(),
            outcome.report.collapsed,
            outcome.report.timings.total,
            outcome.report.path
        );
        Ok(outcome)
    }

    /// Materialise a classified outcome into `view`. Returns the pass count.
    pub fn render(&self, outcome: &DedupOutcome, view: &mut dyn QueueView) -> usize {
        self.renderer
            .materialize(&outcome.ready, &outcome.duplicate, view)
    }
}
