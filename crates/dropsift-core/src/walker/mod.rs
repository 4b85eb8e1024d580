/// Folder walker: recursive enumeration through the host's paged reader.
///
/// Every call into the host (open a directory, read a page, resolve a file)
/// runs on a [`lane::ReadLane`] while the walker waits with a short poll so
/// it can notice cancellation. Each directory gets a child [`CancelToken`];
/// the stall sampler fires that token when the directory stops producing
/// files, and the walker then records the folder as skipped and moves on
/// to its siblings. Cancelling the walk's own token stops everything and
/// returns what was gathered so far.
///
/// Paths are POSIX-style and relative to the selection, starting with the
/// root folder's name: `Photos/2024/img.jpg`.
pub mod cancel;
pub mod fs;
pub mod host;
pub mod lane;
pub mod skipped;

pub use cancel::CancelToken;
pub use fs::FsDirectory;
pub use host::{DirEntry, DirectoryHandle, EntryReader, FileEntry, ResolvedFile};
pub use crate::platform::FileAttributes;
pub use skipped::SkippedFolderSet;

use crate::config::{StallPolicy, WalkerConfig};
use crate::model::{FileMetadata, FileReference};
use crate::progress::{PipelineObserver, Throttle, WalkProgress};
use crate::stall::{StallDiagnostic, StallSampler, WalkTracker};
use crossbeam_channel::RecvTimeoutError;
use lane::ReadLane;
use parking_lot::Mutex;
use serde::Serialize;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// OS metadata files that host selection dialogs never hand over.
const SYSTEM_FILE_NAMES: [&str; 3] = ["thumbs.db", "desktop.ini", ".ds_store"];

/// `true` for OS metadata files such as `Thumbs.db`.
pub fn is_system_file(name: &str) -> bool {
    SYSTEM_FILE_NAMES.contains(&name.to_lowercase().as_str())
}

/// `true` for editor temp files (`~$draft.tmp`).
pub fn is_temporary_file(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.starts_with('~') && lower.ends_with(".tmp")
}

/// `true` for Unix-style hidden files.
pub fn is_dot_file(name: &str) -> bool {
    name.starts_with('.')
}

/// Why a file was left out of the walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    Hidden,
    System,
    Temporary,
    CloudPlaceholder,
}

/// Filters that need only the name, checked before touching the host.
fn filter_by_name(config: &WalkerConfig, name: &str) -> Option<FilterReason> {
    if config.skip_system_files && is_system_file(name) {
        Some(FilterReason::System)
    } else if config.skip_temporary_files && is_temporary_file(name) {
        Some(FilterReason::Temporary)
    } else if config.skip_hidden_files && is_dot_file(name) {
        Some(FilterReason::Hidden)
    } else {
        None
    }
}

fn filter_by_attributes(config: &WalkerConfig, attrs: &FileAttributes) -> Option<FilterReason> {
    if config.skip_hidden_files && attrs.hidden {
        Some(FilterReason::Hidden)
    } else if config.skip_system_files && attrs.system {
        Some(FilterReason::System)
    } else if config.skip_temporary_files && attrs.temporary {
        Some(FilterReason::Temporary)
    } else if config.skip_cloud_placeholders && attrs.cloud_placeholder {
        Some(FilterReason::CloudPlaceholder)
    } else {
        None
    }
}

/// Result of one walk. Never an error: problems are counted or diagnosed.
#[derive(Debug, Clone, Default)]
pub struct WalkOutcome {
    /// Discovered files, `original_index` assigned in discovery order.
    pub files: Vec<FileReference>,
    pub skipped: SkippedFolderSet,
    pub diagnostics: Vec<StallDiagnostic>,
    /// The caller's token was cancelled before the walk finished.
    pub cancelled: bool,
    /// Every file left out of `files` by a filter.
    pub filtered: usize,
    pub hidden_files: usize,
    pub system_files: usize,
    pub temporary_files: usize,
    /// Cloud placeholders seen (kept or not).
    pub placeholders: usize,
    /// Directories or files the host failed to read.
    pub read_errors: usize,
    pub elapsed: Duration,
}

/// Counters only, for summaries.
#[derive(Debug, Clone, Serialize)]
pub struct WalkSummary {
    pub files: usize,
    pub skipped_folders: Vec<String>,
    pub cancelled: bool,
    pub filtered: usize,
    pub hidden_files: usize,
    pub system_files: usize,
    pub temporary_files: usize,
    pub placeholders: usize,
    pub read_errors: usize,
    pub elapsed_ms: u64,
}

impl WalkOutcome {
    pub fn summary(&self) -> WalkSummary {
        WalkSummary {
            files: self.files.len(),
            skipped_folders: self.skipped.iter().map(str::to_owned).collect(),
            cancelled: self.cancelled,
            filtered: self.filtered,
            hidden_files: self.hidden_files,
            system_files: self.system_files,
            temporary_files: self.temporary_files,
            placeholders: self.placeholders,
            read_errors: self.read_errors,
            elapsed_ms: self.elapsed.as_millis() as u64,
        }
    }

    fn record_filtered(&mut self, reason: FilterReason) {
        self.filtered += 1;
        match reason {
            FilterReason::Hidden => self.hidden_files += 1,
            FilterReason::System => self.system_files += 1,
            FilterReason::Temporary => self.temporary_files += 1,
            FilterReason::CloudPlaceholder => {}
        }
    }
}

#[derive(Debug, Clone)]
pub struct FolderWalker {
    config: WalkerConfig,
    stall: StallPolicy,
}

impl FolderWalker {
    pub fn new(config: WalkerConfig, stall: StallPolicy) -> Self {
        Self { config, stall }
    }

    /// Walk `root` on the calling thread.
    pub fn walk(
        &self,
        root: Arc<dyn DirectoryHandle>,
        cancel: &CancelToken,
        observer: &dyn PipelineObserver,
    ) -> WalkOutcome {
        let started = Instant::now();
        let poll = Duration::from_millis(self.config.poll_interval_ms.max(1));
        let tracker = Arc::new(WalkTracker::new());

        let sampler = if self.stall.enabled {
            match StallSampler::spawn(Arc::clone(&tracker), self.stall.clone(), poll) {
                Ok(sampler) => Some(sampler),
                Err(e) => {
                    warn!("stall sampler could not start, walking without it: {e}");
                    None
                }
            }
        } else {
            None
        };
        let lane = match ReadLane::spawn(0) {
            Ok(lane) => Some(lane),
            Err(e) => {
                warn!("I/O lane could not start, reading on the walker thread: {e}");
                None
            }
        };

        let mut walk = Walk {
            config: &self.config,
            observer,
            tracker: Arc::clone(&tracker),
            lane,
            lanes_spawned: 0,
            poll,
            throttle: Throttle::new(Duration::from_millis(self.config.progress_interval_ms)),
            started,
            out: WalkOutcome::default(),
        };

        let root_name = root.name().to_owned();
        let root_path = if is_valid_name(&root_name) {
            root_name
        } else {
            "selection".to_owned()
        };
        info!("Walking '{root_path}'");
        walk.walk_dir(root, root_path, cancel.child());

        tracker.finish();
        if let Some(sampler) = sampler {
            sampler.stop();
        }

        let mut out = walk.out;
        if !out.skipped.is_empty() {
            // Files found inside a folder before it stalled go too.
            out.files.retain(|f| !out.skipped.covers(&f.path));
            for (index, file) in out.files.iter_mut().enumerate() {
                file.original_index = index;
            }
        }
        out.cancelled = cancel.is_cancelled();
        out.elapsed = started.elapsed();
        observer.on_walk_progress(&WalkProgress {
            elapsed_ms: out.elapsed.as_millis() as u64,
            files_discovered: out.files.len(),
        });
        info!(
            "Walk finished: {} files, {} skipped folders, {} filtered in {:?}{}",
            out.files.len(),
            out.skipped.len(),
            out.filtered,
            out.elapsed,
            if out.cancelled { " (cancelled)" } else { "" }
        );
        out
    }
}

/// Result of waiting on the I/O lane.
enum Awaited<T> {
    Done(T),
    /// The token fired while waiting; the lane was replaced.
    Cancelled,
    /// The job panicked or the lane died.
    Lost,
}

struct Walk<'a> {
    config: &'a WalkerConfig,
    observer: &'a dyn PipelineObserver,
    tracker: Arc<WalkTracker>,
    lane: Option<ReadLane>,
    lanes_spawned: u32,
    poll: Duration,
    throttle: Throttle,
    started: Instant,
    out: WalkOutcome,
}

impl Walk<'_> {
    fn walk_dir(&mut self, dir: Arc<dyn DirectoryHandle>, path: String, token: CancelToken) {
        let entered = Instant::now();
        self.tracker.enter(&path, token.clone());
        self.read_dir(dir, &path, &token);
        self.tracker.exit();

        // Only the stall sampler cancels a directory token directly.
        if token.is_cancelled() && !token.parent_cancelled() {
            let diagnostic = self.tracker.take_stall(&path).unwrap_or_else(|| {
                StallDiagnostic::new(&path, entered.elapsed().as_millis() as u64, 0)
            });
            self.out.skipped.insert(path);
            self.observer.on_skipped_folder(&diagnostic);
            self.out.diagnostics.push(diagnostic);
        }
    }

    fn read_dir(&mut self, dir: Arc<dyn DirectoryHandle>, path: &str, token: &CancelToken) {
        let reader = match self.on_lane(token, move || dir.open_reader()) {
            Awaited::Done(Ok(reader)) => Arc::new(Mutex::new(reader)),
            Awaited::Done(Err(e)) => {
                warn!("Cannot open '{path}': {e}");
                self.out.read_errors += 1;
                return;
            }
            Awaited::Lost => {
                warn!("Reader for '{path}' crashed while opening");
                self.out.read_errors += 1;
                return;
            }
            Awaited::Cancelled => return,
        };

        loop {
            if token.is_cancelled() {
                return;
            }
            let pending = Arc::clone(&reader);
            let page = match self.on_lane(token, move || {
                let mut reader = pending.lock();
                reader.read_page()
            }) {
                Awaited::Done(Ok(page)) => page,
                Awaited::Done(Err(e)) => {
                    warn!("Read of '{path}' failed part-way: {e}");
                    self.out.read_errors += 1;
                    return;
                }
                Awaited::Lost => {
                    warn!("Reader for '{path}' crashed");
                    self.out.read_errors += 1;
                    return;
                }
                Awaited::Cancelled => return,
            };
            if page.is_empty() {
                return;
            }

            for entry in page {
                if token.is_cancelled() {
                    return;
                }
                match entry {
                    DirEntry::File(file) => self.visit_file(file, path, token),
                    DirEntry::Directory(child) => {
                        let name = child.name().to_owned();
                        if !is_valid_name(&name) {
                            warn!("Skipping folder with unusable name {name:?} in '{path}'");
                            continue;
                        }
                        self.walk_dir(child, format!("{path}/{name}"), token.child());
                    }
                }
            }
        }
    }

    fn visit_file(&mut self, file: Arc<dyn FileEntry>, dir: &str, token: &CancelToken) {
        let name = file.name().to_owned();
        if !is_valid_name(&name) {
            warn!("Skipping file with unusable name {name:?} in '{dir}'");
            return;
        }
        if let Some(reason) = filter_by_name(self.config, &name) {
            trace!("filtered {reason:?} file {dir}/{name}");
            self.out.record_filtered(reason);
            return;
        }

        let resolved = match self.on_lane(token, move || file.resolve()) {
            Awaited::Done(Ok(resolved)) => resolved,
            Awaited::Done(Err(e)) => {
                warn!("Cannot resolve '{dir}/{name}': {e}");
                self.out.read_errors += 1;
                return;
            }
            Awaited::Lost => {
                self.out.read_errors += 1;
                return;
            }
            Awaited::Cancelled => return,
        };

        if resolved.attributes.cloud_placeholder {
            self.out.placeholders += 1;
        }
        if let Some(reason) = filter_by_attributes(self.config, &resolved.attributes) {
            debug!("filtered {reason:?} file {dir}/{name}");
            self.out.record_filtered(reason);
            return;
        }

        let index = self.out.files.len();
        let metadata = FileMetadata::new(&name, resolved.size, resolved.last_modified_ms);
        self.out.files.push(FileReference::new(
            resolved.source,
            index,
            format!("{dir}/{name}"),
            metadata,
        ));
        self.tracker.record_file();

        if self.throttle.ready(false) {
            self.observer.on_walk_progress(&WalkProgress {
                elapsed_ms: self.started.elapsed().as_millis() as u64,
                files_discovered: self.out.files.len(),
            });
        }
    }

    /// Run `job` on the lane, polling `token` while it is pending.
    fn on_lane<T, F>(&mut self, token: &CancelToken, job: F) -> Awaited<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if token.is_cancelled() {
            return Awaited::Cancelled;
        }
        let submitted = match &self.lane {
            Some(lane) => lane.submit(job),
            None => return Awaited::Done(job()),
        };
        let Some(rx) = submitted else {
            self.replace_lane();
            return Awaited::Lost;
        };
        loop {
            match rx.recv_timeout(self.poll) {
                Ok(value) => return Awaited::Done(value),
                Err(RecvTimeoutError::Timeout) => {
                    if token.is_cancelled() {
                        debug!("abandoning a pending host read");
                        self.replace_lane();
                        return Awaited::Cancelled;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.replace_lane();
                    return Awaited::Lost;
                }
            }
        }
    }

    fn replace_lane(&mut self) {
        self.lanes_spawned += 1;
        self.lane = match ReadLane::spawn(self.lanes_spawned) {
            Ok(lane) => {
                debug!(lane = lane.generation(), "I/O lane replaced");
                Some(lane)
            }
            Err(e) => {
                warn!("I/O lane could not be replaced, reading on the walker thread: {e}");
                None
            }
        };
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

/// Handle to a walk running on its own thread.
pub struct WalkHandle {
    cancel: CancelToken,
    join: Option<thread::JoinHandle<WalkOutcome>>,
}

impl WalkHandle {
    /// Request the walk to stop as soon as possible.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, thread::JoinHandle::is_finished)
    }

    /// Wait for the walk. `None` if the walker thread panicked.
    pub fn join(mut self) -> Option<WalkOutcome> {
        self.join.take()?.join().ok()
    }
}

/// Start a walk on a background thread.
pub fn start_walk(
    walker: FolderWalker,
    root: Arc<dyn DirectoryHandle>,
    observer: Arc<dyn PipelineObserver>,
) -> io::Result<WalkHandle> {
    let cancel = CancelToken::new();
    let token = cancel.clone();
    let join = thread::Builder::new()
        .name("dropsift-walker".into())
        .spawn(move || walker.walk(root, &token, observer.as_ref()))?;
    Ok(WalkHandle {
        cancel,
        join: Some(join),
    })
}
