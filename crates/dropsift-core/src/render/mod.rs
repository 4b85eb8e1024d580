/// Queue rendering: materialise a classified result into a view.
///
/// Views are replaced wholesale. A large queue is shown in two passes: a
/// short prefix first so something appears at once, then, after a pause
/// that lets the frontend paint, the complete list. Either way the view
/// ends up holding exactly the classified input.
use crate::config::RenderConfig;
use crate::model::{FileId, FileReference, FileStatus};
use compact_str::CompactString;
use serde::Serialize;
use std::thread;
use std::time::Duration;
use tracing::debug;

/// One row in the upload queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueItem {
    pub id: FileId,
    pub original_index: usize,
    pub path: String,
    pub file_name: CompactString,
    pub file_type: CompactString,
    pub size: u64,
    pub last_modified_ms: i64,
    pub hash: Option<String>,
    pub status: FileStatus,
}

impl QueueItem {
    fn from_file(file: &FileReference, fallback: FileStatus) -> Self {
        Self {
            id: file.id(),
            original_index: file.original_index,
            path: file.path.clone(),
            file_name: file.metadata.file_name.clone(),
            file_type: file.metadata.file_type.clone(),
            size: file.size(),
            last_modified_ms: file.metadata.last_modified_ms,
            hash: file.hash().map(str::to_owned),
            status: file.status().unwrap_or(fallback),
        }
    }
}

/// Anything that can display the queue.
pub trait QueueView {
    fn replace_all(&mut self, items: &[QueueItem]);
}

/// Ready items first, then duplicates, each in selection order.
pub fn queue_items(ready: &[FileReference], duplicate: &[FileReference]) -> Vec<QueueItem> {
    ready
        .iter()
        .map(|f| QueueItem::from_file(f, FileStatus::Ready))
        .chain(
            duplicate
                .iter()
                .map(|f| QueueItem::from_file(f, FileStatus::Duplicate)),
        )
        .collect()
}

pub struct QueueRenderer {
    config: RenderConfig,
}

impl QueueRenderer {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    /// Fill `view` with the classified files. Returns the number of passes.
    pub fn materialize(
        &self,
        ready: &[FileReference],
        duplicate: &[FileReference],
        view: &mut dyn QueueView,
    ) -> usize {
        let items = queue_items(ready, duplicate);
        if items.len() <= self.config.chunk_threshold {
            view.replace_all(&items);
            return 1;
        }

        let prefix = self.config.initial_chunk.min(items.len());
        debug!(
            "rendering {} queue items in two passes (first {prefix})",
            items.len()
        );
        view.replace_all(&items[..prefix]);
        thread::sleep(Duration::from_millis(self.config.chunk_pause_ms));
        view.replace_all(&items);
        2
    }
}

/// In-memory upload queue.
#[derive(Debug, Clone, Default)]
pub struct UploadQueue {
    items: Vec<QueueItem>,
}

impl UploadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[QueueItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn ready_count(&self) -> usize {
        self.count(FileStatus::Ready)
    }

    pub fn duplicate_count(&self) -> usize {
        self.count(FileStatus::Duplicate)
    }

    pub fn total_bytes(&self, status: FileStatus) -> u64 {
        self.items
            .iter()
            .filter(|i| i.status == status)
            .map(|i| i.size)
            .sum()
    }

    /// Take an item out of the queue, e.g. when the user dismisses it.
    pub fn remove(&mut self, id: FileId) -> Option<QueueItem> {
        let pos = self.items.iter().position(|i| i.id == id)?;
        Some(self.items.remove(pos))
    }

    fn count(&self, status: FileStatus) -> usize {
        self.items.iter().filter(|i| i.status == status).count()
    }
}

impl QueueView for UploadQueue {
    fn replace_all(&mut self, items: &[QueueItem]) {
        self.items.clear();
        self.items.extend_from_slice(items);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records the length of every replace.
    #[derive(Default)]
    struct RecordingView {
        passes: Vec<usize>,
        last: Vec<QueueItem>,
    }

    impl QueueView for RecordingView {
        fn replace_all(&mut self, items: &[QueueItem]) {
            self.passes.push(items.len());
            self.last = items.to_vec();
        }
    }

    fn files(n: usize, offset: usize) -> Vec<FileReference> {
        (0..n)
            .map(|i| {
                let index = offset + i;
                FileReference::in_memory(index, &format!("q/f{index}.txt"), vec![1u8; index + 1], 0)
            })
            .collect()
    }

    fn renderer(threshold: usize) -> QueueRenderer {
        QueueRenderer::new(RenderConfig {
            chunk_threshold: threshold,
            initial_chunk: 3,
            chunk_pause_ms: 0,
        })
    }

    #[test]
    fn small_queue_renders_once() {
        let mut view = RecordingView::default();
        let passes = renderer(10).materialize(&files(4, 0), &files(2, 4), &mut view);
        assert_eq!(passes, 1);
        assert_eq!(view.passes, vec![6]);
        assert_eq!(view.last[4].status, FileStatus::Duplicate);
    }

    #[test]
    fn large_queue_converges_to_full_set() {
        let mut view = RecordingView::default();
        let ready = files(8, 0);
        let duplicate = files(4, 8);
        let passes = renderer(10).materialize(&ready, &duplicate, &mut view);
        assert_eq!(passes, 2);
        assert_eq!(view.passes, vec![3, 12]);
        assert_eq!(view.last, queue_items(&ready, &duplicate));
    }

    #[test]
    fn threshold_is_inclusive() {
        let mut view = RecordingView::default();
        assert_eq!(renderer(5).materialize(&files(5, 0), &[], &mut view), 1);
    }

    #[test]
    fn upload_queue_counts_and_removes() {
        let mut queue = UploadQueue::new();
        renderer(100).materialize(&files(3, 0), &files(1, 3), &mut queue);
        assert_eq!(queue.ready_count(), 3);
        assert_eq!(queue.duplicate_count(), 1);
        assert_eq!(queue.total_bytes(FileStatus::Duplicate), 4);

        let removed = queue.remove(FileId(3)).unwrap();
        assert_eq!(removed.status, FileStatus::Duplicate);
        assert_eq!(queue.duplicate_count(), 0);
        assert!(queue.remove(FileId(3)).is_none());
    }
}
