/// Best-copy selection among true content duplicates.
///
/// Strict total order, first differing criterion wins:
/// 1. earliest modification time
/// 2. longest folder path (the more specific location)
/// 3. shortest file name
/// 4. lexicographic file name
/// 5. original selection index
use crate::model::FileReference;
use std::cmp::Ordering;

/// Compare two candidates; `Less` means `a` is the better copy to keep.
pub fn selection_order(a: &FileReference, b: &FileReference) -> Ordering {
    a.metadata
        .last_modified_ms
        .cmp(&b.metadata.last_modified_ms)
        .then_with(|| b.folder_path().len().cmp(&a.folder_path().len()))
        .then_with(|| {
            a.file_name()
                .chars()
                .count()
                .cmp(&b.file_name().chars().count())
        })
        .then_with(|| a.file_name().cmp(b.file_name()))
        .then_with(|| a.original_index.cmp(&b.original_index))
}

/// The candidate holding the copy to keep, or `None` if there are none.
///
/// `file` maps a candidate (a slot, a reference) to the file it stands for.
pub fn select_best<'a, T, I, F>(candidates: I, file: F) -> Option<T>
where
    I: IntoIterator<Item = T>,
    F: Fn(&T) -> &'a FileReference,
{
    candidates
        .into_iter()
        .min_by(|a, b| selection_order(file(a), file(b)))
}
