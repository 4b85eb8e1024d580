/// The paged directory API the walker consumes.
///
/// Hosts hand the walker a [`DirectoryHandle`]. Opening it yields an
/// [`EntryReader`] that returns entries a page at a time; an empty page
/// means the directory is exhausted. Any of these calls may block
/// indefinitely (cloud placeholders), so the walker only ever makes them on
/// its I/O lane.
use crate::model::FileSource;
use crate::platform::FileAttributes;
use std::fmt;
use std::io;
use std::sync::Arc;

pub trait DirectoryHandle: Send + Sync {
    fn name(&self) -> &str;
    fn open_reader(&self) -> io::Result<Box<dyn EntryReader>>;
}

pub trait EntryReader: Send {
    /// Next page of entries. Empty means done.
    fn read_page(&mut self) -> io::Result<Vec<DirEntry>>;
}

pub trait FileEntry: Send + Sync {
    fn name(&self) -> &str;
    /// Turn the entry into a readable file plus its metadata.
    fn resolve(&self) -> io::Result<ResolvedFile>;
}

pub enum DirEntry {
    File(Arc<dyn FileEntry>),
    Directory(Arc<dyn DirectoryHandle>),
}

impl DirEntry {
    pub fn name(&self) -> &str {
        match self {
            Self::File(f) => f.name(),
            Self::Directory(d) => d.name(),
        }
    }
}

impl fmt::Debug for DirEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(e) => write!(f, "File({})", e.name()),
            Self::Directory(d) => write!(f, "Directory({})", d.name()),
        }
    }
}

/// A file entry after resolution.
#[derive(Debug, Clone)]
pub struct ResolvedFile {
    pub source: Arc<dyn FileSource>,
    pub size: u64,
    /// Milliseconds since the Unix epoch.
    pub last_modified_ms: i64,
    pub attributes: FileAttributes,
}
