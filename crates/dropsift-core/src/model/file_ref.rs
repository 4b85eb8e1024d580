/// A single file selected for upload.
///
/// A `FileReference` is created when a walked entry (or a direct queue
/// insertion) yields a concrete file. It carries a shared handle to the
/// byte source so it can be handed to the worker thread without copying
/// file contents.
use compact_str::CompactString;
use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

/// Lightweight identifier of a file within one selection.
///
/// Equal to the file's original selection index, which the pipeline
/// validates to be unique per call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(transparent)]
pub struct FileId(pub u64);

/// Terminal classification of a file reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// Eligible for upload.
    Ready,
    /// Redundant content already represented by another file in the batch.
    Duplicate,
}

impl FileStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Duplicate => "duplicate",
        }
    }
}

/// Host-provided byte source behind a file handle.
pub trait FileSource: Send + Sync + fmt::Debug {
    /// Open a fresh reader over the file's full content.
    fn open(&self) -> io::Result<Box<dyn Read + Send>>;
}

/// A file on a local filesystem.
#[derive(Debug, Clone)]
pub struct DiskFile {
    path: PathBuf,
}

impl DiskFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FileSource for DiskFile {
    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(File::open(&self.path)?))
    }
}

/// An in-memory file, used for pasted/dropped blobs and in tests.
#[derive(Debug, Clone)]
pub struct MemoryFile {
    bytes: Arc<[u8]>,
}

impl MemoryFile {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl FileSource for MemoryFile {
    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(Arc::clone(&self.bytes))))
    }
}

/// Metadata captured when the file was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub file_name: CompactString,
    pub file_size: u64,
    /// MIME type, `application/octet-stream` when unknown.
    pub file_type: CompactString,
    /// Milliseconds since the Unix epoch.
    pub last_modified_ms: i64,
}

impl FileMetadata {
    /// Build metadata from a name, size and modification time, inferring the MIME type.
    pub fn new(file_name: &str, file_size: u64, last_modified_ms: i64) -> Self {
        Self {
            file_name: CompactString::new(file_name),
            file_size,
            file_type: CompactString::new(super::mime::mime_for_name(file_name)),
            last_modified_ms,
        }
    }

    /// Read metadata for a local file.
    pub fn from_fs(file_name: &str, meta: &std::fs::Metadata) -> Self {
        let last_modified_ms = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Self::new(file_name, meta.len(), last_modified_ms)
    }
}

/// The "same file picked twice" key: name, size and modification time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey {
    pub file_name: CompactString,
    pub file_size: u64,
    pub last_modified_ms: i64,
}

/// One file in a selection, plus its classification once resolved.
#[derive(Debug, Clone)]
pub struct FileReference {
    pub file: Arc<dyn FileSource>,
    pub original_index: usize,
    /// POSIX-style, selection-relative path including the file name.
    pub path: String,
    pub metadata: FileMetadata,
    hash: Option<String>,
    status: Option<FileStatus>,
}

impl FileReference {
    pub fn new(
        file: Arc<dyn FileSource>,
        original_index: usize,
        path: impl Into<String>,
        metadata: FileMetadata,
    ) -> Self {
        Self {
            file,
            original_index,
            path: path.into(),
            metadata,
            hash: None,
            status: None,
        }
    }

    /// Convenience constructor for an in-memory file.
    pub fn in_memory(
        original_index: usize,
        path: &str,
        bytes: impl Into<Arc<[u8]>>,
        last_modified_ms: i64,
    ) -> Self {
        let source = MemoryFile::new(bytes);
        let name = path.rsplit('/').next().unwrap_or(path);
        let metadata = FileMetadata::new(name, source.len(), last_modified_ms);
        Self::new(Arc::new(source), original_index, path, metadata)
    }

    pub fn id(&self) -> FileId {
        FileId(self.original_index as u64)
    }

    pub fn file_name(&self) -> &str {
        &self.metadata.file_name
    }

    pub fn size(&self) -> u64 {
        self.metadata.file_size
    }

    /// The folder part of `path` (empty for files at the selection root).
    pub fn folder_path(&self) -> &str {
        match self.path.rsplit_once('/') {
            Some((folder, _)) => folder,
            None => "",
        }
    }

    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey {
            file_name: self.metadata.file_name.clone(),
            file_size: self.metadata.file_size,
            last_modified_ms: self.metadata.last_modified_ms,
        }
    }

    pub fn hash(&self) -> Option<&str> {
        self.hash.as_deref()
    }

    pub(crate) fn set_hash(&mut self, digest: String) {
        self.hash = Some(digest);
    }

    pub fn status(&self) -> Option<FileStatus> {
        self.status
    }

    /// Set the terminal status. A reference is classified exactly once.
    pub(crate) fn classify(&mut self, status: FileStatus) {
        debug_assert!(
            self.status.is_none(),
            "file {} classified twice",
            self.original_index
        );
        self.status = Some(status);
    }
}
