/// Content hashing: SHA-256 over a file's full byte stream.
///
/// Runs inside the worker thread and, on the fallback path, on the calling
/// thread. Both paths go through the same [`ContentHasher`] so they produce
/// identical digests.
use crate::error::HashingError;
use crate::model::FileReference;
use sha2::{Digest, Sha256};
use std::io::{self, Read};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Default read buffer for streaming digests.
pub const DEFAULT_BUFFER_SIZE: usize = 256 * 1024;

/// Computes a content digest for a file reference.
pub trait ContentHasher: Send + Sync {
    fn digest(&self, file: &FileReference) -> Result<String, HashingError>;
}

/// Streaming SHA-256, rendered as lowercase hex.
#[derive(Debug, Clone)]
pub struct Sha256Hasher {
    buffer_size: usize,
}

impl Default for Sha256Hasher {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

impl Sha256Hasher {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(4096),
        }
    }
}

impl ContentHasher for Sha256Hasher {
    fn digest(&self, file: &FileReference) -> Result<String, HashingError> {
        let read_err = |source| HashingError::Read {
            path: file.path.clone(),
            source,
        };
        let reader = file.file.open().map_err(read_err)?;
        let (digest, read) = digest_reader(reader, self.buffer_size).map_err(read_err)?;

        // A file that changed under us would hash to a digest that no
        // longer describes what will be uploaded.
        if read != file.size() {
            return Err(HashingError::SizeMismatch {
                path: file.path.clone(),
                expected: file.size(),
                actual: read,
            });
        }
        Ok(digest)
    }
}

/// Hash everything `reader` yields. Returns the hex digest and byte count.
pub fn digest_reader(mut reader: impl Read, buffer_size: usize) -> io::Result<(String, u64)> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; buffer_size.max(1)];
    let mut total: u64 = 0;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
        total += n as u64;
    }
    Ok((format!("{:x}", hasher.finalize()), total))
}

/// Hash-bucket key. The size is appended as a safety margin independent
/// of the digest's own collision resistance.
pub fn bucket_key(digest: &str, size: u64) -> String {
    format!("{digest}:{size}")
}

/// Wraps a hasher and counts calls. Used for statistics and in tests to
/// prove that uniquely-sized files are never hashed.
#[derive(Debug, Default)]
pub struct CountingHasher<H> {
    inner: H,
    calls: AtomicUsize,
}

impl<H> CountingHasher<H> {
    pub fn new(inner: H) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl<H: ContentHasher> ContentHasher for CountingHasher<H> {
    fn digest(&self, file: &FileReference) -> Result<String, HashingError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.inner.digest(file)
    }
}
