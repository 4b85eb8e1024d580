/// `std::fs` implementation of the host directory API.
///
/// Symlinks are not followed, matching how the selection dialog presents
/// them. Per-entry errors (a file vanishing mid-read, access denied on one
/// child) are logged and the entry is left out; only a failure to open or
/// iterate the directory itself is returned.
use super::host::{DirEntry, DirectoryHandle, EntryReader, FileEntry, ResolvedFile};
use crate::model::{DiskFile, FileMetadata};
use crate::platform;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{trace, warn};

#[derive(Debug, Clone)]
pub struct FsDirectory {
    path: PathBuf,
    name: String,
    page_size: usize,
}

impl FsDirectory {
    pub fn new(path: impl Into<PathBuf>, page_size: usize) -> Self {
        let path = path.into();
        let name = display_name(&path);
        Self {
            path,
            name,
            page_size: page_size.max(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// The root's name: the last component, or the trimmed path for drive roots.
fn display_name(path: &Path) -> String {
    if let Some(name) = path.file_name() {
        return name.to_string_lossy().into_owned();
    }
    let s = path.to_string_lossy();
    let trimmed = s.trim_end_matches(['\\', '/']).replace(['\\', '/', ':'], "");
    if trimmed.is_empty() {
        "selection".to_owned()
    } else {
        trimmed
    }
}

impl DirectoryHandle for FsDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    fn open_reader(&self) -> io::Result<Box<dyn EntryReader>> {
        Ok(Box::new(FsReader {
            entries: fs::read_dir(&self.path)?,
            page_size: self.page_size,
        }))
    }
}

struct FsReader {
    entries: fs::ReadDir,
    page_size: usize,
}

impl EntryReader for FsReader {
    fn read_page(&mut self) -> io::Result<Vec<DirEntry>> {
        let mut page = Vec::with_capacity(self.page_size);
        for entry in self.entries.by_ref() {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    warn!("skipping unreadable directory entry: {err}");
                    continue;
                }
            };
            let file_type = match entry.file_type() {
                Ok(t) => t,
                Err(err) => {
                    warn!("skipping {}: {err}", entry.path().display());
                    continue;
                }
            };
            let path = entry.path();
            if file_type.is_symlink() {
                trace!("not following symlink {}", path.display());
                continue;
            }
            if file_type.is_dir() {
                page.push(DirEntry::Directory(Arc::new(FsDirectory::new(
                    path,
                    self.page_size,
                ))));
            } else if file_type.is_file() {
                let name = entry.file_name().to_string_lossy().into_owned();
                page.push(DirEntry::File(Arc::new(FsFile { path, name })));
            }
            if page.len() >= self.page_size {
                break;
            }
        }
        Ok(page)
    }
}

struct FsFile {
    path: PathBuf,
    name: String,
}

impl FileEntry for FsFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolve(&self) -> io::Result<ResolvedFile> {
        let meta = fs::metadata(&self.path)?;
        let resolved = FileMetadata::from_fs(&self.name, &meta);
        Ok(ResolvedFile {
            source: Arc::new(DiskFile::new(&self.path)),
            size: resolved.file_size,
            last_modified_ms: resolved.last_modified_ms,
            attributes: platform::file_attributes(&meta),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_are_bounded_and_end_empty() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            fs::write(dir.path().join(format!("f{i}.txt")), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("sub")).unwrap();

        let handle = FsDirectory::new(dir.path(), 2);
        let mut reader = handle.open_reader().unwrap();
        let mut total = 0;
        let mut dirs = 0;
        loop {
            let page = reader.read_page().unwrap();
            if page.is_empty() {
                break;
            }
            assert!(page.len() <= 2);
            dirs += page
                .iter()
                .filter(|e| matches!(e, DirEntry::Directory(_)))
                .count();
            total += page.len();
        }
        assert_eq!(total, 6);
        assert_eq!(dirs, 1);
    }

    #[test]
    fn resolve_reads_size() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.bin"), b"12345").unwrap();
        let mut reader = FsDirectory::new(dir.path(), 10).open_reader().unwrap();
        let page = reader.read_page().unwrap();
        let DirEntry::File(file) = &page[0] else {
            panic!("expected a file entry");
        };
        let resolved = file.resolve().unwrap();
        assert_eq!(resolved.size, 5);
        assert!(resolved.last_modified_ms > 0);
        assert!(!resolved.attributes.cloud_placeholder);
    }

    #[test]
    fn root_name_is_last_component() {
        assert_eq!(FsDirectory::new("/home/me/Photos", 10).name(), "Photos");
        assert_eq!(FsDirectory::new("/", 10).name(), "selection");
    }
}
