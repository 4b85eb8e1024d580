/// Data model for the intake pipeline.
///
/// Re-exports the file reference type and supporting types.
pub mod file_ref;
pub mod mime;

pub use file_ref::{
    DiskFile, FileId, FileMetadata, FileReference, FileSource, FileStatus, IdentityKey, MemoryFile,
};
pub use mime::mime_for_name;
