/// Platform-specific file checks.
use std::fs::Metadata;

/// File attributes the walker filters on.
///
/// Only Windows reports these; elsewhere every flag is `false` and hidden
/// files are recognised by their leading dot instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileAttributes {
    pub hidden: bool,
    pub system: bool,
    pub temporary: bool,
    /// Content lives in the cloud and reading it will trigger a download.
    pub cloud_placeholder: bool,
}

/// Read the filter-relevant attributes from `meta`.
///
/// Cloud placeholders are the ones OneDrive and other cloud-files providers
/// mark offline or recall-on-access. Enumerating a folder of them can block
/// for a long time.
#[cfg(windows)]
pub fn file_attributes(meta: &Metadata) -> FileAttributes {
    use std::os::windows::fs::MetadataExt;
    use windows::Win32::Storage::FileSystem::{
        FILE_ATTRIBUTE_HIDDEN, FILE_ATTRIBUTE_OFFLINE, FILE_ATTRIBUTE_RECALL_ON_DATA_ACCESS,
        FILE_ATTRIBUTE_RECALL_ON_OPEN, FILE_ATTRIBUTE_SYSTEM, FILE_ATTRIBUTE_TEMPORARY,
    };

    let raw = meta.file_attributes();
    let placeholder = FILE_ATTRIBUTE_OFFLINE.0
        | FILE_ATTRIBUTE_RECALL_ON_DATA_ACCESS.0
        | FILE_ATTRIBUTE_RECALL_ON_OPEN.0;
    FileAttributes {
        hidden: raw & FILE_ATTRIBUTE_HIDDEN.0 != 0,
        system: raw & FILE_ATTRIBUTE_SYSTEM.0 != 0,
        temporary: raw & FILE_ATTRIBUTE_TEMPORARY.0 != 0,
        cloud_placeholder: raw & placeholder != 0,
    }
}

#[cfg(not(windows))]
pub fn file_attributes(_meta: &Metadata) -> FileAttributes {
    FileAttributes::default()
}
