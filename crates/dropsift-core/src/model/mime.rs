/// MIME type inference from file extensions.
///
/// Host selection APIs usually hand over a MIME type with each file; a
/// local walk has only the name, so the type is inferred here.

/// Fallback for unknown or missing extensions.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Infer a MIME type from a file name's extension.
///
/// Extensions are lowercased into a fixed stack buffer rather than a
/// `String`; anything longer than 16 bytes is unknown.
pub fn mime_for_name(name: &str) -> &'static str {
    let ext = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext,
        _ => return OCTET_STREAM,
    };

    let bytes = ext.as_bytes();
    if bytes.is_empty() || bytes.len() > 16 {
        return OCTET_STREAM;
    }

    let mut lower = [0u8; 16];
    for (dest, &src) in lower.iter_mut().zip(bytes.iter()) {
        *dest = src.to_ascii_lowercase();
    }
    let lower_str = match std::str::from_utf8(&lower[..bytes.len()]) {
        Ok(s) => s,
        Err(_) => return OCTET_STREAM,
    };

    match lower_str {
        // Images
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "tif" | "tiff" => "image/tiff",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "ico" => "image/vnd.microsoft.icon",
        // Video
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "mpg" | "mpeg" => "video/mpeg",
        // Audio
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "ogg" | "opus" => "audio/ogg",
        "m4a" | "aac" => "audio/aac",
        // Documents
        "pdf" => "application/pdf",
        "txt" | "log" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "xml" => "application/xml",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "rtf" => "application/rtf",
        // Archives
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "7z" => "application/x-7z-compressed",
        "rar" => "application/vnd.rar",
        _ => OCTET_STREAM,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_extensions_case_insensitive() {
        assert_eq!(mime_for_name("IMG_0001.JPG"), "image/jpeg");
        assert_eq!(mime_for_name("report.Pdf"), "application/pdf");
        assert_eq!(mime_for_name("archive.tar.gz"), "application/gzip");
    }

    #[test]
    fn unknown_or_missing_extension_is_octet_stream() {
        assert_eq!(mime_for_name("Makefile"), OCTET_STREAM);
        assert_eq!(mime_for_name("data.qqq"), OCTET_STREAM);
        assert_eq!(mime_for_name("trailing."), OCTET_STREAM);
    }

    /// Dot files have no extension, only a name.
    #[test]
    fn dot_file_is_not_an_extension() {
        assert_eq!(mime_for_name(".json"), OCTET_STREAM);
    }

    #[test]
    fn overlong_extension_is_rejected() {
        assert_eq!(mime_for_name("x.abcdefghijklmnopq"), OCTET_STREAM);
    }
}
