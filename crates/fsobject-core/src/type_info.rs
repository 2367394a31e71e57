//! Informational file type descriptions.

use std::path::Path;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Display type and MIME string for an entry.
///
/// Purely informational: no operation branches on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeInfo {
    /// Human-readable type name, e.g. "PDF document".
    pub display_type: CompactString,
    /// MIME type, e.g. "application/pdf".
    pub mime: CompactString,
}

impl TypeInfo {
    /// Create new type info.
    pub fn new(display_type: impl Into<CompactString>, mime: impl Into<CompactString>) -> Self {
        Self {
            display_type: display_type.into(),
            mime: mime.into(),
        }
    }
}

/// Identifies the type of a file.
pub trait TypeInfoProvider: Send + Sync + std::fmt::Debug {
    /// Describe `path`, or `None` when the type is unknown.
    fn identify(&self, path: &Path) -> Option<TypeInfo>;
}

/// Extension-based identification with a small built-in table.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtensionTypeInfo;

const EXTENSIONS: &[(&str, &str, &str)] = &[
    ("txt", "Text document", "text/plain"),
    ("md", "Markdown document", "text/markdown"),
    ("json", "JSON document", "application/json"),
    ("toml", "TOML document", "application/toml"),
    ("csv", "CSV document", "text/csv"),
    ("html", "HTML document", "text/html"),
    ("pdf", "PDF document", "application/pdf"),
    ("png", "PNG image", "image/png"),
    ("jpg", "JPEG image", "image/jpeg"),
    ("jpeg", "JPEG image", "image/jpeg"),
    ("gif", "GIF image", "image/gif"),
    ("svg", "SVG image", "image/svg+xml"),
    ("mp3", "MP3 audio", "audio/mpeg"),
    ("mp4", "MP4 video", "video/mp4"),
    ("zip", "ZIP archive", "application/zip"),
    ("gz", "Gzip archive", "application/gzip"),
    ("tar", "Tar archive", "application/x-tar"),
    ("rs", "Rust source", "text/x-rust"),
];

impl TypeInfoProvider for ExtensionTypeInfo {
    fn identify(&self, path: &Path) -> Option<TypeInfo> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        EXTENSIONS
            .iter()
            .find(|(e, _, _)| *e == ext)
            .map(|(_, display, mime)| TypeInfo::new(*display, *mime))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identify_known_extension() {
        let info = ExtensionTypeInfo.identify(Path::new("/tmp/Report.PDF")).unwrap();
        assert_eq!(info.mime.as_str(), "application/pdf");
    }

    #[test]
    fn test_identify_unknown() {
        assert!(ExtensionTypeInfo.identify(Path::new("/tmp/blob.xyz")).is_none());
        assert!(ExtensionTypeInfo.identify(Path::new("/tmp/noext")).is_none());
    }
}
