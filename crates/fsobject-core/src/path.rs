//! Path validation and normalization.
//!
//! Every check here runs before a caller touches the filesystem, so a
//! rejected path never leaves partial state behind.

use std::path::{Component, Path, PathBuf};

use crate::error::{Result, StorageError};
use crate::metadata::ObjectKind;

#[cfg(windows)]
const INVALID_PATH_CHARS: &[char] = &['<', '>', '"', '|', '?', '*', '\0'];

#[cfg(not(windows))]
const INVALID_PATH_CHARS: &[char] = &['\0'];

/// Validate `raw` and turn it into a normalized absolute path.
///
/// When `expected` is given and something already exists at the path, its
/// on-disk kind must match.
pub fn validate_path(raw: impl AsRef<Path>, expected: Option<ObjectKind>) -> Result<PathBuf> {
    let raw = raw.as_ref();
    let text = raw.to_string_lossy();

    if text.trim().is_empty() {
        return Err(StorageError::invalid(raw, "path cannot be empty"));
    }

    check_components(raw)?;

    let absolute = std::path::absolute(raw).map_err(|e| StorageError::io(raw, e))?;
    let normalized = normalize_lexically(&absolute);

    if let Some(expected) = expected {
        if let Ok(metadata) = std::fs::metadata(&normalized) {
            let actual = if metadata.is_dir() {
                ObjectKind::Directory
            } else {
                ObjectKind::File
            };
            if actual != expected {
                return Err(StorageError::invalid(
                    &normalized,
                    format!("expected a {expected} but found a {actual}"),
                ));
            }
        }
    }

    Ok(normalized)
}

/// Validate a path that must stay relative to some base directory.
pub fn validate_relative(raw: impl AsRef<Path>) -> Result<PathBuf> {
    let raw = raw.as_ref();

    if raw.to_string_lossy().trim().is_empty() {
        return Err(StorageError::invalid(raw, "relative path cannot be empty"));
    }

    check_components(raw)?;

    let mut depth = 0usize;
    for component in raw.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => {
                return Err(StorageError::invalid(
                    raw,
                    "a relative path is required, got a rooted path",
                ));
            }
            Component::ParentDir => {
                if depth == 0 {
                    return Err(StorageError::invalid(raw, "path escapes its base directory"));
                }
                depth -= 1;
            }
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
        }
    }

    Ok(normalize_lexically(raw))
}

/// Resolve `.` and `..` without touching the filesystem.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // `..` at the root stays at the root
                if !out.pop() && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Validate a filename for cross-platform compatibility.
pub fn validate_filename(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StorageError::invalid(name, "name cannot be empty"));
    }

    if name.len() > 255 {
        return Err(StorageError::invalid(name, "name is too long (max 255 bytes)"));
    }

    for c in ['/', '\0'] {
        if name.contains(c) {
            return Err(StorageError::invalid(name, format!("name cannot contain {c:?}")));
        }
    }

    #[cfg(target_os = "windows")]
    {
        for c in ['\\', ':', '*', '?', '"', '<', '>', '|'] {
            if name.contains(c) {
                return Err(StorageError::invalid(name, format!("name cannot contain {c:?}")));
            }
        }

        let reserved = [
            "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7",
            "COM8", "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
        ];
        let upper_name = name.to_uppercase();
        let base_name = upper_name.split('.').next().unwrap_or("");
        if reserved.contains(&base_name) {
            return Err(StorageError::invalid(name, "reserved filename"));
        }
    }

    if name.starts_with(' ') || name.ends_with(' ') {
        return Err(StorageError::invalid(name, "name cannot start or end with spaces"));
    }

    if name.ends_with('.') {
        return Err(StorageError::invalid(name, "name cannot end with a dot"));
    }

    Ok(())
}

fn check_components(raw: &Path) -> Result<()> {
    for component in raw.components() {
        if let Component::Normal(part) = component {
            let part = part.to_string_lossy();
            if let Some(c) = part.chars().find(|c| INVALID_PATH_CHARS.contains(c)) {
                return Err(StorageError::invalid(
                    raw,
                    format!("path contains invalid character {c:?}"),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_filename_valid() {
        assert!(validate_filename("test.txt").is_ok());
        assert!(validate_filename("my-file").is_ok());
        assert!(validate_filename(".hidden").is_ok());
        assert!(validate_filename("file with spaces").is_ok());
    }

    #[test]
    fn test_validate_filename_invalid() {
        assert!(validate_filename("").is_err());
        assert!(validate_filename("test/file").is_err());
        assert!(validate_filename(".").is_err());
        assert!(validate_filename("..").is_err());
        assert!(validate_filename("file ").is_err());
        assert!(validate_filename(" file").is_err());
        assert!(validate_filename("file.").is_err());
        assert!(validate_filename("nul\0byte").is_err());
    }

    #[test]
    fn test_validate_path_rejects_blank() {
        assert!(matches!(
            validate_path("   ", None),
            Err(StorageError::PathValidation { .. })
        ));
        assert!(validate_path("", None).is_err());
    }

    #[test]
    fn test_validate_path_makes_absolute_and_normalizes() {
        let temp = TempDir::new().unwrap();
        let raw = temp.path().join("a/./b/../c.txt");
        let path = validate_path(&raw, None).unwrap();
        assert!(path.is_absolute());
        assert_eq!(path, temp.path().join("a/c.txt"));
    }

    #[test]
    fn test_validate_path_checks_kind() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("f.txt");
        std::fs::write(&file, "x").unwrap();

        assert!(validate_path(&file, Some(ObjectKind::File)).is_ok());
        assert!(validate_path(&file, Some(ObjectKind::Directory)).is_err());
        assert!(validate_path(temp.path(), Some(ObjectKind::File)).is_err());
        // Nothing on disk yet: any kind is acceptable
        assert!(validate_path(temp.path().join("new"), Some(ObjectKind::File)).is_ok());
    }

    #[test]
    fn test_validate_relative() {
        assert_eq!(validate_relative("a/b.txt").unwrap(), PathBuf::from("a/b.txt"));
        assert_eq!(validate_relative("a/../b").unwrap(), PathBuf::from("b"));
        assert!(validate_relative("/etc/passwd").is_err());
        assert!(validate_relative("../outside").is_err());
        assert!(validate_relative("").is_err());
    }

    #[test]
    fn test_normalize_lexically() {
        assert_eq!(
            normalize_lexically(Path::new("/x/y/../z/./w")),
            PathBuf::from("/x/z/w")
        );
        assert_eq!(normalize_lexically(Path::new("/..")), PathBuf::from("/"));
    }
}
