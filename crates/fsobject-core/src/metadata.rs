//! Metadata snapshots and the platform provider that produces them.

use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

use jwalk::WalkDir;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StorageError};
use crate::type_info::TypeInfo;

/// The two kinds of storage object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    File,
    Directory,
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Directory => write!(f, "directory"),
        }
    }
}

/// Inode information for the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InodeInfo {
    /// Inode number.
    pub inode: u64,
    /// Device ID.
    pub device: u64,
}

impl InodeInfo {
    /// Create new inode info.
    pub fn new(inode: u64, device: u64) -> Self {
        Self { inode, device }
    }
}

/// File metadata timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamps {
    /// Last modification time.
    pub modified: SystemTime,
    /// Last access time (if available).
    pub accessed: Option<SystemTime>,
    /// Creation time (if available, platform-dependent).
    pub created: Option<SystemTime>,
}

impl Timestamps {
    /// Create timestamps with only modified time.
    pub fn with_modified(modified: SystemTime) -> Self {
        Self {
            modified,
            accessed: None,
            created: None,
        }
    }

    /// Create timestamps with all available times.
    pub fn new(
        modified: SystemTime,
        accessed: Option<SystemTime>,
        created: Option<SystemTime>,
    ) -> Self {
        Self {
            modified,
            accessed,
            created,
        }
    }

    fn from_metadata(metadata: &Metadata) -> Self {
        Self::new(
            metadata.modified().unwrap_or(std::time::UNIX_EPOCH),
            metadata.accessed().ok(),
            metadata.created().ok(),
        )
    }
}

/// Normalized attribute flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    pub read_only: bool,
    pub hidden: bool,
    pub symlink: bool,
    pub executable: bool,
}

impl Attributes {
    pub const READ_ONLY: u32 = 1;
    pub const HIDDEN: u32 = 1 << 1;
    pub const SYMLINK: u32 = 1 << 2;
    pub const EXECUTABLE: u32 = 1 << 3;

    /// The attributes as a bitset.
    pub fn bits(&self) -> u32 {
        let mut bits = 0;
        if self.read_only {
            bits |= Self::READ_ONLY;
        }
        if self.hidden {
            bits |= Self::HIDDEN;
        }
        if self.symlink {
            bits |= Self::SYMLINK;
        }
        if self.executable {
            bits |= Self::EXECUTABLE;
        }
        bits
    }
}

/// Platform-specific extras. Fields a platform cannot supply stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformExtras {
    /// Owner identity (uid on Unix).
    pub owner: Option<u32>,
    /// Raw permission bits (Unix).
    pub mode: Option<u32>,
    /// Inode and device.
    pub inode: Option<InodeInfo>,
    /// Target of the link when the path is a symbolic link.
    pub link_target: Option<PathBuf>,
}

/// Kind-specific part of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    /// Regular file.
    File,
    /// Directory.
    Directory {
        /// Total number of files in this subtree.
        file_count: u64,
        /// Total number of directories in this subtree.
        dir_count: u64,
    },
}

impl EntryKind {
    /// The object kind this entry describes.
    pub fn object_kind(&self) -> ObjectKind {
        match self {
            Self::File => ObjectKind::File,
            Self::Directory { .. } => ObjectKind::Directory,
        }
    }
}

/// Immutable point-in-time record of an entity.
///
/// Snapshots are never edited; a change produces a new snapshot that
/// replaces the old one wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataSnapshot {
    /// Absolute path the snapshot was taken from.
    pub path: PathBuf,
    /// Kind and kind-specific counters.
    pub kind: EntryKind,
    /// Size in bytes (aggregate for directories).
    pub size: u64,
    /// Normalized attribute flags.
    pub attributes: Attributes,
    /// Timestamps.
    pub timestamps: Timestamps,
    /// Platform extras.
    pub extras: PlatformExtras,
    /// Informational type description.
    pub type_info: Option<TypeInfo>,
}

impl MetadataSnapshot {
    /// Attach type information.
    pub fn with_type_info(mut self, type_info: Option<TypeInfo>) -> Self {
        self.type_info = type_info;
        self
    }

    /// Check if this snapshot describes a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self.kind, EntryKind::Directory { .. })
    }

    /// Check if this snapshot describes a file.
    pub fn is_file(&self) -> bool {
        matches!(self.kind, EntryKind::File)
    }

    /// File count for directories, 1 for files.
    pub fn file_count(&self) -> u64 {
        match self.kind {
            EntryKind::Directory { file_count, .. } => file_count,
            EntryKind::File => 1,
        }
    }

    /// Subdirectory count for directories.
    pub fn dir_count(&self) -> u64 {
        match self.kind {
            EntryKind::Directory { dir_count, .. } => dir_count,
            EntryKind::File => 0,
        }
    }
}

/// Source of metadata snapshots.
///
/// Implementations are synchronous and side-effect free.
pub trait MetadataProvider: Send + Sync + std::fmt::Debug {
    /// Take a snapshot of `path`, which is expected to be of `kind`.
    fn snapshot(&self, path: &Path, kind: ObjectKind) -> Result<MetadataSnapshot>;
}

/// Provider backed by `std::fs` metadata.
///
/// Directory snapshots walk the whole subtree to aggregate size and counts.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformMetadataProvider;

impl PlatformMetadataProvider {
    /// Create a new provider.
    pub fn new() -> Self {
        Self
    }
}

impl MetadataProvider for PlatformMetadataProvider {
    fn snapshot(&self, path: &Path, kind: ObjectKind) -> Result<MetadataSnapshot> {
        let link_metadata = std::fs::symlink_metadata(path).map_err(|e| StorageError::io(path, e))?;
        let is_symlink = link_metadata.file_type().is_symlink();
        let metadata = if is_symlink {
            std::fs::metadata(path).map_err(|e| StorageError::io(path, e))?
        } else {
            link_metadata
        };

        let actual = if metadata.is_dir() {
            ObjectKind::Directory
        } else {
            ObjectKind::File
        };
        if actual != kind {
            return Err(StorageError::invalid(
                path,
                format!("expected a {kind} but found a {actual}"),
            ));
        }

        let link_target = if is_symlink {
            std::fs::read_link(path).ok()
        } else {
            None
        };

        let (entry_kind, size) = match kind {
            ObjectKind::File => (EntryKind::File, metadata.len()),
            ObjectKind::Directory => {
                let (file_count, dir_count, size) = directory_totals(path);
                (
                    EntryKind::Directory {
                        file_count,
                        dir_count,
                    },
                    size,
                )
            }
        };

        Ok(MetadataSnapshot {
            path: path.to_path_buf(),
            kind: entry_kind,
            size,
            attributes: Attributes {
                read_only: metadata.permissions().readonly(),
                hidden: is_hidden(path, &metadata),
                symlink: is_symlink,
                executable: is_executable(&metadata),
            },
            timestamps: Timestamps::from_metadata(&metadata),
            extras: PlatformExtras {
                owner: get_owner(&metadata),
                mode: get_mode(&metadata),
                inode: get_inode(&metadata),
                link_target,
            },
            type_info: None,
        })
    }
}

/// Count files, subdirectories and bytes under `dir`.
fn directory_totals(dir: &Path) -> (u64, u64, u64) {
    let mut files = 0;
    let mut dirs = 0;
    let mut bytes = 0u64;

    for entry in WalkDir::new(dir).skip_hidden(false).min_depth(1).into_iter().flatten() {
        let file_type = entry.file_type();
        if file_type.is_dir() {
            dirs += 1;
        } else if file_type.is_file() {
            files += 1;
            if let Ok(metadata) = entry.metadata() {
                bytes += metadata.len();
            }
        }
    }

    (files, dirs, bytes)
}

// Cross-platform metadata helpers

#[cfg(unix)]
fn is_executable(metadata: &Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.is_file() && metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &Metadata) -> bool {
    false
}

#[cfg(windows)]
fn is_hidden(_path: &Path, metadata: &Metadata) -> bool {
    use std::os::windows::fs::MetadataExt;
    const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;
    metadata.file_attributes() & FILE_ATTRIBUTE_HIDDEN != 0
}

#[cfg(not(windows))]
fn is_hidden(path: &Path, _metadata: &Metadata) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

#[cfg(unix)]
fn get_owner(metadata: &Metadata) -> Option<u32> {
    Some(metadata.uid())
}

#[cfg(not(unix))]
fn get_owner(_metadata: &Metadata) -> Option<u32> {
    None
}

#[cfg(unix)]
fn get_mode(metadata: &Metadata) -> Option<u32> {
    Some(metadata.mode())
}

#[cfg(not(unix))]
fn get_mode(_metadata: &Metadata) -> Option<u32> {
    None
}

#[cfg(unix)]
fn get_inode(metadata: &Metadata) -> Option<InodeInfo> {
    Some(InodeInfo::new(metadata.ino(), metadata.dev()))
}

#[cfg(not(unix))]
fn get_inode(_metadata: &Metadata) -> Option<InodeInfo> {
    None
}
