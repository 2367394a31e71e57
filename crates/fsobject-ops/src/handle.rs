//! A handle over either kind of storage object.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use fsobject_core::{
    ChangeEvent, MetadataSnapshot, ObjectKind, Result, StorageContext, StorageError, validate_path,
};
use tokio::sync::broadcast;

use crate::directory::DirectoryObject;
use crate::file::FileObject;
use crate::options::MoveOptions;

/// A file or a directory, chosen by what is on disk.
#[derive(Debug)]
pub enum StorageHandle {
    File(FileObject),
    Directory(DirectoryObject),
}

impl StorageHandle {
    /// Open whatever exists at `path` with the default context.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_in(path, StorageContext::default()).await
    }

    /// Open whatever exists at `path`.
    pub async fn open_in(path: impl AsRef<Path>, context: StorageContext) -> Result<Self> {
        let path = validate_path(path, None)?;
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| StorageError::io(&path, e))?;

        if metadata.is_dir() {
            Ok(Self::Directory(DirectoryObject::load(path, context).await?))
        } else {
            Ok(Self::File(FileObject::load(path, context).await?))
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::File(_) => ObjectKind::File,
            Self::Directory(_) => ObjectKind::Directory,
        }
    }

    pub fn full_path(&self) -> Result<PathBuf> {
        match self {
            Self::File(f) => f.full_path(),
            Self::Directory(d) => d.full_path(),
        }
    }

    pub fn metadata(&self) -> Result<Arc<MetadataSnapshot>> {
        match self {
            Self::File(f) => f.metadata(),
            Self::Directory(d) => d.metadata(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        match self {
            Self::File(f) => f.subscribe(),
            Self::Directory(d) => d.subscribe(),
        }
    }

    pub fn is_disposed(&self) -> bool {
        match self {
            Self::File(f) => f.is_disposed(),
            Self::Directory(d) => d.is_disposed(),
        }
    }

    pub async fn rename(&self, new_name: &str, options: MoveOptions) -> Result<Arc<MetadataSnapshot>> {
        match self {
            Self::File(f) => f.rename(new_name, options).await,
            Self::Directory(d) => d.rename(new_name, options).await,
        }
    }

    pub async fn move_to(
        &self,
        destination: impl AsRef<Path>,
        options: MoveOptions,
    ) -> Result<Arc<MetadataSnapshot>> {
        match self {
            Self::File(f) => f.move_to(destination, options).await,
            Self::Directory(d) => d.move_to(destination, options).await,
        }
    }

    pub async fn delete(&self) -> Result<()> {
        match self {
            Self::File(f) => f.delete().await,
            Self::Directory(d) => d.delete().await,
        }
    }

    pub fn dispose(&self) {
        match self {
            Self::File(f) => f.dispose(),
            Self::Directory(d) => d.dispose(),
        }
    }

    pub fn as_file(&self) -> Option<&FileObject> {
        match self {
            Self::File(f) => Some(f),
            Self::Directory(_) => None,
        }
    }

    pub fn as_directory(&self) -> Option<&DirectoryObject> {
        match self {
            Self::Directory(d) => Some(d),
            Self::File(_) => None,
        }
    }
}

impl From<FileObject> for StorageHandle {
    fn from(file: FileObject) -> Self {
        Self::File(file)
    }
}

impl From<DirectoryObject> for StorageHandle {
    fn from(directory: DirectoryObject) -> Self {
        Self::Directory(directory)
    }
}
