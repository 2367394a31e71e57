//! File handles.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use fsobject_core::{
    ChangeEvent, ChangeType, MetadataSnapshot, ObjectKind, Result, StorageContext, StorageError,
    TypeInfo, validate_filename, validate_path,
};
use tokio::io::AsyncRead;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::copy::{buffer_size_for, copy_file, copy_stream, open_destination};
use crate::lock_wait::{self, DEFAULT_POLL_INTERVAL};
use crate::move_op::relocate;
use crate::object::{ObjectCore, take_snapshot};
use crate::options::{CopyOptions, MoveOptions, WriteOptions};

/// Handle over a single file.
///
/// Clones share one identity: they see the same path, the same snapshot and
/// queue on the same operation lock.
#[derive(Debug, Clone)]
pub struct FileObject {
    core: Arc<ObjectCore>,
}

impl FileObject {
    /// Open an existing file with the default context.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_in(path, StorageContext::default()).await
    }

    /// Open an existing file.
    pub async fn open_in(path: impl AsRef<Path>, context: StorageContext) -> Result<Self> {
        let path = validate_path(path, Some(ObjectKind::File))?;
        Self::load(path, context).await
    }

    /// Open a file, creating it (and its parent directories) when absent.
    ///
    /// Existing content is left untouched.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::create_in(path, StorageContext::default()).await
    }

    /// [`FileObject::create`] with an explicit context.
    pub async fn create_in(path: impl AsRef<Path>, context: StorageContext) -> Result<Self> {
        let path = validate_path(path, Some(ObjectKind::File))?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(parent, e))?;
        }
        tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .await
            .map_err(|e| StorageError::io(&path, e))?;
        debug!(path = %path.display(), "file ensured");
        Self::load(path, context).await
    }

    pub(crate) async fn load(path: PathBuf, context: StorageContext) -> Result<Self> {
        let metadata = take_snapshot(&context, &path, ObjectKind::File).await?;
        Ok(Self {
            core: ObjectCore::new(ObjectKind::File, path, metadata, context),
        })
    }

    /// Absolute path of the file.
    pub fn full_path(&self) -> Result<PathBuf> {
        self.core.full_path()
    }

    pub fn parent_directory(&self) -> Result<Option<PathBuf>> {
        self.core.parent_directory()
    }

    /// File name component.
    pub fn name(&self) -> Result<String> {
        self.core.name()
    }

    /// The current snapshot.
    pub fn metadata(&self) -> Result<Arc<MetadataSnapshot>> {
        self.core.metadata()
    }

    /// Informational type description, if the provider recognized the file.
    pub fn type_info(&self) -> Result<Option<TypeInfo>> {
        Ok(self.core.metadata()?.type_info.clone())
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.core.subscribe()
    }

    pub fn is_disposed(&self) -> bool {
        self.core.is_disposed()
    }

    /// Release the handle. Further calls fail with [`StorageError::Disposed`].
    pub fn dispose(&self) {
        self.core.dispose();
    }

    pub fn context(&self) -> &StorageContext {
        self.core.context()
    }

    /// Re-read the metadata and emit `Modified` if the file changed.
    pub async fn refresh(&self) -> Result<Arc<MetadataSnapshot>> {
        self.core.ensure_live()?;
        let path = self.core.full_path()?;
        let fresh = self.core.snapshot(&path).await?;
        let current = self.core.metadata()?;

        if fresh.size != current.size
            || fresh.timestamps.modified != current.timestamps.modified
        {
            self.core.apply(ChangeType::Modified, Arc::clone(&fresh));
        }
        Ok(fresh)
    }

    /// Copy the file to `destination` and return a handle over the copy.
    ///
    /// A destination naming an existing directory, or ending with a path
    /// separator, receives this file's name. A cancelled copy leaves the
    /// partially written destination in place.
    pub async fn copy_to(
        &self,
        destination: impl AsRef<Path>,
        options: CopyOptions,
    ) -> Result<FileObject> {
        let _guard = self.core.begin_mutation().await?;
        let source = self.core.full_path()?;
        let destination = resolve_destination(&source, destination.as_ref()).await?;

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(parent, e))?;
        }

        let context = self.core.context();
        let bytes = copy_file(
            &source,
            &destination,
            options.overwrite,
            &context.config,
            options.progress.as_deref(),
            &options.cancel,
        )
        .await?;

        info!(
            source = %source.display(),
            destination = %destination.display(),
            bytes,
            "file copied"
        );
        FileObject::load(destination, context.clone()).await
    }

    /// Move the file. The handle follows it to the new location.
    pub async fn move_to(
        &self,
        destination: impl AsRef<Path>,
        options: MoveOptions,
    ) -> Result<Arc<MetadataSnapshot>> {
        let _guard = self.core.begin_mutation().await?;
        let source = self.core.full_path()?;
        let destination = resolve_destination(&source, destination.as_ref()).await?;
        self.relocate_locked(&source, &destination, &options).await
    }

    /// Rename the file within its directory.
    ///
    /// The new name is validated before anything else happens.
    pub async fn rename(
        &self,
        new_name: &str,
        options: MoveOptions,
    ) -> Result<Arc<MetadataSnapshot>> {
        validate_filename(new_name)?;
        let _guard = self.core.begin_mutation().await?;
        let source = self.core.full_path()?;
        let destination = source.with_file_name(new_name);
        self.relocate_locked(&source, &destination, &options).await
    }

    async fn relocate_locked(
        &self,
        source: &Path,
        destination: &Path,
        options: &MoveOptions,
    ) -> Result<Arc<MetadataSnapshot>> {
        if source == destination {
            return self.core.metadata();
        }

        relocate(
            ObjectKind::File,
            source,
            destination,
            options,
            &self.core.context().config,
        )
        .await?;

        self.core.settle_relocation(destination).await
    }

    /// Delete the file and dispose the handle.
    ///
    /// A file that is already gone counts as deleted.
    pub async fn delete(&self) -> Result<()> {
        let _guard = self.core.begin_mutation().await?;
        let path = self.core.full_path()?;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => info!(path = %path.display(), "file deleted"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "file already absent");
            }
            Err(e) => return Err(StorageError::io(&path, e)),
        }

        self.core.apply_deleted();
        Ok(())
    }

    /// Replace the file's content with everything read from `reader`.
    ///
    /// `len` is only used to size buffers and report progress.
    pub async fn write_from<R>(
        &self,
        reader: &mut R,
        len: Option<u64>,
        options: WriteOptions,
    ) -> Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let _guard = self.core.begin_mutation().await?;
        let path = self.core.full_path()?;
        let buffer_size = buffer_size_for(len, &self.core.context().config);

        let mut writer = open_destination(&path, true).await?;
        let written = copy_stream(
            reader,
            &mut writer,
            len,
            buffer_size,
            options.progress.as_deref(),
            &options.cancel,
        )
        .await
        .map_err(|e| e.at(&path))?;

        let metadata = self.core.snapshot(&path).await?;
        self.core.apply(ChangeType::Modified, metadata);
        debug!(path = %path.display(), written, "file content replaced");
        Ok(written)
    }

    /// Replace the file's content with `bytes`.
    pub async fn write_all(&self, bytes: &[u8]) -> Result<u64> {
        let mut reader = bytes;
        self.write_from(&mut reader, Some(bytes.len() as u64), WriteOptions::default())
            .await
    }

    /// Wait until no other holder has the file locked.
    pub async fn wait_until_unlocked(&self, timeout: Duration) -> Result<()> {
        let path = self.core.full_path()?;
        lock_wait::wait_until_unlocked(path, timeout, DEFAULT_POLL_INTERVAL).await
    }
}

/// Resolve a copy or move destination for the file at `source`.
async fn resolve_destination(source: &Path, raw: &Path) -> Result<PathBuf> {
    let names_directory = raw
        .to_string_lossy()
        .chars()
        .last()
        .is_some_and(std::path::is_separator);
    let target = validate_path(raw, None)?;

    let is_dir = tokio::fs::metadata(&target)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);

    if names_directory || is_dir {
        let name = source
            .file_name()
            .ok_or_else(|| StorageError::invalid(source, "path has no file name"))?;
        validate_path(target.join(name), Some(ObjectKind::File))
    } else {
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = FileObject::open(temp.path().join("missing.txt")).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_open_directory_as_file() {
        let temp = TempDir::new().unwrap();
        let err = FileObject::open(temp.path()).await.unwrap_err();
        assert!(matches!(err, StorageError::PathValidation { .. }));
    }

    #[tokio::test]
    async fn test_create_makes_parents_and_keeps_content() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a/b/notes.txt");

        let file = FileObject::create(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(file.metadata().unwrap().size, 0);
        assert_eq!(file.name().unwrap(), "notes.txt");
        assert_eq!(file.parent_directory().unwrap(), Some(temp.path().join("a/b")));

        fs::write(&path, "kept").unwrap();
        let again = FileObject::create(&path).await.unwrap();
        assert_eq!(again.metadata().unwrap().size, 4);
    }

    #[tokio::test]
    async fn test_copy_into_directory_uses_file_name() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("report.pdf");
        fs::write(&source, "pdf bytes").unwrap();
        fs::create_dir(temp.path().join("b")).unwrap();

        let file = FileObject::open(&source).await.unwrap();
        let copy = file
            .copy_to(temp.path().join("b"), CopyOptions::default())
            .await
            .unwrap();

        assert_eq!(copy.full_path().unwrap(), temp.path().join("b/report.pdf"));
        assert_eq!(fs::read_to_string(temp.path().join("b/report.pdf")).unwrap(), "pdf bytes");
        // The source handle is unchanged
        assert_eq!(file.full_path().unwrap(), source);
    }

    #[tokio::test]
    async fn test_trailing_separator_names_a_directory() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("a.txt");
        fs::write(&source, "x").unwrap();

        let file = FileObject::open(&source).await.unwrap();
        let raw = format!("{}/fresh/", temp.path().display());
        let copy = file.copy_to(raw, CopyOptions::default()).await.unwrap();
        assert_eq!(copy.full_path().unwrap(), temp.path().join("fresh/a.txt"));
    }

    #[tokio::test]
    async fn test_rename_updates_identity_and_notifies() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("old.txt");
        fs::write(&source, "x").unwrap();

        let file = FileObject::open(&source).await.unwrap();
        let mut rx = file.subscribe();
        let metadata = file.rename("new.txt", MoveOptions::default()).await.unwrap();

        assert_eq!(metadata.path, temp.path().join("new.txt"));
        assert_eq!(file.full_path().unwrap(), temp.path().join("new.txt"));
        assert!(!source.exists());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.change, ChangeType::Relocated);
        assert_eq!(event.path, temp.path().join("new.txt"));
    }

    #[tokio::test]
    async fn test_invalid_rename_touches_nothing() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("keep.txt");
        fs::write(&source, "x").unwrap();

        let file = FileObject::open(&source).await.unwrap();
        for bad in ["", "a/b", "..", "."] {
            let err = file.rename(bad, MoveOptions::default()).await.unwrap_err();
            assert!(matches!(err, StorageError::PathValidation { .. }), "{bad:?}");
        }

        let names: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("keep.txt")]);
        assert_eq!(file.full_path().unwrap(), source);
    }

    #[tokio::test]
    async fn test_delete_disposes_and_is_idempotent_out_of_band() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("gone.txt");
        fs::write(&path, "x").unwrap();

        let file = FileObject::open(&path).await.unwrap();
        fs::remove_file(&path).unwrap();

        let mut rx = file.subscribe();
        file.delete().await.unwrap();
        assert!(file.is_disposed());
        assert_eq!(rx.recv().await.unwrap().change, ChangeType::Deleted);

        assert!(matches!(file.delete().await, Err(StorageError::Disposed)));
        assert!(matches!(file.full_path(), Err(StorageError::Disposed)));
    }

    #[tokio::test]
    async fn test_write_all_replaces_content() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("data.bin");
        fs::write(&path, "a much longer original body").unwrap();

        let file = FileObject::open(&path).await.unwrap();
        let mut rx = file.subscribe();
        let written = file.write_all(b"short").await.unwrap();

        assert_eq!(written, 5);
        assert_eq!(fs::read_to_string(&path).unwrap(), "short");
        assert_eq!(file.metadata().unwrap().size, 5);
        assert_eq!(rx.recv().await.unwrap().change, ChangeType::Modified);
    }

    #[tokio::test]
    async fn test_refresh_notices_external_change() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("grow.txt");
        fs::write(&path, "1").unwrap();

        let file = FileObject::open(&path).await.unwrap();
        let mut rx = file.subscribe();

        file.refresh().await.unwrap();
        assert!(rx.try_recv().is_err());

        fs::write(&path, "12345").unwrap();
        let fresh = file.refresh().await.unwrap();
        assert_eq!(fresh.size, 5);
        assert_eq!(rx.recv().await.unwrap().change, ChangeType::Modified);
    }

    #[tokio::test]
    async fn test_type_info_from_extension() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("readme.md");
        fs::write(&path, "# hi").unwrap();

        let file = FileObject::open(&path).await.unwrap();
        assert!(file.type_info().unwrap().is_some());
    }
}
