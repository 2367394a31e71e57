//! Directory handles.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use fsobject_core::{
    ChangeEvent, ChangeType, MetadataSnapshot, ObjectKind, Result, StorageContext, StorageError,
    validate_filename, validate_path, validate_relative,
};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::file::FileObject;
use crate::move_op::relocate;
use crate::object::{ObjectCore, take_snapshot};
use crate::options::{DirCopyOptions, MoveOptions};
use crate::tree::{copy_tree, list_entries, plan_tree_async};
use crate::watcher::DirectoryMonitor;

/// Handle over a directory.
///
/// While watching, external changes under the directory are coalesced and
/// reported as `Modified` events. Dropping the handle disposes it.
#[derive(Debug)]
pub struct DirectoryObject {
    core: Arc<ObjectCore>,
    monitor: Mutex<Option<DirectoryMonitor>>,
}

impl DirectoryObject {
    /// Open an existing directory with the default context.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_in(path, StorageContext::default()).await
    }

    /// Open an existing directory.
    pub async fn open_in(path: impl AsRef<Path>, context: StorageContext) -> Result<Self> {
        let path = validate_path(path, Some(ObjectKind::Directory))?;
        Self::load(path, context).await
    }

    /// Open a directory, creating it and any missing parents.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::create_in(path, StorageContext::default()).await
    }

    /// [`DirectoryObject::create`] with an explicit context.
    pub async fn create_in(path: impl AsRef<Path>, context: StorageContext) -> Result<Self> {
        let path = validate_path(path, Some(ObjectKind::Directory))?;
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| StorageError::io(&path, e))?;
        debug!(path = %path.display(), "directory ensured");
        Self::load(path, context).await
    }

    pub(crate) async fn load(path: PathBuf, context: StorageContext) -> Result<Self> {
        let metadata = take_snapshot(&context, &path, ObjectKind::Directory).await?;
        let watch = context.config.watch_directories;
        let directory = Self {
            core: ObjectCore::new(ObjectKind::Directory, path, metadata, context),
            monitor: Mutex::new(None),
        };

        if watch && tokio::runtime::Handle::try_current().is_ok() {
            if let Err(e) = directory.watch() {
                warn!(error = %e, "continuing without change monitoring");
            }
        }
        Ok(directory)
    }

    /// Absolute path of the directory.
    pub fn full_path(&self) -> Result<PathBuf> {
        self.core.full_path()
    }

    pub fn parent_directory(&self) -> Result<Option<PathBuf>> {
        self.core.parent_directory()
    }

    /// Directory name component.
    pub fn name(&self) -> Result<String> {
        self.core.name()
    }

    /// The current snapshot, with file and subdirectory totals.
    pub fn metadata(&self) -> Result<Arc<MetadataSnapshot>> {
        self.core.metadata()
    }

    /// Subscribe to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.core.subscribe()
    }

    pub fn is_disposed(&self) -> bool {
        self.core.is_disposed()
    }

    pub fn context(&self) -> &StorageContext {
        self.core.context()
    }

    /// Whether a change monitor is running.
    pub fn is_watching(&self) -> bool {
        self.monitor.lock().is_some()
    }

    /// Start the change monitor if it is not running.
    ///
    /// Requires a tokio runtime.
    pub fn watch(&self) -> Result<()> {
        let path = self.core.full_path()?;
        let mut monitor = self.monitor.lock();
        if monitor.is_none() {
            let window = self.core.context().config.debounce_window;
            *monitor = Some(DirectoryMonitor::start(&self.core, &path, window)?);
        }
        Ok(())
    }

    /// Stop the change monitor. Pending changes are dropped.
    pub fn unwatch(&self) {
        if self.monitor.lock().take().is_some() {
            debug!("directory monitor stopped");
        }
    }

    /// Stop monitoring and release the handle.
    ///
    /// Safe to call repeatedly and while a debounced flush is in flight.
    pub fn dispose(&self) {
        self.unwatch();
        self.core.dispose();
    }

    /// Re-read the metadata and emit `Modified` if anything changed.
    pub async fn refresh(&self) -> Result<Arc<MetadataSnapshot>> {
        self.core.ensure_live()?;
        let path = self.core.full_path()?;
        let fresh = self.core.snapshot(&path).await?;
        let current = self.core.metadata()?;

        if fresh.size != current.size
            || fresh.kind != current.kind
            || fresh.timestamps.modified != current.timestamps.modified
        {
            self.core.apply(ChangeType::Modified, Arc::clone(&fresh));
        }
        Ok(fresh)
    }

    /// Files under this directory whose name matches the glob `pattern`,
    /// sorted by path.
    pub async fn get_files(&self, pattern: &str, recursive: bool) -> Result<Vec<PathBuf>> {
        self.list(pattern, recursive, ObjectKind::File).await
    }

    /// Subdirectories whose name matches the glob `pattern`, sorted by path.
    pub async fn get_directories(&self, pattern: &str, recursive: bool) -> Result<Vec<PathBuf>> {
        self.list(pattern, recursive, ObjectKind::Directory).await
    }

    async fn list(&self, pattern: &str, recursive: bool, kind: ObjectKind) -> Result<Vec<PathBuf>> {
        let root = self.core.full_path()?;
        let owned_root = root.clone();
        let pattern = pattern.to_owned();

        tokio::task::spawn_blocking(move || list_entries(&owned_root, &pattern, recursive, kind))
            .await
            .map_err(|e| StorageError::io(&root, std::io::Error::other(e)))?
    }

    /// Open the file at `relative` below this directory.
    pub async fn get_file(&self, relative: impl AsRef<Path>) -> Result<FileObject> {
        let target = self.child(relative.as_ref()).await?;
        FileObject::open_in(target, self.core.context().clone()).await
    }

    /// Open the directory at `relative` below this directory.
    pub async fn get_directory(&self, relative: impl AsRef<Path>) -> Result<DirectoryObject> {
        let target = self.child(relative.as_ref()).await?;
        DirectoryObject::open_in(target, self.core.context().clone()).await
    }

    async fn child(&self, relative: &Path) -> Result<PathBuf> {
        let relative = validate_relative(relative)?;
        let target = self.core.full_path()?.join(relative);
        let present = tokio::fs::try_exists(&target)
            .await
            .map_err(|e| StorageError::io(&target, e))?;
        if !present {
            return Err(StorageError::NotFound { path: target });
        }
        Ok(target)
    }

    /// Copy the whole tree to `destination` and return a handle over the copy.
    ///
    /// `destination` becomes the copy itself and is created if absent.
    /// Per-file failures do not stop the copy; they are reported together
    /// as [`StorageError::Aggregate`] and the files that made it stay.
    pub async fn copy_to(
        &self,
        destination: impl AsRef<Path>,
        options: DirCopyOptions,
    ) -> Result<DirectoryObject> {
        let destination = validate_path(destination, Some(ObjectKind::Directory))?;
        let _guard = self.core.begin_mutation().await?;
        let source = self.core.full_path()?;

        if destination.starts_with(&source) {
            return Err(StorageError::invalid(
                &destination,
                "cannot copy a directory into itself",
            ));
        }

        let plan = plan_tree_async(&source).await?;
        let context = self.core.context();
        copy_tree(&source, &destination, &plan, &options, &context.config).await?;

        DirectoryObject::load(destination, context.clone()).await
    }

    /// Move the directory. The handle follows it to the new location.
    pub async fn move_to(
        &self,
        destination: impl AsRef<Path>,
        options: MoveOptions,
    ) -> Result<Arc<MetadataSnapshot>> {
        let destination = validate_path(destination, None)?;
        let _guard = self.core.begin_mutation().await?;
        let source = self.core.full_path()?;
        self.relocate_locked(&source, &destination, &options).await
    }

    /// Rename the directory within its parent.
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

        let was_watching = self.monitor.lock().take().is_some();
        let moved = relocate(
            ObjectKind::Directory,
            source,
            destination,
            options,
            &self.core.context().config,
        )
        .await;

        let result = match moved {
            Ok(()) => self.core.settle_relocation(destination).await,
            Err(e) => Err(e),
        };

        if was_watching {
            if let Err(e) = self.watch() {
                warn!(error = %e, "could not resume change monitoring");
            }
        }
        result
    }

    /// Delete the directory and everything below it, then dispose the
    /// handle. A directory that is already gone counts as deleted.
    pub async fn delete(&self) -> Result<()> {
        let _guard = self.core.begin_mutation().await?;
        let path = self.core.full_path()?;
        self.unwatch();

        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => info!(path = %path.display(), "directory deleted"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "directory already absent");
            }
            Err(e) => return Err(StorageError::io(&path, e)),
        }

        self.core.apply_deleted();
        Ok(())
    }
}

impl Drop for DirectoryObject {
    fn drop(&mut self) {
        self.dispose();
    }
}
