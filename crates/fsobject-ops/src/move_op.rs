//! Relocation of files and directories.
//!
//! Same-volume moves are a single rename. Moves across volumes copy the
//! content and then remove the source; if removing the source fails the
//! destination copy is rolled back so the entity exists in one place only.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use fsobject_core::{EngineConfig, ObjectKind, Result, StorageError, StorageProgress};
use tracing::{debug, info, warn};

use crate::copy::copy_file;
use crate::options::{DirCopyOptions, MoveOptions, RelocationStrategy};
use crate::tree::{copy_tree, plan_tree_async};

/// Move the entity at `source` to `destination`.
///
/// Preconditions are checked before anything touches the disk: an existing
/// destination without `overwrite` fails with [`StorageError::AlreadyExists`]
/// and a directory cannot move below itself.
pub(crate) async fn relocate(
    kind: ObjectKind,
    source: &Path,
    destination: &Path,
    options: &MoveOptions,
    config: &EngineConfig,
) -> Result<()> {
    if source == destination {
        return Ok(());
    }
    if kind == ObjectKind::Directory && destination.starts_with(source) {
        return Err(StorageError::invalid(
            destination,
            "cannot move a directory into itself",
        ));
    }

    let exists = path_exists(destination).await?;
    if exists && !options.overwrite {
        return Err(StorageError::AlreadyExists {
            path: destination.to_path_buf(),
        });
    }
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StorageError::io(parent, e))?;
    }

    let strategy = match options.strategy {
        RelocationStrategy::Auto if same_volume(source, destination).await => {
            RelocationStrategy::Rename
        }
        RelocationStrategy::Auto => RelocationStrategy::CopyThenDelete,
        forced => forced,
    };
    debug!(
        source = %source.display(),
        destination = %destination.display(),
        ?strategy,
        "relocating"
    );

    if strategy == RelocationStrategy::Rename {
        let size = match options.progress {
            Some(_) => entry_size(kind, source).await,
            None => 0,
        };
        match rename_in_place(kind, source, destination, exists).await {
            Ok(()) => {
                if let Some(sink) = &options.progress {
                    sink.report(StorageProgress::completed(size));
                }
                info!(
                    source = %source.display(),
                    destination = %destination.display(),
                    "renamed"
                );
                return Ok(());
            }
            Err(e)
                if options.strategy == RelocationStrategy::Auto
                    && e.kind() == io::ErrorKind::CrossesDevices =>
            {
                debug!(source = %source.display(), "rename crossed devices, copying instead");
            }
            Err(e) => return Err(StorageError::io_pair(source, destination, e)),
        }
    }

    match kind {
        ObjectKind::File => {
            move_file_across(source, destination, options, config, |path| async move {
                tokio::fs::remove_file(path).await
            })
            .await
        }
        ObjectKind::Directory => {
            if exists {
                remove_any(destination)
                    .await
                    .map_err(|e| StorageError::io(destination, e))?;
            }
            move_directory_across(source, destination, options, config, |path| async move {
                tokio::fs::remove_dir_all(path).await
            })
            .await
        }
    }
}

async fn rename_in_place(
    kind: ObjectKind,
    source: &Path,
    destination: &Path,
    exists: bool,
) -> io::Result<()> {
    // A file rename replaces its target atomically; a directory target has to go first.
    if exists && kind == ObjectKind::Directory {
        remove_any(destination).await?;
    }
    tokio::fs::rename(source, destination).await
}

/// Copy a file across volumes, then remove the source with `remove_source`.
pub(crate) async fn move_file_across<F, Fut>(
    source: &Path,
    destination: &Path,
    options: &MoveOptions,
    config: &EngineConfig,
    remove_source: F,
) -> Result<()>
where
    F: FnOnce(PathBuf) -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    let copied = copy_file(
        source,
        destination,
        options.overwrite,
        config,
        options.progress.as_deref(),
        &options.cancel,
    )
    .await;

    if let Err(e) = copied {
        // Only a failure mid-stream leaves a partial file of ours behind.
        if matches!(e, StorageError::IoPair { .. }) {
            discard(destination).await;
        }
        return Err(e);
    }

    if let Err(e) = remove_source(source.to_path_buf()).await {
        warn!(
            source = %source.display(),
            error = %e,
            "removing source failed, rolling back destination copy"
        );
        discard(destination).await;
        return Err(StorageError::io(source, e));
    }

    info!(
        source = %source.display(),
        destination = %destination.display(),
        "moved across volumes"
    );
    Ok(())
}

/// Copy a directory tree across volumes, then remove the source tree.
///
/// When the source cannot be removed, the destination copy is discarded
/// only if the source tree is still complete; a partially removed source
/// keeps the copy so no content is lost.
pub(crate) async fn move_directory_across<F, Fut>(
    source: &Path,
    destination: &Path,
    options: &MoveOptions,
    config: &EngineConfig,
    remove_source: F,
) -> Result<()>
where
    F: FnOnce(PathBuf) -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    let before = plan_tree_async(source).await?;
    let copy_options = DirCopyOptions {
        overwrite: false,
        max_concurrency: None,
        progress: options.progress.clone(),
        cancel: options.cancel.clone(),
    };

    if let Err(e) = copy_tree(source, destination, &before, &copy_options, config).await {
        if !e.is_cancelled() {
            discard_tree(destination).await;
        }
        return Err(e);
    }

    if let Err(e) = remove_source(source.to_path_buf()).await {
        let intact = match plan_tree_async(source).await {
            Ok(after) => after.errors.is_empty() && after.matches(&before),
            Err(_) => false,
        };
        if intact {
            warn!(source = %source.display(), error = %e, "removing source failed, rolling back");
            discard_tree(destination).await;
        } else {
            warn!(
                source = %source.display(),
                destination = %destination.display(),
                error = %e,
                "source partially removed, keeping the destination copy"
            );
        }
        return Err(StorageError::io(source, e));
    }

    info!(
        source = %source.display(),
        destination = %destination.display(),
        "directory moved across volumes"
    );
    Ok(())
}

async fn path_exists(path: &Path) -> Result<bool> {
    match tokio::fs::symlink_metadata(path).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StorageError::io(path, e)),
    }
}

async fn remove_any(path: &Path) -> io::Result<()> {
    let metadata = match tokio::fs::symlink_metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if metadata.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    }
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "could not remove partial copy");
        }
    }
}

async fn discard_tree(path: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(path).await {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "could not remove partial tree copy");
        }
    }
}

async fn entry_size(kind: ObjectKind, path: &Path) -> u64 {
    match kind {
        ObjectKind::File => tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0),
        ObjectKind::Directory => plan_tree_async(path)
            .await
            .map(|plan| plan.total_bytes)
            .unwrap_or(0),
    }
}

/// Whether `source` and the directory that will hold `destination` live on
/// the same device.
#[cfg(unix)]
pub(crate) async fn same_volume(source: &Path, destination: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    let Ok(from) = tokio::fs::symlink_metadata(source).await else {
        return false;
    };
    for anchor in destination.ancestors().skip(1) {
        if let Ok(to) = tokio::fs::metadata(anchor).await {
            return from.dev() == to.dev();
        }
    }
    false
}

/// Whether both paths share a root (drive letter or UNC share).
#[cfg(not(unix))]
pub(crate) async fn same_volume(source: &Path, destination: &Path) -> bool {
    fn root(path: &Path) -> Option<String> {
        match path.components().next()? {
            std::path::Component::Prefix(prefix) => {
                Some(prefix.as_os_str().to_string_lossy().to_uppercase())
            }
            _ => None,
        }
    }
    root(source) == root(destination)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsobject_core::{FnSink, StorageProgress};
    use std::fs;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn failing_remove(_: PathBuf) -> std::future::Ready<io::Result<()>> {
        std::future::ready(Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "source is locked",
        )))
    }

    #[tokio::test]
    async fn test_same_volume_rename() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("a.txt");
        let dest = temp.path().join("nested/b.txt");
        fs::write(&source, "payload").unwrap();

        let reports = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&reports);
        let options = MoveOptions::default().with_progress(Arc::new(FnSink(
            move |p: StorageProgress| captured.lock().unwrap().push(p),
        )));

        relocate(ObjectKind::File, &source, &dest, &options, &EngineConfig::default())
            .await
            .unwrap();

        assert!(!source.exists());
        assert_eq!(fs::read_to_string(&dest).unwrap(), "payload");
        let reports = reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].bytes_transferred, 7);
        assert!(reports[0].is_complete());
    }

    #[tokio::test]
    async fn test_existing_destination_rejected_before_any_change() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("a.txt");
        let dest = temp.path().join("b.txt");
        fs::write(&source, "new").unwrap();
        fs::write(&dest, "old").unwrap();

        let err = relocate(
            ObjectKind::File,
            &source,
            &dest,
            &MoveOptions::default(),
            &EngineConfig::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, StorageError::AlreadyExists { .. }));
        assert_eq!(fs::read_to_string(&source).unwrap(), "new");
        assert_eq!(fs::read_to_string(&dest).unwrap(), "old");
    }

    #[tokio::test]
    async fn test_forced_copy_then_delete() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("a.txt");
        let dest = temp.path().join("b.txt");
        fs::write(&source, "payload").unwrap();

        let options = MoveOptions::default().with_strategy(RelocationStrategy::CopyThenDelete);
        relocate(ObjectKind::File, &source, &dest, &options, &EngineConfig::default())
            .await
            .unwrap();

        assert!(!source.exists());
        assert_eq!(fs::read_to_string(&dest).unwrap(), "payload");
    }

    #[tokio::test]
    async fn test_file_rollback_when_source_removal_fails() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("a.txt");
        let dest = temp.path().join("b.txt");
        fs::write(&source, "payload").unwrap();

        let err = move_file_across(
            &source,
            &dest,
            &MoveOptions::default(),
            &EngineConfig::default(),
            failing_remove,
        )
        .await
        .unwrap_err();

        match err {
            StorageError::Io { path, source: io_err } => {
                assert_eq!(path, source);
                assert_eq!(io_err.kind(), io::ErrorKind::PermissionDenied);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(fs::read_to_string(&source).unwrap(), "payload");
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_directory_rollback_when_source_removal_fails() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("src");
        let dest = temp.path().join("dst");
        fs::create_dir_all(source.join("inner/empty")).unwrap();
        fs::write(source.join("inner/a.txt"), "a").unwrap();

        let err = move_directory_across(
            &source,
            &dest,
            &MoveOptions::default(),
            &EngineConfig::default(),
            failing_remove,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, StorageError::Io { .. }));
        assert!(source.join("inner/a.txt").exists());
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_directory_cannot_move_into_itself() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("src");
        fs::create_dir(&source).unwrap();

        let err = relocate(
            ObjectKind::Directory,
            &source,
            &source.join("child"),
            &MoveOptions::default(),
            &EngineConfig::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, StorageError::PathValidation { .. }));
        assert!(source.is_dir());
    }

    #[tokio::test]
    async fn test_directory_overwrite_replaces_destination() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("src");
        let dest = temp.path().join("dst");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("new.txt"), "new").unwrap();
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("old.txt"), "old").unwrap();

        relocate(
            ObjectKind::Directory,
            &source,
            &dest,
            &MoveOptions::overwrite(),
            &EngineConfig::default(),
        )
        .await
        .unwrap();

        assert!(!source.exists());
        assert!(dest.join("new.txt").exists());
        assert!(!dest.join("old.txt").exists());
    }

    #[tokio::test]
    async fn test_same_volume_within_tempdir() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("a.txt");
        fs::write(&source, "x").unwrap();
        assert!(same_volume(&source, &temp.path().join("missing/deeper/b.txt")).await);
    }
}
