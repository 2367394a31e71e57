//! Directory tree planning, listing and aggregate copy.

use std::io;
use std::path::{Path, PathBuf};

use fsobject_core::{EngineConfig, ObjectKind, OperationError, Result, StorageError};
use futures::stream::{self, StreamExt};
use globset::{Glob, GlobMatcher};
use jwalk::WalkDir;
use tracing::{debug, info, warn};

use crate::copy::copy_file;
use crate::options::DirCopyOptions;
use crate::progress::AggregateProgress;

/// Everything below a directory, relative to it, in walk order.
#[derive(Debug, Default)]
pub(crate) struct TreePlan {
    pub dirs: Vec<PathBuf>,
    pub files: Vec<(PathBuf, u64)>,
    pub links: Vec<PathBuf>,
    pub total_bytes: u64,
    pub errors: Vec<OperationError>,
}

impl TreePlan {
    /// Whether two plans describe the same tree shape and size.
    pub fn matches(&self, other: &TreePlan) -> bool {
        self.files.len() == other.files.len()
            && self.dirs.len() == other.dirs.len()
            && self.links.len() == other.links.len()
            && self.total_bytes == other.total_bytes
    }
}

/// Walk `root` and record its subdirectories, files and links.
pub(crate) fn plan_tree(root: &Path) -> TreePlan {
    let mut plan = TreePlan::default();

    let walker = WalkDir::new(root).skip_hidden(false).sort(true).min_depth(1);
    for entry_result in walker {
        let entry = match entry_result {
            Ok(e) => e,
            Err(err) => {
                let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                plan.errors.push(OperationError::new(path, err.to_string()));
                continue;
            }
        };

        let path = entry.path();
        let Ok(relative) = path.strip_prefix(root).map(Path::to_path_buf) else {
            continue;
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            plan.dirs.push(relative);
        } else if file_type.is_symlink() {
            plan.links.push(relative);
        } else if file_type.is_file() {
            match entry.metadata() {
                Ok(metadata) => {
                    plan.total_bytes += metadata.len();
                    plan.files.push((relative, metadata.len()));
                }
                Err(err) => plan.errors.push(OperationError::new(&path, err.to_string())),
            }
        }
    }

    plan
}

/// [`plan_tree`] on the blocking pool.
pub(crate) async fn plan_tree_async(root: &Path) -> Result<TreePlan> {
    let owned = root.to_path_buf();
    tokio::task::spawn_blocking(move || plan_tree(&owned))
        .await
        .map_err(|e| StorageError::io(root, io::Error::other(e)))
}

/// Copy the tree described by `plan` from `source` into `destination`.
///
/// The directory structure is created first so empty directories survive.
/// Files are then copied concurrently; per-file failures are collected and
/// reported once as [`StorageError::Aggregate`] while successful copies stay
/// in place.
pub(crate) async fn copy_tree(
    source: &Path,
    destination: &Path,
    plan: &TreePlan,
    options: &DirCopyOptions,
    config: &EngineConfig,
) -> Result<u64> {
    let mut failures = plan.errors.clone();

    tokio::fs::create_dir_all(destination)
        .await
        .map_err(|e| StorageError::io(destination, e))?;

    for dir in &plan.dirs {
        let target = destination.join(dir);
        if let Err(e) = tokio::fs::create_dir_all(&target).await {
            failures.push(OperationError::new(target, e.to_string()));
        }
    }

    for link in &plan.links {
        if let Err(e) = copy_link(&source.join(link), &destination.join(link), options.overwrite).await {
            failures.push(OperationError::from_error(source.join(link), &e));
        }
    }

    let concurrency = options
        .max_concurrency
        .unwrap_or(config.max_concurrency)
        .max(1);
    let aggregate = AggregateProgress::new(options.progress.clone(), plan.total_bytes);
    let cancel = &options.cancel;
    let overwrite = options.overwrite;

    debug!(
        source = %source.display(),
        files = plan.files.len(),
        dirs = plan.dirs.len(),
        total = plan.total_bytes,
        concurrency,
        "copying directory tree"
    );

    let results: Vec<(PathBuf, Result<u64>)> = stream::iter(plan.files.iter())
        .map(|(relative, _)| {
            let from = source.join(relative);
            let to = destination.join(relative);
            let sink = aggregate.file_sink();
            async move {
                if cancel.is_cancelled() {
                    return (from, Err(StorageError::Cancelled { path: to }));
                }
                let result = copy_file(&from, &to, overwrite, config, Some(sink.as_ref()), cancel).await;
                (from, result)
            }
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    if cancel.is_cancelled() {
        return Err(StorageError::Cancelled {
            path: destination.to_path_buf(),
        });
    }

    for (from, result) in results {
        if let Err(e) = result {
            warn!(path = %from.display(), error = %e, "file copy failed");
            failures.push(OperationError::from_error(from, &e));
        }
    }

    if failures.is_empty() {
        info!(
            source = %source.display(),
            destination = %destination.display(),
            bytes = aggregate.transferred(),
            "directory tree copied"
        );
        Ok(aggregate.transferred())
    } else {
        Err(StorageError::Aggregate {
            path: source.to_path_buf(),
            failures,
        })
    }
}

#[cfg(unix)]
async fn copy_link(from: &Path, to: &Path, overwrite: bool) -> Result<()> {
    let target = tokio::fs::read_link(from)
        .await
        .map_err(|e| StorageError::io(from, e))?;
    if overwrite && tokio::fs::symlink_metadata(to).await.is_ok() {
        tokio::fs::remove_file(to)
            .await
            .map_err(|e| StorageError::io(to, e))?;
    }
    tokio::fs::symlink(&target, to)
        .await
        .map_err(|e| StorageError::io_pair(from, to, e))
}

#[cfg(not(unix))]
async fn copy_link(from: &Path, _to: &Path, _overwrite: bool) -> Result<()> {
    Err(StorageError::invalid(from, "symbolic links cannot be copied on this platform"))
}

/// List entries of `kind` under `root` whose file name matches `pattern`.
pub(crate) fn list_entries(
    root: &Path,
    pattern: &str,
    recursive: bool,
    kind: ObjectKind,
) -> Result<Vec<PathBuf>> {
    let matcher = compile_pattern(pattern)?;
    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut found = Vec::new();

    let walker = WalkDir::new(root)
        .skip_hidden(false)
        .sort(true)
        .min_depth(1)
        .max_depth(max_depth);

    for entry_result in walker {
        let entry = entry_result.map_err(|err| {
            let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
            let kind = err.io_error().map_or(io::ErrorKind::Other, io::Error::kind);
            StorageError::io(path, io::Error::new(kind, err.to_string()))
        })?;

        let file_type = entry.file_type();
        let wanted = match kind {
            ObjectKind::File => file_type.is_file(),
            ObjectKind::Directory => file_type.is_dir(),
        };
        if wanted && matcher.is_match(entry.file_name()) {
            found.push(entry.path());
        }
    }

    Ok(found)
}

fn compile_pattern(pattern: &str) -> Result<GlobMatcher> {
    let pattern = if pattern.trim().is_empty() { "*" } else { pattern };
    Glob::new(pattern)
        .map(|g| g.compile_matcher())
        .map_err(|e| StorageError::invalid(pattern, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsobject_core::{FnSink, ProgressSink, StorageProgress};
    use std::fs;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn create_test_tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        fs::create_dir_all(root.join("dir1/subdir")).unwrap();
        fs::create_dir_all(root.join("empty")).unwrap();

        fs::write(root.join("file1.txt"), "hello").unwrap();
        fs::write(root.join("dir1/file2.txt"), "world world world").unwrap();
        fs::write(root.join("dir1/subdir/file3.log"), "test").unwrap();

        temp
    }

    #[test]
    fn test_plan_tree() {
        let temp = create_test_tree();
        let plan = plan_tree(temp.path());

        assert_eq!(plan.files.len(), 3);
        assert_eq!(plan.dirs.len(), 3);
        assert_eq!(plan.total_bytes, 5 + 17 + 4);
        assert!(plan.errors.is_empty());
        assert!(plan.files.iter().all(|(p, _)| p.is_relative()));
    }

    #[test]
    fn test_list_entries_pattern_and_depth() {
        let temp = create_test_tree();

        let top = list_entries(temp.path(), "*.txt", false, ObjectKind::File).unwrap();
        assert_eq!(top, vec![temp.path().join("file1.txt")]);

        let all = list_entries(temp.path(), "*.txt", true, ObjectKind::File).unwrap();
        assert_eq!(all.len(), 2);

        let logs = list_entries(temp.path(), "*.log", true, ObjectKind::File).unwrap();
        assert_eq!(logs, vec![temp.path().join("dir1/subdir/file3.log")]);

        let dirs = list_entries(temp.path(), "*", false, ObjectKind::Directory).unwrap();
        assert_eq!(dirs.len(), 2);
    }

    #[test]
    fn test_invalid_pattern() {
        let temp = create_test_tree();
        let err = list_entries(temp.path(), "[", false, ObjectKind::File).unwrap_err();
        assert!(matches!(err, StorageError::PathValidation { .. }));
    }

    #[test]
    fn test_list_missing_root_is_not_found() {
        let temp = TempDir::new().unwrap();
        let err = list_entries(&temp.path().join("vanished"), "*", true, ObjectKind::File)
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_copy_tree_preserves_empty_dirs_and_progress() {
        let temp = create_test_tree();
        let out = TempDir::new().unwrap();
        let dest = out.path().join("copy");

        let last = Arc::new(Mutex::new(None));
        let captured = Arc::clone(&last);
        let sink: Arc<dyn ProgressSink> = Arc::new(FnSink(move |p: StorageProgress| {
            *captured.lock().unwrap() = Some(p);
        }));

        let plan = plan_tree(temp.path());
        let options = DirCopyOptions::default().with_progress(sink).with_max_concurrency(2);
        let copied = copy_tree(temp.path(), &dest, &plan, &options, &EngineConfig::default())
            .await
            .unwrap();

        assert_eq!(copied, 26);
        assert!(dest.join("empty").is_dir());
        assert_eq!(
            fs::read_to_string(dest.join("dir1/subdir/file3.log")).unwrap(),
            "test"
        );
        let report = last.lock().unwrap().unwrap();
        assert_eq!(report.bytes_transferred, 26);
        assert_eq!(report.total_bytes, 26);
    }

    #[tokio::test]
    async fn test_copy_tree_collects_failures() {
        let temp = create_test_tree();
        let out = TempDir::new().unwrap();
        let dest = out.path().join("copy");
        fs::create_dir_all(dest.join("dir1")).unwrap();
        fs::write(dest.join("dir1/file2.txt"), "already here").unwrap();

        let plan = plan_tree(temp.path());
        let err = copy_tree(
            temp.path(),
            &dest,
            &plan,
            &DirCopyOptions::default(),
            &EngineConfig::default(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.failures().len(), 1);
        assert!(err.failures()[0].path.ends_with("dir1/file2.txt"));
        // Everything else still made it across
        assert_eq!(fs::read_to_string(dest.join("file1.txt")).unwrap(), "hello");
        assert_eq!(fs::read_to_string(dest.join("dir1/file2.txt")).unwrap(), "already here");
    }
}
