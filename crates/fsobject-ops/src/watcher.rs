//! Directory change monitor with debouncing.
//!
//! OS events only feed a pending set. Once the debounce window passes with
//! no new event, the directory is re-snapshotted and a single `Modified`
//! notification goes out for the whole burst.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use fsobject_core::{ChangeType, Result, StorageError};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::object::ObjectCore;

/// A running watch over one directory. Stops when dropped.
pub(crate) struct DirectoryMonitor {
    _watcher: RecommendedWatcher,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl DirectoryMonitor {
    /// Start watching `root` recursively on behalf of `core`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(core: &Arc<ObjectCore>, root: &Path, window: Duration) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let watched = root.to_path_buf();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if matches!(event.kind, EventKind::Access(_)) {
                    return;
                }
                for path in event.paths {
                    let _ = tx.send(path);
                }
            }
            Err(e) => warn!(root = %watched.display(), error = %e, "watch error"),
        })
        .map_err(|e| watch_error(root, e))?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| watch_error(root, e))?;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(debounce_loop(
            rx,
            Arc::downgrade(core),
            window,
            cancel.clone(),
        ));

        debug!(root = %root.display(), ?window, "directory monitor started");
        Ok(Self {
            _watcher: watcher,
            cancel,
            task,
        })
    }
}

impl Drop for DirectoryMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

impl std::fmt::Debug for DirectoryMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryMonitor")
            .field("stopped", &self.cancel.is_cancelled())
            .finish()
    }
}

fn watch_error(root: &Path, e: notify::Error) -> StorageError {
    StorageError::Watch {
        path: root.to_path_buf(),
        message: e.to_string(),
    }
}

/// Collect paths into bursts and flush one notification per burst.
pub(crate) async fn debounce_loop(
    mut rx: mpsc::UnboundedReceiver<PathBuf>,
    core: Weak<ObjectCore>,
    window: Duration,
    cancel: CancellationToken,
) {
    let mut pending: HashSet<PathBuf> = HashSet::new();

    loop {
        let first = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            path = rx.recv() => path,
        };
        let Some(first) = first else { return };
        pending.insert(first);

        let mut closed = false;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                next = tokio::time::timeout(window, rx.recv()) => match next {
                    Ok(Some(path)) => {
                        trace!(path = %path.display(), "change queued");
                        pending.insert(path);
                    }
                    Ok(None) => {
                        closed = true;
                        break;
                    }
                    // Quiet for a full window
                    Err(_) => break,
                },
            }
        }

        flush(&core, &mut pending).await;
        if closed {
            return;
        }
    }
}

async fn flush(core: &Weak<ObjectCore>, pending: &mut HashSet<PathBuf>) {
    let events = pending.len();
    pending.clear();

    let Some(core) = core.upgrade() else { return };
    let Ok(path) = core.full_path() else { return };

    match core.snapshot(&path).await {
        Ok(metadata) => {
            if core.apply(ChangeType::Modified, metadata) {
                debug!(path = %path.display(), events, "directory change flushed");
            }
        }
        Err(e) => debug!(path = %path.display(), error = %e, "skipping flush"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsobject_core::{ObjectKind, StorageContext};
    use tempfile::TempDir;

    use crate::object::take_snapshot;

    const WINDOW: Duration = Duration::from_millis(250);

    async fn dir_core(path: &Path) -> Arc<ObjectCore> {
        let context = StorageContext::default();
        let metadata = take_snapshot(&context, path, ObjectKind::Directory).await.unwrap();
        ObjectCore::new(ObjectKind::Directory, path.to_path_buf(), metadata, context)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_to_one_notification() {
        let temp = TempDir::new().unwrap();
        let core = dir_core(temp.path()).await;
        let mut changes = core.subscribe();

        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(debounce_loop(rx, Arc::downgrade(&core), WINDOW, cancel.clone()));

        std::fs::write(temp.path().join("new.txt"), "abc").unwrap();
        for i in 0..20 {
            tx.send(temp.path().join(format!("f{i}"))).unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(changes.try_recv().is_err(), "fired before the window elapsed");

        let event = changes.recv().await.unwrap();
        assert_eq!(event.change, ChangeType::Modified);
        assert_eq!(event.metadata.unwrap().file_count(), 1);

        tokio::time::sleep(WINDOW * 4).await;
        assert!(changes.try_recv().is_err());

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_vanished_directory_is_skipped() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("watched");
        std::fs::create_dir(&root).unwrap();
        let core = dir_core(&root).await;
        let mut changes = core.subscribe();

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(debounce_loop(
            rx,
            Arc::downgrade(&core),
            WINDOW,
            CancellationToken::new(),
        ));

        tx.send(root.join("x")).unwrap();
        std::fs::remove_dir_all(&root).unwrap();
        drop(tx);

        // The loop flushes the last burst and exits once the sender is gone.
        task.await.unwrap();
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disposed_object_receives_nothing() {
        let temp = TempDir::new().unwrap();
        let core = dir_core(temp.path()).await;
        let mut changes = core.subscribe();

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(debounce_loop(
            rx,
            Arc::downgrade(&core),
            WINDOW,
            CancellationToken::new(),
        ));

        tx.send(temp.path().join("x")).unwrap();
        core.dispose();
        core.dispose();
        drop(tx);

        task.await.unwrap();
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_monitor_reports_real_changes() {
        let temp = TempDir::new().unwrap();
        let core = dir_core(temp.path()).await;
        let mut changes = core.subscribe();

        let monitor = DirectoryMonitor::start(&core, temp.path(), Duration::from_millis(100)).unwrap();
        // Give the OS watch a moment to settle
        tokio::time::sleep(Duration::from_millis(100)).await;
        for i in 0..5 {
            std::fs::write(temp.path().join(format!("f{i}.txt")), "x").unwrap();
        }

        let event = tokio::time::timeout(Duration::from_secs(10), changes.recv())
            .await
            .expect("no notification")
            .unwrap();
        assert_eq!(event.change, ChangeType::Modified);

        drop(monitor);
    }
}
