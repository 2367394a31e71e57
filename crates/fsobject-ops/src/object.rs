//! Identity, lifecycle and locking shared by file and directory objects.
//!
//! Two locks guard an object. The operation mutex (async) serializes
//! mutating filesystem work and may be held across I/O. The state lock
//! (`parking_lot`) only guards the in-memory path/snapshot pair and is never
//! held across an await, so reading a path is never stuck behind a copy.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use fsobject_core::{
    ChangeEvent, ChangeType, MetadataSnapshot, ObjectKind, Result, StorageContext, StorageError,
};
use parking_lot::RwLock;
use tokio::sync::{Mutex, MutexGuard, broadcast};
use tracing::{debug, trace, warn};

#[derive(Debug, Clone)]
struct ObjectState {
    path: PathBuf,
    metadata: Arc<MetadataSnapshot>,
}

/// Shared substrate behind [`crate::FileObject`] and [`crate::DirectoryObject`].
#[derive(Debug)]
pub(crate) struct ObjectCore {
    kind: ObjectKind,
    /// `None` once disposed.
    state: RwLock<Option<ObjectState>>,
    op_lock: Mutex<()>,
    disposed: AtomicBool,
    changes: broadcast::Sender<ChangeEvent>,
    context: StorageContext,
}

impl ObjectCore {
    pub fn new(
        kind: ObjectKind,
        path: PathBuf,
        metadata: Arc<MetadataSnapshot>,
        context: StorageContext,
    ) -> Arc<Self> {
        let (changes, _) = broadcast::channel(context.config.change_channel_capacity);
        Arc::new(Self {
            kind,
            state: RwLock::new(Some(ObjectState { path, metadata })),
            op_lock: Mutex::new(()),
            disposed: AtomicBool::new(false),
            changes,
            context,
        })
    }

    pub fn context(&self) -> &StorageContext {
        &self.context
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            Err(StorageError::Disposed)
        } else {
            Ok(())
        }
    }

    pub fn full_path(&self) -> Result<PathBuf> {
        self.state
            .read()
            .as_ref()
            .map(|s| s.path.clone())
            .ok_or(StorageError::Disposed)
    }

    /// Derived from the current path, never stored.
    pub fn parent_directory(&self) -> Result<Option<PathBuf>> {
        Ok(self.full_path()?.parent().map(Path::to_path_buf))
    }

    pub fn name(&self) -> Result<String> {
        let path = self.full_path()?;
        Ok(path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned()))
    }

    pub fn metadata(&self) -> Result<Arc<MetadataSnapshot>> {
        self.state
            .read()
            .as_ref()
            .map(|s| Arc::clone(&s.metadata))
            .ok_or(StorageError::Disposed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }

    /// Guard a mutating operation: fail if disposed, then take the
    /// operation mutex. The check is repeated after acquisition because the
    /// object may have been disposed while this call waited.
    pub async fn begin_mutation(&self) -> Result<MutexGuard<'_, ()>> {
        self.ensure_live()?;
        let guard = self.op_lock.lock().await;
        self.ensure_live()?;
        trace!(kind = %self.kind, "operation lock acquired");
        Ok(guard)
    }

    /// Take a fresh snapshot of `path` off the async runtime.
    pub async fn snapshot(&self, path: &Path) -> Result<Arc<MetadataSnapshot>> {
        take_snapshot(&self.context, path, self.kind).await
    }

    /// Swap in a new identity and notify subscribers.
    ///
    /// Only `Relocated` may change the path. Any other change whose snapshot
    /// was taken at a path the object has since left is stale and dropped.
    /// Returns `false`, and emits nothing, when the swap is skipped or the
    /// object was disposed first.
    pub fn apply(&self, change: ChangeType, metadata: Arc<MetadataSnapshot>) -> bool {
        let mut state = self.state.write();
        let Some(current) = state.as_ref() else {
            return false;
        };
        if change != ChangeType::Relocated && current.path != metadata.path {
            trace!(
                stale = %metadata.path.display(),
                current = %current.path.display(),
                "stale snapshot dropped"
            );
            return false;
        }
        *state = Some(ObjectState {
            path: metadata.path.clone(),
            metadata: Arc::clone(&metadata),
        });
        // Sent under the state lock so a concurrent dispose cannot slip in
        // between the swap and the notification.
        let _ = self.changes.send(ChangeEvent::new(change, metadata));
        true
    }

    /// Record that the entity now lives at `destination`.
    ///
    /// The move already happened on disk, so a failed snapshot of the new
    /// location still relocates the object, carrying the previous snapshot
    /// over with its path rewritten.
    pub async fn settle_relocation(&self, destination: &Path) -> Result<Arc<MetadataSnapshot>> {
        let metadata = match self.snapshot(destination).await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(
                    path = %destination.display(),
                    error = %e,
                    "snapshot after relocation failed; keeping previous metadata"
                );
                let mut carried = MetadataSnapshot::clone(&*self.metadata()?);
                carried.path = destination.to_path_buf();
                Arc::new(carried)
            }
        };
        self.apply(ChangeType::Relocated, Arc::clone(&metadata));
        Ok(metadata)
    }

    /// The entity is gone: notify, then dispose.
    pub fn apply_deleted(&self) {
        let mut state = self.state.write();
        if let Some(old) = state.take() {
            self.disposed.store(true, Ordering::Release);
            let _ = self.changes.send(ChangeEvent::deleted(old.path));
        }
    }

    /// Idempotent; returns `true` only for the call that disposed.
    pub fn dispose(&self) -> bool {
        let mut state = self.state.write();
        if self.disposed.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Some(old) = state.take() {
            debug!(path = %old.path.display(), kind = %self.kind, "object disposed");
        }
        true
    }
}

/// Snapshot `path` with the context's providers on the blocking pool.
pub(crate) async fn take_snapshot(
    context: &StorageContext,
    path: &Path,
    kind: ObjectKind,
) -> Result<Arc<MetadataSnapshot>> {
    let metadata = Arc::clone(&context.metadata);
    let types = Arc::clone(&context.types);
    let owned = path.to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<Arc<MetadataSnapshot>> {
        let snapshot = metadata.snapshot(&owned, kind)?;
        let type_info = match kind {
            ObjectKind::File => types.identify(&owned),
            ObjectKind::Directory => None,
        };
        Ok(Arc::new(snapshot.with_type_info(type_info)))
    })
    .await
    .map_err(|e| StorageError::io(path, std::io::Error::other(e)))?
}
