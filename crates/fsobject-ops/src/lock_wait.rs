//! Opt-in helper that waits for other holders to release a file.

use std::path::Path;
use std::time::{Duration, Instant};

use fs2::FileExt;
use fsobject_core::{Result, StorageError};
use tracing::trace;

/// Default interval between lock probes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Poll until an exclusive lock on `path` can be taken, then release it.
///
/// Fails with [`StorageError::Timeout`] once `timeout` has elapsed. The
/// engine never calls this on its own.
pub async fn wait_until_unlocked(
    path: impl AsRef<Path>,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<()> {
    let path = path.as_ref();
    let start = Instant::now();

    loop {
        if try_lock(path).await? {
            return Ok(());
        }
        if start.elapsed() >= timeout {
            return Err(StorageError::Timeout {
                path: path.to_path_buf(),
                waited: start.elapsed(),
            });
        }
        trace!(path = %path.display(), "file still locked");
        tokio::time::sleep(poll_interval).await;
    }
}

async fn try_lock(path: &Path) -> Result<bool> {
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<bool> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .open(&owned)
            .map_err(|e| StorageError::io(&owned, e))?;
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                let _ = FileExt::unlock(&file);
                Ok(true)
            }
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(false),
            Err(e) => Err(StorageError::io(&owned, e)),
        }
    })
    .await
    .map_err(|e| StorageError::io(path, std::io::Error::other(e)))?
}
