//! Double-buffered streaming copy engine.
//!
//! Two buffers alternate: while chunk N is written from the front buffer,
//! chunk N+1 is read into the back buffer. Both halves are awaited together,
//! then the buffers swap. A zero-length read ends the transfer.

use std::future::Future;
use std::io;
use std::path::Path;

use fsobject_core::{EngineConfig, ProgressSink, Result, StorageError};
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::progress::ProgressTracker;

/// Failure inside [`copy_stream`], before path context is attached.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("read failed: {0}")]
    Read(#[source] io::Error),
    #[error("write failed: {0}")]
    Write(#[source] io::Error),
    #[error("transfer cancelled")]
    Cancelled,
}

impl TransferError {
    /// Attach the paths of both ends.
    pub fn with_paths(self, from: &Path, to: &Path) -> StorageError {
        match self {
            Self::Read(e) | Self::Write(e) => StorageError::io_pair(from, to, e),
            Self::Cancelled => StorageError::Cancelled {
                path: to.to_path_buf(),
            },
        }
    }

    /// Attach a single path, for streams that have no path of their own.
    pub fn at(self, path: &Path) -> StorageError {
        match self {
            Self::Read(e) | Self::Write(e) => StorageError::io(path, e),
            Self::Cancelled => StorageError::Cancelled {
                path: path.to_path_buf(),
            },
        }
    }
}

/// Pick a buffer size aiming for `target_chunks` chunks per transfer,
/// clamped to the configured bounds.
pub fn buffer_size_for(total: Option<u64>, config: &EngineConfig) -> usize {
    let wanted = match total {
        Some(total) => {
            let per_chunk = total / config.target_chunks.max(1);
            usize::try_from(per_chunk).unwrap_or(usize::MAX)
        }
        None => config.unknown_length_buffer_size,
    };
    wanted.clamp(config.min_buffer_size, config.max_buffer_size)
}

/// Copy everything from `reader` into `writer`.
///
/// `total` is only used for progress reports. Returns the number of bytes
/// copied. Cancellation is checked at every await; a cancelled transfer
/// leaves whatever was already written in place.
pub async fn copy_stream<R, W>(
    reader: &mut R,
    writer: &mut W,
    total: Option<u64>,
    buffer_size: usize,
    progress: Option<&dyn ProgressSink>,
    cancel: &CancellationToken,
) -> std::result::Result<u64, TransferError>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut front = vec![0u8; buffer_size];
    let mut back = vec![0u8; buffer_size];
    let mut tracker = ProgressTracker::new(progress, total.unwrap_or(0));

    let mut filled = cancellable(cancel, reader.read(&mut front))
        .await?
        .map_err(TransferError::Read)?;

    while filled > 0 {
        let chunk = &front[..filled];
        let (next, ()) = cancellable(cancel, async {
            tokio::try_join!(
                async { reader.read(&mut back).await.map_err(TransferError::Read) },
                async { writer.write_all(chunk).await.map_err(TransferError::Write) },
            )
        })
        .await??;

        tracker.advance(filled as u64);
        trace!(chunk = filled, transferred = tracker.transferred(), "chunk written");

        std::mem::swap(&mut front, &mut back);
        filled = next;
    }

    cancellable(cancel, writer.flush())
        .await?
        .map_err(TransferError::Write)?;

    Ok(tracker.transferred())
}

/// Copy the file at `source` to `destination`.
///
/// Without `overwrite` the destination is opened create-new, so an existing
/// file is rejected before any byte is written.
pub async fn copy_file(
    source: &Path,
    destination: &Path,
    overwrite: bool,
    config: &EngineConfig,
    progress: Option<&dyn ProgressSink>,
    cancel: &CancellationToken,
) -> Result<u64> {
    if source == destination {
        return Err(StorageError::invalid(
            destination,
            "source and destination are the same file",
        ));
    }

    let mut reader = File::open(source)
        .await
        .map_err(|e| StorageError::io(source, e))?;
    let source_meta = reader
        .metadata()
        .await
        .map_err(|e| StorageError::io(source, e))?;
    let total = source_meta.len();

    // A destination reached through a link may still be the source itself.
    if let Ok(dest_meta) = tokio::fs::metadata(destination).await {
        if same_entity(&source_meta, &dest_meta) {
            return Err(StorageError::invalid(
                destination,
                "source and destination are the same file",
            ));
        }
    }

    let mut writer = open_destination(destination, overwrite).await?;
    let buffer_size = buffer_size_for(Some(total), config);
    debug!(
        source = %source.display(),
        destination = %destination.display(),
        total,
        buffer_size,
        "starting file copy"
    );

    copy_stream(&mut reader, &mut writer, Some(total), buffer_size, progress, cancel)
        .await
        .map_err(|e| e.with_paths(source, destination))
}

#[cfg(unix)]
fn same_entity(a: &std::fs::Metadata, b: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    a.dev() == b.dev() && a.ino() == b.ino()
}

#[cfg(not(unix))]
fn same_entity(_a: &std::fs::Metadata, _b: &std::fs::Metadata) -> bool {
    false
}

/// Open `path` for writing, create-new unless `overwrite`.
pub(crate) async fn open_destination(path: &Path, overwrite: bool) -> Result<File> {
    let mut options = OpenOptions::new();
    options.write(true);
    if overwrite {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    options
        .open(path)
        .await
        .map_err(|e| StorageError::io(path, e))
}

async fn cancellable<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> std::result::Result<F::Output, TransferError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TransferError::Cancelled),
        out = fut => Ok(out),
    }
}
