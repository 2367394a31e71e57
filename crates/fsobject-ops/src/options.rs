//! Options accepted by mutating operations.

use std::sync::Arc;

use fsobject_core::ProgressSink;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Options for single-file copy operations.
#[derive(Clone, Default)]
pub struct CopyOptions {
    /// Replace an existing destination instead of failing.
    pub overwrite: bool,
    /// Where to deliver progress reports.
    pub progress: Option<Arc<dyn ProgressSink>>,
    /// Cancellation signal. A cancelled copy leaves whatever it had
    /// written at the destination.
    pub cancel: CancellationToken,
}

impl CopyOptions {
    /// Options that replace an existing destination.
    pub fn overwrite() -> Self {
        Self {
            overwrite: true,
            ..Default::default()
        }
    }

    /// Attach a progress sink.
    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    /// Attach a cancellation token.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// How a relocation reaches its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RelocationStrategy {
    /// Rename when both ends share a volume, copy then delete otherwise.
    #[default]
    Auto,
    /// Always rename; fails if the volumes differ.
    Rename,
    /// Always copy then delete the source.
    CopyThenDelete,
}

/// Options for move and rename operations.
#[derive(Clone, Default)]
pub struct MoveOptions {
    /// Replace an existing destination instead of failing.
    pub overwrite: bool,
    /// Relocation strategy.
    pub strategy: RelocationStrategy,
    /// Where to deliver progress reports.
    pub progress: Option<Arc<dyn ProgressSink>>,
    /// Cancellation signal for the copy phase of a cross-volume move.
    pub cancel: CancellationToken,
}

impl MoveOptions {
    /// Options that replace an existing destination.
    pub fn overwrite() -> Self {
        Self {
            overwrite: true,
            ..Default::default()
        }
    }

    /// Force a strategy.
    pub fn with_strategy(mut self, strategy: RelocationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Attach a progress sink.
    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    /// Attach a cancellation token.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Options for streaming external content into a file.
#[derive(Clone, Default)]
pub struct WriteOptions {
    /// Where to deliver progress reports.
    pub progress: Option<Arc<dyn ProgressSink>>,
    /// Cancellation signal.
    pub cancel: CancellationToken,
}

impl WriteOptions {
    /// Attach a progress sink.
    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    /// Attach a cancellation token.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Options for directory tree copies.
#[derive(Clone, Default)]
pub struct DirCopyOptions {
    /// Replace existing files at the destination.
    pub overwrite: bool,
    /// Files copied at once; falls back to the engine config.
    pub max_concurrency: Option<usize>,
    /// Where to deliver aggregated progress reports.
    pub progress: Option<Arc<dyn ProgressSink>>,
    /// Cancellation signal.
    pub cancel: CancellationToken,
}

impl DirCopyOptions {
    /// Options that replace existing files.
    pub fn overwrite() -> Self {
        Self {
            overwrite: true,
            ..Default::default()
        }
    }

    /// Attach a progress sink.
    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    /// Attach a cancellation token.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Limit concurrent file copies.
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = Some(max);
        self
    }
}

impl std::fmt::Debug for CopyOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CopyOptions")
            .field("overwrite", &self.overwrite)
            .field("progress", &self.progress.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl std::fmt::Debug for MoveOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MoveOptions")
            .field("overwrite", &self.overwrite)
            .field("strategy", &self.strategy)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}
