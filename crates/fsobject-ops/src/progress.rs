//! Progress tracking for transfers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use fsobject_core::{ProgressSink, StorageProgress};

/// Tracks one transfer and reports to an optional sink.
pub(crate) struct ProgressTracker<'a> {
    sink: Option<&'a dyn ProgressSink>,
    total: u64,
    transferred: u64,
    start: Instant,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(sink: Option<&'a dyn ProgressSink>, total: u64) -> Self {
        Self {
            sink,
            total,
            transferred: 0,
            start: Instant::now(),
        }
    }

    /// Record `bytes` more and report.
    pub fn advance(&mut self, bytes: u64) {
        self.transferred += bytes;
        if let Some(sink) = self.sink {
            sink.report(self.snapshot());
        }
    }

    pub fn transferred(&self) -> u64 {
        self.transferred
    }

    pub fn snapshot(&self) -> StorageProgress {
        StorageProgress::new(
            self.total,
            self.transferred,
            rate(self.transferred, self.start),
        )
    }
}

/// Running total shared by the concurrent file copies of a tree operation.
pub(crate) struct AggregateProgress {
    sink: Option<Arc<dyn ProgressSink>>,
    total: u64,
    transferred: AtomicU64,
    start: Instant,
}

impl AggregateProgress {
    pub fn new(sink: Option<Arc<dyn ProgressSink>>, total: u64) -> Arc<Self> {
        Arc::new(Self {
            sink,
            total,
            transferred: AtomicU64::new(0),
            start: Instant::now(),
        })
    }

    fn add(&self, delta: u64) {
        let now = self.transferred.fetch_add(delta, Ordering::AcqRel) + delta;
        if let Some(sink) = &self.sink {
            sink.report(StorageProgress::new(self.total, now, rate(now, self.start)));
        }
    }

    /// Bytes transferred across all files so far.
    pub fn transferred(&self) -> u64 {
        self.transferred.load(Ordering::Acquire)
    }

    /// A sink for one file that forwards its deltas into the running total.
    pub fn file_sink(self: &Arc<Self>) -> Arc<dyn ProgressSink> {
        Arc::new(FileShare {
            parent: Arc::clone(self),
            last: AtomicU64::new(0),
        })
    }
}

struct FileShare {
    parent: Arc<AggregateProgress>,
    last: AtomicU64,
}

impl ProgressSink for FileShare {
    fn report(&self, progress: StorageProgress) {
        let previous = self.last.swap(progress.bytes_transferred, Ordering::AcqRel);
        let delta = progress.bytes_transferred.saturating_sub(previous);
        if delta > 0 {
            self.parent.add(delta);
        }
    }
}

fn rate(bytes: u64, start: Instant) -> f64 {
    let secs = start.elapsed().as_secs_f64();
    if secs > 0.0 { bytes as f64 / secs } else { 0.0 }
}
