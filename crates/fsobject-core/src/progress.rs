//! Progress reporting for byte transfers.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Immutable progress report for a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StorageProgress {
    /// Total bytes to transfer (may be 0 if unknown).
    pub total_bytes: u64,
    /// Bytes transferred so far.
    pub bytes_transferred: u64,
    /// Average throughput since the transfer started.
    pub bytes_per_second: f64,
}

impl StorageProgress {
    /// Create a progress report.
    pub fn new(total_bytes: u64, bytes_transferred: u64, bytes_per_second: f64) -> Self {
        Self {
            total_bytes,
            bytes_transferred,
            bytes_per_second,
        }
    }

    /// A report for a transfer that finished in one step.
    pub fn completed(total_bytes: u64) -> Self {
        Self::new(total_bytes, total_bytes, 0.0)
    }

    /// Get the progress as a percentage (0.0 to 100.0).
    pub fn percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            0.0
        } else {
            (self.bytes_transferred as f64 / self.total_bytes as f64) * 100.0
        }
    }

    /// Whether every byte has been transferred.
    pub fn is_complete(&self) -> bool {
        self.total_bytes > 0 && self.bytes_transferred >= self.total_bytes
    }
}

/// Receiver of progress reports.
///
/// Sinks are called from inside the transfer loop and must not block.
pub trait ProgressSink: Send + Sync {
    /// Deliver one report.
    fn report(&self, progress: StorageProgress);
}

impl ProgressSink for mpsc::UnboundedSender<StorageProgress> {
    fn report(&self, progress: StorageProgress) {
        let _ = self.send(progress);
    }
}

impl ProgressSink for mpsc::Sender<StorageProgress> {
    fn report(&self, progress: StorageProgress) {
        // Drop the update rather than stall the transfer.
        let _ = self.try_send(progress);
    }
}

/// Adapts a closure into a [`ProgressSink`].
pub struct FnSink<F>(pub F);

impl<F> ProgressSink for FnSink<F>
where
    F: Fn(StorageProgress) + Send + Sync,
{
    fn report(&self, progress: StorageProgress) {
        (self.0)(progress)
    }
}

impl<F> std::fmt::Debug for FnSink<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FnSink")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_percentage() {
        assert_eq!(StorageProgress::new(200, 50, 0.0).percentage(), 25.0);
        assert_eq!(StorageProgress::new(0, 50, 0.0).percentage(), 0.0);
        assert_eq!(StorageProgress::completed(10).percentage(), 100.0);
    }

    #[test]
    fn test_is_complete() {
        assert!(StorageProgress::completed(10).is_complete());
        assert!(!StorageProgress::new(10, 9, 0.0).is_complete());
        assert!(!StorageProgress::completed(0).is_complete());
    }

    #[test]
    fn test_fn_sink() {
        let seen = Mutex::new(Vec::new());
        let sink = FnSink(|p: StorageProgress| seen.lock().unwrap().push(p.bytes_transferred));
        sink.report(StorageProgress::new(10, 4, 1.0));
        sink.report(StorageProgress::new(10, 10, 1.0));
        assert_eq!(*seen.lock().unwrap(), vec![4, 10]);
    }

    #[test]
    fn test_channel_sink() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.report(StorageProgress::completed(3));
        assert_eq!(rx.try_recv().unwrap().bytes_transferred, 3);
    }
}
