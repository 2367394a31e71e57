//! Storage object engine for fsobject.
//!
//! This crate provides file and directory handles with serialized, cancellable
//! copy/move/rename/delete operations, progress reporting through
//! [`ProgressSink`](fsobject_core::ProgressSink), same-volume renames with a
//! copy+delete fallback across volumes, and debounced change monitoring for
//! directories.

mod copy;
mod directory;
mod file;
mod handle;
mod lock_wait;
mod move_op;
mod object;
mod options;
mod progress;
mod tree;
mod watcher;

pub use copy::{TransferError, buffer_size_for, copy_file, copy_stream};
pub use directory::DirectoryObject;
pub use file::FileObject;
pub use handle::StorageHandle;
pub use lock_wait::{DEFAULT_POLL_INTERVAL, wait_until_unlocked};
pub use options::{CopyOptions, DirCopyOptions, MoveOptions, RelocationStrategy, WriteOptions};
