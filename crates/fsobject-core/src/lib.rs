//! Core types and traits for fsobject.
//!
//! This crate holds the value types shared by every storage object: the
//! error taxonomy, metadata snapshots and the provider traits that produce
//! them, progress reports, change events, path validation and the engine
//! configuration. It performs no asynchronous work of its own.

mod change;
mod config;
mod error;
mod metadata;
mod path;
mod progress;
mod type_info;

pub use change::{ChangeEvent, ChangeType};
pub use config::{EngineConfig, EngineConfigBuilder, StorageContext};
pub use error::{OperationError, Result, StorageError};
pub use metadata::{
    Attributes, EntryKind, InodeInfo, MetadataProvider, MetadataSnapshot, ObjectKind,
    PlatformExtras, PlatformMetadataProvider, Timestamps,
};
pub use path::{normalize_lexically, validate_filename, validate_path, validate_relative};
pub use progress::{FnSink, ProgressSink, StorageProgress};
pub use type_info::{ExtensionTypeInfo, TypeInfo, TypeInfoProvider};
