//! Change notifications raised by storage objects.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::metadata::MetadataSnapshot;

/// What happened to the entity behind an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
pub enum ChangeType {
    Created,
    Modified,
    Deleted,
    Relocated,
}

/// A single change notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// The kind of change.
    pub change: ChangeType,
    /// Path of the entity after the change (before it, for deletions).
    pub path: PathBuf,
    /// The replacement snapshot; `None` for deletions.
    pub metadata: Option<Arc<MetadataSnapshot>>,
}

impl ChangeEvent {
    /// A change that produced a new snapshot.
    pub fn new(change: ChangeType, metadata: Arc<MetadataSnapshot>) -> Self {
        Self {
            change,
            path: metadata.path.clone(),
            metadata: Some(metadata),
        }
    }

    /// A deletion of the entity at `path`.
    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self {
            change: ChangeType::Deleted,
            path: path.into(),
            metadata: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_type_display_round_trip() {
        assert_eq!(ChangeType::Relocated.to_string(), "Relocated");
        assert_eq!("Modified".parse::<ChangeType>().unwrap(), ChangeType::Modified);
    }

    #[test]
    fn test_deleted_has_no_snapshot() {
        let event = ChangeEvent::deleted("/tmp/gone");
        assert_eq!(event.change, ChangeType::Deleted);
        assert!(event.metadata.is_none());
    }
}
