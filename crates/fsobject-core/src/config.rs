//! Engine configuration and the collaborator bundle handed to every object.

use std::sync::Arc;
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::metadata::{MetadataProvider, PlatformMetadataProvider};
use crate::type_info::{ExtensionTypeInfo, TypeInfoProvider};

/// Tunables for the copy engine and the directory change monitor.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct EngineConfig {
    /// Quiet period after the last filesystem event before a coalesced
    /// notification is emitted.
    #[builder(default = "Duration::from_millis(250)")]
    #[serde(default = "default_debounce_window")]
    pub debounce_window: Duration,

    /// Maximum number of files copied concurrently by directory operations.
    #[builder(default = "4")]
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Smallest copy buffer.
    #[builder(default = "1024")]
    #[serde(default = "default_min_buffer_size")]
    pub min_buffer_size: usize,

    /// Largest copy buffer.
    #[builder(default = "16 * 1024 * 1024")]
    #[serde(default = "default_max_buffer_size")]
    pub max_buffer_size: usize,

    /// Number of chunks a transfer of known length is split into.
    #[builder(default = "100")]
    #[serde(default = "default_target_chunks")]
    pub target_chunks: u64,

    /// Buffer size used when the source length is unknown.
    #[builder(default = "64 * 1024")]
    #[serde(default = "default_unknown_length_buffer_size")]
    pub unknown_length_buffer_size: usize,

    /// Start a change monitor for every directory object.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub watch_directories: bool,

    /// Capacity of each object's change notification channel.
    #[builder(default = "64")]
    #[serde(default = "default_change_channel_capacity")]
    pub change_channel_capacity: usize,
}

fn default_debounce_window() -> Duration {
    Duration::from_millis(250)
}

fn default_max_concurrency() -> usize {
    4
}

fn default_min_buffer_size() -> usize {
    1024
}

fn default_max_buffer_size() -> usize {
    16 * 1024 * 1024
}

fn default_target_chunks() -> u64 {
    100
}

fn default_unknown_length_buffer_size() -> usize {
    64 * 1024
}

fn default_true() -> bool {
    true
}

fn default_change_channel_capacity() -> usize {
    64
}

impl EngineConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.max_concurrency == Some(0) {
            return Err("max_concurrency must be at least 1".to_string());
        }
        if self.target_chunks == Some(0) {
            return Err("target_chunks must be at least 1".to_string());
        }
        if self.change_channel_capacity == Some(0) {
            return Err("change_channel_capacity must be at least 1".to_string());
        }
        let min = self.min_buffer_size.unwrap_or_else(default_min_buffer_size);
        let max = self.max_buffer_size.unwrap_or_else(default_max_buffer_size);
        if min == 0 || min > max {
            return Err(format!("invalid buffer bounds [{min}, {max}]"));
        }
        Ok(())
    }
}

impl EngineConfig {
    /// Create a new config builder.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_window: default_debounce_window(),
            max_concurrency: default_max_concurrency(),
            min_buffer_size: default_min_buffer_size(),
            max_buffer_size: default_max_buffer_size(),
            target_chunks: default_target_chunks(),
            unknown_length_buffer_size: default_unknown_length_buffer_size(),
            watch_directories: true,
            change_channel_capacity: default_change_channel_capacity(),
        }
    }
}

/// Configuration plus the external collaborators an object consults.
///
/// Cheap to clone; every object keeps its own copy.
#[derive(Debug, Clone)]
pub struct StorageContext {
    pub config: Arc<EngineConfig>,
    pub metadata: Arc<dyn MetadataProvider>,
    pub types: Arc<dyn TypeInfoProvider>,
}

impl StorageContext {
    /// Context with the given config and the platform providers.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config: Arc::new(config),
            metadata: Arc::new(PlatformMetadataProvider::new()),
            types: Arc::new(ExtensionTypeInfo),
        }
    }

    /// Replace the metadata provider.
    pub fn with_metadata_provider(mut self, provider: Arc<dyn MetadataProvider>) -> Self {
        self.metadata = provider;
        self
    }

    /// Replace the type information provider.
    pub fn with_type_info_provider(mut self, provider: Arc<dyn TypeInfoProvider>) -> Self {
        self.types = provider;
        self
    }
}

impl Default for StorageContext {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = EngineConfig::builder()
            .debounce_window(Duration::from_millis(50))
            .max_concurrency(2usize)
            .watch_directories(false)
            .build()
            .unwrap();

        assert_eq!(config.debounce_window, Duration::from_millis(50));
        assert_eq!(config.max_concurrency, 2);
        assert!(!config.watch_directories);
        assert_eq!(config.min_buffer_size, 1024);
    }

    #[test]
    fn test_config_builder_rejects_zero_concurrency() {
        assert!(EngineConfig::builder().max_concurrency(0usize).build().is_err());
    }

    #[test]
    fn test_config_builder_rejects_inverted_buffers() {
        assert!(
            EngineConfig::builder()
                .min_buffer_size(4096usize)
                .max_buffer_size(1024usize)
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"max_concurrency": 8}"#).unwrap();
        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.target_chunks, 100);
        assert!(config.watch_directories);
    }
}
