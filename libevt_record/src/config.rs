use serde::{Deserialize, Serialize};
use std::path::Path;

use super::constants::DEFAULT_SEGMENT_SIZE_MB;
use super::error::ConfigError;

/// Tunable settings of the segmenter, loadable from a YAML file so a whole
/// experiment can share one recording policy. Command-line flags override
/// whatever is loaded here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmenterConfig {
    /// Segment size threshold in megabytes.
    pub segment_size_mb: u64,
    /// Optional startup holdoff in seconds, for attaching a debugger before
    /// the main loop begins consuming input.
    pub debug_holdoff_secs: Option<u64>,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            segment_size_mb: DEFAULT_SEGMENT_SIZE_MB,
            debug_holdoff_secs: None,
        }
    }
}

impl SegmenterConfig {
    /// Read the configuration from a YAML file.
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }
}
