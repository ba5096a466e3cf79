use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where and how Shelf stores files. Fixed for the lifetime of the process.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one file per blob.
    pub resources_dir: PathBuf,
    /// JSON file holding the id -> display-name mapping.
    pub mapping_path: PathBuf,
    /// Largest accepted upload in bytes. `0` means unlimited.
    pub max_file_size: u64,
}

impl StorageConfig {
    /// Returns `true` if `size` is over the configured limit.
    pub fn exceeds_limit(&self, size: u64) -> bool {
        self.max_file_size > 0 && size > self.max_file_size
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            resources_dir: PathBuf::from("resources"),
            mapping_path: PathBuf::from("mapping.json"),
            max_file_size: 0,
        }
    }
}
