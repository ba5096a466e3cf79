use std::path::Path;

use serde::{Deserialize, Serialize};
use shelf_store::StorageConfig;

use crate::error::{ServerError, ServerResult};

/// Request bodies may exceed the file size limit by this much, to leave room
/// for multipart framing.
pub const MULTIPART_ALLOWANCE: u64 = 64 * 1024;

/// Largest request body accepted for a file size limit, or `None` for no
/// limit.
pub fn body_limit(max_file_size: u64) -> Option<usize> {
    match max_file_size {
        0 => None,
        max => Some(
            usize::try_from(max.saturating_add(MULTIPART_ALLOWANCE)).unwrap_or(usize::MAX),
        ),
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub storage: StorageConfig,
}

impl ServerConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(raw: &str) -> ServerResult<Self> {
        toml::from_str(raw).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn from_toml_file(path: &Path) -> ServerResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    /// `host:port`, as accepted by `TcpListener::bind`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            storage: StorageConfig::default(),
        }
    }
}
