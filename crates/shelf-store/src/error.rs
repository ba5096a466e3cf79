use std::fmt;

use shelf_types::FileId;

/// Errors from storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The storage directories could not be prepared at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Upload is larger than the configured maximum.
    #[error("file of {size} bytes exceeds size limit of {limit} bytes")]
    SizeLimitExceeded { size: u64, limit: u64 },

    /// No unused identifier was found within the retry budget.
    #[error("failed to allocate a unique id after {attempts} attempts")]
    IdExhaustion { attempts: usize },

    /// A blob with this id already exists, or another writer holds its
    /// temporary file.
    #[error("id already in use: {0}")]
    IdCollision(FileId),

    /// The id is malformed, or no file is stored under it.
    #[error("not found: {0}")]
    NotFound(String),

    /// Mapping could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// The mapping file could not be updated after a blob mutation succeeded.
///
/// The in-memory mapping is correct; the file on disk lags behind it until the
/// next successful save.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PersistenceWarning {
    pub message: String,
}

impl PersistenceWarning {
    pub(crate) fn from_error(err: &StoreError) -> Self {
        Self {
            message: format!("failed to persist mapping: {err}"),
        }
    }
}

impl fmt::Display for PersistenceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}
