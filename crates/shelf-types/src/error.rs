use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid file id {id:?}: {reason}")]
    InvalidId { id: String, reason: String },

    #[error("invalid id length: expected {min}..={max}, got {actual}")]
    InvalidLength {
        min: usize,
        max: usize,
        actual: usize,
    },
}
