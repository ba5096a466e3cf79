//! Foundation types for Shelf.
//!
//! Every other Shelf crate depends on `shelf-types`.
//!
//! # Key Types
//!
//! - [`FileId`]: validated alphanumeric identifier naming one stored file
//! - [`IdGenerator`] / [`RandomIdGenerator`]: candidate identifier sources
//! - [`sanitize_display_name`]: normalizes untrusted upload names

pub mod error;
pub mod id;
pub mod name;

pub use error::TypeError;
pub use id::{
    is_valid_id, FileId, IdGenerator, RandomIdGenerator, DEFAULT_ID_LEN, MAX_ID_LEN, MIN_ID_LEN,
};
pub use name::{base_name, sanitize_display_name};
