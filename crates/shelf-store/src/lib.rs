//! Storage layer for Shelf.
//!
//! Clients hand Shelf a blob and a display name and get back an opaque
//! [`FileId`](shelf_types::FileId). This crate owns everything behind that
//! identifier:
//!
//! - [`FsBlobStore`]: one write-once file per blob under the resources
//!   directory, named by its id
//! - [`MappingStore`]: the id -> display-name map, held in memory behind a
//!   reader/writer lock and persisted to a JSON file
//! - [`StorageService`]: the facade request handlers call for add, get,
//!   list and delete
//!
//! # Design Rules
//!
//! 1. Blobs are immutable once written. There is no update, only create and
//!    delete.
//! 2. Every file that becomes visible under its final name is complete: blob
//!    content and the mapping file are both written to a temporary file and
//!    renamed into place.
//! 3. An id is never turned into a path before it has been validated.
//! 4. A failed mapping save after a completed blob mutation does not fail the
//!    operation. It is reported as a [`PersistenceWarning`] and logged.
//! 5. The mapping is loaded once at open and never rebuilt from blob files.

pub mod blob;
pub mod config;
pub mod error;
pub mod mapping;
pub mod service;

pub use blob::FsBlobStore;
pub use config::StorageConfig;
pub use error::{PersistenceWarning, StoreError, StoreResult};
pub use mapping::MappingStore;
pub use service::{Outcome, StorageService, MAX_ID_ATTEMPTS};
