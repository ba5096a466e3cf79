//! HTTP server for Shelf.
//!
//! Exposes a [`StorageService`](shelf_store::StorageService) over HTTP:
//! uploads (multipart or raw body), downloads, JSON listing, deletion and a
//! server-rendered index page.

pub mod config;
pub mod error;
pub mod handler;
pub mod html;
pub mod router;
pub mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{FileEntry, UploadResponse};
pub use router::build_router;
pub use server::ShelfServer;
