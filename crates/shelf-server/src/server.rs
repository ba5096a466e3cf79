use std::sync::Arc;

use shelf_store::StorageService;
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::router::build_router;

/// Shelf HTTP server.
pub struct ShelfServer {
    config: ServerConfig,
    storage: Arc<StorageService>,
}

impl ShelfServer {
    /// Open the storage described by `config`.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let storage = StorageService::open(config.storage.clone())?;
        Ok(Self::with_storage(config, Arc::new(storage)))
    }

    pub fn with_storage(config: ServerConfig, storage: Arc<StorageService>) -> Self {
        Self { config, storage }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(Arc::clone(&self.storage))
    }

    /// Start serving requests.
    pub async fn serve(self) -> ServerResult<()> {
        let app = self.router();
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr).await?;
        tracing::info!(
            addr = %addr,
            max_file_size = self.config.storage.max_file_size,
            "shelf server listening"
        );
        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}
