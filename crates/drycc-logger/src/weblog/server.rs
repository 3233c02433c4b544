//! HTTP server for the read API.

use std::future::Future;
use std::sync::Arc;

use drycc_log_store::LogStorage;
use tokio::net::TcpListener;
use tracing::info;

use super::{create_router, WeblogState};
use crate::config::WeblogConfig;
use crate::error::{WeblogError, WeblogResult};

/// Serves the read API over a storage backend.
#[derive(Clone)]
pub struct WeblogServer {
    state: Arc<WeblogState>,
}

impl WeblogServer {
    /// Create a new server over `storage`.
    #[must_use]
    pub fn new(config: WeblogConfig, storage: Arc<dyn LogStorage>) -> Self {
        Self {
            state: Arc::new(WeblogState::new(config, storage)),
        }
    }

    /// Start the server with graceful shutdown support.
    ///
    /// The server stops accepting requests when `shutdown` completes and
    /// returns once the open requests have finished.
    ///
    /// # Errors
    ///
    /// Returns an error if binding to the configured address fails.
    pub async fn serve_with_shutdown<F>(&self, shutdown: F) -> WeblogResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.state.config().bind_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| WeblogError::BindFailed(addr, e))?;

        info!(addr = %addr, "weblog server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| WeblogError::Internal(e.to_string()))?;

        info!("weblog server shut down");
        Ok(())
    }

    /// Create the router without starting the server.
    pub fn router(&self) -> axum::Router {
        create_router(Arc::clone(&self.state))
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use super::*;
    use tempfile::TempDir;

    fn make_server(addr: SocketAddr, dir: &TempDir) -> WeblogServer {
        let storage = drycc_log_store::FileStore::with_log_root(dir.path()).unwrap();
        WeblogServer::new(WeblogConfig::new(addr), Arc::new(storage))
    }

    #[tokio::test]
    async fn test_bind_failure() {
        let dir = TempDir::new().unwrap();
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let server = make_server(taken.local_addr().unwrap(), &dir);

        let err = server.serve_with_shutdown(async {}).await.unwrap_err();

        assert!(matches!(err, WeblogError::BindFailed(addr, _) if addr == taken.local_addr().unwrap()));
    }

    #[tokio::test]
    async fn test_shutdown_returns() {
        let dir = TempDir::new().unwrap();
        let server = make_server(SocketAddr::from(([127, 0, 0, 1], 0)), &dir);

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            server
                .serve_with_shutdown(async move {
                    let _ = rx.await;
                })
                .await
        });
        tx.send(()).unwrap();

        let result = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
