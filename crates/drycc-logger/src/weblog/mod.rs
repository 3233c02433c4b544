//! HTTP read API over the log storage.
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `/healthz` | GET | Liveness probe |
//! | `/logs/{app}` | GET | Recent lines, optionally followed live |
//! | `/logs/{app}` | DELETE | Remove everything stored for an application |

pub mod handlers;
pub mod routes;
pub mod server;

use std::sync::Arc;

use drycc_log_store::LogStorage;

use crate::config::WeblogConfig;

pub use routes::create_router;
pub use server::WeblogServer;

/// State shared by every request handler.
pub struct WeblogState {
    config: WeblogConfig,
    storage: Arc<dyn LogStorage>,
}

impl WeblogState {
    /// Creates handler state over `storage`.
    #[must_use]
    pub fn new(config: WeblogConfig, storage: Arc<dyn LogStorage>) -> Self {
        Self { config, storage }
    }

    /// Returns the API settings.
    #[must_use]
    pub const fn config(&self) -> &WeblogConfig {
        &self.config
    }

    /// Returns the storage the handlers read from.
    #[must_use]
    pub fn storage(&self) -> Arc<dyn LogStorage> {
        Arc::clone(&self.storage)
    }
}
