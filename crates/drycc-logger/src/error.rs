//! Error types for the logger service.

use std::net::SocketAddr;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use drycc_log_aggregator::AggregatorError;
use drycc_log_store::StoreError;
use thiserror::Error;
use tracing::warn;

/// Invalid process settings. Always fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Storage settings were rejected.
    #[error("invalid storage settings: {0}")]
    Storage(#[from] StoreError),

    /// Aggregator settings were rejected.
    #[error("invalid aggregator settings: {0}")]
    Aggregator(#[from] AggregatorError),

    /// HTTP API settings were rejected.
    #[error("invalid weblog settings: {0}")]
    Weblog(String),
}

/// Result type alias for HTTP API operations.
pub type WeblogResult<T> = Result<T, WeblogError>;

/// Errors raised while serving the HTTP API.
#[derive(Debug, Error)]
pub enum WeblogError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {0}: {1}")]
    BindFailed(SocketAddr, std::io::Error),

    /// The storage call behind a request failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The server stopped with an I/O error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for WeblogError {
    fn into_response(self) -> Response {
        match &self {
            Self::Store(err) if err.is_not_found() => StatusCode::NO_CONTENT.into_response(),
            Self::Store(err) if err.is_invalid_app() => {
                (StatusCode::BAD_REQUEST, err.to_string()).into_response()
            }
            _ => {
                warn!(error = %self, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
            }
        }
    }
}

/// Errors that end the logger process.
#[derive(Debug, Error)]
pub enum LoggerError {
    /// The settings were invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Storage could not be built.
    #[error("storage: {0}")]
    Store(#[from] StoreError),

    /// The aggregator could not be built, started or stopped in time.
    #[error("aggregator: {0}")]
    Aggregator(#[from] AggregatorError),

    /// The HTTP API could not be served.
    #[error("weblog: {0}")]
    Weblog(#[from] WeblogError),
}
