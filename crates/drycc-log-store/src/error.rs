//! Error types for log storage.

use thiserror::Error;

/// Errors that can occur while storing or retrieving application logs.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The per-application capacity must be positive.
    #[error("invalid buffer size: {0}")]
    InvalidBufferSize(i64),

    /// The configured storage realization is unknown.
    #[error("unrecognized storage adapter type: {0}")]
    UnrecognizedStorage(String),

    /// No log is currently stored for the application.
    #[error("could not find logs for '{0}'")]
    NotFound(String),

    /// The application name cannot name a log.
    #[error("invalid application name: '{0}'")]
    InvalidApp(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The wire protocol could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The remote store answered with an error reply.
    #[error("server error: {0}")]
    Server(String),

    /// The remote store answered with a reply of an unexpected shape.
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),

    /// The remote connection was closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// A remote operation did not complete in time.
    #[error("operation timed out")]
    Timeout,

    /// A store URL could not be parsed.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// The background writer is no longer accepting lines.
    #[error("storage channel closed")]
    ChannelClosed,
}

impl StoreError {
    /// Returns true if the error reports a missing application log.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true if the error means the connection is no longer usable.
    #[must_use]
    pub const fn is_disconnect(&self) -> bool {
        matches!(self, Self::ConnectionClosed | Self::Io(_) | Self::Protocol(_))
    }

    /// Returns true if the error rejects the application name itself.
    #[must_use]
    pub const fn is_invalid_app(&self) -> bool {
        matches!(self, Self::InvalidApp(_))
    }
}

impl From<redis_protocol::error::RedisProtocolError> for StoreError {
    fn from(err: redis_protocol::error::RedisProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;
