//! Error types for log aggregation.

use std::time::Duration;

use drycc_log_store::StoreError;
use thiserror::Error;

/// Errors that can occur while consuming and formatting log messages.
#[derive(Debug, Error)]
pub enum AggregatorError {
    /// The wire envelope is not valid JSON of the expected shape.
    #[error("failed to decode log message: {0}")]
    Decode(#[from] serde_json::Error),

    /// A stream entry carried no envelope payload.
    #[error("stream entry {0} has no data field")]
    MissingPayload(String),

    /// The envelope decoded but its payload has an unexpected shape.
    #[error("failed to classify log message: {0}")]
    Classification(String),

    /// The storage backend failed.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// The message bus answered with something that is not a stream reply.
    #[error("message bus error: {0}")]
    Bus(String),

    /// Cancellation was not observed before the stop deadline.
    #[error("stopping the aggregator timed out after {0:?}")]
    StopTimedOut(Duration),

    /// The configured aggregator realization is unknown.
    #[error("unrecognized aggregator type: '{0}'")]
    UnrecognizedAggregator(String),

    /// The aggregator configuration is invalid.
    #[error("invalid aggregator configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for aggregation operations.
pub type Result<T> = std::result::Result<T, AggregatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = AggregatorError::UnrecognizedAggregator("nsq".to_string());
        assert_eq!(err.to_string(), "unrecognized aggregator type: 'nsq'");

        let err = AggregatorError::StopTimedOut(Duration::from_secs(1));
        assert_eq!(err.to_string(), "stopping the aggregator timed out after 1s");

        let err = AggregatorError::MissingPayload("1-0".to_string());
        assert_eq!(err.to_string(), "stream entry 1-0 has no data field");
    }

    #[test]
    fn store_errors_convert() {
        let err: AggregatorError = StoreError::NotFound("foo".to_string()).into();
        assert!(matches!(err, AggregatorError::Store(StoreError::NotFound(_))));
    }

    #[test]
    fn decode_errors_convert() {
        let json_err = serde_json::from_str::<serde_json::Value>("{\"log\":}").unwrap_err();
        let err: AggregatorError = json_err.into();
        assert!(err.to_string().starts_with("failed to decode log message"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AggregatorError>();
    }
}
