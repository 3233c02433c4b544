//! Aggregator configuration.

use std::time::Duration;

use crate::error::{AggregatorError, Result};

/// Default message bus address.
pub const DEFAULT_STREAM_URL: &str = "redis://127.0.0.1:6379";

/// Settings for consuming the log stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorConfig {
    /// One consumer task is started per address.
    pub stream_urls: Vec<String>,
    /// Name of the stream holding the envelopes.
    pub stream: String,
    /// Consumer group shared by every logger replica.
    pub group: String,
    /// Maximum entries per read.
    pub count: usize,
    /// How long a read waits for new entries.
    pub block: Duration,
    /// Pause before reconnecting after a failed read.
    pub backoff: Duration,
    /// Timeout for non-blocking bus commands.
    pub command_timeout: Duration,
    /// How long [`crate::Aggregator::stop`] waits for the consumers.
    pub stop_timeout: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            stream_urls: vec![DEFAULT_STREAM_URL.to_string()],
            stream: "logs".to_string(),
            group: "logger".to_string(),
            count: 30,
            block: Duration::from_secs(30),
            backoff: Duration::from_secs(1),
            command_timeout: Duration::from_secs(10),
            stop_timeout: Duration::from_secs(1),
        }
    }
}

impl AggregatorConfig {
    /// Creates a config consuming from the given addresses.
    #[must_use]
    pub fn new<I, S>(stream_urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stream_urls: stream_urls.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Sets the stream name.
    #[must_use]
    pub fn with_stream(mut self, stream: impl Into<String>) -> Self {
        self.stream = stream.into();
        self
    }

    /// Sets the consumer group.
    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    /// Sets the maximum entries per read.
    #[must_use]
    pub const fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    /// Sets the blocking wait of each read.
    #[must_use]
    pub const fn with_block(mut self, block: Duration) -> Self {
        self.block = block;
        self
    }

    /// Sets the reconnect backoff.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the timeout of non-blocking bus commands.
    #[must_use]
    pub const fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Sets the stop timeout.
    #[must_use]
    pub const fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Checks that the settings can be used.
    ///
    /// # Errors
    ///
    /// Returns [`AggregatorError::InvalidConfig`] describing the first problem.
    pub fn validate(&self) -> Result<()> {
        if self.stream_urls.is_empty() || self.stream_urls.iter().any(|u| u.trim().is_empty()) {
            return Err(AggregatorError::InvalidConfig(
                "at least one non-empty stream url is required".to_string(),
            ));
        }
        if self.stream.is_empty() {
            return Err(AggregatorError::InvalidConfig("stream name is empty".to_string()));
        }
        if self.group.is_empty() {
            return Err(AggregatorError::InvalidConfig("consumer group is empty".to_string()));
        }
        if self.count == 0 {
            return Err(AggregatorError::InvalidConfig("read count must be positive".to_string()));
        }
        // BLOCK 0 waits forever server-side, which the client read deadline forbids.
        if self.block.is_zero() {
            return Err(AggregatorError::InvalidConfig("block wait must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment() {
        let config = AggregatorConfig::default();
        assert_eq!(config.stream_urls, vec![DEFAULT_STREAM_URL]);
        assert_eq!(config.stream, "logs");
        assert_eq!(config.group, "logger");
        assert_eq!(config.count, 30);
        assert_eq!(config.block, Duration::from_secs(30));
        assert_eq!(config.stop_timeout, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_sets_fields() {
        let config = AggregatorConfig::new(["redis://a:1", "redis://b:2"])
            .with_stream("s")
            .with_group("g")
            .with_count(5)
            .with_block(Duration::from_millis(10))
            .with_backoff(Duration::from_millis(20))
            .with_stop_timeout(Duration::from_secs(3));
        assert_eq!(config.stream_urls.len(), 2);
        assert_eq!(config.stream, "s");
        assert_eq!(config.group, "g");
        assert_eq!(config.count, 5);
        assert_eq!(config.backoff, Duration::from_millis(20));
        assert_eq!(config.stop_timeout, Duration::from_secs(3));
    }

    #[test]
    fn validate_rejects_bad_settings() {
        assert!(AggregatorConfig::new(Vec::<String>::new()).validate().is_err());
        assert!(AggregatorConfig::new([" "]).validate().is_err());
        assert!(AggregatorConfig::default().with_stream("").validate().is_err());
        assert!(AggregatorConfig::default().with_group("").validate().is_err());
        assert!(AggregatorConfig::default().with_count(0).validate().is_err());
        assert!(AggregatorConfig::default().with_block(Duration::ZERO).validate().is_err());
    }
}
