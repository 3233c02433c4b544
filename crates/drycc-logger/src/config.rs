//! Process settings.
//!
//! Every setting can be given as a command-line flag or through its
//! environment variable. [`Settings::into_config`] validates them once and
//! splits them into the per-component configs handed to the constructors.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use drycc_log_aggregator::{AggregatorConfig, VALKEY_AGGREGATOR};
use drycc_log_store::valkey::DEFAULT_VALKEY_URL;
use drycc_log_store::{
    FileStoreConfig, StorageConfig, StorageKind, StoreError, ValkeyStoreConfig,
};

use crate::error::ConfigError;

/// Drycc logger: stores container logs per application and serves them over HTTP.
#[derive(Parser, Debug, Clone)]
#[command(name = "drycc-logger")]
#[command(version, about, long_about = None)]
pub struct Settings {
    /// Storage backend: `file` or `valkey`.
    #[arg(long, env = "DRYCC_LOGGER_STORAGE", default_value = "valkey")]
    pub storage: String,

    /// Directory of the file backend.
    #[arg(long, env = "DRYCC_LOGGER_LOG_ROOT", default_value = "/data/logs")]
    pub log_root: PathBuf,

    /// Lines kept per application by the valkey backend.
    #[arg(long, env = "DRYCC_LOGGER_BUFFER_SIZE", default_value_t = 1000, allow_negative_numbers = true)]
    pub buffer_size: i64,

    /// Address of the valkey backend.
    #[arg(long, env = "DRYCC_VALKEY_URL", default_value = DEFAULT_VALKEY_URL)]
    pub valkey_url: String,

    /// Lines accumulated before the valkey backend flushes.
    #[arg(long, env = "DRYCC_VALKEY_PIPELINE_LENGTH", default_value_t = 50)]
    pub pipeline_length: usize,

    /// Seconds between time-based flushes of the valkey backend.
    #[arg(long, env = "DRYCC_VALKEY_PIPELINE_TIMEOUT_SECONDS", default_value_t = 1)]
    pub pipeline_timeout_seconds: u64,

    /// Comma separated message bus addresses. Defaults to the valkey address.
    #[arg(long, env = "DRYCC_VALKEY_STREAM_URLS")]
    pub stream_urls: Option<String>,

    /// Stream holding the log envelopes.
    #[arg(long, env = "DRYCC_VALKEY_STREAM", default_value = "logs")]
    pub stream: String,

    /// Consumer group shared by every logger replica.
    #[arg(long, env = "DRYCC_VALKEY_STREAM_GROUP", default_value = "logger")]
    pub stream_group: String,

    /// Entries fetched per read.
    #[arg(long, env = "DRYCC_VALKEY_STREAM_COUNT", default_value_t = 30)]
    pub stream_count: usize,

    /// Seconds a read waits for new entries.
    #[arg(long, env = "DRYCC_VALKEY_STREAM_BLOCK_SECONDS", default_value_t = 30)]
    pub stream_block_seconds: u64,

    /// Aggregator realization.
    #[arg(long, env = "AGGREGATOR_TYPE", default_value = VALKEY_AGGREGATOR)]
    pub aggregator_type: String,

    /// Seconds to wait for the aggregator on shutdown.
    #[arg(long, env = "AGGREGATOR_STOP_TIMEOUT_SEC", default_value_t = 1)]
    pub aggregator_stop_timeout_sec: u64,

    /// Upper bound on the lines returned by one request.
    #[arg(long, env = "DRYCC_LOGS_MAXIMUM_LINES", default_value_t = 300, allow_negative_numbers = true)]
    pub maximum_lines: i64,

    /// Upper bound on a follow request, in seconds.
    #[arg(long, env = "DRYCC_LOGS_MAXIMUM_TIMEOUT", default_value_t = 300)]
    pub maximum_timeout: u64,

    /// HTTP listen address.
    #[arg(long, env = "DRYCC_LOGGER_BIND", default_value = "0.0.0.0:8088")]
    pub bind: SocketAddr,
}

/// Validated settings, one config per component.
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Storage backend settings.
    pub storage: StorageConfig,
    /// Aggregator realization name.
    pub aggregator_kind: String,
    /// Aggregator settings.
    pub aggregator: AggregatorConfig,
    /// HTTP API settings.
    pub weblog: WeblogConfig,
}

impl Settings {
    /// Validates the settings and builds the component configs.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first invalid setting.
    pub fn into_config(self) -> Result<LoggerConfig, ConfigError> {
        let kind: StorageKind = self.storage.parse()?;
        if kind == StorageKind::Valkey && self.buffer_size <= 0 {
            return Err(StoreError::InvalidBufferSize(self.buffer_size).into());
        }
        let storage = StorageConfig::new(kind)
            .with_file(FileStoreConfig::new(self.log_root))
            .with_valkey(
                ValkeyStoreConfig::new(self.valkey_url.clone())
                    .with_buffer_size(self.buffer_size)
                    .with_pipeline_length(self.pipeline_length)
                    .with_pipeline_timeout(Duration::from_secs(self.pipeline_timeout_seconds)),
            );

        let stream_urls = self.stream_urls.unwrap_or(self.valkey_url);
        let aggregator = AggregatorConfig::new(
            stream_urls
                .split(',')
                .map(str::trim)
                .filter(|url| !url.is_empty()),
        )
        .with_stream(self.stream)
        .with_group(self.stream_group)
        .with_count(self.stream_count)
        .with_block(Duration::from_secs(self.stream_block_seconds))
        .with_stop_timeout(Duration::from_secs(self.aggregator_stop_timeout_sec));
        aggregator.validate()?;

        let weblog = WeblogConfig::new(self.bind)
            .with_max_lines(self.maximum_lines)
            .with_max_timeout(Duration::from_secs(self.maximum_timeout));
        weblog.validate()?;

        Ok(LoggerConfig {
            storage,
            aggregator_kind: self.aggregator_type,
            aggregator,
            weblog,
        })
    }
}

/// Configuration for the HTTP read API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeblogConfig {
    /// Address to bind the HTTP server to.
    pub bind_addr: SocketAddr,
    /// Line cap of one request, also used when the requested count is invalid.
    pub max_lines: i64,
    /// Longest a follow request stays open.
    pub max_timeout: Duration,
    /// Live lines delivered to one follow request at most.
    pub follow_capacity: usize,
}

impl Default for WeblogConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8088)),
            max_lines: 300,
            max_timeout: Duration::from_secs(300),
            follow_capacity: 100,
        }
    }
}

impl WeblogConfig {
    /// Create a new configuration with the specified bind address.
    #[must_use]
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Self::default()
        }
    }

    /// Set the line cap.
    #[must_use]
    pub const fn with_max_lines(mut self, max_lines: i64) -> Self {
        self.max_lines = max_lines;
        self
    }

    /// Set the follow cap.
    #[must_use]
    pub const fn with_max_timeout(mut self, max_timeout: Duration) -> Self {
        self.max_timeout = max_timeout;
        self
    }

    /// Set the live line cap of follow requests.
    #[must_use]
    pub const fn with_follow_capacity(mut self, capacity: usize) -> Self {
        self.follow_capacity = capacity;
        self
    }

    /// Checks that the caps are usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Weblog`] if a cap is not positive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_lines <= 0 {
            return Err(ConfigError::Weblog("maximum lines must be positive".to_string()));
        }
        if self.max_timeout.is_zero() {
            return Err(ConfigError::Weblog("maximum timeout must be positive".to_string()));
        }
        if self.follow_capacity == 0 {
            return Err(ConfigError::Weblog("follow capacity must be positive".to_string()));
        }
        Ok(())
    }

    /// Resolves the `log_lines` query value.
    ///
    /// Any value outside `0..=max_lines` means the cap.
    #[must_use]
    pub fn log_lines(&self, raw: Option<&str>) -> i64 {
        match raw.map(str::parse::<i64>) {
            Some(Ok(lines)) if (0..=self.max_lines).contains(&lines) => lines,
            _ => self.max_lines,
        }
    }

    /// Resolves the `timeout` query value of a follow request.
    #[must_use]
    pub fn follow_timeout(&self, raw: Option<&str>) -> Duration {
        match raw.map(str::parse::<i64>) {
            Some(Ok(secs)) if secs > 0 && secs.unsigned_abs() <= self.max_timeout.as_secs() => {
                Duration::from_secs(secs.unsigned_abs())
            }
            _ => self.max_timeout,
        }
    }
}

/// Parses a `follow` flag. Anything but a recognised true value is false.
#[must_use]
pub fn parse_flag(raw: Option<&str>) -> bool {
    matches!(raw, Some("1" | "t" | "T" | "true" | "TRUE" | "True"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn parse(args: &[&str]) -> Settings {
        let mut argv = vec!["drycc-logger"];
        argv.extend_from_slice(args);
        Settings::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_build_a_valkey_deployment() {
        let config = parse(&["--valkey-url", "redis://valkey:6379"]).into_config().unwrap();

        assert_eq!(config.storage.kind, StorageKind::Valkey);
        assert_eq!(config.storage.valkey.url, "redis://valkey:6379");
        assert_eq!(config.storage.valkey.buffer_size, 1000);
        assert_eq!(config.storage.valkey.pipeline_length, 50);
        assert_eq!(config.storage.valkey.pipeline_timeout, Duration::from_secs(1));
        assert_eq!(config.aggregator_kind, "valkey");
        assert_eq!(config.aggregator.stream_urls, vec!["redis://valkey:6379"]);
        assert_eq!(config.aggregator.count, 30);
        assert_eq!(config.aggregator.block, Duration::from_secs(30));
        assert_eq!(config.weblog.max_lines, 300);
        assert_eq!(config.weblog.bind_addr.port(), 8088);
    }

    #[test]
    fn stream_urls_are_split_on_commas() {
        let config = parse(&["--stream-urls", "redis://a:1, redis://b:2,"])
            .into_config()
            .unwrap();
        assert_eq!(config.aggregator.stream_urls, vec!["redis://a:1", "redis://b:2"]);
    }

    #[test]
    fn file_storage_ignores_buffer_size() {
        let config = parse(&["--storage", "file", "--log-root", "/tmp/logs", "--buffer-size", "0"])
            .into_config()
            .unwrap();
        assert_eq!(config.storage.kind, StorageKind::File);
        assert_eq!(config.storage.file.log_root, PathBuf::from("/tmp/logs"));
    }

    #[test]
    fn rejects_unknown_storage() {
        let err = parse(&["--storage", "redis"]).into_config().unwrap_err();
        assert!(matches!(err, ConfigError::Storage(StoreError::UnrecognizedStorage(_))));
    }

    #[test_case("0" ; "zero")]
    #[test_case("-5" ; "negative")]
    fn rejects_bad_buffer_size(size: &str) {
        let err = parse(&["--buffer-size", size]).into_config().unwrap_err();
        assert!(matches!(err, ConfigError::Storage(StoreError::InvalidBufferSize(_))));
    }

    #[test]
    fn rejects_zero_read_count() {
        let err = parse(&["--stream-count", "0"]).into_config().unwrap_err();
        assert!(matches!(err, ConfigError::Aggregator(_)));
    }

    #[test]
    fn rejects_zero_maximum_lines() {
        let err = parse(&["--maximum-lines", "0"]).into_config().unwrap_err();
        assert!(matches!(err, ConfigError::Weblog(_)));
    }

    #[test_case(None, 300 ; "absent")]
    #[test_case(Some("10"), 10 ; "in range")]
    #[test_case(Some("0"), 0 ; "zero")]
    #[test_case(Some("300"), 300 ; "at cap")]
    #[test_case(Some("301"), 300 ; "above cap")]
    #[test_case(Some("-1"), 300 ; "negative")]
    #[test_case(Some("lots"), 300 ; "garbage")]
    fn log_lines_are_clamped(raw: Option<&str>, expected: i64) {
        assert_eq!(WeblogConfig::default().log_lines(raw), expected);
    }

    #[test_case(None, 300 ; "absent")]
    #[test_case(Some("5"), 5 ; "in range")]
    #[test_case(Some("0"), 300 ; "zero")]
    #[test_case(Some("-3"), 300 ; "negative")]
    #[test_case(Some("301"), 300 ; "above cap")]
    #[test_case(Some("soon"), 300 ; "garbage")]
    fn follow_timeouts_are_clamped(raw: Option<&str>, expected: u64) {
        assert_eq!(
            WeblogConfig::default().follow_timeout(raw),
            Duration::from_secs(expected)
        );
    }

    proptest::proptest! {
        #[test]
        fn resolved_line_counts_stay_within_cap(raw in ".*") {
            let lines = WeblogConfig::default().log_lines(Some(&raw));
            proptest::prop_assert!((0..=300).contains(&lines));
        }

        #[test]
        fn resolved_timeouts_stay_within_cap(raw in "-?[0-9]{0,6}") {
            let timeout = WeblogConfig::default().follow_timeout(Some(&raw));
            proptest::prop_assert!(timeout > Duration::ZERO);
            proptest::prop_assert!(timeout <= Duration::from_secs(300));
        }
    }

    #[test_case(Some("true"), true)]
    #[test_case(Some("1"), true)]
    #[test_case(Some("T"), true)]
    #[test_case(Some("false"), false)]
    #[test_case(Some("yes"), false)]
    #[test_case(None, false)]
    fn follow_flag(raw: Option<&str>, expected: bool) {
        assert_eq!(parse_flag(raw), expected);
    }
}
