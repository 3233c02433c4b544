//! Wiring of storage, aggregator and HTTP API into one process.

use std::future::Future;
use std::sync::Arc;

use drycc_log_aggregator::{new_aggregator, Aggregator};
use drycc_log_store::{new_storage, LogStorage};
use tracing::{error, info};

use crate::config::LoggerConfig;
use crate::error::LoggerError;
use crate::weblog::WeblogServer;

/// A fully built logger service.
pub struct Logger {
    storage: Arc<dyn LogStorage>,
    aggregator: Box<dyn Aggregator>,
    server: WeblogServer,
}

impl Logger {
    /// Builds every component. Nothing runs until [`Logger::run`].
    ///
    /// # Errors
    ///
    /// Returns an error if the storage or aggregator cannot be built.
    pub fn new(config: LoggerConfig) -> Result<Self, LoggerError> {
        let storage = new_storage(&config.storage)?;
        let aggregator = new_aggregator(
            &config.aggregator_kind,
            config.aggregator,
            Arc::clone(&storage),
        )?;
        let server = WeblogServer::new(config.weblog, Arc::clone(&storage));
        Ok(Self {
            storage,
            aggregator,
            server,
        })
    }

    /// Returns the storage shared by the aggregator and the HTTP API.
    #[must_use]
    pub fn storage(&self) -> Arc<dyn LogStorage> {
        Arc::clone(&self.storage)
    }

    /// Runs until `shutdown` completes, then stops the aggregator before the
    /// storage so that in-flight lines are flushed.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot bind, the aggregator cannot
    /// start, or the aggregator does not stop within its timeout.
    pub async fn run<F>(self, shutdown: F) -> Result<(), LoggerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.storage.start();
        if let Err(err) = self.aggregator.listen() {
            self.storage.stop().await;
            return Err(err.into());
        }
        info!("logger running");

        let served = self.server.serve_with_shutdown(shutdown).await;
        info!("logger shutting down");

        let stopped = self.aggregator.stop().await;
        if let Err(err) = &stopped {
            error!(error = %err, "aggregator did not stop cleanly");
        }
        self.storage.stop().await;
        info!("logger stopped");

        served?;
        stopped?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use super::*;
    use crate::config::WeblogConfig;
    use drycc_log_aggregator::{AggregatorConfig, AggregatorError, VALKEY_AGGREGATOR};
    use drycc_log_store::testing::FakeValkey;
    use drycc_log_store::{FileStoreConfig, StorageConfig, StorageKind, StoreError};
    use tempfile::TempDir;

    const APP_MESSAGE: &str = r#"{"log": "hello\n", "stream": "stdout", "time": "2016-10-18T20:29:38+00:00", "kubernetes": {"namespace_name": "foo", "pod_id": "podId", "pod_name": "foo-web-845861952-nzf60", "container_name": "foo-web", "labels": {"app": "foo", "type": "web", "version": "v2"}, "host": "host"}}"#;

    fn make_config(dir: &TempDir, bus: &str) -> LoggerConfig {
        LoggerConfig {
            storage: StorageConfig::new(StorageKind::File)
                .with_file(FileStoreConfig::new(dir.path())),
            aggregator_kind: VALKEY_AGGREGATOR.to_string(),
            aggregator: AggregatorConfig::new([bus])
                .with_block(Duration::from_millis(50))
                .with_backoff(Duration::from_millis(20))
                .with_stop_timeout(Duration::from_secs(2)),
            weblog: WeblogConfig::new(SocketAddr::from(([127, 0, 0, 1], 0))),
        }
    }

    #[tokio::test]
    async fn test_moves_bus_entries_into_storage() {
        let dir = TempDir::new().unwrap();
        let fake = FakeValkey::start().await.unwrap();
        let logger = Logger::new(make_config(&dir, &fake.url())).unwrap();
        let storage = logger.storage();

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let running = tokio::spawn(logger.run(async move {
            let _ = rx.await;
        }));
        fake.xadd("logs", &[("data", APP_MESSAGE)]);

        let mut lines = Vec::new();
        for _ in 0..300 {
            if let Ok(found) = storage.read("foo", 10).await {
                lines = found;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(lines, vec!["2016-10-18T20:29:38+00:00 foo[web.v2.nzf60]: hello"]);

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(fake.pending("logs", "logger"), 0);
    }

    #[test]
    fn test_unknown_aggregator_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = make_config(&dir, "redis://127.0.0.1:6379");
        config.aggregator_kind = "nsq".to_string();

        let Err(err) = Logger::new(config) else {
            panic!("expected an unrecognized aggregator");
        };
        assert!(matches!(
            err,
            LoggerError::Aggregator(AggregatorError::UnrecognizedAggregator(_))
        ));
    }

    #[test]
    fn test_invalid_storage_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = make_config(&dir, "redis://127.0.0.1:6379");
        config.storage = StorageConfig::new(StorageKind::Valkey).with_valkey(
            drycc_log_store::ValkeyStoreConfig::default().with_buffer_size(0),
        );

        let Err(err) = Logger::new(config) else {
            panic!("expected an invalid buffer size");
        };
        assert!(matches!(err, LoggerError::Store(StoreError::InvalidBufferSize(0))));
    }
}
