//! Fixtures shared by the unit tests of this crate.

use async_trait::async_trait;
use drycc_log_store::{LogStorage, LogTail, Result, StoreError};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

pub const CONTROLLER_MESSAGE: &str = r#"{"log": "INFO [foo]: admin deployed 2fd9226", "time": "2016-10-18T20:29:38+00:00", "stream": "stderr", "docker": {"container_id": "containerId"}, "kubernetes": {"namespace_name": "foo", "pod_id": "podId", "pod_name": "podName", "container_name": "drycc-controller", "labels": {"app": "foo", "heritage": "drycc", "type": "web", "version": "v2"}, "host": "host"}}"#;

pub const APP_MESSAGE: &str = r#"{"log": "test message", "stream": "stderr", "time": "2016-10-18T20:29:38+00:00", "docker": {"container_id": "containerId"}, "kubernetes": {"namespace_name": "foo", "pod_id": "podId", "pod_name": "foo-web-845861952-nzf60", "container_name": "foo-web", "labels": {"app": "foo", "heritage": "drycc", "type": "web", "version": "v2"}, "host": "host"}}"#;

pub const BAD_POD_NAME_MESSAGE: &str = r#"{"log": "test message", "stream": "stderr", "time": "2016-10-18T20:29:38+00:00", "docker": {"container_id": "containerId"}, "kubernetes": {"namespace_name": "foo", "pod_id": "podId", "pod_name": "foo-web-845861952", "container_name": "foo-web", "labels": {"app": "foo", "heritage": "drycc", "type": "web", "version": "v2"}, "host": "host"}}"#;

/// Storage that records every write and can be told to fail.
#[derive(Default)]
pub struct RecordingStorage {
    writes: Mutex<Vec<(String, String)>>,
    failing: Mutex<bool>,
    hanging: Mutex<bool>,
}

impl RecordingStorage {
    pub fn writes(&self) -> Vec<(String, String)> {
        self.writes.lock().clone()
    }

    pub fn fail_writes(&self) {
        *self.failing.lock() = true;
    }

    /// Makes every later write wait forever, like a full write channel.
    pub fn hang_writes(&self) {
        *self.hanging.lock() = true;
    }
}

#[async_trait]
impl LogStorage for RecordingStorage {
    fn start(&self) {}

    async fn write(&self, app: &str, line: &str) -> Result<()> {
        let hanging = *self.hanging.lock();
        if hanging {
            std::future::pending::<()>().await;
        }
        if *self.failing.lock() {
            return Err(StoreError::ChannelClosed);
        }
        self.writes.lock().push((app.to_string(), line.to_string()));
        Ok(())
    }

    async fn read(&self, app: &str, lines: i64) -> Result<Vec<String>> {
        let stored: Vec<String> = self
            .writes
            .lock()
            .iter()
            .filter(|(a, _)| a == app)
            .map(|(_, l)| l.clone())
            .collect();
        if stored.is_empty() {
            return Err(StoreError::NotFound(app.to_string()));
        }
        let keep = usize::try_from(lines.max(0)).unwrap_or(0).min(stored.len());
        Ok(stored[stored.len() - keep..].to_vec())
    }

    async fn tail(&self, app: &str, _capacity: usize, _cancel: CancellationToken) -> Result<LogTail> {
        Err(StoreError::NotFound(app.to_string()))
    }

    async fn destroy(&self, app: &str) -> Result<()> {
        self.writes.lock().retain(|(a, _)| a != app);
        Ok(())
    }

    async fn reopen(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) {}
}
