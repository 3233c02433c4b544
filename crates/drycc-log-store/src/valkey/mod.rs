//! Clustered log storage on a valkey-compatible server.
//!
//! Every application's log is a remote list. Writes go through a bounded
//! channel to a single [`Pipeliner`] task that appends, trims and publishes
//! each batch in one `MULTI`/`EXEC` round trip. Live tail subscribes to the
//! channel named after the application.

mod pipeliner;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use redis_protocol::resp2::types::BytesFrame;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, StoreError};
use crate::resp::{frame_bytes, frame_integer, frame_strings, Command, Connection, RespClient};
use crate::traits::{LogStorage, LogTail, TailSender};

use pipeliner::{Pipeliner, QueuedLine};

/// Default valkey URL.
pub const DEFAULT_VALKEY_URL: &str = "redis://127.0.0.1:6379";

/// Configuration for the valkey-backed store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValkeyStoreConfig {
    /// Server URL, `redis://[:password@]host:port[/db]`.
    pub url: String,
    /// Maximum number of lines kept per application.
    pub buffer_size: i64,
    /// Number of queued lines that triggers a flush.
    pub pipeline_length: usize,
    /// Maximum time a queued line waits before being flushed.
    pub pipeline_timeout: Duration,
    /// Timeout for individual remote commands.
    pub command_timeout: Duration,
}

impl Default for ValkeyStoreConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_VALKEY_URL.to_string(),
            buffer_size: 1000,
            pipeline_length: 50,
            pipeline_timeout: Duration::from_secs(1),
            command_timeout: Duration::from_secs(10),
        }
    }
}

impl ValkeyStoreConfig {
    /// Creates a config for the given server URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Sets the per-application capacity.
    #[must_use]
    pub const fn with_buffer_size(mut self, buffer_size: i64) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Sets the batch length that triggers a flush.
    #[must_use]
    pub const fn with_pipeline_length(mut self, length: usize) -> Self {
        self.pipeline_length = length;
        self
    }

    /// Sets the flush interval.
    #[must_use]
    pub const fn with_pipeline_timeout(mut self, timeout: Duration) -> Self {
        self.pipeline_timeout = timeout;
        self
    }

    /// Sets the per-command timeout.
    #[must_use]
    pub const fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }
}

/// Valkey-backed log storage.
pub struct ValkeyStore {
    config: ValkeyStoreConfig,
    client: RespClient,
    sender: mpsc::Sender<QueuedLine>,
    receiver: Mutex<Option<mpsc::Receiver<QueuedLine>>>,
    started: AtomicBool,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ValkeyStore {
    /// Creates a store. No connection is made until the first operation.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer size is not positive or the URL is
    /// invalid.
    pub fn new(config: ValkeyStoreConfig) -> Result<Self> {
        if config.buffer_size <= 0 {
            return Err(StoreError::InvalidBufferSize(config.buffer_size));
        }
        let client = RespClient::from_url(&config.url, config.command_timeout)?;
        let capacity = usize::try_from(config.buffer_size).unwrap_or(usize::MAX).min(1 << 20);
        let (sender, receiver) = mpsc::channel(capacity);
        Ok(Self {
            config,
            client,
            sender,
            receiver: Mutex::new(Some(receiver)),
            started: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ValkeyStoreConfig {
        &self.config
    }

    /// Returns true once [`LogStorage::start`] has been called.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Returns true if a list exists for `app`.
    pub async fn exists(&self, app: &str) -> Result<bool> {
        let mut conn = self.client.connect().await?;
        exists(&mut conn, app).await
    }
}

async fn exists(conn: &mut Connection, app: &str) -> Result<bool> {
    let reply = conn.call(Command::new("EXISTS").arg(app)).await?;
    Ok(frame_integer(&reply)? > 0)
}

#[async_trait]
impl LogStorage for ValkeyStore {
    fn start(&self) {
        if self.started.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(receiver) = self.receiver.lock().take() else {
            return;
        };
        let pipeliner = Pipeliner::new(
            self.client.clone(),
            self.config.buffer_size,
            self.config.pipeline_length,
        );
        let handle = tokio::spawn(pipeliner.run(
            receiver,
            self.config.pipeline_timeout,
            self.cancel.clone(),
        ));
        *self.task.lock() = Some(handle);
        info!(addr = %self.client.addr(), "valkey store started");
    }

    async fn write(&self, app: &str, line: &str) -> Result<()> {
        let queued = QueuedLine {
            app: app.to_string(),
            line: line.trim_end_matches(['\n', '\r']).to_string(),
        };
        self.sender
            .send(queued)
            .await
            .map_err(|_| StoreError::ChannelClosed)
    }

    async fn read(&self, app: &str, lines: i64) -> Result<Vec<String>> {
        if lines <= 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.client.connect().await?;
        let reply = conn
            .call(Command::new("LRANGE").arg(app).int_arg(-lines).int_arg(-1))
            .await?;
        let result = frame_strings(reply)?;
        if result.is_empty() {
            return Err(StoreError::NotFound(app.to_string()));
        }
        Ok(result)
    }

    async fn tail(&self, app: &str, capacity: usize, cancel: CancellationToken) -> Result<LogTail> {
        let mut conn = self.client.connect().await?;
        if !exists(&mut conn, app).await? {
            return Err(StoreError::NotFound(app.to_string()));
        }
        // The confirmation arrives before any message on the channel.
        conn.call(Command::new("SUBSCRIBE").arg(app)).await?;

        let (sender, tail) = LogTail::channel(capacity, &cancel);
        let app = app.to_string();
        tokio::spawn(async move { subscribe(&app, conn, sender).await });
        Ok(tail)
    }

    async fn destroy(&self, app: &str) -> Result<()> {
        let mut conn = self.client.connect().await?;
        conn.call(Command::new("DEL").arg(app)).await?;
        info!(app, "destroyed log list");
        Ok(())
    }

    async fn reopen(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) {
        self.cancel.cancel();
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!(error = %err, "pipeliner task failed");
            }
        }
        info!("valkey store stopped");
    }
}

/// Bridges published messages into the tail until it is done or the
/// connection drops.
async fn subscribe(app: &str, mut conn: Connection, mut sender: TailSender) {
    while !sender.is_done() {
        let frame = tokio::select! {
            () = sender.cancelled() => break,
            frame = conn.next_frame() => frame,
        };
        match frame {
            Ok(frame) => {
                if let Some(payload) = message_payload(&frame) {
                    if !sender.send(payload).await {
                        break;
                    }
                }
            }
            Err(err) => {
                warn!(app, error = %err, "live tail connection lost");
                break;
            }
        }
    }
    debug!(app, "live tail closed");
}

/// Extracts the payload of a `message` push frame.
fn message_payload(frame: &BytesFrame) -> Option<String> {
    let BytesFrame::Array(parts) = frame else {
        return None;
    };
    match parts.as_slice() {
        [kind, _channel, payload] if frame_bytes(kind).is_some_and(|k| k.as_ref() == b"message") => {
            frame_bytes(payload).map(|b| String::from_utf8_lossy(b).into_owned())
        }
        _ => None,
    }
}
