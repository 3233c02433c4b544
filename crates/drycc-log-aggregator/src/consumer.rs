//! The consumption loop bound to one message bus address.

use std::sync::Arc;

use bytes::Bytes;
use drycc_log_store::resp::{frame_bytes, frame_string, Command, Connection, RespClient};
use drycc_log_store::{LogStorage, StoreError};
use redis_protocol::resp2::types::BytesFrame;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::AggregatorConfig;
use crate::error::{AggregatorError, Result};
use crate::handler;

/// Field of a stream entry that holds the JSON envelope.
pub const PAYLOAD_FIELD: &str = "data";

/// One entry read from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StreamEntry {
    pub(crate) id: String,
    pub(crate) fields: Vec<(String, Bytes)>,
}

impl StreamEntry {
    fn field(&self, name: &str) -> Option<&Bytes> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }
}

/// Reads one address with consumer-group semantics and stores what it reads.
pub(crate) struct Consumer {
    client: RespClient,
    name: String,
    config: Arc<AggregatorConfig>,
    storage: Arc<dyn LogStorage>,
    conn: Option<Connection>,
    group_ready: bool,
}

impl Consumer {
    pub(crate) fn new(
        client: RespClient,
        config: Arc<AggregatorConfig>,
        storage: Arc<dyn LogStorage>,
    ) -> Self {
        Self {
            client,
            name: Uuid::new_v4().to_string(),
            config,
            storage,
            conn: None,
            group_ready: false,
        }
    }

    /// Runs until `cancel` fires. Read failures drop the connection and back
    /// off before the next attempt.
    pub(crate) async fn run(mut self, cancel: CancellationToken) {
        info!(addr = %self.client.addr(), consumer = %self.name, "consumer started");
        while !cancel.is_cancelled() {
            if let Err(err) = self.poll(&cancel).await {
                self.conn = None;
                warn!(
                    addr = %self.client.addr(),
                    error = %err,
                    backoff_ms = u64::try_from(self.config.backoff.as_millis()).unwrap_or(u64::MAX),
                    "stream read failed, reconnecting"
                );
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(self.config.backoff) => {}
                }
            }
        }
        info!(addr = %self.client.addr(), consumer = %self.name, "consumer stopped");
    }

    /// Reads one batch, stores it and acknowledges it.
    ///
    /// Connecting and the blocking read are abandoned on cancellation; a batch
    /// that was read is always processed and acknowledged.
    async fn poll(&mut self, cancel: &CancellationToken) -> Result<usize> {
        let read = self.read_command();
        let block = self.config.block;
        let conn = tokio::select! {
            () = cancel.cancelled() => return Ok(0),
            conn = self.connection() => conn?,
        };
        let reply = tokio::select! {
            () = cancel.cancelled() => return Ok(0),
            reply = conn.call_blocking(read, block) => reply?,
        };
        let entries = parse_entries(reply)?;
        if entries.is_empty() {
            return Ok(0);
        }

        for entry in &entries {
            self.process(entry).await;
        }

        let mut ack = Command::new("XACK")
            .arg(&self.config.stream)
            .arg(&self.config.group);
        for entry in &entries {
            ack = ack.arg(&entry.id);
        }
        let conn = self.connection().await?;
        conn.call(ack).await?;
        debug!(entries = entries.len(), "acknowledged stream entries");
        Ok(entries.len())
    }

    /// Returns the open connection, connecting and creating the group first
    /// if needed.
    async fn connection(&mut self) -> Result<&mut Connection> {
        if self.conn.is_none() {
            self.conn = Some(self.client.connect().await?);
            self.group_ready = false;
        }
        let Some(conn) = self.conn.as_mut() else {
            return Err(AggregatorError::Store(StoreError::ConnectionClosed));
        };
        if !self.group_ready {
            ensure_group(conn, &self.config.stream, &self.config.group).await?;
            self.group_ready = true;
        }
        Ok(conn)
    }

    fn read_command(&self) -> Command {
        let block_ms = i64::try_from(self.config.block.as_millis()).unwrap_or(i64::MAX);
        Command::new("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.group)
            .arg(&self.name)
            .arg("COUNT")
            .int_arg(i64::try_from(self.config.count).unwrap_or(i64::MAX))
            .arg("BLOCK")
            .int_arg(block_ms)
            .arg("STREAMS")
            .arg(&self.config.stream)
            .arg(">")
    }

    /// Stores one entry. Failures are logged and never stop the loop.
    async fn process(&self, entry: &StreamEntry) {
        let Some(payload) = entry.field(PAYLOAD_FIELD) else {
            let err = AggregatorError::MissingPayload(entry.id.clone());
            warn!(id = %entry.id, error = %err, "dropping stream entry");
            return;
        };
        match handler::handle(payload, self.storage.as_ref()).await {
            Ok(line) => debug!(id = %entry.id, app = %line.app, "stored log line"),
            Err(err @ AggregatorError::Store(_)) => {
                error!(id = %entry.id, error = %err, "failed to store log line");
            }
            Err(err) => warn!(id = %entry.id, error = %err, "dropping malformed log message"),
        }
    }
}

/// Creates the consumer group, and the stream with it, unless it exists.
async fn ensure_group(conn: &mut Connection, stream: &str, group: &str) -> Result<()> {
    let create = Command::new("XGROUP")
        .arg("CREATE")
        .arg(stream)
        .arg(group)
        .arg("0")
        .arg("MKSTREAM");
    match conn.call(create).await {
        Ok(_) => {
            info!(stream, group, "created consumer group");
            Ok(())
        }
        Err(StoreError::Server(msg)) if msg.starts_with("BUSYGROUP") => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// Parses an `XREADGROUP` reply. A null reply means the wait timed out.
pub(crate) fn parse_entries(reply: BytesFrame) -> Result<Vec<StreamEntry>> {
    let streams = match reply {
        BytesFrame::Null => return Ok(Vec::new()),
        BytesFrame::Array(streams) => streams,
        other => return Err(unexpected("stream list", &other)),
    };
    let mut entries = Vec::new();
    for stream in streams {
        let BytesFrame::Array(mut parts) = stream else {
            return Err(unexpected("stream", &stream));
        };
        if parts.len() != 2 {
            return Err(AggregatorError::Bus(format!(
                "stream reply has {} parts",
                parts.len()
            )));
        }
        match parts.pop() {
            Some(BytesFrame::Array(items)) => {
                for item in items {
                    entries.push(parse_entry(item)?);
                }
            }
            Some(BytesFrame::Null) | None => {}
            Some(other) => return Err(unexpected("entry list", &other)),
        }
    }
    Ok(entries)
}

fn parse_entry(item: BytesFrame) -> Result<StreamEntry> {
    let BytesFrame::Array(parts) = item else {
        return Err(unexpected("entry", &item));
    };
    let [id, fields] = parts.as_slice() else {
        return Err(AggregatorError::Bus(format!(
            "stream entry has {} parts",
            parts.len()
        )));
    };
    let id = frame_string(id).ok_or_else(|| unexpected("entry id", id))?;
    let fields = match fields {
        BytesFrame::Array(values) => values
            .chunks_exact(2)
            .filter_map(|pair| Some((frame_string(&pair[0])?, frame_bytes(&pair[1])?.clone())))
            .collect(),
        BytesFrame::Null => Vec::new(),
        other => return Err(unexpected("entry fields", other)),
    };
    Ok(StreamEntry { id, fields })
}

fn unexpected(what: &str, frame: &BytesFrame) -> AggregatorError {
    AggregatorError::Bus(format!("expected {what}, got {frame:?}"))
}
