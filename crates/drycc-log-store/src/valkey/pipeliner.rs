//! Batching of queued writes into pipelined transactions.
//!
//! The [`Pipeliner`] is owned by exactly one background task and is reached
//! only through the store's write channel, so its accumulator needs no lock.
//! A batch is flushed when it reaches the configured length or when the flush
//! interval elapses, whichever comes first.

use std::collections::HashMap;
use std::time::Duration;

use redis_protocol::resp2::types::BytesFrame;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{Result, StoreError};
use crate::resp::{Command, Connection, RespClient};

/// One line waiting to be flushed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct QueuedLine {
    pub(crate) app: String,
    pub(crate) line: String,
}

/// Accumulates queued lines and flushes them as one transaction.
pub(crate) struct Pipeliner {
    client: RespClient,
    conn: Option<Connection>,
    buffer_size: i64,
    batch_length: usize,
    /// Queued lines per application, in write order.
    pending: HashMap<String, Vec<String>>,
    /// Applications in the order they were first touched since the last flush.
    touched: Vec<String>,
    count: usize,
}

impl Pipeliner {
    pub(crate) fn new(client: RespClient, buffer_size: i64, batch_length: usize) -> Self {
        Self {
            client,
            conn: None,
            buffer_size,
            batch_length: batch_length.max(1),
            pending: HashMap::new(),
            touched: Vec::new(),
            count: 0,
        }
    }

    /// Queues a line. Returns true once the batch has reached its length.
    pub(crate) fn push(&mut self, queued: QueuedLine) -> bool {
        let QueuedLine { app, line } = queued;
        match self.pending.get_mut(&app) {
            Some(lines) => lines.push(line),
            None => {
                self.touched.push(app.clone());
                self.pending.insert(app, vec![line]);
            }
        }
        self.count += 1;
        self.count >= self.batch_length
    }

    pub(crate) const fn len(&self) -> usize {
        self.count
    }

    pub(crate) const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Builds the transaction for the current batch and resets the accumulator.
    ///
    /// For every touched application the lines are appended, the list is
    /// trimmed to its last `buffer_size` entries, and each line is published
    /// on the application's channel.
    fn take_batch(&mut self) -> Vec<Command> {
        let mut commands = Vec::with_capacity(2 + self.touched.len() * 2 + self.count);
        commands.push(Command::new("MULTI"));
        for app in self.touched.drain(..) {
            let Some(lines) = self.pending.remove(&app) else {
                continue;
            };
            let mut rpush = Command::new("RPUSH").arg(&app);
            for line in &lines {
                rpush = rpush.arg(line);
            }
            commands.push(rpush);
            commands.push(
                Command::new("LTRIM")
                    .arg(&app)
                    .int_arg(-self.buffer_size)
                    .int_arg(-1),
            );
            for line in lines {
                commands.push(Command::new("PUBLISH").arg(&app).arg(line));
            }
        }
        commands.push(Command::new("EXEC"));
        self.pending.clear();
        self.count = 0;
        commands
    }

    /// Flushes the current batch. Returns the number of lines flushed.
    ///
    /// The accumulator is reset whether or not the flush succeeds. A batch
    /// that fails because the cached connection was dropped by the server is
    /// resent once on a fresh connection; any other failure loses the batch.
    pub(crate) async fn flush(&mut self) -> Result<usize> {
        if self.is_empty() {
            return Ok(0);
        }
        let lines = self.count;
        let commands = self.take_batch();

        let reused = self.conn.is_some();
        let replies = match self.send_batch(commands.clone()).await {
            Ok(replies) => replies,
            Err(err) if reused && err.is_disconnect() => {
                info!(lines, error = %err, "cached connection lost, resending batch");
                self.send_batch(commands).await?
            }
            Err(err) => return Err(err),
        };
        check_transaction(&replies)?;
        Ok(lines)
    }

    /// Sends one batch, connecting first if needed.
    async fn send_batch(&mut self, commands: Vec<Command>) -> Result<Vec<BytesFrame>> {
        if self.conn.is_none() {
            self.conn = Some(self.client.connect().await?);
        }
        let Some(conn) = self.conn.as_mut() else {
            return Err(StoreError::ConnectionClosed);
        };
        match conn.pipeline(commands).await {
            Ok(replies) => Ok(replies),
            Err(err) => {
                // The connection may hold half-read replies.
                self.conn = None;
                Err(err)
            }
        }
    }

    async fn flush_and_report(&mut self) {
        let pending = self.len();
        match self.flush().await {
            Ok(0) => {}
            Ok(lines) => debug!(lines, "flushed batch"),
            Err(err) => error!(lines = pending, error = %err, "failed to flush batch"),
        }
    }

    /// Runs the flush loop until `cancel` fires or every sender is dropped.
    ///
    /// Lines still queued at shutdown are flushed before returning.
    pub(crate) async fn run(
        mut self,
        mut receiver: mpsc::Receiver<QueuedLine>,
        interval: Duration,
        cancel: CancellationToken,
    ) {
        let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    while let Ok(queued) = receiver.try_recv() {
                        self.push(queued);
                    }
                    self.flush_and_report().await;
                    break;
                }
                queued = receiver.recv() => match queued {
                    Some(queued) => {
                        if self.push(queued) {
                            self.flush_and_report().await;
                        }
                    }
                    None => {
                        self.flush_and_report().await;
                        break;
                    }
                },
                _ = ticker.tick() => self.flush_and_report().await,
            }
        }
        info!("pipeliner stopped");
    }
}

/// Checks the replies of a `MULTI` ... `EXEC` pipeline.
fn check_transaction(replies: &[BytesFrame]) -> Result<()> {
    for reply in replies {
        if let BytesFrame::Error(err) = reply {
            return Err(StoreError::Server(err.to_string()));
        }
    }
    match replies.last() {
        Some(BytesFrame::Array(results)) => {
            for result in results {
                if let BytesFrame::Error(err) = result {
                    return Err(StoreError::Server(err.to_string()));
                }
            }
            Ok(())
        }
        Some(BytesFrame::Null) => Err(StoreError::Server("transaction aborted".to_string())),
        other => Err(StoreError::UnexpectedReply(format!("EXEC replied {other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn make_pipeliner(buffer_size: i64, batch_length: usize) -> Pipeliner {
        Pipeliner::new(
            RespClient::new("127.0.0.1:1", Duration::from_millis(100)),
            buffer_size,
            batch_length,
        )
    }

    fn queued(app: &str, line: &str) -> QueuedLine {
        QueuedLine {
            app: app.to_string(),
            line: line.to_string(),
        }
    }

    fn names(commands: &[Command]) -> Vec<String> {
        commands
            .iter()
            .map(|c| String::from_utf8_lossy(c.name()).into_owned())
            .collect()
    }

    #[test]
    fn push_reports_full_batch() {
        let mut pipeliner = make_pipeliner(10, 3);
        assert!(!pipeliner.push(queued("foo", "a")));
        assert!(!pipeliner.push(queued("bar", "b")));
        assert!(pipeliner.push(queued("foo", "c")));
        assert_eq!(pipeliner.len(), 3);
    }

    #[test]
    fn batch_groups_by_app_in_first_touch_order() {
        let mut pipeliner = make_pipeliner(10, 50);
        pipeliner.push(queued("foo", "a"));
        pipeliner.push(queued("bar", "b"));
        pipeliner.push(queued("foo", "c"));

        let commands = pipeliner.take_batch();
        assert_eq!(
            names(&commands),
            vec![
                "MULTI", "RPUSH", "LTRIM", "PUBLISH", "PUBLISH", "RPUSH", "LTRIM", "PUBLISH",
                "EXEC"
            ]
        );
        assert_eq!(
            commands[1],
            Command::new("RPUSH").arg("foo").arg("a").arg("c")
        );
        assert_eq!(
            commands[2],
            Command::new("LTRIM").arg("foo").int_arg(-10).int_arg(-1)
        );
        assert_eq!(commands[3], Command::new("PUBLISH").arg("foo").arg("a"));
        assert_eq!(commands[4], Command::new("PUBLISH").arg("foo").arg("c"));
        assert_eq!(commands[5], Command::new("RPUSH").arg("bar").arg("b"));
    }

    #[test]
    fn take_batch_resets_accumulator() {
        let mut pipeliner = make_pipeliner(10, 50);
        pipeliner.push(queued("foo", "a"));
        let _ = pipeliner.take_batch();

        assert!(pipeliner.is_empty());
        assert!(pipeliner.pending.is_empty());
        assert!(pipeliner.touched.is_empty());
    }

    #[tokio::test]
    async fn failed_flush_still_resets() {
        // Nothing listens on port 1.
        let mut pipeliner = make_pipeliner(10, 50);
        pipeliner.push(queued("foo", "a"));

        assert!(pipeliner.flush().await.is_err());
        assert!(pipeliner.is_empty());
        assert_eq!(pipeliner.flush().await.unwrap(), 0);
    }

    #[test]
    fn transaction_replies() {
        let ok = vec![
            BytesFrame::SimpleString(Bytes::from_static(b"OK")),
            BytesFrame::SimpleString(Bytes::from_static(b"QUEUED")),
            BytesFrame::Array(vec![BytesFrame::Integer(1)]),
        ];
        assert!(check_transaction(&ok).is_ok());

        let aborted = vec![
            BytesFrame::SimpleString(Bytes::from_static(b"OK")),
            BytesFrame::Null,
        ];
        assert!(matches!(check_transaction(&aborted), Err(StoreError::Server(_))));

        let queued_error = vec![
            BytesFrame::SimpleString(Bytes::from_static(b"OK")),
            BytesFrame::Error("ERR unknown command".into()),
            BytesFrame::Error("EXECABORT".into()),
        ];
        assert!(matches!(check_transaction(&queued_error), Err(StoreError::Server(msg)) if msg.contains("unknown")));

        let inner_error = vec![BytesFrame::Array(vec![BytesFrame::Error(
            "WRONGTYPE".into(),
        )])];
        assert!(check_transaction(&inner_error).is_err());
    }
}
