//! Minimal RESP2 client for valkey-compatible servers.
//!
//! Connections are plain `Framed<TcpStream, Resp2>` pairs. A [`RespClient`]
//! only remembers where and how to connect; every [`Connection`] it returns is
//! owned by exactly one task.

use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use redis_protocol::codec::Resp2;
use redis_protocol::resp2::types::BytesFrame;
use tokio::net::TcpStream;
use tokio::time;
use tokio_util::codec::Framed;
use tracing::debug;
use url::Url;

use crate::error::{Result, StoreError};

/// Default port for `redis://` URLs without one.
pub const DEFAULT_PORT: u16 = 6379;

/// A single command and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    args: Vec<Bytes>,
}

impl Command {
    /// Starts a command with the given name.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            args: vec![Bytes::from_static(name.as_bytes())],
        }
    }

    /// Appends an argument.
    #[must_use]
    pub fn arg(mut self, arg: impl AsRef<[u8]>) -> Self {
        self.args.push(Bytes::copy_from_slice(arg.as_ref()));
        self
    }

    /// Appends an integer argument.
    #[must_use]
    pub fn int_arg(self, arg: i64) -> Self {
        self.arg(arg.to_string())
    }

    /// Returns the command name.
    #[must_use]
    pub fn name(&self) -> &[u8] {
        self.args.first().map_or(&[], |b| b.as_ref())
    }

    fn into_frame(self) -> BytesFrame {
        BytesFrame::Array(self.args.into_iter().map(BytesFrame::BulkString).collect())
    }
}

/// Connection settings parsed from a `redis://` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RespClient {
    addr: String,
    password: Option<String>,
    db: Option<i64>,
    timeout: Duration,
}

impl RespClient {
    /// Creates a client for a plain `host:port` address.
    #[must_use]
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            password: None,
            db: None,
            timeout,
        }
    }

    /// Parses `redis://[:password@]host[:port][/db]`.
    pub fn from_url(raw: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(raw).map_err(|e| StoreError::InvalidUrl(format!("{raw}: {e}")))?;
        if !matches!(url.scheme(), "redis" | "valkey") {
            return Err(StoreError::InvalidUrl(format!(
                "{raw}: unsupported scheme '{}'",
                url.scheme()
            )));
        }
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| StoreError::InvalidUrl(format!("{raw}: missing host")))?;
        let port = url.port().unwrap_or(DEFAULT_PORT);
        let password = url.password().map(str::to_string);
        let db = match url.path().trim_start_matches('/') {
            "" => None,
            index => Some(
                index
                    .parse::<i64>()
                    .map_err(|_| StoreError::InvalidUrl(format!("{raw}: invalid db '{index}'")))?,
            ),
        };
        Ok(Self {
            addr: format!("{host}:{port}"),
            password,
            db,
            timeout,
        })
    }

    /// Returns the `host:port` this client connects to.
    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Opens a new connection, authenticating and selecting the db if configured.
    pub async fn connect(&self) -> Result<Connection> {
        let socket = time::timeout(self.timeout, TcpStream::connect(self.addr.as_str()))
            .await
            .map_err(|_| StoreError::Timeout)??;
        if let Err(err) = socket.set_nodelay(true) {
            debug!(addr = %self.addr, error = %err, "could not disable nagle");
        }
        let mut conn = Connection {
            framed: Framed::new(socket, Resp2::default()),
            timeout: self.timeout,
        };
        if let Some(password) = &self.password {
            conn.call(Command::new("AUTH").arg(password)).await?;
        }
        if let Some(db) = self.db {
            conn.call(Command::new("SELECT").int_arg(db)).await?;
        }
        debug!(addr = %self.addr, "connected");
        Ok(conn)
    }
}

/// An open connection to the server.
pub struct Connection {
    framed: Framed<TcpStream, Resp2>,
    timeout: Duration,
}

impl Connection {
    /// Sends one command and waits for its reply.
    ///
    /// Error replies are returned as [`StoreError::Server`].
    pub async fn call(&mut self, command: Command) -> Result<BytesFrame> {
        let timeout = self.timeout;
        time::timeout(timeout, self.framed.send(command.into_frame()))
            .await
            .map_err(|_| StoreError::Timeout)??;
        let reply = time::timeout(timeout, self.next_frame())
            .await
            .map_err(|_| StoreError::Timeout)??;
        check_reply(reply)
    }

    /// Sends a blocking command whose reply the server holds for up to `wait`.
    ///
    /// The reply is awaited for `wait` plus the command timeout, so a silent
    /// peer fails with [`StoreError::Timeout`] instead of hanging.
    pub async fn call_blocking(&mut self, command: Command, wait: Duration) -> Result<BytesFrame> {
        let timeout = self.timeout;
        time::timeout(timeout, self.framed.send(command.into_frame()))
            .await
            .map_err(|_| StoreError::Timeout)??;
        let reply = time::timeout(wait.saturating_add(timeout), self.next_frame())
            .await
            .map_err(|_| StoreError::Timeout)??;
        check_reply(reply)
    }

    /// Writes every command in one flush, then reads one reply per command.
    ///
    /// Error replies are returned in place rather than failing the pipeline.
    pub async fn pipeline(&mut self, commands: Vec<Command>) -> Result<Vec<BytesFrame>> {
        let count = commands.len();
        let timeout = self.timeout;
        time::timeout(timeout, async {
            for command in commands {
                self.framed.feed(command.into_frame()).await?;
            }
            self.framed.flush().await
        })
        .await
        .map_err(|_| StoreError::Timeout)??;

        let mut replies = Vec::with_capacity(count);
        for _ in 0..count {
            let reply = time::timeout(timeout, self.next_frame())
                .await
                .map_err(|_| StoreError::Timeout)??;
            replies.push(reply);
        }
        Ok(replies)
    }

    /// Sends a command without waiting for a reply.
    pub async fn send(&mut self, command: Command) -> Result<()> {
        self.framed.send(command.into_frame()).await?;
        Ok(())
    }

    /// Reads the next frame pushed by the server.
    pub async fn next_frame(&mut self) -> Result<BytesFrame> {
        match self.framed.next().await {
            Some(Ok(frame)) => Ok(frame),
            Some(Err(err)) => Err(err.into()),
            None => Err(StoreError::ConnectionClosed),
        }
    }
}

fn check_reply(reply: BytesFrame) -> Result<BytesFrame> {
    match reply {
        BytesFrame::Error(err) => Err(StoreError::Server(err.to_string())),
        other => Ok(other),
    }
}

/// Returns the bytes of a bulk or simple string reply.
#[must_use]
pub fn frame_bytes(frame: &BytesFrame) -> Option<&Bytes> {
    match frame {
        BytesFrame::BulkString(bytes) | BytesFrame::SimpleString(bytes) => Some(bytes),
        _ => None,
    }
}

/// Decodes a bulk or simple string reply as UTF-8, replacing invalid bytes.
#[must_use]
pub fn frame_string(frame: &BytesFrame) -> Option<String> {
    frame_bytes(frame).map(|b| String::from_utf8_lossy(b).into_owned())
}

/// Interprets an integer reply.
pub fn frame_integer(frame: &BytesFrame) -> Result<i64> {
    match frame {
        BytesFrame::Integer(value) => Ok(*value),
        other => Err(StoreError::UnexpectedReply(format!("expected integer, got {other:?}"))),
    }
}

/// Interprets an array of strings reply. A null reply is an empty list.
pub fn frame_strings(frame: BytesFrame) -> Result<Vec<String>> {
    match frame {
        BytesFrame::Null => Ok(Vec::new()),
        BytesFrame::Array(items) => items
            .iter()
            .map(|item| {
                frame_string(item).ok_or_else(|| {
                    StoreError::UnexpectedReply(format!("expected string, got {item:?}"))
                })
            })
            .collect(),
        other => Err(StoreError::UnexpectedReply(format!("expected array, got {other:?}"))),
    }
}
