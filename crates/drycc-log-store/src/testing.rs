//! In-process valkey stand-in for tests.
//!
//! [`FakeValkey`] speaks RESP2 over a real TCP socket and implements the
//! subset of commands the logger issues: lists, pub/sub, transactions and
//! consumer-group streams. State lives in memory and can be inspected
//! directly from tests.

use std::collections::{HashMap, HashSet};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use redis_protocol::codec::Resp2;
use redis_protocol::resp2::types::BytesFrame;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A fake valkey server bound to an ephemeral local port.
pub struct FakeValkey {
    addr: SocketAddr,
    shared: Arc<Shared>,
    accept: JoinHandle<()>,
}

struct Shared {
    state: Mutex<State>,
    password: Option<String>,
    appended: Notify,
    connections: Mutex<CancellationToken>,
}

#[derive(Default)]
struct State {
    lists: HashMap<String, Vec<Bytes>>,
    streams: HashMap<String, Stream>,
    subscribers: HashMap<String, Vec<mpsc::UnboundedSender<BytesFrame>>>,
    commands: Vec<String>,
}

#[derive(Default)]
struct Stream {
    entries: Vec<StreamEntry>,
    last_id: u64,
    groups: HashMap<String, Group>,
}

struct StreamEntry {
    id: String,
    fields: Vec<Bytes>,
}

#[derive(Default)]
struct Group {
    delivered: usize,
    pending: HashSet<String>,
}

type Reply = std::result::Result<BytesFrame, String>;

impl FakeValkey {
    /// Starts a server that accepts every connection.
    pub async fn start() -> io::Result<Self> {
        Self::bind(None).await
    }

    /// Starts a server that requires `AUTH password` before any command.
    pub async fn start_with_password(password: &str) -> io::Result<Self> {
        Self::bind(Some(password.to_string())).await
    }

    async fn bind(password: Option<String>) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shared = Arc::new(Shared {
            state: Mutex::new(State::default()),
            password,
            appended: Notify::new(),
            connections: Mutex::new(CancellationToken::new()),
        });
        let accept = tokio::spawn(accept_loop(listener, Arc::clone(&shared)));
        Ok(Self {
            addr,
            shared,
            accept,
        })
    }

    /// Returns the bound address.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns a `redis://` URL for this server, including the password if any.
    #[must_use]
    pub fn url(&self) -> String {
        match &self.shared.password {
            Some(password) => format!("redis://:{password}@{}", self.addr),
            None => format!("redis://{}", self.addr),
        }
    }

    /// Returns the contents of a list, oldest first.
    #[must_use]
    pub fn list(&self, key: &str) -> Vec<String> {
        self.shared
            .state
            .lock()
            .lists
            .get(key)
            .map(|items| {
                items
                    .iter()
                    .map(|b| String::from_utf8_lossy(b).into_owned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns true if a list or stream exists under `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        let state = self.shared.state.lock();
        state.lists.contains_key(key) || state.streams.contains_key(key)
    }

    /// Appends an entry to a stream, creating it if needed. Returns the entry id.
    pub fn xadd(&self, stream: &str, fields: &[(&str, &str)]) -> String {
        let fields = fields
            .iter()
            .flat_map(|(k, v)| [Bytes::copy_from_slice(k.as_bytes()), Bytes::copy_from_slice(v.as_bytes())])
            .collect();
        let id = self.shared.state.lock().xadd(stream, fields);
        self.shared.appended.notify_waiters();
        id
    }

    /// Returns true if the consumer group exists on the stream.
    #[must_use]
    pub fn group_exists(&self, stream: &str, group: &str) -> bool {
        self.shared
            .state
            .lock()
            .streams
            .get(stream)
            .is_some_and(|s| s.groups.contains_key(group))
    }

    /// Returns the number of delivered but unacknowledged entries of a group.
    #[must_use]
    pub fn pending(&self, stream: &str, group: &str) -> usize {
        self.shared
            .state
            .lock()
            .streams
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .map_or(0, |g| g.pending.len())
    }

    /// Returns the number of entries delivered to a group so far.
    #[must_use]
    pub fn delivered(&self, stream: &str, group: &str) -> usize {
        self.shared
            .state
            .lock()
            .streams
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .map_or(0, |g| g.delivered)
    }

    /// Returns the number of live subscribers of a channel.
    #[must_use]
    pub fn subscribers(&self, channel: &str) -> usize {
        self.shared
            .state
            .lock()
            .subscribers
            .get(channel)
            .map_or(0, |subs| subs.iter().filter(|s| !s.is_closed()).count())
    }

    /// Returns how many times a command has been received.
    #[must_use]
    pub fn command_count(&self, name: &str) -> usize {
        let name = name.to_ascii_uppercase();
        self.shared
            .state
            .lock()
            .commands
            .iter()
            .filter(|c| **c == name)
            .count()
    }

    /// Closes every open client connection. New connections are still accepted.
    pub fn disconnect_all(&self) {
        let previous = std::mem::replace(
            &mut *self.shared.connections.lock(),
            CancellationToken::new(),
        );
        previous.cancel();
    }
}

impl Drop for FakeValkey {
    fn drop(&mut self) {
        self.accept.abort();
        self.shared.connections.lock().cancel();
    }
}

async fn accept_loop(listener: TcpListener, shared: Arc<Shared>) {
    loop {
        let Ok((socket, _)) = listener.accept().await else {
            continue;
        };
        let disconnect = shared.connections.lock().clone();
        tokio::spawn(serve(socket, Arc::clone(&shared), disconnect));
    }
}

/// Per-connection state.
struct Session {
    authenticated: bool,
    multi: Option<Vec<Vec<Bytes>>>,
    push: mpsc::UnboundedSender<BytesFrame>,
    channels: usize,
}

async fn serve(socket: TcpStream, shared: Arc<Shared>, disconnect: CancellationToken) {
    let mut framed = Framed::new(socket, Resp2::default());
    let (push, mut pushed) = mpsc::unbounded_channel();
    let mut session = Session {
        authenticated: shared.password.is_none(),
        multi: None,
        push,
        channels: 0,
    };

    loop {
        let frame = tokio::select! {
            () = disconnect.cancelled() => break,
            Some(message) = pushed.recv() => {
                if framed.send(message).await.is_err() {
                    break;
                }
                continue;
            }
            frame = framed.next() => frame,
        };
        let Some(Ok(frame)) = frame else {
            break;
        };
        let reply = match command_args(frame) {
            Some(args) => tokio::select! {
                () = disconnect.cancelled() => break,
                reply = session.execute(&shared, args) => reply,
            },
            None => Err("ERR expected array of bulk strings".to_string()),
        };
        let frame = reply.unwrap_or_else(|err| BytesFrame::Error(err.into()));
        if framed.send(frame).await.is_err() {
            break;
        }
    }
    debug!("fake valkey connection closed");
}

fn command_args(frame: BytesFrame) -> Option<Vec<Bytes>> {
    let BytesFrame::Array(parts) = frame else {
        return None;
    };
    let args: Option<Vec<Bytes>> = parts
        .into_iter()
        .map(|part| match part {
            BytesFrame::BulkString(b) | BytesFrame::SimpleString(b) => Some(b),
            _ => None,
        })
        .collect();
    args.filter(|a| !a.is_empty())
}

fn name_of(args: &[Bytes]) -> String {
    args.first()
        .map(|b| String::from_utf8_lossy(b).to_ascii_uppercase())
        .unwrap_or_default()
}

fn text(arg: &Bytes) -> String {
    String::from_utf8_lossy(arg).into_owned()
}

fn integer(arg: Option<&Bytes>) -> std::result::Result<i64, String> {
    arg.map(text)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| "ERR value is not an integer or out of range".to_string())
}

fn ok() -> BytesFrame {
    BytesFrame::SimpleString(Bytes::from_static(b"OK"))
}

fn bulk(value: impl Into<Bytes>) -> BytesFrame {
    BytesFrame::BulkString(value.into())
}

fn wrong_arity(name: &str) -> String {
    format!("ERR wrong number of arguments for '{}' command", name.to_ascii_lowercase())
}

fn count(n: usize) -> BytesFrame {
    BytesFrame::Integer(i64::try_from(n).unwrap_or(i64::MAX))
}

impl Session {
    async fn execute(&mut self, shared: &Shared, args: Vec<Bytes>) -> Reply {
        let name = name_of(&args);
        shared.state.lock().commands.push(name.clone());

        if name == "AUTH" {
            let given = args.last().map(text);
            return match (&shared.password, given) {
                (Some(expected), Some(given)) if *expected == given => {
                    self.authenticated = true;
                    Ok(ok())
                }
                (None, _) => Err("ERR AUTH called without any password configured".to_string()),
                _ => Err("WRONGPASS invalid username-password pair".to_string()),
            };
        }
        if !self.authenticated {
            return Err("NOAUTH Authentication required.".to_string());
        }

        if let Some(queued) = self.multi.as_mut() {
            return match name.as_str() {
                "EXEC" => {
                    let queued = std::mem::take(queued);
                    self.multi = None;
                    let replies = queued
                        .iter()
                        .map(|cmd| {
                            shared
                                .apply(&name_of(cmd), cmd)
                                .unwrap_or_else(|err| BytesFrame::Error(err.into()))
                        })
                        .collect();
                    Ok(BytesFrame::Array(replies))
                }
                "DISCARD" => {
                    self.multi = None;
                    Ok(ok())
                }
                "MULTI" => Err("ERR MULTI calls can not be nested".to_string()),
                _ => {
                    queued.push(args);
                    Ok(BytesFrame::SimpleString(Bytes::from_static(b"QUEUED")))
                }
            };
        }

        match name.as_str() {
            "MULTI" => {
                self.multi = Some(Vec::new());
                Ok(ok())
            }
            "EXEC" => Err("ERR EXEC without MULTI".to_string()),
            "SUBSCRIBE" => self.subscribe(shared, &args),
            "XREADGROUP" => read_group(shared, &args).await,
            _ => shared.apply(&name, &args),
        }
    }

    fn subscribe(&mut self, shared: &Shared, args: &[Bytes]) -> Reply {
        if args.len() < 2 {
            return Err(wrong_arity("subscribe"));
        }
        let mut confirmations = Vec::with_capacity(args.len() - 1);
        {
            let mut state = shared.state.lock();
            for channel in &args[1..] {
                state
                    .subscribers
                    .entry(text(channel))
                    .or_default()
                    .push(self.push.clone());
                self.channels += 1;
                confirmations.push(BytesFrame::Array(vec![
                    bulk(Bytes::from_static(b"subscribe")),
                    bulk(channel.clone()),
                    count(self.channels),
                ]));
            }
        }
        let mut confirmations = confirmations.into_iter();
        let first = confirmations.next().unwrap_or(BytesFrame::Null);
        for rest in confirmations {
            let _ = self.push.send(rest);
        }
        Ok(first)
    }
}

impl Shared {
    fn apply(&self, name: &str, args: &[Bytes]) -> Reply {
        let mut state = self.state.lock();
        match name {
            "PING" => Ok(BytesFrame::SimpleString(Bytes::from_static(b"PONG"))),
            "SELECT" => {
                integer(args.get(1))?;
                Ok(ok())
            }
            "RPUSH" => {
                if args.len() < 3 {
                    return Err(wrong_arity(name));
                }
                let list = state.lists.entry(text(&args[1])).or_default();
                list.extend(args[2..].iter().cloned());
                Ok(count(list.len()))
            }
            "LTRIM" => {
                if args.len() != 4 {
                    return Err(wrong_arity(name));
                }
                let key = text(&args[1]);
                let (start, stop) = (integer(args.get(2))?, integer(args.get(3))?);
                if let Some(list) = state.lists.get_mut(&key) {
                    match normalize_range(list.len(), start, stop) {
                        Some((from, to)) => {
                            list.truncate(to + 1);
                            list.drain(..from);
                        }
                        None => list.clear(),
                    }
                    if list.is_empty() {
                        state.lists.remove(&key);
                    }
                }
                Ok(ok())
            }
            "LRANGE" => {
                if args.len() != 4 {
                    return Err(wrong_arity(name));
                }
                let (start, stop) = (integer(args.get(2))?, integer(args.get(3))?);
                let items = state
                    .lists
                    .get(&text(&args[1]))
                    .and_then(|list| {
                        normalize_range(list.len(), start, stop)
                            .map(|(from, to)| list[from..=to].iter().cloned().map(bulk).collect())
                    })
                    .unwrap_or_default();
                Ok(BytesFrame::Array(items))
            }
            "DEL" => {
                let removed = args[1..]
                    .iter()
                    .map(text)
                    .filter(|key| {
                        state.lists.remove(key).is_some() | state.streams.remove(key).is_some()
                    })
                    .count();
                Ok(count(removed))
            }
            "EXISTS" => {
                let found = args[1..]
                    .iter()
                    .map(text)
                    .filter(|key| state.lists.contains_key(key) || state.streams.contains_key(key))
                    .count();
                Ok(count(found))
            }
            "PUBLISH" => {
                if args.len() != 3 {
                    return Err(wrong_arity(name));
                }
                let message = BytesFrame::Array(vec![
                    bulk(Bytes::from_static(b"message")),
                    bulk(args[1].clone()),
                    bulk(args[2].clone()),
                ]);
                let receivers = state.subscribers.get_mut(&text(&args[1])).map_or(0, |subs| {
                    subs.retain(|s| s.send(message.clone()).is_ok());
                    subs.len()
                });
                Ok(count(receivers))
            }
            "XADD" => {
                if args.len() < 5 || args.len() % 2 == 0 {
                    return Err(wrong_arity(name));
                }
                let id = state.xadd(&text(&args[1]), args[3..].to_vec());
                drop(state);
                self.appended.notify_waiters();
                Ok(bulk(id))
            }
            "XGROUP" => state.create_group(args),
            "XACK" => {
                if args.len() < 4 {
                    return Err(wrong_arity(name));
                }
                let acked = state
                    .streams
                    .get_mut(&text(&args[1]))
                    .and_then(|s| s.groups.get_mut(&text(&args[2])))
                    .map_or(0, |group| {
                        args[3..]
                            .iter()
                            .filter(|id| group.pending.remove(&text(id)))
                            .count()
                    });
                Ok(count(acked))
            }
            other => Err(format!("ERR unknown command '{other}'")),
        }
    }
}

impl State {
    fn xadd(&mut self, key: &str, fields: Vec<Bytes>) -> String {
        let stream = self.streams.entry(key.to_string()).or_default();
        stream.last_id += 1;
        let id = format!("{}-0", stream.last_id);
        stream.entries.push(StreamEntry {
            id: id.clone(),
            fields,
        });
        id
    }

    fn create_group(&mut self, args: &[Bytes]) -> Reply {
        let sub = args.get(1).map(|b| text(b).to_ascii_uppercase());
        if sub.as_deref() != Some("CREATE") || args.len() < 5 {
            return Err("ERR only XGROUP CREATE key group id [MKSTREAM] is supported".to_string());
        }
        let key = text(&args[2]);
        let group = text(&args[3]);
        let mkstream = args[5..]
            .iter()
            .any(|a| text(a).eq_ignore_ascii_case("MKSTREAM"));
        if !self.streams.contains_key(&key) {
            if !mkstream {
                return Err("ERR The XGROUP subcommand requires the key to exist".to_string());
            }
            self.streams.insert(key.clone(), Stream::default());
        }
        let Some(stream) = self.streams.get_mut(&key) else {
            return Err("ERR no such key".to_string());
        };
        if stream.groups.contains_key(&group) {
            return Err("BUSYGROUP Consumer Group name already exists".to_string());
        }
        let delivered = if args[4].as_ref() == b"$" {
            stream.entries.len()
        } else {
            0
        };
        stream.groups.insert(
            group,
            Group {
                delivered,
                pending: HashSet::new(),
            },
        );
        Ok(ok())
    }

    /// Hands out up to `limit` new entries to a group.
    fn deliver(&mut self, key: &str, group: &str, limit: usize) -> std::result::Result<Option<BytesFrame>, String> {
        let no_group = || format!("NOGROUP No such key '{key}' or consumer group '{group}'");
        let stream = self.streams.get_mut(key).ok_or_else(no_group)?;
        let cursor = stream.groups.get_mut(group).ok_or_else(no_group)?;
        let fresh: Vec<&StreamEntry> = stream.entries[cursor.delivered..].iter().take(limit).collect();
        if fresh.is_empty() {
            return Ok(None);
        }
        cursor.delivered += fresh.len();
        let entries = fresh
            .into_iter()
            .map(|entry| {
                cursor.pending.insert(entry.id.clone());
                BytesFrame::Array(vec![
                    bulk(entry.id.clone()),
                    BytesFrame::Array(entry.fields.iter().cloned().map(bulk).collect()),
                ])
            })
            .collect();
        Ok(Some(BytesFrame::Array(vec![BytesFrame::Array(vec![
            bulk(key.to_string()),
            BytesFrame::Array(entries),
        ])])))
    }
}

/// Parsed `XREADGROUP GROUP g c [COUNT n] [BLOCK ms] STREAMS key >`.
struct ReadGroup {
    group: String,
    key: String,
    limit: usize,
    block: Option<Duration>,
}

fn parse_read_group(args: &[Bytes]) -> std::result::Result<ReadGroup, String> {
    let words: Vec<String> = args.iter().map(text).collect();
    let upper = |i: usize| words.get(i).map(|w| w.to_ascii_uppercase());
    if upper(1).as_deref() != Some("GROUP") || words.len() < 7 {
        return Err(wrong_arity("xreadgroup"));
    }
    let group = words[2].clone();
    let mut limit = usize::MAX;
    let mut block = None;
    let mut i = 4;
    while i < words.len() {
        match upper(i).as_deref() {
            Some("COUNT") => {
                limit = usize::try_from(integer(args.get(i + 1))?).unwrap_or(usize::MAX).max(1);
                i += 2;
            }
            Some("BLOCK") => {
                let ms = u64::try_from(integer(args.get(i + 1))?).unwrap_or(0);
                block = Some(Duration::from_millis(ms));
                i += 2;
            }
            Some("NOACK") => i += 1,
            Some("STREAMS") => {
                let key = words.get(i + 1).cloned().ok_or_else(|| wrong_arity("xreadgroup"))?;
                if words.get(i + 2).map(String::as_str) != Some(">") {
                    return Err("ERR only '>' reads are supported".to_string());
                }
                return Ok(ReadGroup {
                    group,
                    key,
                    limit,
                    block,
                });
            }
            _ => return Err("ERR syntax error".to_string()),
        }
    }
    Err(wrong_arity("xreadgroup"))
}

async fn read_group(shared: &Shared, args: &[Bytes]) -> Reply {
    let request = parse_read_group(args)?;
    // BLOCK 0 waits forever.
    let deadline = request
        .block
        .filter(|b| !b.is_zero())
        .map(|b| Instant::now() + b);
    loop {
        let notified = shared.appended.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let delivered = shared
            .state
            .lock()
            .deliver(&request.key, &request.group, request.limit)?;
        if let Some(frame) = delivered {
            return Ok(frame);
        }
        if request.block.is_none() {
            return Ok(BytesFrame::Null);
        }
        match deadline {
            Some(deadline) => {
                if time::timeout_at(deadline, notified).await.is_err() {
                    return Ok(BytesFrame::Null);
                }
            }
            None => notified.await,
        }
    }
}

/// Resolves redis-style inclusive indices against a list of `len` items.
fn normalize_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = i64::try_from(len).ok()?;
    let start = if start < 0 { len + start } else { start }.max(0);
    let stop = if stop < 0 { len + stop } else { stop }.min(len - 1);
    if start > stop || start >= len {
        return None;
    }
    Some((usize::try_from(start).ok()?, usize::try_from(stop).ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resp::{frame_integer, frame_strings, Command, RespClient};
    use test_case::test_case;

    fn client(fake: &FakeValkey) -> RespClient {
        RespClient::from_url(&fake.url(), Duration::from_secs(2)).unwrap()
    }

    #[test_case(5, 0, -1, Some((0, 4)) ; "whole list")]
    #[test_case(5, -2, -1, Some((3, 4)) ; "last two")]
    #[test_case(5, -10, -1, Some((0, 4)) ; "more than available")]
    #[test_case(5, 3, 1, None ; "inverted")]
    #[test_case(0, 0, -1, None ; "empty")]
    #[test_case(5, 7, 9, None ; "past the end")]
    fn ranges(len: usize, start: i64, stop: i64, expected: Option<(usize, usize)>) {
        assert_eq!(normalize_range(len, start, stop), expected);
    }

    #[tokio::test]
    async fn list_commands() {
        let fake = FakeValkey::start().await.unwrap();
        let mut conn = client(&fake).connect().await.unwrap();

        let reply = conn
            .call(Command::new("RPUSH").arg("foo").arg("a").arg("b").arg("c"))
            .await
            .unwrap();
        assert_eq!(frame_integer(&reply).unwrap(), 3);
        conn.call(Command::new("LTRIM").arg("foo").int_arg(-2).int_arg(-1))
            .await
            .unwrap();
        let reply = conn
            .call(Command::new("LRANGE").arg("foo").int_arg(0).int_arg(-1))
            .await
            .unwrap();
        assert_eq!(frame_strings(reply).unwrap(), vec!["b", "c"]);
        assert_eq!(fake.list("foo"), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn password_is_required() {
        let fake = FakeValkey::start_with_password("secret").await.unwrap();
        let bare = RespClient::new(fake.addr().to_string(), Duration::from_secs(2));
        let mut conn = bare.connect().await.unwrap();
        assert!(conn.call(Command::new("PING")).await.is_err());

        let mut conn = client(&fake).connect().await.unwrap();
        assert!(conn.call(Command::new("PING")).await.is_ok());
    }

    #[tokio::test]
    async fn streams_and_groups() {
        let fake = FakeValkey::start().await.unwrap();
        let mut conn = client(&fake).connect().await.unwrap();

        conn.call(
            Command::new("XGROUP")
                .arg("CREATE")
                .arg("logs")
                .arg("logger")
                .arg("0")
                .arg("MKSTREAM"),
        )
        .await
        .unwrap();
        let again = conn
            .call(
                Command::new("XGROUP")
                    .arg("CREATE")
                    .arg("logs")
                    .arg("logger")
                    .arg("0")
                    .arg("MKSTREAM"),
            )
            .await;
        assert!(matches!(again, Err(crate::StoreError::Server(msg)) if msg.starts_with("BUSYGROUP")));

        let id = fake.xadd("logs", &[("data", "{}")]);
        let reply = conn
            .call(
                Command::new("XREADGROUP")
                    .arg("GROUP")
                    .arg("logger")
                    .arg("c1")
                    .arg("COUNT")
                    .int_arg(10)
                    .arg("BLOCK")
                    .int_arg(100)
                    .arg("STREAMS")
                    .arg("logs")
                    .arg(">"),
            )
            .await
            .unwrap();
        assert!(matches!(reply, BytesFrame::Array(_)));
        assert_eq!(fake.pending("logs", "logger"), 1);

        let reply = conn
            .call(Command::new("XACK").arg("logs").arg("logger").arg(&id))
            .await
            .unwrap();
        assert_eq!(frame_integer(&reply).unwrap(), 1);
        assert_eq!(fake.pending("logs", "logger"), 0);
    }

    #[tokio::test]
    async fn blocking_read_times_out_with_null() {
        let fake = FakeValkey::start().await.unwrap();
        fake.xadd("logs", &[("data", "x")]);
        let mut conn = client(&fake).connect().await.unwrap();
        conn.call(Command::new("XGROUP").arg("CREATE").arg("logs").arg("g").arg("$"))
            .await
            .unwrap();

        let reply = conn
            .call(
                Command::new("XREADGROUP")
                    .arg("GROUP")
                    .arg("g")
                    .arg("c")
                    .arg("BLOCK")
                    .int_arg(50)
                    .arg("STREAMS")
                    .arg("logs")
                    .arg(">"),
            )
            .await
            .unwrap();
        assert_eq!(reply, BytesFrame::Null);
    }

    #[tokio::test]
    async fn disconnect_closes_connections() {
        let fake = FakeValkey::start().await.unwrap();
        let mut conn = client(&fake).connect().await.unwrap();
        conn.call(Command::new("PING")).await.unwrap();
        fake.disconnect_all();
        assert!(conn.next_frame().await.is_err());

        let mut conn = client(&fake).connect().await.unwrap();
        assert!(conn.call(Command::new("PING")).await.is_ok());
    }
}
