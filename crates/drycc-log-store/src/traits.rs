//! The storage capability shared by every backend.
//!
//! [`LogStorage`] is implemented by the local-file backend
//! ([`crate::FileStore`]) and the clustered valkey backend
//! ([`crate::ValkeyStore`]). Callers hold an `Arc<dyn LogStorage>` chosen at
//! construction time by [`crate::new_storage`].

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::error::{Result, StoreError};

/// Checks that `app` can name a log in every backend.
///
/// An application name is a single path component: it must be non-empty,
/// must not be `.` or `..`, and must not contain a path separator or NUL.
///
/// # Errors
///
/// Returns [`StoreError::InvalidApp`] when `app` is rejected.
pub fn validate_app(app: &str) -> Result<()> {
    let rejected = app.is_empty()
        || app == "."
        || app == ".."
        || app.contains(['/', '\\', '\0']);
    if rejected {
        return Err(StoreError::InvalidApp(app.to_string()));
    }
    Ok(())
}

/// A bounded per-application log store with live tail.
#[async_trait]
pub trait LogStorage: Send + Sync {
    /// Starts any background task. Calling it more than once has no effect.
    fn start(&self);

    /// Appends a line to the application's bounded log.
    ///
    /// Lines written for the same application by a single caller are stored
    /// in call order. The call may wait for buffer space but never for the
    /// remote store itself.
    async fn write(&self, app: &str, line: &str) -> Result<()>;

    /// Returns the most recent `lines` lines for `app`, oldest first.
    ///
    /// A non-positive `lines` yields an empty vector. An application with no
    /// stored lines yields [`crate::StoreError::NotFound`].
    async fn read(&self, app: &str, lines: i64) -> Result<Vec<String>>;

    /// Streams lines written to `app` after this call.
    ///
    /// The stream ends after `capacity` lines, when `cancel` fires, or when
    /// the returned [`LogTail`] is dropped. Fails with
    /// [`crate::StoreError::NotFound`] if `app` has no log.
    async fn tail(&self, app: &str, capacity: usize, cancel: CancellationToken) -> Result<LogTail>;

    /// Removes everything stored for `app`. Destroying a missing log is not
    /// an error.
    async fn destroy(&self, app: &str) -> Result<()>;

    /// Drops cached resource handles so they are recreated on next write.
    async fn reopen(&self) -> Result<()>;

    /// Halts the background task. Writes issued afterwards are not stored.
    async fn stop(&self);
}

/// Live stream of lines returned by [`LogStorage::tail`].
///
/// Dropping the tail cancels the task feeding it.
#[derive(Debug)]
pub struct LogTail {
    receiver: mpsc::Receiver<String>,
    _guard: DropGuard,
}

impl LogTail {
    /// Creates a tail together with the sender a bridging task feeds it with.
    ///
    /// The returned token is a child of `cancel`; it fires when `cancel` does
    /// or when the tail is dropped.
    pub(crate) fn channel(capacity: usize, cancel: &CancellationToken) -> (TailSender, Self) {
        let token = cancel.child_token();
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let tail = Self {
            receiver,
            _guard: token.clone().drop_guard(),
        };
        let sender = TailSender {
            sender,
            remaining: capacity,
            cancel: token,
        };
        (sender, tail)
    }

    /// Receives the next line, or `None` once the tail has closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }
}

impl Stream for LogTail {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Producer half of a [`LogTail`], owned by the bridging task.
pub(crate) struct TailSender {
    sender: mpsc::Sender<String>,
    remaining: usize,
    cancel: CancellationToken,
}

impl TailSender {
    /// Delivers one line. Returns false once the tail wants no more lines.
    pub(crate) async fn send(&mut self, line: String) -> bool {
        if self.is_done() {
            return false;
        }
        tokio::select! {
            () = self.cancel.cancelled() => false,
            sent = self.sender.send(line) => {
                if sent.is_err() {
                    return false;
                }
                self.remaining -= 1;
                self.remaining > 0
            }
        }
    }

    /// Returns true if the tail is full, cancelled or dropped.
    pub(crate) fn is_done(&self) -> bool {
        self.remaining == 0 || self.cancel.is_cancelled() || self.sender.is_closed()
    }

    /// Resolves when the tail is cancelled or dropped.
    pub(crate) async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;
    use test_case::test_case;

    #[test_case("" ; "empty")]
    #[test_case("." ; "current directory")]
    #[test_case(".." ; "parent directory")]
    #[test_case("../victim" ; "parent prefix")]
    #[test_case("foo/bar" ; "nested")]
    #[test_case("/etc/passwd" ; "absolute")]
    #[test_case("..\\victim" ; "backslash")]
    #[test_case("foo\0" ; "nul")]
    fn validate_app_rejects(app: &str) {
        let err = validate_app(app).unwrap_err();
        assert!(err.is_invalid_app());
    }

    #[test_case("foo" ; "plain")]
    #[test_case("my-app.v2" ; "dotted")]
    #[test_case("..foo" ; "leading dots")]
    fn validate_app_accepts(app: &str) {
        assert!(validate_app(app).is_ok());
    }

    #[tokio::test]
    async fn tail_closes_after_capacity() {
        let cancel = CancellationToken::new();
        let (mut sender, mut tail) = LogTail::channel(2, &cancel);

        assert!(sender.send("one".to_string()).await);
        assert!(!sender.send("two".to_string()).await);
        assert!(!sender.send("three".to_string()).await);
        drop(sender);

        let lines: Vec<String> = tail.by_ref().collect().await;
        assert_eq!(lines, vec!["one".to_string(), "two".to_string()]);
    }

    #[tokio::test]
    async fn cancel_stops_sender() {
        let cancel = CancellationToken::new();
        let (mut sender, mut tail) = LogTail::channel(10, &cancel);

        cancel.cancel();
        assert!(sender.is_done());
        assert!(!sender.send("late".to_string()).await);
        drop(sender);

        assert!(tail.recv().await.is_none());
    }

    #[tokio::test]
    async fn dropping_tail_cancels_bridge() {
        let cancel = CancellationToken::new();
        let (sender, tail) = LogTail::channel(10, &cancel);

        drop(tail);
        let result = tokio::time::timeout(Duration::from_secs(1), sender.cancelled()).await;
        assert!(result.is_ok());
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn zero_capacity_is_done_immediately() {
        let cancel = CancellationToken::new();
        let (sender, _tail) = LogTail::channel(0, &cancel);
        assert!(sender.is_done());
    }
}
