//! File-backed log storage.
//!
//! This module provides:
//! - [`FileStore`]: one append-only `<root>/<app>.log` file per application
//! - Bounded reads through `tail -n`
//! - Live tail through a `tail -n 0 -f` child process
//!
//! File handles are cached per application in an immutable snapshot. Writers
//! for an application whose handle is already open only load the snapshot;
//! the cold-path mutex is taken when a handle is created or removed, and a
//! new snapshot replaces the old one.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, StoreError};
use crate::traits::{validate_app, LogStorage, LogTail, TailSender};

/// Default root directory for application log files.
pub const DEFAULT_LOG_ROOT: &str = "/data/logs";

/// Configuration for file-based log storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStoreConfig {
    /// Directory holding one `<app>.log` file per application.
    pub log_root: PathBuf,
    /// Program used for bounded reads and follow mode.
    pub tail_program: String,
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self {
            log_root: PathBuf::from(DEFAULT_LOG_ROOT),
            tail_program: "tail".to_string(),
        }
    }
}

impl FileStoreConfig {
    /// Creates a new config with the given root directory.
    #[must_use]
    pub fn new(log_root: impl Into<PathBuf>) -> Self {
        Self {
            log_root: log_root.into(),
            ..Default::default()
        }
    }

    /// Sets the program used for reads and follow mode.
    #[must_use]
    pub fn with_tail_program(mut self, program: impl Into<String>) -> Self {
        self.tail_program = program.into();
        self
    }
}

/// File-based log storage.
pub struct FileStore {
    config: FileStoreConfig,
    files: ArcSwap<HashMap<String, Arc<File>>>,
    /// Serializes snapshot replacement.
    cold_path: Mutex<()>,
}

impl FileStore {
    /// Creates a file store, creating the root directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be created.
    pub fn new(config: FileStoreConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.log_root)?;
        Ok(Self {
            config,
            files: ArcSwap::from_pointee(HashMap::new()),
            cold_path: Mutex::new(()),
        })
    }

    /// Creates a file store with default settings under `log_root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be created.
    pub fn with_log_root(log_root: impl Into<PathBuf>) -> Result<Self> {
        Self::new(FileStoreConfig::new(log_root))
    }

    /// Returns the path of the log file for `app`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidApp`] if `app` would resolve outside the
    /// log root.
    pub fn file_path(&self, app: &str) -> Result<PathBuf> {
        validate_app(app)?;
        Ok(self.config.log_root.join(format!("{app}.log")))
    }

    /// Returns the number of cached file handles.
    #[must_use]
    pub fn open_files(&self) -> usize {
        self.files.load().len()
    }

    /// Appends one line to the application's file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or written.
    pub fn append(&self, app: &str, line: &str) -> Result<()> {
        let file = self.handle(app)?;
        let mut record = String::with_capacity(line.len() + 1);
        record.push_str(line.trim_end_matches(['\n', '\r']));
        record.push('\n');
        (&*file).write_all(record.as_bytes())?;
        Ok(())
    }

    /// Returns the cached handle for `app`, opening it on first use.
    fn handle(&self, app: &str) -> Result<Arc<File>> {
        if let Some(file) = self.files.load().get(app) {
            return Ok(Arc::clone(file));
        }

        let _cold = self.cold_path.lock();
        let current = self.files.load_full();
        // Another writer may have opened it while we waited.
        if let Some(file) = current.get(app) {
            return Ok(Arc::clone(file));
        }
        let path = self.file_path(app)?;
        let file = Arc::new(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)?,
        );
        debug!(app, path = %path.display(), "opened log file");
        let mut next = HashMap::clone(&current);
        next.insert(app.to_string(), Arc::clone(&file));
        self.files.store(Arc::new(next));
        Ok(file)
    }

    fn ensure_exists(&self, app: &str) -> Result<PathBuf> {
        let path = self.file_path(app)?;
        if path.try_exists()? {
            Ok(path)
        } else {
            Err(StoreError::NotFound(app.to_string()))
        }
    }

    async fn read_lines(&self, path: &Path, lines: i64) -> Result<Vec<String>> {
        let output = Command::new(&self.config.tail_program)
            .arg("-n")
            .arg(lines.to_string())
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await?;
        if !output.status.success() {
            return Err(StoreError::Io(std::io::Error::other(format!(
                "{} exited with {}: {}",
                self.config.tail_program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ))));
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_string)
            .collect())
    }
}

#[async_trait]
impl LogStorage for FileStore {
    fn start(&self) {}

    async fn write(&self, app: &str, line: &str) -> Result<()> {
        self.append(app, line)
    }

    async fn read(&self, app: &str, lines: i64) -> Result<Vec<String>> {
        if lines <= 0 {
            return Ok(Vec::new());
        }
        let path = self.ensure_exists(app)?;
        self.read_lines(&path, lines).await
    }

    async fn tail(&self, app: &str, capacity: usize, cancel: CancellationToken) -> Result<LogTail> {
        let path = self.ensure_exists(app)?;
        let mut child = Command::new(&self.config.tail_program)
            .args(["-n", "0", "-f"])
            .arg(&path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| StoreError::Io(std::io::Error::other("follow process has no stdout")))?;

        let (sender, tail) = LogTail::channel(capacity, &cancel);
        let app = app.to_string();
        tokio::spawn(async move {
            follow(&app, BufReader::new(stdout), sender).await;
            if let Err(err) = child.kill().await {
                debug!(app = %app, error = %err, "follow process already exited");
            }
        });
        Ok(tail)
    }

    async fn destroy(&self, app: &str) -> Result<()> {
        let path = self.file_path(app)?;
        let _cold = self.cold_path.lock();
        let current = self.files.load_full();
        if current.contains_key(app) {
            let mut next = HashMap::clone(&current);
            next.remove(app);
            self.files.store(Arc::new(next));
        }
        match std::fs::remove_file(path) {
            Ok(()) => {
                info!(app, "destroyed log file");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn reopen(&self) -> Result<()> {
        let _cold = self.cold_path.lock();
        let count = self.files.swap(Arc::new(HashMap::new())).len();
        info!(count, "dropped cached log files");
        Ok(())
    }

    async fn stop(&self) {}
}

/// Bridges lines from the follow process into the tail until it is done.
async fn follow<R>(app: &str, reader: BufReader<R>, mut sender: TailSender)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = reader.lines();
    while !sender.is_done() {
        let next = tokio::select! {
            () = sender.cancelled() => break,
            next = lines.next_line() => next,
        };
        match next {
            Ok(Some(line)) => {
                if !sender.send(line).await {
                    break;
                }
            }
            Ok(None) => break,
            Err(err) => {
                warn!(app, error = %err, "follow read failed");
                break;
            }
        }
    }
}
