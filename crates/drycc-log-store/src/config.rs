//! Selection of the storage backend.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::info;

use crate::error::{Result, StoreError};
use crate::file_store::{FileStore, FileStoreConfig};
use crate::traits::LogStorage;
use crate::valkey::{ValkeyStore, ValkeyStoreConfig};

/// Which storage backend to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageKind {
    /// One file per application on local disk.
    File,
    /// Lists on a shared valkey server.
    #[default]
    Valkey,
}

impl StorageKind {
    /// Returns the configuration name of this backend.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Valkey => "valkey",
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "file" => Ok(Self::File),
            "valkey" => Ok(Self::Valkey),
            other => Err(StoreError::UnrecognizedStorage(other.to_string())),
        }
    }
}

/// Configuration for every storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StorageConfig {
    /// The backend to construct.
    pub kind: StorageKind,
    /// Settings used when `kind` is [`StorageKind::File`].
    pub file: FileStoreConfig,
    /// Settings used when `kind` is [`StorageKind::Valkey`].
    pub valkey: ValkeyStoreConfig,
}

impl StorageConfig {
    /// Creates a config for the given backend with default settings.
    #[must_use]
    pub fn new(kind: StorageKind) -> Self {
        Self {
            kind,
            ..Default::default()
        }
    }

    /// Sets the file backend settings.
    #[must_use]
    pub fn with_file(mut self, file: FileStoreConfig) -> Self {
        self.file = file;
        self
    }

    /// Sets the valkey backend settings.
    #[must_use]
    pub fn with_valkey(mut self, valkey: ValkeyStoreConfig) -> Self {
        self.valkey = valkey;
        self
    }
}

/// Builds the configured storage backend.
///
/// The returned storage is not started.
///
/// # Errors
///
/// Returns an error if the backend settings are invalid.
pub fn new_storage(config: &StorageConfig) -> Result<Arc<dyn LogStorage>> {
    info!(kind = %config.kind, "creating log storage");
    match config.kind {
        StorageKind::File => Ok(Arc::new(FileStore::new(config.file.clone())?)),
        StorageKind::Valkey => Ok(Arc::new(ValkeyStore::new(config.valkey.clone())?)),
    }
}
