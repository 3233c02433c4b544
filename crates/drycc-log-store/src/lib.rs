//! # drycc-log-store
//!
//! Bounded per-application log storage for the Drycc logger.
//!
//! This crate provides:
//!
//! - [`LogStorage`]: the capability every backend implements
//! - [`FileStore`]: one append-only file per application on local disk
//! - [`ValkeyStore`]: capped lists on a shared valkey server, written in
//!   pipelined batches and tailed through pub/sub
//! - [`LogTail`]: a bounded, cancellable live stream of new lines
//! - [`new_storage`]: construction of the configured backend
//!
//! ## Example
//!
//! ```rust,no_run
//! use drycc_log_store::{new_storage, StorageConfig, StorageKind};
//!
//! # async fn example() -> drycc_log_store::Result<()> {
//! let storage = new_storage(&StorageConfig::new(StorageKind::Valkey))?;
//! storage.start();
//! storage.write("foo", "2016-10-18T20:29:38+00:00 foo[web.v2.nzf60]: hello").await?;
//! let recent = storage.read("foo", 100).await?;
//! storage.stop().await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod file_store;
pub mod resp;
pub mod traits;
pub mod valkey;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use config::{new_storage, StorageConfig, StorageKind};
pub use error::{Result, StoreError};
pub use file_store::{FileStore, FileStoreConfig};
pub use traits::{validate_app, LogStorage, LogTail};
pub use valkey::{ValkeyStore, ValkeyStoreConfig};
