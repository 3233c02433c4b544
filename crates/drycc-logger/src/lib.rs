//! # drycc-logger
//!
//! Log aggregation service for Drycc applications.
//!
//! The process consumes container log envelopes from the message bus,
//! stores them per application in a bounded log, and serves them over HTTP.
//!
//! ## API Endpoints
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `/healthz` | GET | Liveness probe |
//! | `/logs/{app}` | GET | Recent lines; `follow=true` streams new ones |
//! | `/logs/{app}` | DELETE | Remove an application's log |

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod service;
pub mod weblog;

pub use config::{LoggerConfig, Settings, WeblogConfig};
pub use error::{ConfigError, LoggerError, WeblogError, WeblogResult};
pub use service::Logger;
pub use weblog::WeblogServer;
