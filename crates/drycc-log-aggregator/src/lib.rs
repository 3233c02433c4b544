//! # drycc-log-aggregator
//!
//! Moves container log envelopes from the message bus into log storage.
//!
//! This crate provides:
//!
//! - [`Message`]: the envelope shipped for every container line
//! - [`classify`] and [`handle`]: formatting of envelopes into stored lines
//! - [`Aggregator`] and [`StreamAggregator`]: consumer-group reads from one
//!   or more stream addresses with bounded shutdown
//! - [`new_aggregator`]: construction of the configured realization

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod aggregator;
pub mod config;
mod consumer;
pub mod error;
pub mod handler;
pub mod message;

#[cfg(test)]
mod test_support;

pub use aggregator::{new_aggregator, Aggregator, AggregatorState, StreamAggregator, VALKEY_AGGREGATOR};
pub use config::AggregatorConfig;
pub use consumer::PAYLOAD_FIELD;
pub use error::{AggregatorError, Result};
pub use handler::{classify, handle, LogLine};
pub use message::{Kubernetes, Message, OutputStream};
