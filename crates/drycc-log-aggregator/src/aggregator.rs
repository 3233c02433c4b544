//! Aggregator lifecycle: `Idle → Listening → Stopping → Stopped`.

use std::sync::Arc;

use async_trait::async_trait;
use drycc_log_store::resp::RespClient;
use drycc_log_store::LogStorage;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::AggregatorConfig;
use crate::consumer::Consumer;
use crate::error::{AggregatorError, Result};

/// Name of the stream aggregator realization.
pub const VALKEY_AGGREGATOR: &str = "valkey";

/// Consumes log envelopes from the message bus into storage.
#[async_trait]
pub trait Aggregator: Send + Sync {
    /// Starts consuming. Only the first call has an effect.
    ///
    /// # Errors
    ///
    /// Returns an error if a consumer cannot be set up.
    fn listen(&self) -> Result<()>;

    /// Cancels every consumer and waits up to the stop timeout for them to
    /// finish.
    ///
    /// # Errors
    ///
    /// Returns [`AggregatorError::StopTimedOut`] if the consumers are still
    /// running when the timeout elapses.
    async fn stop(&self) -> Result<()>;

    /// Resolves once every consumer has observed cancellation.
    async fn stopped(&self);
}

/// Lifecycle state of a [`StreamAggregator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorState {
    /// Constructed, not yet listening.
    Idle,
    /// Consumers are running.
    Listening,
    /// Cancellation was requested.
    Stopping,
    /// Every consumer has finished.
    Stopped,
}

struct Shared {
    state: Mutex<AggregatorState>,
    done: watch::Sender<bool>,
}

impl Shared {
    fn finish(&self) {
        *self.state.lock() = AggregatorState::Stopped;
        self.done.send_replace(true);
    }
}

/// Consumer-group aggregator with one consumer task per bus address.
pub struct StreamAggregator {
    config: Arc<AggregatorConfig>,
    clients: Vec<RespClient>,
    storage: Arc<dyn LogStorage>,
    cancel: CancellationToken,
    shared: Arc<Shared>,
}

impl StreamAggregator {
    /// Creates an aggregator writing into `storage`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or a bus URL cannot be
    /// parsed.
    pub fn new(config: AggregatorConfig, storage: Arc<dyn LogStorage>) -> Result<Self> {
        config.validate()?;
        let clients = config
            .stream_urls
            .iter()
            .map(|url| RespClient::from_url(url.trim(), config.command_timeout))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let (done, _) = watch::channel(false);
        Ok(Self {
            config: Arc::new(config),
            clients,
            storage,
            cancel: CancellationToken::new(),
            shared: Arc::new(Shared {
                state: Mutex::new(AggregatorState::Idle),
                done,
            }),
        })
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> AggregatorState {
        *self.shared.state.lock()
    }
}

#[async_trait]
impl Aggregator for StreamAggregator {
    fn listen(&self) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            if *state != AggregatorState::Idle {
                return Ok(());
            }
            *state = AggregatorState::Listening;
        }

        let handles: Vec<_> = self
            .clients
            .iter()
            .map(|client| {
                let consumer = Consumer::new(
                    client.clone(),
                    Arc::clone(&self.config),
                    Arc::clone(&self.storage),
                );
                tokio::spawn(consumer.run(self.cancel.clone()))
            })
            .collect();
        info!(
            consumers = handles.len(),
            stream = %self.config.stream,
            group = %self.config.group,
            "aggregator listening"
        );

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            for handle in handles {
                if let Err(err) = handle.await {
                    tracing::error!(error = %err, "consumer task failed");
                }
            }
            shared.finish();
            info!("aggregator stopped");
        });
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let never_listened = {
            let mut state = self.shared.state.lock();
            let idle = *state == AggregatorState::Idle;
            if *state == AggregatorState::Listening {
                *state = AggregatorState::Stopping;
            }
            idle
        };
        self.cancel.cancel();
        if never_listened {
            self.shared.finish();
            return Ok(());
        }

        let timeout = self.config.stop_timeout;
        tokio::time::timeout(timeout, self.stopped())
            .await
            .map_err(|_| AggregatorError::StopTimedOut(timeout))
    }

    async fn stopped(&self) {
        let mut done = self.shared.done.subscribe();
        // The sender lives as long as `self`, so this only fails after it is gone.
        let _ = done.wait_for(|finished| *finished).await;
    }
}

/// Builds the aggregator realization named by `kind`.
///
/// # Errors
///
/// Returns [`AggregatorError::UnrecognizedAggregator`] for unknown kinds, or
/// any error from constructing the aggregator.
pub fn new_aggregator(
    kind: &str,
    config: AggregatorConfig,
    storage: Arc<dyn LogStorage>,
) -> Result<Box<dyn Aggregator>> {
    match kind {
        VALKEY_AGGREGATOR => Ok(Box::new(StreamAggregator::new(config, storage)?)),
        other => Err(AggregatorError::UnrecognizedAggregator(other.to_string())),
    }
}
