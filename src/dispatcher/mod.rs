//! # Consumer Dispatcher
//!
//! The background loop that pulls messages off the bus and routes them by
//! exact key match to a registered [`MessageHandler`].
//!
//! - Unknown keys are skipped.
//! - Handler errors are logged and the loop moves on. There is no retry and
//!   no dead-letter queue.
//! - Consume errors are logged and the loop pauses briefly before trying
//!   again, except for cancellation and a closed bus, which end the loop.

mod error;
mod handlers;

pub use error::*;
pub use handlers::*;

use crate::relay::{Consumer, Message, RelayError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Handles every message published under one key.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    fn key(&self) -> &'static str;

    async fn handle(&self, message: &Message) -> Result<(), DispatchError>;
}

/// Counters reported when the loop ends.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    pub handled: u64,
    pub ignored: u64,
    pub failed: u64,
    pub consume_errors: u64,
}

pub struct ConsumerDispatcher<C: Consumer> {
    consumer: C,
    handlers: HashMap<&'static str, Arc<dyn MessageHandler>>,
    cancel: CancellationToken,
    error_pause: Duration,
}

impl<C: Consumer> ConsumerDispatcher<C> {
    pub fn new(consumer: C, cancel: CancellationToken) -> Self {
        Self {
            consumer,
            handlers: HashMap::new(),
            cancel,
            error_pause: Duration::from_millis(500),
        }
    }

    /// How long to wait after a failed consume before trying again.
    pub fn with_error_pause(mut self, pause: Duration) -> Self {
        self.error_pause = pause;
        self
    }

    /// Registers `handler` for its key, replacing any previous one.
    pub fn register(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.handlers.insert(handler.key(), handler);
        self
    }

    /// Runs until cancelled or the bus closes.
    pub async fn run(mut self) -> DispatchStats {
        let mut keys: Vec<_> = self.handlers.keys().copied().collect();
        keys.sort_unstable();
        info!(?keys, "Dispatcher started");

        let mut stats = DispatchStats::default();
        loop {
            let message = match self.consumer.consume(&self.cancel).await {
                Ok(message) => message,
                Err(RelayError::Cancelled) => break,
                Err(RelayError::Closed) => {
                    warn!("Message bus closed");
                    break;
                }
                Err(e) => {
                    stats.consume_errors += 1;
                    warn!(error = %e, pause = ?self.error_pause, "Consume failed");
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.error_pause) => continue,
                    }
                }
            };
            dispatch(&self.handlers, &message, &mut stats).await;
        }

        info!(?stats, "Dispatcher stopped");
        stats
    }
}

async fn dispatch(
    handlers: &HashMap<&'static str, Arc<dyn MessageHandler>>,
    message: &Message,
    stats: &mut DispatchStats,
) {
    let Some(handler) = handlers.get(message.key.as_str()) else {
        debug!(key = %message.key, "Ignoring message with unrecognized key");
        stats.ignored += 1;
        return;
    };

    debug!(
        key = %message.key,
        value = %String::from_utf8_lossy(&message.value),
        "Message received"
    );
    match handler.handle(message).await {
        Ok(()) => {
            stats.handled += 1;
            debug!(key = %message.key, "Message handled");
        }
        Err(e) => {
            stats.failed += 1;
            error!(key = %message.key, error = %e, "Message handler failed");
        }
    }
}
