//! # Outbox Relay
//!
//! Derived events are written to the `outbox_events` table in the same
//! transaction as the state change that caused them. [`OutboxRelay`] moves
//! them from there onto the message bus.
//!
//! Delivery is at-least-once. Events go out in sequence order and a drain
//! stops at the first publish failure, so a later event for an order can
//! never overtake an earlier one. Ids only follow commit order within one
//! order (its row lock serializes the writers); two orders committing
//! concurrently may interleave their ids.
//!
//! A failing event is retried on every drain with no backoff and no attempt
//! cap, and it holds back every event queued behind it until it succeeds.
//! Delivered rows are pruned at the end of each drain that delivered any.

use crate::model::OrderId;
use crate::relay::Producer;
use crate::store::{OrderStore, StoreError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// An event to be appended to the outbox.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOutboxEvent {
    pub order_id: OrderId,
    pub key: String,
    pub payload: Vec<u8>,
}

/// A stored outbox row.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxEvent {
    /// Sequence id. Increases in commit order for events of the same order;
    /// events of different orders may commit out of id order.
    pub id: i64,
    pub order_id: OrderId,
    pub key: String,
    pub payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
}

/// Outcome of one [`OutboxRelay::drain`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: usize,
    /// Whether the drain stopped on a publish failure.
    pub stalled: bool,
}

pub struct OutboxRelay<S: OrderStore, P: Producer> {
    store: Arc<S>,
    producer: P,
    batch_size: usize,
    drain_lock: Mutex<()>,
}

impl<S: OrderStore, P: Producer> OutboxRelay<S, P> {
    pub fn new(store: Arc<S>, producer: P, batch_size: usize) -> Self {
        Self {
            store,
            producer,
            batch_size: batch_size.max(1),
            drain_lock: Mutex::new(()),
        }
    }

    pub fn producer(&self) -> &P {
        &self.producer
    }

    /// Publishes every pending event, oldest first.
    ///
    /// Concurrent callers are serialized. Store errors abort the drain; a
    /// publish error is recorded on the event and ends the drain early.
    /// Delivered rows are pruned afterwards; a failed prune is only logged.
    #[instrument(skip(self))]
    pub async fn drain(&self) -> Result<DrainReport, StoreError> {
        let _guard = self.drain_lock.lock().await;
        let report = self.publish_pending().await?;

        if report.delivered > 0 {
            match self.store.prune_delivered_events().await {
                Ok(pruned) => debug!(pruned, "Pruned delivered events"),
                Err(e) => warn!(error = %e, "Pruning delivered events failed"),
            }
        }

        Ok(report)
    }

    async fn publish_pending(&self) -> Result<DrainReport, StoreError> {
        let mut report = DrainReport::default();

        loop {
            let batch = self.store.pending_events(self.batch_size).await?;
            let exhausted = batch.len() < self.batch_size;

            for event in batch {
                match self.producer.publish(&event.key, &event.payload).await {
                    Ok(()) => {
                        self.store.mark_event_delivered(event.id).await?;
                        report.delivered += 1;
                        debug!(
                            event_id = event.id,
                            key = %event.key,
                            order_id = %event.order_id,
                            "Event published"
                        );
                    }
                    Err(e) => {
                        warn!(
                            event_id = event.id,
                            key = %event.key,
                            order_id = %event.order_id,
                            attempts = event.attempts + 1,
                            error = %e,
                            "Publish failed, event stays pending"
                        );
                        self.store.record_event_failure(event.id, &e.to_string()).await?;
                        report.stalled = true;
                        return Ok(report);
                    }
                }
            }

            if exhausted {
                return Ok(report);
            }
        }
    }

    /// Drains every `interval` until `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken, interval: Duration) {
        info!(?interval, batch_size = self.batch_size, "Outbox relay started");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match self.drain().await {
                        Ok(report) if report.delivered > 0 => {
                            info!(
                                delivered = report.delivered,
                                stalled = report.stalled,
                                "Outbox drained"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "Outbox drain failed"),
                    }
                }
            }
        }

        info!("Outbox relay stopped");
    }
}
