//! # Order Store
//!
//! Owns the relational representation of orders, their line items and the
//! outbox of events waiting to be published.
//!
//! The store is split in two traits:
//!
//! - [`StoreTransaction`]: the row-level primitives, all executed inside one
//!   database transaction. Dropping a transaction without calling
//!   [`commit`](StoreTransaction::commit) rolls it back.
//! - [`OrderStore`]: opens transactions, serves the read paths and the outbox,
//!   and provides the composed operations ([`insert_order`](OrderStore::insert_order),
//!   [`update_status`](OrderStore::update_status), ...) on top of the primitives.
//!
//! Two backends are provided: [`InMemoryOrderStore`] and, behind the
//! `postgres` feature, `PostgresOrderStore`.

mod error;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use error::*;
pub use memory::{FailPoint, InMemoryOrderStore, InMemoryTransaction};
#[cfg(feature = "postgres")]
pub use postgres::{PostgresConfig, PostgresOrderStore, PostgresTransaction};

use crate::model::{NewOrder, Order, OrderId, OrderItem, OrderStatus, ProductId};
use crate::outbox::{NewOutboxEvent, OutboxEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};

/// Row-level operations executed inside a single transaction.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Inserts the order row and returns the `ordered_at` actually stored
    /// (the store clock when the caller left it empty).
    async fn insert_order(&mut self, order: &NewOrder) -> Result<DateTime<Utc>, StoreError>;

    /// Inserts one line item. Fails if the owning order does not exist.
    async fn insert_item(&mut self, item: &OrderItem) -> Result<(), StoreError>;

    /// Reads the current status and locks the row until the transaction ends.
    async fn order_status(&mut self, order_id: OrderId) -> Result<Option<OrderStatus>, StoreError>;

    /// Distinct product ids of the order's items, in the order first seen.
    async fn affected_product_ids(
        &mut self,
        order_id: OrderId,
    ) -> Result<Vec<ProductId>, StoreError>;

    /// Writes the status and returns the number of rows affected.
    ///
    /// Reaching [`OrderStatus::Paid`] stamps `paid_at` with `at` unless it is
    /// already set.
    async fn update_status(
        &mut self,
        order_id: OrderId,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Appends an outbox row and returns its sequence id.
    async fn enqueue_event(&mut self, event: &NewOutboxEvent) -> Result<i64, StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}

/// Transactional storage for orders and their outbox.
#[async_trait]
pub trait OrderStore: Send + Sync + 'static {
    type Tx: StoreTransaction + 'static;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    /// All orders, oldest first, with `items` left empty.
    async fn list_orders(&self) -> Result<Vec<Order>, StoreError>;

    /// Items of one order in insertion order.
    async fn list_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, StoreError>;

    /// Undelivered outbox rows in sequence order.
    async fn pending_events(&self, limit: usize) -> Result<Vec<OutboxEvent>, StoreError>;

    async fn mark_event_delivered(&self, event_id: i64) -> Result<(), StoreError>;

    /// Bumps the attempt counter and remembers the last publish error.
    async fn record_event_failure(&self, event_id: i64, error: &str) -> Result<(), StoreError>;

    /// Deletes delivered outbox rows and returns how many were removed.
    async fn prune_delivered_events(&self) -> Result<u64, StoreError>;

    // --- Composed operations ---

    /// Persists an order and all of its items atomically.
    ///
    /// Either one order row and `items.len()` item rows are committed, or
    /// nothing is.
    #[instrument(skip(self, order, items), fields(order_id = %order.id, items = items.len()))]
    async fn insert_order(
        &self,
        order: &NewOrder,
        items: &[OrderItem],
    ) -> Result<OrderId, StoreError> {
        let mut tx = self.begin().await?;
        let result = insert_rows(&mut tx, order, items).await;
        let ordered_at = commit_or_rollback(tx, result).await?;
        debug!(%ordered_at, "Order committed");
        Ok(order.id)
    }

    /// Every stored order with its items joined in.
    ///
    /// Issues one query for the orders and one per order for its items. Any
    /// failure aborts the whole listing.
    async fn get_all_orders(&self) -> Result<Vec<Order>, StoreError> {
        let mut orders = self.list_orders().await?;
        for order in &mut orders {
            order.items = self.list_items(order.id).await?;
        }
        Ok(orders)
    }

    /// Overwrites the status of exactly one order.
    #[instrument(skip(self))]
    async fn update_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<(), StoreError> {
        let mut tx = self.begin().await?;
        let result = match tx.update_status(order_id, status, Utc::now()).await {
            Ok(0) => Err(StoreError::NotFound(order_id)),
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };
        commit_or_rollback(tx, result).await
    }

    async fn get_affected_product_ids(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<ProductId>, StoreError> {
        let mut tx = self.begin().await?;
        let result = tx.affected_product_ids(order_id).await;
        commit_or_rollback(tx, result).await
    }
}

async fn insert_rows<T: StoreTransaction>(
    tx: &mut T,
    order: &NewOrder,
    items: &[OrderItem],
) -> Result<DateTime<Utc>, StoreError> {
    let ordered_at = tx.insert_order(order).await?;
    for item in items {
        tx.insert_item(item).await?;
    }
    Ok(ordered_at)
}

/// Commits on `Ok`, rolls back on `Err`, and hands the result through.
///
/// A commit failure replaces the result. A rollback failure is only logged:
/// the original error is the one the caller needs to see.
pub async fn commit_or_rollback<T, R, E>(tx: T, result: Result<R, E>) -> Result<R, E>
where
    T: StoreTransaction,
    R: Send,
    E: From<StoreError> + Send,
{
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Rollback failed");
            }
            Err(e)
        }
    }
}
