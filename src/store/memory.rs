//! In-process order store.
//!
//! All tables live behind one async mutex. A transaction holds the owned
//! guard for its whole lifetime, so transactions are serialized, and keeps an
//! undo log that is replayed on rollback or when the transaction is dropped
//! uncommitted.
//!
//! The store mirrors the relational constraints the service relies on:
//! primary keys are unique and an item cannot reference a missing order.

use crate::model::{ItemId, NewOrder, Order, OrderId, OrderItem, OrderStatus, ProductId};
use crate::outbox::{NewOutboxEvent, OutboxEvent};
use crate::store::{OrderStore, StoreError, StoreTransaction};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

/// Points at which a one-shot failure can be injected.
///
/// Armed with [`InMemoryOrderStore::fail_next`]; each armed point fires once
/// and is then disarmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    Begin,
    InsertOrder,
    /// The n-th (zero-based) item insert of a transaction.
    InsertItem(usize),
    UpdateStatus,
    EnqueueEvent,
    Commit,
    ListItems,
    PendingEvents,
}

#[derive(Debug, Default)]
struct Tables {
    orders: Vec<Order>,
    items: Vec<OrderItem>,
    outbox: Vec<OutboxEvent>,
    last_event_id: i64,
}

type FailPoints = Arc<Mutex<Vec<FailPoint>>>;

fn trip(failpoints: &FailPoints, point: FailPoint) -> Result<(), StoreError> {
    let mut armed = failpoints.lock();
    match armed.iter().position(|p| *p == point) {
        Some(index) => {
            armed.remove(index);
            Err(StoreError::Persistence(format!("injected failure at {point:?}")))
        }
        None => Ok(()),
    }
}

/// Order store backed by in-process tables.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    tables: Arc<AsyncMutex<Tables>>,
    failpoints: FailPoints,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms a one-shot failure at `point`.
    pub fn fail_next(&self, point: FailPoint) {
        self.failpoints.lock().push(point);
    }

    /// Number of stored `(orders, items)` rows.
    pub async fn row_counts(&self) -> (usize, usize) {
        let tables = self.tables.lock().await;
        (tables.orders.len(), tables.items.len())
    }

    /// Number of outbox rows, delivered or not.
    pub async fn outbox_len(&self) -> usize {
        self.tables.lock().await.outbox.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> Result<InMemoryTransaction, StoreError> {
        trip(&self.failpoints, FailPoint::Begin)?;
        let tables = self.tables.clone().lock_owned().await;
        Ok(InMemoryTransaction {
            tables,
            undo: Vec::new(),
            items_inserted: 0,
            failpoints: self.failpoints.clone(),
            open: true,
        })
    }

    async fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
        let tables = self.tables.lock().await;
        let mut orders = tables.orders.clone();
        orders.sort_by(|a, b| a.ordered_at.cmp(&b.ordered_at).then(a.id.cmp(&b.id)));
        Ok(orders)
    }

    async fn list_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, StoreError> {
        trip(&self.failpoints, FailPoint::ListItems)?;
        let tables = self.tables.lock().await;
        Ok(tables
            .items
            .iter()
            .filter(|item| item.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn pending_events(&self, limit: usize) -> Result<Vec<OutboxEvent>, StoreError> {
        trip(&self.failpoints, FailPoint::PendingEvents)?;
        let tables = self.tables.lock().await;
        Ok(tables
            .outbox
            .iter()
            .filter(|event| event.delivered_at.is_none())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_event_delivered(&self, event_id: i64) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        let event = find_event(&mut tables, event_id)?;
        event.delivered_at = Some(Utc::now());
        Ok(())
    }

    async fn record_event_failure(&self, event_id: i64, error: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        let event = find_event(&mut tables, event_id)?;
        event.attempts += 1;
        event.last_error = Some(error.to_string());
        Ok(())
    }

    async fn prune_delivered_events(&self) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock().await;
        let before = tables.outbox.len();
        tables.outbox.retain(|event| event.delivered_at.is_none());
        Ok((before - tables.outbox.len()) as u64)
    }
}

fn find_event(tables: &mut Tables, event_id: i64) -> Result<&mut OutboxEvent, StoreError> {
    tables
        .outbox
        .iter_mut()
        .find(|event| event.id == event_id)
        .ok_or_else(|| StoreError::Persistence(format!("outbox event {event_id} not found")))
}

enum Undo {
    Order(OrderId),
    Item(ItemId),
    Status {
        order_id: OrderId,
        status: OrderStatus,
        paid_at: Option<DateTime<Utc>>,
    },
    Event(i64),
}

/// An open transaction on an [`InMemoryOrderStore`].
pub struct InMemoryTransaction {
    tables: OwnedMutexGuard<Tables>,
    undo: Vec<Undo>,
    items_inserted: usize,
    failpoints: FailPoints,
    open: bool,
}

impl InMemoryTransaction {
    fn undo_all(&mut self) {
        while let Some(step) = self.undo.pop() {
            match step {
                Undo::Order(id) => self.tables.orders.retain(|order| order.id != id),
                Undo::Item(id) => self.tables.items.retain(|item| item.id != id),
                Undo::Status { order_id, status, paid_at } => {
                    if let Some(order) = self.tables.orders.iter_mut().find(|o| o.id == order_id) {
                        order.status = status;
                        order.paid_at = paid_at;
                    }
                }
                Undo::Event(id) => self.tables.outbox.retain(|event| event.id != id),
            }
        }
        self.open = false;
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        if self.open {
            debug!(steps = self.undo.len(), "Rolling back unfinished transaction");
            self.undo_all();
        }
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn insert_order(&mut self, order: &NewOrder) -> Result<DateTime<Utc>, StoreError> {
        trip(&self.failpoints, FailPoint::InsertOrder)?;
        if self.tables.orders.iter().any(|o| o.id == order.id) {
            return Err(StoreError::Persistence(format!(
                "duplicate key value violates unique constraint \"orders_pkey\": {}",
                order.id
            )));
        }
        let ordered_at = order.ordered_at.unwrap_or_else(Utc::now);
        self.tables.orders.push(order.clone().into_order(ordered_at, Vec::new()));
        self.undo.push(Undo::Order(order.id));
        Ok(ordered_at)
    }

    async fn insert_item(&mut self, item: &OrderItem) -> Result<(), StoreError> {
        let nth = self.items_inserted;
        self.items_inserted += 1;
        trip(&self.failpoints, FailPoint::InsertItem(nth))?;

        if !self.tables.orders.iter().any(|o| o.id == item.order_id) {
            return Err(StoreError::Persistence(format!(
                "insert on table \"order_items\" violates foreign key constraint: \
                 order {} does not exist",
                item.order_id
            )));
        }
        if self.tables.items.iter().any(|i| i.id == item.id) {
            return Err(StoreError::Persistence(format!(
                "duplicate key value violates unique constraint \"order_items_pkey\": {}",
                item.id
            )));
        }
        self.tables.items.push(item.clone());
        self.undo.push(Undo::Item(item.id));
        Ok(())
    }

    async fn order_status(&mut self, order_id: OrderId) -> Result<Option<OrderStatus>, StoreError> {
        Ok(self
            .tables
            .orders
            .iter()
            .find(|o| o.id == order_id)
            .map(|o| o.status))
    }

    async fn affected_product_ids(
        &mut self,
        order_id: OrderId,
    ) -> Result<Vec<ProductId>, StoreError> {
        let mut product_ids: Vec<ProductId> = Vec::new();
        for item in self.tables.items.iter().filter(|i| i.order_id == order_id) {
            if !product_ids.contains(&item.product_id) {
                product_ids.push(item.product_id);
            }
        }
        Ok(product_ids)
    }

    async fn update_status(
        &mut self,
        order_id: OrderId,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        trip(&self.failpoints, FailPoint::UpdateStatus)?;
        let Some(order) = self.tables.orders.iter_mut().find(|o| o.id == order_id) else {
            return Ok(0);
        };
        let previous = Undo::Status {
            order_id,
            status: order.status,
            paid_at: order.paid_at,
        };
        order.status = status;
        if status == OrderStatus::Paid && order.paid_at.is_none() {
            order.paid_at = Some(at);
        }
        self.undo.push(previous);
        Ok(1)
    }

    async fn enqueue_event(&mut self, event: &NewOutboxEvent) -> Result<i64, StoreError> {
        trip(&self.failpoints, FailPoint::EnqueueEvent)?;
        self.tables.last_event_id += 1;
        let id = self.tables.last_event_id;
        self.tables.outbox.push(OutboxEvent {
            id,
            order_id: event.order_id,
            key: event.key.clone(),
            payload: event.payload.clone(),
            created_at: Utc::now(),
            attempts: 0,
            last_error: None,
            delivered_at: None,
        });
        self.undo.push(Undo::Event(id));
        Ok(id)
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        // A failed commit leaves `open` set, so dropping `self` undoes the work.
        trip(&self.failpoints, FailPoint::Commit)?;
        self.undo.clear();
        self.open = false;
        Ok(())
    }

    async fn rollback(mut self) -> Result<(), StoreError> {
        self.undo_all();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UserId;
    use serde_json::json;

    fn new_order() -> NewOrder {
        NewOrder {
            id: OrderId::generate(),
            user_id: UserId::generate(),
            order_number: "ORD-1".to_string(),
            status: OrderStatus::Received,
            total_price: 30_000,
            quantity: 3,
            payment_method: "kakaopay".to_string(),
            shipping_fee: 3_000,
            shipping_address: "Seoul".to_string(),
            ordered_at: None,
            paid_at: None,
            memo: None,
        }
    }

    fn item(order_id: OrderId, product_id: ProductId) -> OrderItem {
        OrderItem {
            id: ItemId::generate(),
            order_id,
            product_id,
            product_name: "Widget".to_string(),
            product_price: 10_000,
            quantity: 1,
            product_options: Some(json!({"size": "M"})),
        }
    }

    #[tokio::test]
    async fn test_insert_order_commits_order_and_items() {
        let store = InMemoryOrderStore::new();
        let order = new_order();
        let items = vec![
            item(order.id, ProductId::generate()),
            item(order.id, ProductId::generate()),
        ];

        let id = store.insert_order(&order, &items).await.unwrap();

        assert_eq!(id, order.id);
        assert_eq!(store.row_counts().await, (1, 2));
        let orders = store.get_all_orders().await.unwrap();
        assert_eq!(orders[0].items, items);
    }

    #[tokio::test]
    async fn test_failed_item_insert_leaves_no_rows() {
        let store = InMemoryOrderStore::new();
        let order = new_order();
        let items = vec![
            item(order.id, ProductId::generate()),
            item(order.id, ProductId::generate()),
        ];
        store.fail_next(FailPoint::InsertItem(1));

        let result = store.insert_order(&order, &items).await;

        assert!(matches!(result, Err(StoreError::Persistence(_))));
        assert_eq!(store.row_counts().await, (0, 0));
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_no_rows() {
        let store = InMemoryOrderStore::new();
        let order = new_order();
        store.fail_next(FailPoint::Commit);

        let result = store.insert_order(&order, &[item(order.id, ProductId::generate())]).await;

        assert!(result.is_err());
        assert_eq!(store.row_counts().await, (0, 0));
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let store = InMemoryOrderStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_order(&new_order()).await.unwrap();
        }
        assert_eq!(store.row_counts().await, (0, 0));
    }

    #[tokio::test]
    async fn test_item_without_order_violates_foreign_key() {
        let store = InMemoryOrderStore::new();
        let mut tx = store.begin().await.unwrap();
        let result = tx.insert_item(&item(OrderId::generate(), ProductId::generate())).await;
        assert!(matches!(result, Err(StoreError::Persistence(msg)) if msg.contains("foreign key")));
    }

    #[tokio::test]
    async fn test_duplicate_order_id_is_rejected() {
        let store = InMemoryOrderStore::new();
        let order = new_order();
        store.insert_order(&order, &[]).await.unwrap();

        let result = store.insert_order(&order, &[]).await;

        assert!(matches!(result, Err(StoreError::Persistence(_))));
        assert_eq!(store.row_counts().await, (1, 0));
    }

    #[tokio::test]
    async fn test_caller_supplied_ordered_at_is_kept() {
        let store = InMemoryOrderStore::new();
        let mut order = new_order();
        let at = "2024-05-01T09:30:00Z".parse::<DateTime<Utc>>().unwrap();
        order.ordered_at = Some(at);

        store.insert_order(&order, &[]).await.unwrap();

        assert_eq!(store.list_orders().await.unwrap()[0].ordered_at, at);
    }

    #[tokio::test]
    async fn test_update_status_of_missing_order_is_not_found() {
        let store = InMemoryOrderStore::new();
        let missing = OrderId::generate();
        let result = store.update_status(missing, OrderStatus::Paid).await;
        assert_eq!(result, Err(StoreError::NotFound(missing)));
    }

    #[tokio::test]
    async fn test_paid_at_is_set_once() {
        let store = InMemoryOrderStore::new();
        let order = new_order();
        store.insert_order(&order, &[]).await.unwrap();

        store.update_status(order.id, OrderStatus::Paid).await.unwrap();
        let first = store.list_orders().await.unwrap()[0].paid_at;
        assert!(first.is_some());

        let mut tx = store.begin().await.unwrap();
        tx.update_status(order.id, OrderStatus::Paid, Utc::now() + chrono::Duration::hours(1))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.list_orders().await.unwrap()[0].paid_at, first);
    }

    #[tokio::test]
    async fn test_rollback_restores_previous_status() {
        let store = InMemoryOrderStore::new();
        let order = new_order();
        store.insert_order(&order, &[]).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.update_status(order.id, OrderStatus::Paid, Utc::now()).await.unwrap(), 1);
        tx.rollback().await.unwrap();

        let stored = &store.list_orders().await.unwrap()[0];
        assert_eq!(stored.status, OrderStatus::Received);
        assert_eq!(stored.paid_at, None);
    }

    #[tokio::test]
    async fn test_affected_product_ids_are_distinct() {
        let store = InMemoryOrderStore::new();
        let order = new_order();
        let (a, b) = (ProductId::generate(), ProductId::generate());
        store
            .insert_order(&order, &[item(order.id, a), item(order.id, b), item(order.id, a)])
            .await
            .unwrap();

        assert_eq!(store.get_affected_product_ids(order.id).await.unwrap(), vec![a, b]);
    }

    #[tokio::test]
    async fn test_item_read_failure_aborts_listing() {
        let store = InMemoryOrderStore::new();
        store.insert_order(&new_order(), &[]).await.unwrap();
        store.insert_order(&new_order(), &[]).await.unwrap();
        store.fail_next(FailPoint::ListItems);

        assert!(store.get_all_orders().await.is_err());
        assert_eq!(store.get_all_orders().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_outbox_delivery_bookkeeping() {
        let store = InMemoryOrderStore::new();
        let order = new_order();
        store.insert_order(&order, &[]).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let event = NewOutboxEvent {
            order_id: order.id,
            key: "inventory-discount".to_string(),
            payload: b"{}".to_vec(),
        };
        let first = tx.enqueue_event(&event).await.unwrap();
        let second = tx.enqueue_event(&event).await.unwrap();
        tx.commit().await.unwrap();
        assert!(first < second);

        store.record_event_failure(first, "broker down").await.unwrap();
        let pending = store.pending_events(10).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].attempts, 1);
        assert_eq!(pending[0].last_error.as_deref(), Some("broker down"));

        store.mark_event_delivered(first).await.unwrap();
        let pending = store.pending_events(10).await.unwrap();
        assert_eq!(pending.iter().map(|e| e.id).collect::<Vec<_>>(), vec![second]);
    }

    #[tokio::test]
    async fn test_prune_removes_only_delivered_events() {
        let store = InMemoryOrderStore::new();
        let mut tx = store.begin().await.unwrap();
        let event = NewOutboxEvent {
            order_id: OrderId::generate(),
            key: "inventory-discount".to_string(),
            payload: b"{}".to_vec(),
        };
        let delivered = tx.enqueue_event(&event).await.unwrap();
        let pending = tx.enqueue_event(&event).await.unwrap();
        tx.commit().await.unwrap();
        store.mark_event_delivered(delivered).await.unwrap();

        assert_eq!(store.prune_delivered_events().await.unwrap(), 1);
        assert_eq!(store.outbox_len().await, 1);
        assert_eq!(store.pending_events(10).await.unwrap()[0].id, pending);
        assert_eq!(store.prune_delivered_events().await.unwrap(), 0);
    }
}
