//! # Order Controller
//!
//! Business rules between the RPC surface, the event path and the store.
//!
//! - [`insert_order`](OrderController::insert_order) validates a request and
//!   persists the order with its items atomically.
//! - [`update_order_status`](OrderController::update_order_status) walks the
//!   status lifecycle and enqueues the derived `inventory-discount` event in
//!   the same transaction.
//! - [`get_all_orders`](OrderController::get_all_orders) lists every order in
//!   wire format.

mod convert;
mod error;

pub use error::*;

use crate::model::{
    InventoryDiscount, ItemId, NewOrder, OrderId, OrderItem, OrderStatus, ProductId, UserId,
    INVENTORY_DISCOUNT_KEY,
};
use crate::outbox::{NewOutboxEvent, OutboxRelay};
use crate::relay::Producer;
use crate::rpc::{
    GetAllOrdersRequest, GetAllOrdersResponse, InsertOrderRequest, InsertOrderResponse,
    OrderItemInput, OrderRpc,
};
use crate::store::{commit_or_rollback, OrderStore, StoreTransaction};
use async_trait::async_trait;
use chrono::Utc;
use convert::{
    order_view, parse_id, parse_optional_text, parse_optional_time, parse_product_options,
};
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// What to do with an item whose `product_options` is not a JSON object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ItemOptionsPolicy {
    /// Reject the whole request.
    #[default]
    Strict,
    /// Drop the item with a warning and keep the rest.
    Lenient,
}

impl ItemOptionsPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemOptionsPolicy::Strict => "strict",
            ItemOptionsPolicy::Lenient => "lenient",
        }
    }
}

impl Display for ItemOptionsPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemOptionsPolicy {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(ItemOptionsPolicy::Strict),
            "lenient" => Ok(ItemOptionsPolicy::Lenient),
            other => Err(OrderError::Validation(format!("unknown item options policy: {other}"))),
        }
    }
}

/// Result of a status update inside its transaction.
enum Transition {
    Unchanged,
    Applied { from: OrderStatus, event_id: i64 },
}

pub struct OrderController<S: OrderStore, P: Producer> {
    store: Arc<S>,
    outbox: Arc<OutboxRelay<S, P>>,
    options_policy: ItemOptionsPolicy,
}

impl<S: OrderStore, P: Producer> OrderController<S, P> {
    pub fn new(
        store: Arc<S>,
        outbox: Arc<OutboxRelay<S, P>>,
        options_policy: ItemOptionsPolicy,
    ) -> Self {
        Self {
            store,
            outbox,
            options_policy,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn outbox(&self) -> &Arc<OutboxRelay<S, P>> {
        &self.outbox
    }

    /// Validates and persists a new order.
    ///
    /// The order always starts as `received` with a freshly generated id,
    /// whatever status the caller sent.
    #[instrument(
        skip(self, request),
        fields(order_number = %request.order_number, items = request.items.len())
    )]
    pub async fn insert_order(
        &self,
        request: InsertOrderRequest,
    ) -> Result<InsertOrderResponse, OrderError> {
        debug!(?request, "insert_order called");

        let user_id: UserId = parse_id("user_id", &request.user_id)?;
        if !request.status.is_empty() && request.status != OrderStatus::INITIAL.as_str() {
            debug!(requested = %request.status, "Ignoring caller-supplied status");
        }

        let order_id = OrderId::generate();
        let items = self.build_items(order_id, &request.items)?;
        let order = NewOrder {
            id: order_id,
            user_id,
            order_number: request.order_number,
            status: OrderStatus::INITIAL,
            total_price: request.total_price,
            quantity: request.quantity,
            payment_method: request.payment_method,
            shipping_fee: request.shipping_fee,
            shipping_address: request.shipping_address,
            ordered_at: None,
            paid_at: parse_optional_time("paid_at", &request.paid_at),
            memo: parse_optional_text(&request.memo),
        };

        self.store.insert_order(&order, &items).await?;
        info!(%order_id, items = items.len(), "Order created");

        Ok(InsertOrderResponse {
            id: order_id.to_string(),
        })
    }

    fn build_items(
        &self,
        order_id: OrderId,
        inputs: &[OrderItemInput],
    ) -> Result<Vec<OrderItem>, OrderError> {
        let mut items = Vec::with_capacity(inputs.len());
        for (index, input) in inputs.iter().enumerate() {
            let product_id: ProductId = parse_id("product_id", &input.product_id)?;
            let product_options = match parse_product_options(&input.product_options) {
                Ok(options) => options,
                Err(reason) => match self.options_policy {
                    ItemOptionsPolicy::Strict => {
                        return Err(OrderError::Validation(format!(
                            "item {index} ({product_id}) has invalid product_options: {reason}"
                        )));
                    }
                    ItemOptionsPolicy::Lenient => {
                        warn!(
                            index,
                            %product_id,
                            %reason,
                            "Dropping item with invalid product_options"
                        );
                        continue;
                    }
                },
            };
            items.push(OrderItem {
                id: ItemId::generate(),
                order_id,
                product_id,
                product_name: input.product_name.clone(),
                product_price: input.product_price,
                quantity: input.quantity,
                product_options,
            });
        }
        Ok(items)
    }

    /// Moves an order to `status` and emits `inventory-discount`.
    ///
    /// The status write and the outbox row commit together. Publishing
    /// happens afterwards; a publish failure is logged and left to the outbox
    /// relay, it never fails this call. Requesting the status the order
    /// already has changes nothing and emits nothing.
    #[instrument(skip(self))]
    pub async fn update_order_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<(), OrderError> {
        let mut tx = self.store.begin().await?;
        let result = apply_transition(&mut tx, order_id, status).await;

        match commit_or_rollback(tx, result).await? {
            Transition::Unchanged => {
                info!(%order_id, %status, "Order already in requested status");
            }
            Transition::Applied { from, event_id } => {
                info!(%order_id, %from, to = %status, event_id, "Order status updated");
                match self.outbox.drain().await {
                    Ok(report) if report.stalled => {
                        warn!(%order_id, "Inventory event left pending in outbox");
                    }
                    Ok(_) => {}
                    Err(e) => warn!(%order_id, error = %e, "Outbox drain failed, relay will retry"),
                }
            }
        }
        Ok(())
    }

    /// Every order with its items, oldest first.
    #[instrument(skip(self, _request))]
    pub async fn get_all_orders(
        &self,
        _request: GetAllOrdersRequest,
    ) -> Result<GetAllOrdersResponse, OrderError> {
        let orders = self.store.get_all_orders().await?;
        debug!(count = orders.len(), "Orders listed");
        Ok(GetAllOrdersResponse {
            orders: orders.into_iter().map(order_view).collect(),
        })
    }
}

async fn apply_transition<T: StoreTransaction>(
    tx: &mut T,
    order_id: OrderId,
    target: OrderStatus,
) -> Result<Transition, OrderError> {
    let current = tx
        .order_status(order_id)
        .await?
        .ok_or(OrderError::NotFound(order_id))?;

    if current == target {
        return Ok(Transition::Unchanged);
    }
    if !current.can_transition_to(target) {
        return Err(OrderError::InvalidTransition {
            order_id,
            from: current,
            to: target,
        });
    }

    let product_ids = tx.affected_product_ids(order_id).await?;
    if tx.update_status(order_id, target, Utc::now()).await? == 0 {
        return Err(OrderError::NotFound(order_id));
    }

    let payload = InventoryDiscount { order_id, product_ids }.to_json()?;
    let event_id = tx
        .enqueue_event(&NewOutboxEvent {
            order_id,
            key: INVENTORY_DISCOUNT_KEY.to_string(),
            payload,
        })
        .await?;

    Ok(Transition::Applied { from: current, event_id })
}

#[async_trait]
impl<S: OrderStore, P: Producer> OrderRpc for OrderController<S, P> {
    async fn insert_order(
        &self,
        request: InsertOrderRequest,
    ) -> Result<InsertOrderResponse, OrderError> {
        OrderController::insert_order(self, request).await
    }

    async fn get_all_orders(
        &self,
        request: GetAllOrdersRequest,
    ) -> Result<GetAllOrdersResponse, OrderError> {
        OrderController::get_all_orders(self, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::mock::MockProducer;
    use crate::store::{FailPoint, InMemoryOrderStore};

    const USER: &str = "11111111-1111-1111-1111-111111111111";

    type TestController = OrderController<InMemoryOrderStore, MockProducer>;

    fn controller(policy: ItemOptionsPolicy) -> (TestController, MockProducer) {
        let store = Arc::new(InMemoryOrderStore::new());
        let producer = MockProducer::new();
        let outbox = Arc::new(OutboxRelay::new(store.clone(), producer.clone(), 16));
        (OrderController::new(store, outbox, policy), producer)
    }

    async fn insert(controller: &TestController, items: Vec<OrderItemInput>) -> OrderId {
        let response = controller.insert_order(request(items)).await.unwrap();
        response.id.parse().unwrap()
    }

    fn item(options: &str) -> OrderItemInput {
        OrderItemInput {
            product_id: ProductId::generate().to_string(),
            product_name: "mug".to_string(),
            product_price: 10_000,
            quantity: 1,
            product_options: options.to_string(),
        }
    }

    fn request(items: Vec<OrderItemInput>) -> InsertOrderRequest {
        InsertOrderRequest {
            user_id: USER.to_string(),
            order_number: "ORD-1".to_string(),
            status: "shipped".to_string(),
            items,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_insert_forces_received_and_fresh_ids() {
        let (controller, _) = controller(ItemOptionsPolicy::Strict);

        let first = controller.insert_order(request(vec![item(""), item("")])).await.unwrap();
        let second = controller.insert_order(request(vec![])).await.unwrap();
        assert_ne!(first.id, second.id);

        let listing = controller.get_all_orders(GetAllOrdersRequest::default()).await.unwrap();
        assert_eq!(listing.orders.len(), 2);
        let stored = listing.orders.iter().find(|o| o.id == first.id).unwrap();
        assert_eq!(stored.status, "received");
        assert_eq!(stored.items.len(), 2);
        assert_ne!(stored.items[0].id, stored.items[1].id);
    }

    #[tokio::test]
    async fn test_insert_rejects_malformed_user_id() {
        let (controller, _) = controller(ItemOptionsPolicy::Strict);
        let mut bad = request(vec![]);
        bad.user_id = "nobody".to_string();

        let err = controller.insert_order(bad).await.unwrap_err();

        assert!(matches!(err, OrderError::Validation(_)));
        assert_eq!(controller.store().row_counts().await, (0, 0));
    }

    #[tokio::test]
    async fn test_strict_policy_rejects_whole_request() {
        let (controller, _) = controller(ItemOptionsPolicy::Strict);

        let err = controller
            .insert_order(request(vec![item(r#"{"size":"L"}"#), item("{broken")]))
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::Validation(msg) if msg.contains("item 1")));
        assert_eq!(controller.store().row_counts().await, (0, 0));
    }

    #[tokio::test]
    async fn test_lenient_policy_drops_only_bad_item() {
        let (controller, _) = controller(ItemOptionsPolicy::Lenient);

        controller
            .insert_order(request(vec![item(r#"{"size":"L"}"#), item("{broken"), item("")]))
            .await
            .unwrap();

        assert_eq!(controller.store().row_counts().await, (1, 2));
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_as_persistence() {
        let (controller, _) = controller(ItemOptionsPolicy::Strict);
        controller.store().fail_next(FailPoint::InsertItem(1));

        let err = controller
            .insert_order(request(vec![item(""), item("")]))
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::Persistence(_)));
        assert_eq!(controller.store().row_counts().await, (0, 0));
    }

    #[tokio::test]
    async fn test_update_to_paid_publishes_inventory_discount() {
        let (controller, producer) = controller(ItemOptionsPolicy::Strict);
        let response = controller.insert_order(request(vec![item(""), item("")])).await.unwrap();
        let order_id: OrderId = response.id.parse().unwrap();

        controller.update_order_status(order_id, OrderStatus::Paid).await.unwrap();

        let published = producer.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].key, INVENTORY_DISCOUNT_KEY);
        let payload = InventoryDiscount::from_json(&published[0].value).unwrap();
        assert_eq!(payload.order_id, order_id);
        assert_eq!(payload.product_ids.len(), 2);

        let listing = controller.get_all_orders(GetAllOrdersRequest::default()).await.unwrap();
        assert_eq!(listing.orders[0].status, "paid");
        assert!(!listing.orders[0].paid_at.is_empty());
    }

    #[tokio::test]
    async fn test_repeated_status_is_a_no_op() {
        let (controller, producer) = controller(ItemOptionsPolicy::Strict);
        let order_id = insert(&controller, vec![item("")]).await;

        controller.update_order_status(order_id, OrderStatus::Paid).await.unwrap();
        controller.update_order_status(order_id, OrderStatus::Paid).await.unwrap();

        assert_eq!(producer.attempts().len(), 1);
    }

    #[tokio::test]
    async fn test_illegal_transition_is_rejected() {
        let (controller, producer) = controller(ItemOptionsPolicy::Strict);
        let order_id = insert(&controller, vec![]).await;

        let err = controller
            .update_order_status(order_id, OrderStatus::Shipped)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            OrderError::InvalidTransition {
                order_id,
                from: OrderStatus::Received,
                to: OrderStatus::Shipped,
            }
        );
        assert!(producer.attempts().is_empty());
    }

    #[tokio::test]
    async fn test_update_unknown_order_is_not_found() {
        let (controller, _) = controller(ItemOptionsPolicy::Strict);
        let missing = OrderId::generate();

        let err = controller
            .update_order_status(missing, OrderStatus::Paid)
            .await
            .unwrap_err();

        assert_eq!(err, OrderError::NotFound(missing));
    }

    #[tokio::test]
    async fn test_failed_enqueue_rolls_back_status() {
        let (controller, producer) = controller(ItemOptionsPolicy::Strict);
        let order_id = insert(&controller, vec![]).await;
        controller.store().fail_next(FailPoint::EnqueueEvent);

        let err = controller
            .update_order_status(order_id, OrderStatus::Paid)
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::Persistence(_)));
        let listing = controller.get_all_orders(GetAllOrdersRequest::default()).await.unwrap();
        assert_eq!(listing.orders[0].status, "received");
        assert!(producer.attempts().is_empty());
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("Lenient".parse::<ItemOptionsPolicy>(), Ok(ItemOptionsPolicy::Lenient));
        assert_eq!(" strict ".parse::<ItemOptionsPolicy>(), Ok(ItemOptionsPolicy::Strict));
        assert!("loose".parse::<ItemOptionsPolicy>().is_err());
    }
}
