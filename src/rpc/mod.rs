//! # RPC Contract
//!
//! Request and response types for the order service's RPC surface, and the
//! [`OrderRpc`] trait a transport adapter (gRPC, HTTP, ...) serves.
//!
//! Inputs mirror the wire format: identifiers and timestamps arrive as text
//! and are validated by the controller. Outputs render every timestamp as
//! RFC 3339 with second precision and every absent optional field as `""`.

use crate::controller::OrderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsertOrderRequest {
    pub user_id: String,
    pub order_number: String,
    /// Ignored: new orders always start as `received`.
    pub status: String,
    pub total_price: i64,
    pub quantity: i32,
    pub payment_method: String,
    pub shipping_fee: i64,
    pub shipping_address: String,
    /// RFC 3339; empty or unparseable means "not paid".
    pub paid_at: String,
    pub memo: String,
    pub items: Vec<OrderItemInput>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderItemInput {
    pub product_id: String,
    pub product_name: String,
    pub product_price: i64,
    pub quantity: i32,
    /// A JSON object as text, or empty.
    pub product_options: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertOrderResponse {
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetAllOrdersRequest {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetAllOrdersResponse {
    pub orders: Vec<OrderView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderView {
    pub id: String,
    pub user_id: String,
    pub order_number: String,
    pub status: String,
    pub total_price: i64,
    pub quantity: i32,
    pub payment_method: String,
    pub shipping_fee: i64,
    pub shipping_address: String,
    pub ordered_at: String,
    pub paid_at: String,
    pub memo: String,
    pub items: Vec<OrderItemView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemView {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    pub product_name: String,
    pub product_price: i64,
    pub quantity: i32,
    /// Compact JSON, or `""` when the item has no options.
    pub product_options: String,
}

/// The synchronous operations exposed to clients.
///
/// Object safe, so a transport can hold an `Arc<dyn OrderRpc>` without
/// knowing which store or bus backs it.
#[async_trait]
pub trait OrderRpc: Send + Sync {
    async fn insert_order(
        &self,
        request: InsertOrderRequest,
    ) -> Result<InsertOrderResponse, OrderError>;

    async fn get_all_orders(
        &self,
        request: GetAllOrdersRequest,
    ) -> Result<GetAllOrdersResponse, OrderError>;
}
