//! Orders and their line items.

use crate::model::{ItemId, OrderId, OrderStatus, ProductId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored order together with its line items.
///
/// `total_price`, `quantity`, `payment_method`, `shipping_fee` and
/// `shipping_address` are carried for display and audit; nothing in the
/// service computes with them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub order_number: String,
    pub status: OrderStatus,
    pub total_price: i64,
    pub quantity: i32,
    pub payment_method: String,
    pub shipping_fee: i64,
    pub shipping_address: String,
    pub ordered_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub memo: Option<String>,
    pub items: Vec<OrderItem>,
}

/// A fully-formed order row ready to be inserted.
///
/// When `ordered_at` is `None` the store stamps the row with its own clock.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub id: OrderId,
    pub user_id: UserId,
    pub order_number: String,
    pub status: OrderStatus,
    pub total_price: i64,
    pub quantity: i32,
    pub payment_method: String,
    pub shipping_fee: i64,
    pub shipping_address: String,
    pub ordered_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub memo: Option<String>,
}

impl NewOrder {
    /// Builds the stored representation once the store has assigned
    /// `ordered_at`.
    pub fn into_order(self, ordered_at: DateTime<Utc>, items: Vec<OrderItem>) -> Order {
        Order {
            id: self.id,
            user_id: self.user_id,
            order_number: self.order_number,
            status: self.status,
            total_price: self.total_price,
            quantity: self.quantity,
            payment_method: self.payment_method,
            shipping_fee: self.shipping_fee,
            shipping_address: self.shipping_address,
            ordered_at,
            paid_at: self.paid_at,
            memo: self.memo,
            items,
        }
    }
}

/// A line item. Owned by exactly one order and never outlives it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: ItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub product_name: String,
    pub product_price: i64,
    pub quantity: i32,
    /// Free-form options (size, colour, ...). Always a JSON object when set.
    pub product_options: Option<serde_json::Value>,
}
