//! Message keys and payloads exchanged with the message bus.

use crate::model::{OrderId, ProductId};
use serde::{Deserialize, Serialize};

/// Inbound key emitted by the payment service once a KakaoPay payment is
/// approved. The value is the order id as plain text.
pub const KAKAO_APPROVE_KEY: &str = "kakao-approve";

/// Outbound key consumed by the inventory service.
pub const INVENTORY_DISCOUNT_KEY: &str = "inventory-discount";

/// Payload published under [`INVENTORY_DISCOUNT_KEY`] after an order's status
/// changes: the products whose stock the inventory service should adjust.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryDiscount {
    pub order_id: OrderId,
    pub product_ids: Vec<ProductId>,
}

impl InventoryDiscount {
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
