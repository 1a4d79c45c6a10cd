//! Error types for the order controller.

use crate::model::{OrderId, OrderStatus};
use crate::store::StoreError;
use thiserror::Error;

/// Errors returned by [`OrderController`](crate::controller::OrderController)
/// operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OrderError {
    /// Malformed input, rejected before anything is persisted.
    #[error("Order validation error: {0}")]
    Validation(String),

    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// The lifecycle has no edge from `from` to `to`.
    #[error("Invalid status transition for order {order_id}: {from} -> {to}")]
    InvalidTransition {
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("Order database error: {0}")]
    Persistence(String),

    #[error("Order event encoding error: {0}")]
    Encoding(String),
}

impl From<StoreError> for OrderError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => OrderError::NotFound(id),
            StoreError::Persistence(msg) => OrderError::Persistence(msg),
        }
    }
}

impl From<serde_json::Error> for OrderError {
    fn from(e: serde_json::Error) -> Self {
        OrderError::Encoding(e.to_string())
    }
}
