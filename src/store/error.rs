//! Error types for the order store.

use crate::model::OrderId;
use thiserror::Error;

/// Errors that can occur while reading or writing order rows.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    /// A status update matched no row.
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// Any other database failure. The enclosing transaction is rolled back.
    #[error("Order database error: {0}")]
    Persistence(String),
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Persistence(e.to_string())
    }
}
