//! Error types for message handlers.

use crate::controller::OrderError;
use thiserror::Error;

/// Failure to handle one consumed message. Logged by the dispatcher and never
/// fatal to the loop.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DispatchError {
    /// The message value could not be decoded.
    #[error("Malformed message payload: {0}")]
    Decode(String),

    #[error(transparent)]
    Order(#[from] OrderError),
}
