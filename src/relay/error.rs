//! Error types for the message bus.

use thiserror::Error;

/// Errors surfaced by [`Producer`](crate::relay::Producer) and
/// [`Consumer`](crate::relay::Consumer) implementations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayError {
    /// The cancellation token fired while waiting for a message.
    #[error("Consume cancelled")]
    Cancelled,

    /// The other side of the bus is gone; nothing more will arrive.
    #[error("Message bus closed")]
    Closed,

    /// Any broker or network failure.
    #[error("Message bus transport error: {0}")]
    Transport(String),
}

impl RelayError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RelayError::Cancelled)
    }
}
