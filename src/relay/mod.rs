//! # Event Relay
//!
//! The publish/consume contract the service uses to talk to the message bus.
//! The bus is treated as a durable, partitioned log addressed by key: messages
//! with the same key are delivered in the order they were published, messages
//! with different keys carry no ordering guarantee.
//!
//! Concrete broker clients plug in by implementing [`Producer`] and
//! [`Consumer`]. [`memory`] ships an in-process topic and [`mock`] the test
//! doubles.

mod error;
pub mod memory;
pub mod mock;

pub use error::*;

use async_trait::async_trait;
use std::str::Utf8Error;
use tokio_util::sync::CancellationToken;

/// A keyed message as it travels over the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub key: String,
    pub value: Vec<u8>,
}

impl Message {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn value_str(&self) -> Result<&str, Utf8Error> {
        std::str::from_utf8(&self.value)
    }
}

/// Publishing half of the bus.
#[async_trait]
pub trait Producer: Send + Sync + 'static {
    /// Sends one message. `key` selects the partition, `value` is opaque.
    ///
    /// Failures are returned to the caller; implementations do not retry.
    async fn publish(&self, key: &str, value: &[u8]) -> Result<(), RelayError>;
}

/// Consuming half of the bus.
#[async_trait]
pub trait Consumer: Send + 'static {
    /// Waits for the next message.
    ///
    /// Must return [`RelayError::Cancelled`] promptly once `cancel` fires, so
    /// callers can tell a shutdown apart from a transport failure.
    async fn consume(&mut self, cancel: &CancellationToken) -> Result<Message, RelayError>;
}
