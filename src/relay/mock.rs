//! # Mock Relay
//!
//! Test doubles for the message bus.
//!
//! [`MockProducer`] records every publish and answers from a queue of
//! expectations. [`ScriptedConsumer`] replays a fixed sequence of messages and
//! errors.

use crate::relay::{Consumer, Message, Producer, RelayError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

// =============================================================================
// PRODUCER
// =============================================================================

struct PublishExpectation {
    key: String,
    response: Result<(), RelayError>,
}

/// A producer with expectation tracking.
///
/// Publishes beyond the queued expectations succeed. Clones share state, so a
/// test can hand one clone to the code under test and inspect the other.
///
/// # Example
/// ```ignore
/// let producer = MockProducer::new();
/// producer.expect_publish("inventory-discount").return_err(RelayError::Transport("down".into()));
/// producer.expect_publish("inventory-discount").return_ok();
///
/// // exercise code...
/// producer.verify();
/// ```
#[derive(Clone, Default)]
pub struct MockProducer {
    expectations: Arc<Mutex<VecDeque<PublishExpectation>>>,
    attempts: Arc<Mutex<Vec<Message>>>,
    published: Arc<Mutex<Vec<Message>>>,
}

impl MockProducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expects the next publish to use `key`.
    pub fn expect_publish(&self, key: impl Into<String>) -> PublishExpectationBuilder {
        PublishExpectationBuilder {
            key: key.into(),
            expectations: self.expectations.clone(),
        }
    }

    /// Messages that were accepted.
    pub fn published(&self) -> Vec<Message> {
        self.published.lock().clone()
    }

    /// Every publish call, accepted or not.
    pub fn attempts(&self) -> Vec<Message> {
        self.attempts.lock().clone()
    }

    /// Verifies that all expectations were met.
    pub fn verify(&self) {
        let remaining = self.expectations.lock().len();
        if remaining > 0 {
            panic!("Not all publish expectations were met. {} remaining", remaining);
        }
    }
}

pub struct PublishExpectationBuilder {
    key: String,
    expectations: Arc<Mutex<VecDeque<PublishExpectation>>>,
}

impl PublishExpectationBuilder {
    pub fn return_ok(self) {
        self.expectations.lock().push_back(PublishExpectation {
            key: self.key,
            response: Ok(()),
        });
    }

    pub fn return_err(self, error: RelayError) {
        self.expectations.lock().push_back(PublishExpectation {
            key: self.key,
            response: Err(error),
        });
    }
}

#[async_trait]
impl Producer for MockProducer {
    async fn publish(&self, key: &str, value: &[u8]) -> Result<(), RelayError> {
        let message = Message::new(key, value);
        self.attempts.lock().push(message.clone());

        let expectation = self.expectations.lock().pop_front();
        let response = match expectation {
            Some(expected) => {
                if expected.key != key {
                    panic!("Unexpected publish: expected key {:?}, got {:?}", expected.key, key);
                }
                expected.response
            }
            None => Ok(()),
        };

        if response.is_ok() {
            self.published.lock().push(message);
        }
        response
    }
}

// =============================================================================
// CONSUMER
// =============================================================================

/// Replays a fixed script of consume results.
///
/// Once the script runs out the consumer either blocks until cancelled or, if
/// built with [`then_close`](Self::then_close), reports [`RelayError::Closed`].
#[derive(Default)]
pub struct ScriptedConsumer {
    script: VecDeque<Result<Message, RelayError>>,
    close_when_done: bool,
}

impl ScriptedConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.script.push_back(Ok(Message::new(key, value)));
        self
    }

    pub fn error(mut self, error: RelayError) -> Self {
        self.script.push_back(Err(error));
        self
    }

    pub fn then_close(mut self) -> Self {
        self.close_when_done = true;
        self
    }
}

#[async_trait]
impl Consumer for ScriptedConsumer {
    async fn consume(&mut self, cancel: &CancellationToken) -> Result<Message, RelayError> {
        if cancel.is_cancelled() {
            return Err(RelayError::Cancelled);
        }
        if let Some(next) = self.script.pop_front() {
            return next;
        }
        if self.close_when_done {
            return Err(RelayError::Closed);
        }
        cancel.cancelled().await;
        Err(RelayError::Cancelled)
    }
}
