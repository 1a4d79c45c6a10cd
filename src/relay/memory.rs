//! In-process topic over a bounded `mpsc` channel.
//!
//! A single FIFO carries every key, which trivially preserves per-key order.

use crate::relay::{Consumer, Message, Producer, RelayError};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Creates a topic holding at most `capacity` undelivered messages.
///
/// Publishers wait when the topic is full. Once every producer is dropped the
/// consumer drains what is left and then reports [`RelayError::Closed`].
pub fn topic(capacity: usize) -> (InMemoryProducer, InMemoryConsumer) {
    let (sender, receiver) = mpsc::channel(capacity);
    (InMemoryProducer { sender }, InMemoryConsumer { receiver })
}

#[derive(Clone)]
pub struct InMemoryProducer {
    sender: mpsc::Sender<Message>,
}

#[async_trait]
impl Producer for InMemoryProducer {
    async fn publish(&self, key: &str, value: &[u8]) -> Result<(), RelayError> {
        self.sender
            .send(Message::new(key, value))
            .await
            .map_err(|_| RelayError::Closed)
    }
}

pub struct InMemoryConsumer {
    receiver: mpsc::Receiver<Message>,
}

impl InMemoryConsumer {
    /// Returns the next message if one is already queued.
    pub fn try_next(&mut self) -> Option<Message> {
        self.receiver.try_recv().ok()
    }
}

#[async_trait]
impl Consumer for InMemoryConsumer {
    async fn consume(&mut self, cancel: &CancellationToken) -> Result<Message, RelayError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RelayError::Cancelled),
            message = self.receiver.recv() => message.ok_or(RelayError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_messages_arrive_in_publish_order() {
        let (producer, mut consumer) = topic(8);
        let cancel = CancellationToken::new();

        producer.publish("a", b"1").await.unwrap();
        producer.publish("b", b"2").await.unwrap();
        producer.publish("a", b"3").await.unwrap();

        let mut received = Vec::new();
        for _ in 0..3 {
            received.push(consumer.consume(&cancel).await.unwrap());
        }
        assert_eq!(
            received,
            vec![Message::new("a", "1"), Message::new("b", "2"), Message::new("a", "3")]
        );
    }

    #[tokio::test]
    async fn test_cancellation_unblocks_consume() {
        let (_producer, mut consumer) = topic(8);
        let cancel = CancellationToken::new();

        let waiter = tokio::spawn({
            let cancel = cancel.clone();
            async move { consumer.consume(&cancel).await }
        });
        cancel.cancel();

        assert_eq!(waiter.await.unwrap(), Err(RelayError::Cancelled));
    }

    #[tokio::test]
    async fn test_dropping_producers_closes_topic() {
        let (producer, mut consumer) = topic(8);
        producer.publish("a", b"last").await.unwrap();
        drop(producer);

        let cancel = CancellationToken::new();
        assert_eq!(consumer.consume(&cancel).await, Ok(Message::new("a", "last")));
        assert_eq!(consumer.consume(&cancel).await, Err(RelayError::Closed));
    }

    #[tokio::test]
    async fn test_publish_after_consumer_dropped_fails() {
        let (producer, consumer) = topic(8);
        drop(consumer);
        assert_eq!(producer.publish("a", b"x").await, Err(RelayError::Closed));
    }
}
