//! In-process topic bus
//!
//! Backs the relay's fan-out and doubles as a loopback channel for tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use super::channel::{Channel, ChannelError, Envelope, Subscription};

/// Buffered messages per topic before slow subscribers start lagging
pub const TOPIC_CAPACITY: usize = 256;
/// Buffered messages per subscription
pub const SUBSCRIPTION_BUFFER: usize = 256;

/// Topic registry shared by every endpoint
#[derive(Clone, Default)]
pub struct LocalBus {
    topics: Arc<DashMap<String, broadcast::Sender<Envelope>>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fan an envelope out to every subscriber of its topic.
    /// Returns the number of receivers reached.
    pub fn publish(&self, envelope: Envelope) -> usize {
        match self.topics.get(&envelope.topic) {
            Some(tx) => tx.send(envelope).unwrap_or(0),
            None => 0,
        }
    }

    /// Raw receiver on a topic, creating the topic if needed
    pub fn receiver(&self, topic: &str) -> broadcast::Receiver<Envelope> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe()
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .get(topic)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// Forget topics nobody listens to anymore
    pub fn prune(&self) {
        self.topics.retain(|_, tx| tx.receiver_count() > 0);
    }

    /// New endpoint with its own subscription bookkeeping
    pub fn endpoint(&self) -> BusEndpoint {
        BusEndpoint {
            id: Uuid::new_v4(),
            bus: self.clone(),
            forwards: Mutex::new(HashMap::new()),
        }
    }
}

/// One participant on a [`LocalBus`]. Dropping it ends all of its
/// subscriptions.
pub struct BusEndpoint {
    id: Uuid,
    bus: LocalBus,
    forwards: Mutex<HashMap<String, Vec<oneshot::Sender<()>>>>,
}

impl BusEndpoint {
    /// Topics this endpoint is subscribed to
    pub fn topics(&self) -> Vec<String> {
        self.forwards.lock().keys().cloned().collect()
    }

    /// Cancel every subscription
    pub fn close(&self) {
        let forwards: Vec<_> = self.forwards.lock().drain().collect();
        for (_, cancels) in forwards {
            for cancel in cancels {
                let _ = cancel.send(());
            }
        }
        self.bus.prune();
    }
}

#[async_trait]
impl Channel for BusEndpoint {
    async fn publish(&self, envelope: Envelope) -> Result<(), ChannelError> {
        let reached = self.bus.publish(envelope);
        debug!(endpoint = %self.id, reached, "Published to bus");
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, ChannelError> {
        let source = self.bus.receiver(topic);
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let (cancel_tx, cancel_rx) = oneshot::channel();

        self.forwards
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push(cancel_tx);

        spawn_forward(self.id, topic.to_string(), source, tx, cancel_rx);

        Ok(Subscription {
            topic: topic.to_string(),
            rx,
        })
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), ChannelError> {
        let cancels = self.forwards.lock().remove(topic).unwrap_or_default();
        for cancel in cancels {
            let _ = cancel.send(());
        }
        self.bus.prune();
        Ok(())
    }
}

/// Copy topic traffic into a subscription until cancelled or the
/// subscriber goes away
fn spawn_forward(
    endpoint: Uuid,
    topic: String,
    mut source: broadcast::Receiver<Envelope>,
    tx: mpsc::Sender<Envelope>,
    mut cancel: oneshot::Receiver<()>,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = &mut cancel => break,
                _ = tx.closed() => break,
                msg = source.recv() => match msg {
                    Ok(envelope) => {
                        if tx.send(envelope).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        // Keep going, peers tolerate gaps
                        warn!(
                            endpoint = %endpoint,
                            topic = %topic,
                            lagged_count = n,
                            "Subscriber lagged, skipping {} messages", n
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        debug!(endpoint = %endpoint, topic = %topic, "Subscription forward ended");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn fans_out_to_every_subscriber_including_sender() {
        let bus = LocalBus::new();
        let a = bus.endpoint();
        let b = bus.endpoint();
        let mut sub_a = a.subscribe("match:1").await.unwrap();
        let mut sub_b = b.subscribe("match:1").await.unwrap();

        a.publish(Envelope::new("match:1", "ping", json!({ "n": 1 })))
            .await
            .unwrap();

        assert_eq!(sub_a.recv().await.unwrap().event, "ping");
        assert_eq!(sub_b.recv().await.unwrap().payload, json!({ "n": 1 }));
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let bus = LocalBus::new();
        let a = bus.endpoint();
        let mut one = a.subscribe("match:1").await.unwrap();
        let _two = a.subscribe("match:2").await.unwrap();

        a.publish(Envelope::new("match:2", "ping", json!(null))).await.unwrap();
        a.publish(Envelope::new("match:1", "pong", json!(null))).await.unwrap();

        assert_eq!(one.recv().await.unwrap().event, "pong");
        assert_eq!(bus.topic_count(), 2);
    }

    #[tokio::test]
    async fn unsubscribe_ends_subscription() {
        let bus = LocalBus::new();
        let a = bus.endpoint();
        let mut sub = a.subscribe("match:1").await.unwrap();
        assert_eq!(bus.subscriber_count("match:1"), 1);

        a.unsubscribe("match:1").await.unwrap();
        assert!(sub.recv().await.is_none());
        assert!(a.topics().is_empty());
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_fine() {
        let bus = LocalBus::new();
        let a = bus.endpoint();
        tokio_test::assert_ok!(a.publish(Envelope::new("nobody", "ping", json!(null))).await);
        assert_eq!(bus.publish(Envelope::new("nobody", "ping", json!(null))), 0);
    }

    #[tokio::test]
    async fn close_cancels_all_topics() {
        let bus = LocalBus::new();
        let a = bus.endpoint();
        let mut one = a.subscribe("t1").await.unwrap();
        let mut two = a.subscribe("t2").await.unwrap();

        a.close();
        assert!(one.recv().await.is_none());
        assert!(two.recv().await.is_none());
    }
}
