//! Publish/subscribe channel abstraction used by peer sync

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// One message on a topic. The payload is opaque to the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub topic: String,
    pub event: String,
    pub payload: serde_json::Value,
}

impl Envelope {
    pub fn new(topic: impl Into<String>, event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            topic: topic.into(),
            event: event.into(),
            payload,
        }
    }
}

/// Live subscription to a topic
#[derive(Debug)]
pub struct Subscription {
    pub topic: String,
    pub rx: mpsc::Receiver<Envelope>,
}

impl Subscription {
    /// Next message, or None once the channel side has gone away
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }
}

/// Channel errors
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel closed")]
    Closed,
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("subscription to {0} rejected: {1}")]
    Rejected(String, String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// At-least-once fan-out channel with no ordering guarantee across
/// publishers. Subscribers receive their own publications.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Fire-and-forget publish
    async fn publish(&self, envelope: Envelope) -> Result<(), ChannelError>;

    /// Subscribe and wait for confirmation
    async fn subscribe(&self, topic: &str) -> Result<Subscription, ChannelError>;

    /// Drop every subscription this endpoint holds on `topic`
    async fn unsubscribe(&self, topic: &str) -> Result<(), ChannelError>;
}
