//! WebSocket client of the broadcast relay

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::ws::protocol::{valid_topic, ClientFrame, RelayFrame};

use super::bus::SUBSCRIPTION_BUFFER;
use super::channel::{Channel, ChannelError, Envelope, Subscription};

/// How long to wait for the relay to confirm a subscription
pub const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(5);
/// How long `close` waits for queued frames to flush
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

const OUTBOUND_BUFFER: usize = 256;

enum WriterCommand {
    Frame(ClientFrame),
    Close(oneshot::Sender<()>),
}

#[derive(Default)]
struct Routes {
    /// Subscriptions waiting for the relay's confirmation
    pending: DashMap<String, oneshot::Sender<()>>,
    /// Live subscriptions by topic
    topics: DashMap<String, mpsc::Sender<Envelope>>,
}

impl Routes {
    fn dispatch(&self, text: &str) {
        let frame = match serde_json::from_str::<RelayFrame>(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Failed to parse relay frame");
                return;
            }
        };

        match frame {
            RelayFrame::Subscribed { topic } => {
                if let Some((_, ack)) = self.pending.remove(&topic) {
                    let _ = ack.send(());
                }
            }
            RelayFrame::Unsubscribed { topic } => {
                debug!(topic = %topic, "Unsubscribed");
            }
            RelayFrame::Broadcast {
                topic,
                event,
                payload,
            } => {
                let envelope = Envelope {
                    topic,
                    event,
                    payload,
                };
                let closed = match self.topics.get(&envelope.topic) {
                    Some(route) => match route.try_send(envelope) {
                        Ok(()) => false,
                        Err(mpsc::error::TrySendError::Full(envelope)) => {
                            debug!(topic = %envelope.topic, "Subscriber full, dropping message");
                            false
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => true,
                    },
                    None => false,
                };
                if closed {
                    // Subscription dropped without unsubscribing
                    self.topics.retain(|_, route| !route.is_closed());
                }
            }
            RelayFrame::Error { code, message } => {
                warn!(code = ?code, message = %message, "Relay rejected a frame");
            }
        }
    }

    fn clear(&self) {
        self.pending.clear();
        self.topics.clear();
    }
}

/// [`Channel`] backed by one WebSocket connection to the relay
pub struct WsChannel {
    outbound: mpsc::Sender<WriterCommand>,
    routes: Arc<Routes>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl WsChannel {
    pub async fn connect(url: &str) -> Result<Self, ChannelError> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))?;
        info!(url = %url, "Connected to relay");

        let (mut sink, mut source) = stream.split();
        let (outbound, mut outbound_rx) = mpsc::channel::<WriterCommand>(OUTBOUND_BUFFER);
        let routes = Arc::new(Routes::default());

        // Writer task: queued frames -> WebSocket
        let writer = tokio::spawn(async move {
            while let Some(command) = outbound_rx.recv().await {
                match command {
                    WriterCommand::Frame(frame) => {
                        let text = match serde_json::to_string(&frame) {
                            Ok(text) => text,
                            Err(e) => {
                                warn!(error = %e, "Failed to encode client frame");
                                continue;
                            }
                        };
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            debug!(error = %e, "Relay send failed");
                            break;
                        }
                    }
                    WriterCommand::Close(done) => {
                        let _ = sink.close().await;
                        let _ = done.send(());
                        break;
                    }
                }
            }
        });

        // Reader task: WebSocket -> subscriptions
        let reader_routes = routes.clone();
        let reader = tokio::spawn(async move {
            while let Some(result) = source.next().await {
                match result {
                    Ok(Message::Text(text)) => reader_routes.dispatch(&text),
                    Ok(Message::Close(_)) => {
                        info!("Relay closed the connection");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "Relay connection error");
                        break;
                    }
                }
            }
            // Ends every subscription and fails pending ones
            reader_routes.clear();
        });

        Ok(Self {
            outbound,
            routes,
            reader,
            writer,
        })
    }

    /// Flush queued frames and close the socket
    pub async fn close(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.outbound.send(WriterCommand::Close(done_tx)).await.is_ok()
            && timeout(CLOSE_TIMEOUT, done_rx).await.is_err()
        {
            warn!("Timed out flushing relay connection");
        }
        self.reader.abort();
        self.routes.clear();
    }

    async fn send(&self, frame: ClientFrame) -> Result<(), ChannelError> {
        self.outbound
            .send(WriterCommand::Frame(frame))
            .await
            .map_err(|_| ChannelError::Closed)
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

#[async_trait]
impl Channel for WsChannel {
    async fn publish(&self, envelope: Envelope) -> Result<(), ChannelError> {
        self.send(ClientFrame::from(envelope)).await
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, ChannelError> {
        if !valid_topic(topic) {
            return Err(ChannelError::Rejected(
                topic.to_string(),
                "invalid topic name".to_string(),
            ));
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        // Route first so nothing sent right after the ack is lost
        self.routes.topics.insert(topic.to_string(), tx);
        self.routes.pending.insert(topic.to_string(), ack_tx);

        if let Err(e) = self
            .send(ClientFrame::Subscribe {
                topic: topic.to_string(),
            })
            .await
        {
            self.routes.pending.remove(topic);
            self.routes.topics.remove(topic);
            return Err(e);
        }

        match timeout(SUBSCRIBE_TIMEOUT, ack_rx).await {
            Ok(Ok(())) => {
                debug!(topic = %topic, "Subscription confirmed");
                Ok(Subscription {
                    topic: topic.to_string(),
                    rx,
                })
            }
            Ok(Err(_)) => {
                self.routes.topics.remove(topic);
                Err(ChannelError::Closed)
            }
            Err(_) => {
                self.routes.pending.remove(topic);
                self.routes.topics.remove(topic);
                Err(ChannelError::Timeout("subscription confirmation"))
            }
        }
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), ChannelError> {
        self.routes.topics.remove(topic);
        self.send(ClientFrame::Unsubscribe {
            topic: topic.to_string(),
        })
        .await
    }
}
