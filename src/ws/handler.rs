//! WebSocket upgrade handler for the broadcast relay

use std::sync::atomic::Ordering;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::net::bus::BusEndpoint;
use crate::net::channel::{Channel, Envelope, Subscription};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::{valid_topic, ClientFrame, ErrorCode, RelayFrame};

/// Frames queued for one connection before senders wait
const OUTBOUND_BUFFER: usize = 512;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id = Uuid::new_v4();
    let active = state.connections.fetch_add(1, Ordering::Relaxed) + 1;
    info!(conn_id = %conn_id, active, "New relay connection");

    let (ws_sink, ws_stream) = socket.split();
    let (out_tx, out_rx) = mpsc::channel(OUTBOUND_BUFFER);

    // Spawn writer task: queued frames -> WebSocket
    let writer_handle = tokio::spawn(write_frames(conn_id, ws_sink, out_rx));

    let endpoint = state.bus.endpoint();
    let rate_limiter = ConnectionRateLimiter::new(state.config.relay_messages_per_sec);

    run_session(conn_id, &endpoint, &rate_limiter, ws_stream, &out_tx).await;

    // Cleanup on disconnect
    endpoint.close();
    writer_handle.abort();
    let active = state.connections.fetch_sub(1, Ordering::Relaxed) - 1;

    info!(conn_id = %conn_id, active, "Relay connection closed");
}

/// Reader loop: WebSocket -> bus
async fn run_session(
    conn_id: Uuid,
    endpoint: &BusEndpoint,
    rate_limiter: &ConnectionRateLimiter,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    out_tx: &mpsc::Sender<RelayFrame>,
) {
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientFrame>(&text) {
                Ok(frame) => {
                    if !handle_frame(conn_id, endpoint, rate_limiter, frame, out_tx).await {
                        debug!(conn_id = %conn_id, "Writer gone, ending session");
                        break;
                    }
                }
                Err(e) => {
                    warn!(conn_id = %conn_id, error = %e, "Failed to parse client frame");
                    let reply = RelayFrame::Error {
                        code: ErrorCode::BadFrame,
                        message: e.to_string(),
                    };
                    if out_tx.send(reply).await.is_err() {
                        break;
                    }
                }
            },
            Ok(Message::Binary(_)) => {
                warn!(conn_id = %conn_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) => {
                debug!(conn_id = %conn_id, "Received ping");
            }
            Ok(Message::Pong(_)) => {
                debug!(conn_id = %conn_id, "Received pong");
            }
            Ok(Message::Close(_)) => {
                info!(conn_id = %conn_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(conn_id = %conn_id, error = %e, "WebSocket error");
                break;
            }
        }
    }
}

/// Apply one client frame. Returns false once the writer is gone.
async fn handle_frame(
    conn_id: Uuid,
    endpoint: &BusEndpoint,
    rate_limiter: &ConnectionRateLimiter,
    frame: ClientFrame,
    out_tx: &mpsc::Sender<RelayFrame>,
) -> bool {
    let reply = match frame {
        ClientFrame::Subscribe { topic } => {
            if !valid_topic(&topic) {
                invalid_topic(&topic)
            } else if endpoint.topics().contains(&topic) {
                // Already forwarding, just confirm again
                RelayFrame::Subscribed { topic }
            } else {
                match endpoint.subscribe(&topic).await {
                    Ok(subscription) => {
                        debug!(conn_id = %conn_id, topic = %topic, "Subscribed");
                        // Ack is queued before the forward starts, so it
                        // always precedes the topic's broadcasts
                        if out_tx.send(RelayFrame::Subscribed { topic }).await.is_err() {
                            return false;
                        }
                        spawn_subscription_forward(conn_id, subscription, out_tx.clone());
                        return true;
                    }
                    Err(e) => RelayFrame::Error {
                        code: ErrorCode::InvalidTopic,
                        message: e.to_string(),
                    },
                }
            }
        }
        ClientFrame::Unsubscribe { topic } => {
            if let Err(e) = endpoint.unsubscribe(&topic).await {
                warn!(conn_id = %conn_id, topic = %topic, error = %e, "Unsubscribe failed");
            }
            RelayFrame::Unsubscribed { topic }
        }
        ClientFrame::Broadcast {
            topic,
            event,
            payload,
        } => {
            if !rate_limiter.check_broadcast() {
                warn!(conn_id = %conn_id, topic = %topic, "Rate limited broadcast");
                RelayFrame::Error {
                    code: ErrorCode::RateLimited,
                    message: "too many broadcasts".to_string(),
                }
            } else if !valid_topic(&topic) {
                invalid_topic(&topic)
            } else {
                if let Err(e) = endpoint.publish(Envelope::new(topic, event, payload)).await {
                    warn!(conn_id = %conn_id, error = %e, "Publish failed");
                }
                return true;
            }
        }
    };

    out_tx.send(reply).await.is_ok()
}

fn invalid_topic(topic: &str) -> RelayFrame {
    RelayFrame::Error {
        code: ErrorCode::InvalidTopic,
        message: format!("invalid topic: {:?}", topic),
    }
}

/// Copy one subscription into the connection's outbound queue
fn spawn_subscription_forward(conn_id: Uuid, mut subscription: Subscription, out_tx: mpsc::Sender<RelayFrame>) {
    tokio::spawn(async move {
        while let Some(envelope) = subscription.recv().await {
            if out_tx.send(RelayFrame::from(envelope)).await.is_err() {
                break;
            }
        }
        debug!(conn_id = %conn_id, topic = %subscription.topic, "Forward ended");
    });
}

/// Writer task: outbound queue -> WebSocket
async fn write_frames(
    conn_id: Uuid,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut out_rx: mpsc::Receiver<RelayFrame>,
) {
    while let Some(frame) = out_rx.recv().await {
        if let Err(e) = send_frame(&mut ws_sink, &frame).await {
            debug!(conn_id = %conn_id, error = %e, "WebSocket send failed");
            break;
        }
    }
}

/// Send a frame over WebSocket
async fn send_frame(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    frame: &RelayFrame,
) -> Result<(), String> {
    let json = serde_json::to_string(frame).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
