//! Relay wire protocol
//! JSON text frames exchanged between peers and the broadcast relay

use serde::{Deserialize, Serialize};

use crate::net::channel::Envelope;

/// Frames sent from a peer to the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Start receiving a topic
    Subscribe { topic: String },

    /// Stop receiving a topic
    Unsubscribe { topic: String },

    /// Publish to every subscriber of a topic, sender included
    Broadcast {
        topic: String,
        event: String,
        #[serde(default)]
        payload: serde_json::Value,
    },
}

/// Frames sent from the relay to a peer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayFrame {
    /// Subscription confirmed; broadcasts on the topic follow
    Subscribed { topic: String },

    Unsubscribed { topic: String },

    /// A message published on a subscribed topic
    Broadcast {
        topic: String,
        event: String,
        payload: serde_json::Value,
    },

    /// Request rejected
    Error { code: ErrorCode, message: String },
}

/// Error codes carried by [`RelayFrame::Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    RateLimited,
    BadFrame,
    InvalidTopic,
}

impl From<Envelope> for RelayFrame {
    fn from(envelope: Envelope) -> Self {
        RelayFrame::Broadcast {
            topic: envelope.topic,
            event: envelope.event,
            payload: envelope.payload,
        }
    }
}

impl From<Envelope> for ClientFrame {
    fn from(envelope: Envelope) -> Self {
        ClientFrame::Broadcast {
            topic: envelope.topic,
            event: envelope.event,
            payload: envelope.payload,
        }
    }
}

/// Longest topic name the relay accepts
pub const MAX_TOPIC_LEN: usize = 128;

/// Topic names are non-empty, bounded and printable ASCII
pub fn valid_topic(topic: &str) -> bool {
    !topic.is_empty()
        && topic.len() <= MAX_TOPIC_LEN
        && topic.bytes().all(|b| b.is_ascii_graphic())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_frames_are_type_tagged() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"subscribe","topic":"match:1"}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::Subscribe {
                topic: "match:1".into()
            }
        );

        let frame: ClientFrame = serde_json::from_str(
            r#"{"type":"broadcast","topic":"match:1","event":"player_leave","payload":{"userId":3}}"#,
        )
        .unwrap();
        assert_eq!(
            frame,
            ClientFrame::Broadcast {
                topic: "match:1".into(),
                event: "player_leave".into(),
                payload: json!({ "userId": 3 }),
            }
        );
    }

    #[test]
    fn broadcast_payload_defaults_to_null() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"broadcast","topic":"t","event":"e"}"#).unwrap();
        assert!(matches!(frame, ClientFrame::Broadcast { payload, .. } if payload.is_null()));
    }

    #[test]
    fn relay_error_serializes_code() {
        let frame = RelayFrame::Error {
            code: ErrorCode::RateLimited,
            message: "slow down".into(),
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["code"], "rate_limited");
    }

    #[test]
    fn unknown_frame_type_fails() {
        assert!(serde_json::from_str::<ClientFrame>(r#"{"type":"join_match"}"#).is_err());
    }

    #[test]
    fn topic_validation() {
        assert!(valid_topic("match:42"));
        assert!(!valid_topic(""));
        assert!(!valid_topic("has space"));
        assert!(!valid_topic(&"x".repeat(MAX_TOPIC_LEN + 1)));
    }
}
