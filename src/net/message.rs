//! Typed peer-sync messages and their envelope encoding

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::game::player::Player;
use crate::game::PlayerId;

use super::channel::Envelope;

pub const PLAYER_UPDATE: &str = "player_update";
pub const PLAYER_JOIN: &str = "player_join";
pub const PLAYER_LEAVE: &str = "player_leave";
pub const SHOT_FIRED: &str = "shot_fired";
pub const PLAYER_DAMAGED: &str = "player_damaged";

/// Round to two decimals before it goes on the wire
pub fn quantize(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}

/// Full player state, used by both join and periodic update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStatePayload {
    pub id: PlayerId,
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Pitch
    pub rot_x: f32,
    /// Yaw
    pub rot_y: f32,
    pub health: i32,
    pub ammo: u32,
    pub is_alive: bool,
}

impl PlayerStatePayload {
    pub fn from_player(player: &Player) -> Self {
        Self {
            id: player.id,
            name: player.name.clone(),
            x: quantize(player.position.x),
            y: quantize(player.position.y),
            z: quantize(player.position.z),
            rot_x: quantize(player.orientation.pitch),
            rot_y: quantize(player.orientation.yaw),
            health: player.health,
            ammo: player.ammo,
            is_alive: player.alive,
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeavePayload {
    pub user_id: PlayerId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShotPayload {
    pub shooter_id: PlayerId,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub dir_x: f32,
    pub dir_y: f32,
    pub dir_z: f32,
    pub damage: u32,
}

impl ShotPayload {
    pub fn new(shooter_id: PlayerId, origin: Vec3, direction: Vec3, damage: u32) -> Self {
        Self {
            shooter_id,
            x: quantize(origin.x),
            y: quantize(origin.y),
            z: quantize(origin.z),
            dir_x: direction.x,
            dir_y: direction.y,
            dir_z: direction.z,
            damage,
        }
    }

    pub fn origin(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    pub fn direction(&self) -> Vec3 {
        Vec3::new(self.dir_x, self.dir_y, self.dir_z)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DamagePayload {
    pub victim_id: PlayerId,
    pub shooter_id: PlayerId,
    pub damage: u32,
}

/// Inbound decoding failure. Callers drop the message.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unknown event: {0}")]
    UnknownEvent(String),
    #[error("malformed {event} payload: {source}")]
    Malformed {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Every message kind exchanged on a match topic
#[derive(Debug, Clone, PartialEq)]
pub enum SyncMessage {
    Update(PlayerStatePayload),
    Join(PlayerStatePayload),
    Leave(LeavePayload),
    Shot(ShotPayload),
    Damaged(DamagePayload),
}

impl SyncMessage {
    pub fn event(&self) -> &'static str {
        match self {
            SyncMessage::Update(_) => PLAYER_UPDATE,
            SyncMessage::Join(_) => PLAYER_JOIN,
            SyncMessage::Leave(_) => PLAYER_LEAVE,
            SyncMessage::Shot(_) => SHOT_FIRED,
            SyncMessage::Damaged(_) => PLAYER_DAMAGED,
        }
    }

    /// Id of the peer that authored the message
    pub fn sender_id(&self) -> PlayerId {
        match self {
            SyncMessage::Update(p) | SyncMessage::Join(p) => p.id,
            SyncMessage::Leave(p) => p.user_id,
            SyncMessage::Shot(p) => p.shooter_id,
            SyncMessage::Damaged(p) => p.shooter_id,
        }
    }

    pub fn decode(envelope: &Envelope) -> Result<Self, DecodeError> {
        let event = match envelope.event.as_str() {
            PLAYER_UPDATE => PLAYER_UPDATE,
            PLAYER_JOIN => PLAYER_JOIN,
            PLAYER_LEAVE => PLAYER_LEAVE,
            SHOT_FIRED => SHOT_FIRED,
            PLAYER_DAMAGED => PLAYER_DAMAGED,
            other => return Err(DecodeError::UnknownEvent(other.to_string())),
        };

        let payload = envelope.payload.clone();
        let malformed = |source| DecodeError::Malformed { event, source };

        let message = match event {
            PLAYER_UPDATE => SyncMessage::Update(serde_json::from_value(payload).map_err(malformed)?),
            PLAYER_JOIN => SyncMessage::Join(serde_json::from_value(payload).map_err(malformed)?),
            PLAYER_LEAVE => SyncMessage::Leave(serde_json::from_value(payload).map_err(malformed)?),
            SHOT_FIRED => SyncMessage::Shot(serde_json::from_value(payload).map_err(malformed)?),
            _ => SyncMessage::Damaged(serde_json::from_value(payload).map_err(malformed)?),
        };
        Ok(message)
    }

    pub fn to_envelope(&self, topic: &str) -> Result<Envelope, serde_json::Error> {
        let payload = match self {
            SyncMessage::Update(p) | SyncMessage::Join(p) => serde_json::to_value(p)?,
            SyncMessage::Leave(p) => serde_json::to_value(p)?,
            SyncMessage::Shot(p) => serde_json::to_value(p)?,
            SyncMessage::Damaged(p) => serde_json::to_value(p)?,
        };
        Ok(Envelope::new(topic, self.event(), payload))
    }
}
