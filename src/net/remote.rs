//! Remote-entity table: the local view of every other peer

use std::collections::HashMap;
use std::sync::Arc;

use glam::Vec3;
use parking_lot::RwLock;

use crate::game::camera::Orientation;
use crate::game::PlayerId;

use super::message::PlayerStatePayload;

/// Another peer's player as last reported by that peer
#[derive(Debug, Clone, PartialEq)]
pub struct RemotePlayer {
    pub id: PlayerId,
    pub name: String,
    pub position: Vec3,
    pub orientation: Orientation,
    pub health: i32,
    pub ammo: u32,
    pub alive: bool,
    /// Local clock time of the last message from this peer
    pub last_seen_ms: u64,
}

impl RemotePlayer {
    pub fn from_payload(payload: &PlayerStatePayload, now_ms: u64) -> Self {
        Self {
            id: payload.id,
            name: payload.name.clone(),
            position: payload.position(),
            orientation: Orientation::new(payload.rot_y, payload.rot_x),
            health: payload.health,
            ammo: payload.ammo,
            alive: payload.is_alive,
            last_seen_ms: now_ms,
        }
    }
}

/// Remote players keyed by id. Every write replaces the whole entry.
#[derive(Debug, Default)]
pub struct RemoteTable {
    players: HashMap<PlayerId, RemotePlayer>,
}

/// Written by the inbound handler, read by the session and renderer
pub type SharedRemoteTable = Arc<RwLock<RemoteTable>>;

impl RemoteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedRemoteTable {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Insert or overwrite; returns true if the player was not known
    pub fn upsert(&mut self, player: RemotePlayer) -> bool {
        self.players.insert(player.id, player).is_none()
    }

    pub fn remove(&mut self, id: PlayerId) -> Option<RemotePlayer> {
        self.players.remove(&id)
    }

    /// Refresh a peer's last-seen time without changing its state
    pub fn touch(&mut self, id: PlayerId, now_ms: u64) {
        if let Some(player) = self.players.get_mut(&id) {
            player.last_seen_ms = now_ms;
        }
    }

    pub fn get(&self, id: PlayerId) -> Option<&RemotePlayer> {
        self.players.get(&id)
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.players.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RemotePlayer> {
        self.players.values()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn clear(&mut self) {
        self.players.clear();
    }

    /// Drop peers silent for longer than `max_age_ms`, returning their ids
    pub fn reap(&mut self, now_ms: u64, max_age_ms: u64) -> Vec<PlayerId> {
        let stale: Vec<PlayerId> = self
            .players
            .values()
            .filter(|p| now_ms.saturating_sub(p.last_seen_ms) > max_age_ms)
            .map(|p| p.id)
            .collect();

        for id in &stale {
            self.players.remove(id);
        }
        stale
    }
}
