//! Peer state synchronization over a per-match topic
//!
//! There is no authority: every peer broadcasts its own player, merges
//! what others broadcast into a [`RemoteTable`], and decides for itself
//! whether a `player_damaged` message concerns it.

use std::sync::Arc;

use glam::Vec3;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::game::player::Player;
use crate::game::PlayerId;
use crate::util::rate_limit::Throttle;
use crate::util::time::{unix_millis, BROADCAST_INTERVAL_MS};

use super::channel::{Channel, ChannelError, Envelope, Subscription};
use super::message::{
    DamagePayload, LeavePayload, PlayerStatePayload, ShotPayload, SyncMessage,
};
use super::remote::{RemotePlayer, RemoteTable, SharedRemoteTable};

/// Default silence after which a remote peer is dropped
pub const STALE_AFTER_MS: u64 = 2_000;

/// Topic name for a match
pub fn match_topic(match_id: u64) -> String {
    format!("match:{}", match_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// What the session needs to hear about from other peers
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Joined(RemotePlayer),
    Left(PlayerId),
    ShotFired(ShotPayload),
    Damaged(DamagePayload),
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("not connected")]
    NotConnected,
    #[error("already connected")]
    AlreadyConnected,
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Minimum gap between two state broadcasts
    pub broadcast_interval_ms: u64,
    /// None disables reaping
    pub stale_after_ms: Option<u64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            broadcast_interval_ms: BROADCAST_INTERVAL_MS,
            stale_after_ms: Some(STALE_AFTER_MS),
        }
    }
}

/// Applies inbound envelopes to the remote table and event queue
#[derive(Clone)]
pub struct InboundHandler {
    local_id: PlayerId,
    remotes: SharedRemoteTable,
    events: mpsc::UnboundedSender<SyncEvent>,
}

impl InboundHandler {
    pub fn handle(&self, envelope: &Envelope, now_ms: u64) {
        let message = match SyncMessage::decode(envelope) {
            Ok(message) => message,
            Err(e) => {
                debug!(topic = %envelope.topic, error = %e, "Dropping inbound message");
                return;
            }
        };

        match message {
            SyncMessage::Update(state) => {
                if state.id == self.local_id {
                    return;
                }
                let remote = RemotePlayer::from_payload(&state, now_ms);
                let is_new = self.remotes.write().upsert(remote.clone());
                if is_new {
                    debug!(player_id = state.id, "First update from unseen peer");
                    self.emit(SyncEvent::Joined(remote));
                }
            }
            SyncMessage::Join(state) => {
                if state.id == self.local_id {
                    return;
                }
                let remote = RemotePlayer::from_payload(&state, now_ms);
                self.remotes.write().upsert(remote.clone());
                info!(player_id = state.id, name = %state.name, "Peer joined");
                self.emit(SyncEvent::Joined(remote));
            }
            SyncMessage::Leave(LeavePayload { user_id }) => {
                if self.remotes.write().remove(user_id).is_some() {
                    info!(player_id = user_id, "Peer left");
                    self.emit(SyncEvent::Left(user_id));
                }
            }
            SyncMessage::Shot(shot) => {
                if shot.shooter_id == self.local_id {
                    return;
                }
                self.remotes.write().touch(shot.shooter_id, now_ms);
                self.emit(SyncEvent::ShotFired(shot));
            }
            // Handled even when we sent it: the victim may be us
            SyncMessage::Damaged(damage) => {
                self.emit(SyncEvent::Damaged(damage));
            }
        }
    }

    fn emit(&self, event: SyncEvent) {
        if self.events.send(event).is_err() {
            debug!("Sync event receiver dropped");
        }
    }
}

/// One peer's connection to a match topic
pub struct PeerSync {
    match_id: u64,
    topic: String,
    local_id: PlayerId,
    channel: Arc<dyn Channel>,
    config: SyncConfig,
    state: ConnectionState,
    throttle: Throttle,
    remotes: SharedRemoteTable,
    inbound: InboundHandler,
    events_rx: Option<mpsc::UnboundedReceiver<SyncEvent>>,
    pump: Option<JoinHandle<()>>,
}

impl PeerSync {
    pub fn new(match_id: u64, local_id: PlayerId, channel: Arc<dyn Channel>, config: SyncConfig) -> Self {
        let remotes = RemoteTable::shared();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let inbound = InboundHandler {
            local_id,
            remotes: remotes.clone(),
            events: events_tx,
        };

        Self {
            match_id,
            topic: match_topic(match_id),
            local_id,
            channel,
            throttle: Throttle::new(config.broadcast_interval_ms),
            config,
            state: ConnectionState::Disconnected,
            remotes,
            inbound,
            events_rx: Some(events_rx),
            pump: None,
        }
    }

    pub fn match_id(&self) -> u64 {
        self.match_id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn local_id(&self) -> PlayerId {
        self.local_id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn remotes(&self) -> SharedRemoteTable {
        self.remotes.clone()
    }

    /// Inbound event queue; can be taken once
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<SyncEvent>> {
        self.events_rx.take()
    }

    /// Subscribe to the match topic, start consuming it, then announce
    /// the local player
    pub async fn connect(&mut self, player: &Player) -> Result<(), SyncError> {
        if self.state != ConnectionState::Disconnected {
            return Err(SyncError::AlreadyConnected);
        }

        self.state = ConnectionState::Connecting;
        info!(match_id = self.match_id, player_id = self.local_id, "Connecting to match");

        let subscription = match self.channel.subscribe(&self.topic).await {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!(match_id = self.match_id, error = %e, "Subscribe failed");
                self.state = ConnectionState::Disconnected;
                return Err(e.into());
            }
        };

        self.pump = Some(spawn_pump(subscription, self.inbound.clone()));
        self.state = ConnectionState::Connected;
        self.throttle.reset();

        self.publish(SyncMessage::Join(PlayerStatePayload::from_player(player)))
            .await?;

        info!(match_id = self.match_id, player_id = self.local_id, "Connected to match");
        Ok(())
    }

    /// Announce leave, then unsubscribe. Leave must go out first or
    /// other peers keep a ghost until their reaper drops it.
    pub async fn disconnect(&mut self) -> Result<(), SyncError> {
        if self.state == ConnectionState::Disconnected {
            return Ok(());
        }

        let leave = self
            .publish(SyncMessage::Leave(LeavePayload {
                user_id: self.local_id,
            }))
            .await;
        if let Err(e) = &leave {
            warn!(match_id = self.match_id, error = %e, "Failed to announce leave");
        }

        let unsubscribe = self.channel.unsubscribe(&self.topic).await;

        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.state = ConnectionState::Disconnected;
        self.remotes.write().clear();

        info!(match_id = self.match_id, player_id = self.local_id, "Disconnected from match");

        leave?;
        unsubscribe?;
        Ok(())
    }

    /// Broadcast local state, at most once per interval.
    /// Returns Ok(false) when throttled or not connected.
    pub async fn broadcast_player_state(&mut self, player: &Player, now_ms: u64) -> Result<bool, SyncError> {
        if !self.is_connected() || !self.throttle.try_acquire(now_ms) {
            return Ok(false);
        }

        self.publish(SyncMessage::Update(PlayerStatePayload::from_player(player)))
            .await?;
        Ok(true)
    }

    pub async fn broadcast_shot(&self, origin: Vec3, direction: Vec3, damage: u32) -> Result<(), SyncError> {
        self.ensure_connected()?;
        self.publish(SyncMessage::Shot(ShotPayload::new(
            self.local_id,
            origin,
            direction,
            damage,
        )))
        .await
    }

    pub async fn broadcast_damage(&self, victim_id: PlayerId, damage: u32) -> Result<(), SyncError> {
        self.ensure_connected()?;
        self.publish(SyncMessage::Damaged(DamagePayload {
            victim_id,
            shooter_id: self.local_id,
            damage,
        }))
        .await
    }

    /// Apply one inbound envelope as the pump would
    pub fn handle_inbound(&self, envelope: &Envelope, now_ms: u64) {
        self.inbound.handle(envelope, now_ms);
    }

    /// Drop silent peers and report them as left
    pub fn reap_stale(&self, now_ms: u64) -> Vec<PlayerId> {
        let Some(max_age) = self.config.stale_after_ms else {
            return Vec::new();
        };

        let stale = self.remotes.write().reap(now_ms, max_age);
        for id in &stale {
            info!(match_id = self.match_id, player_id = *id, "Reaped stale peer");
            self.inbound.emit(SyncEvent::Left(*id));
        }
        stale
    }

    fn ensure_connected(&self) -> Result<(), SyncError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(SyncError::NotConnected)
        }
    }

    async fn publish(&self, message: SyncMessage) -> Result<(), SyncError> {
        let envelope = message.to_envelope(&self.topic)?;
        self.channel.publish(envelope).await?;
        Ok(())
    }
}

impl Drop for PeerSync {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

fn spawn_pump(mut subscription: Subscription, inbound: InboundHandler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(envelope) = subscription.recv().await {
            inbound.handle(&envelope, unix_millis());
        }
        debug!(topic = %subscription.topic, "Inbound pump ended");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::bus::LocalBus;
    use crate::net::message::{PLAYER_DAMAGED, PLAYER_UPDATE, SHOT_FIRED};
    use serde_json::json;

    fn peer(bus: &LocalBus, id: PlayerId) -> PeerSync {
        PeerSync::new(1, id, Arc::new(bus.endpoint()), SyncConfig::default())
    }

    fn update(id: PlayerId) -> Envelope {
        Envelope::new(
            "match:1",
            PLAYER_UPDATE,
            json!({
                "id": id, "name": "p", "x": 1.0, "y": 0.4, "z": 2.0,
                "rotX": 0.0, "rotY": 0.5, "health": 90, "ammo": 12, "isAlive": true
            }),
        )
    }

    #[test]
    fn ignores_own_update_and_shot() {
        let bus = LocalBus::new();
        let mut sync = peer(&bus, 1);
        let mut events = sync.take_events().unwrap();

        sync.handle_inbound(&update(1), 0);
        sync.handle_inbound(
            &Envelope::new(
                "match:1",
                SHOT_FIRED,
                json!({ "shooterId": 1, "x": 0, "y": 0, "z": 0, "dirX": 0, "dirY": 0, "dirZ": -1, "damage": 25 }),
            ),
            0,
        );

        assert!(sync.remotes().read().is_empty());
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn applies_damage_naming_self_even_from_self() {
        let bus = LocalBus::new();
        let mut sync = peer(&bus, 1);
        let mut events = sync.take_events().unwrap();

        sync.handle_inbound(
            &Envelope::new(
                "match:1",
                PLAYER_DAMAGED,
                json!({ "victimId": 1, "shooterId": 1, "damage": 30 }),
            ),
            0,
        );

        assert_eq!(
            events.try_recv().unwrap(),
            SyncEvent::Damaged(DamagePayload {
                victim_id: 1,
                shooter_id: 1,
                damage: 30
            })
        );
    }

    #[test]
    fn first_update_creates_remote() {
        let bus = LocalBus::new();
        let mut sync = peer(&bus, 1);
        let mut events = sync.take_events().unwrap();

        sync.handle_inbound(&update(2), 500);
        sync.handle_inbound(&update(2), 600);

        let remotes = sync.remotes();
        let table = remotes.read();
        let remote = table.get(2).unwrap();
        assert_eq!(remote.health, 90);
        assert_eq!(remote.last_seen_ms, 600);
        assert!(matches!(events.try_recv(), Ok(SyncEvent::Joined(p)) if p.id == 2));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn malformed_messages_are_dropped() {
        let bus = LocalBus::new();
        let mut sync = peer(&bus, 1);
        let mut events = sync.take_events().unwrap();

        sync.handle_inbound(&Envelope::new("match:1", PLAYER_UPDATE, json!({ "id": "x" })), 0);
        sync.handle_inbound(&Envelope::new("match:1", "emote", json!({})), 0);

        assert!(sync.remotes().read().is_empty());
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn reap_reports_left() {
        let bus = LocalBus::new();
        let mut sync = peer(&bus, 1);
        let mut events = sync.take_events().unwrap();

        sync.handle_inbound(&update(2), 1_000);
        let _ = events.try_recv();

        assert!(sync.reap_stale(2_000).is_empty());
        assert_eq!(sync.reap_stale(3_500), vec![2]);
        assert_eq!(events.try_recv().unwrap(), SyncEvent::Left(2));
    }

    #[test]
    fn reaping_can_be_disabled() {
        let bus = LocalBus::new();
        let sync = PeerSync::new(
            1,
            1,
            Arc::new(bus.endpoint()),
            SyncConfig {
                stale_after_ms: None,
                ..SyncConfig::default()
            },
        );
        sync.handle_inbound(&update(2), 0);
        assert!(sync.reap_stale(u64::MAX).is_empty());
        assert_eq!(sync.remotes().read().len(), 1);
    }

    #[tokio::test]
    async fn state_broadcast_is_throttled() {
        let bus = LocalBus::new();
        let mut sync = peer(&bus, 1);
        let player = Player::new(1, "me", Vec3::ZERO);

        // Not connected yet
        assert!(!sync.broadcast_player_state(&player, 0).await.unwrap());

        sync.connect(&player).await.unwrap();
        assert!(sync.broadcast_player_state(&player, 1_000).await.unwrap());
        assert!(!sync.broadcast_player_state(&player, 1_020).await.unwrap());
        assert!(!sync.broadcast_player_state(&player, 1_049).await.unwrap());
        assert!(sync.broadcast_player_state(&player, 1_050).await.unwrap());
    }

    #[tokio::test]
    async fn connect_twice_is_rejected() {
        let bus = LocalBus::new();
        let mut sync = peer(&bus, 1);
        let player = Player::new(1, "me", Vec3::ZERO);

        sync.connect(&player).await.unwrap();
        assert_eq!(sync.state(), ConnectionState::Connected);
        assert!(matches!(sync.connect(&player).await, Err(SyncError::AlreadyConnected)));

        sync.disconnect().await.unwrap();
        assert_eq!(sync.state(), ConnectionState::Disconnected);
        assert!(matches!(
            sync.broadcast_damage(2, 10).await,
            Err(SyncError::NotConnected)
        ));
    }
}
