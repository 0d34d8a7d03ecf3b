//! Two peers sharing a match topic on an in-process bus

use std::sync::Arc;
use std::time::Duration;

use glam::Vec3;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;
use tokio_test::assert_ok;

use arena_sync::game::player::Player;
use arena_sync::net::{LocalBus, PeerSync, SyncConfig, SyncEvent};
use arena_sync::util::time::unix_millis;

struct Peer {
    player: Player,
    sync: PeerSync,
    events: UnboundedReceiver<SyncEvent>,
}

fn peer(bus: &LocalBus, id: u64, name: &str) -> Peer {
    let config = SyncConfig {
        broadcast_interval_ms: 50,
        stale_after_ms: Some(2_000),
    };
    let mut sync = PeerSync::new(9, id, Arc::new(bus.endpoint()), config);
    let events = sync.take_events().expect("events already taken");
    Peer {
        player: Player::new(id, name, Vec3::new(id as f32, 1.0, 0.0)),
        sync,
        events,
    }
}

async fn next_event(events: &mut UnboundedReceiver<SyncEvent>) -> SyncEvent {
    timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("timed out waiting for sync event")
        .expect("event channel closed")
}

async fn assert_quiet(events: &mut UnboundedReceiver<SyncEvent>) {
    if let Ok(Some(event)) = timeout(Duration::from_millis(100), events.recv()).await {
        panic!("unexpected sync event: {event:?}");
    }
}

/// Connects alice (1) then bob (2) and drains the resulting joins
async fn connected_pair(bus: &LocalBus) -> (Peer, Peer) {
    let mut alice = peer(bus, 1, "alice");
    let mut bob = peer(bus, 2, "bob");

    assert_ok!(alice.sync.connect(&alice.player).await);
    assert_ok!(bob.sync.connect(&bob.player).await);

    // Alice hears bob's join; bob subscribed too late for alice's
    match next_event(&mut alice.events).await {
        SyncEvent::Joined(remote) => {
            assert_eq!(remote.id, 2);
            assert_eq!(remote.name, "bob");
        }
        other => panic!("expected join, got {other:?}"),
    }

    // Bob learns about alice from her first state update
    assert!(assert_ok!(
        alice.sync.broadcast_player_state(&alice.player, 1_000).await
    ));
    match next_event(&mut bob.events).await {
        SyncEvent::Joined(remote) => assert_eq!(remote.id, 1),
        other => panic!("expected join, got {other:?}"),
    }

    (alice, bob)
}

#[tokio::test]
async fn peers_discover_each_other() {
    let bus = LocalBus::new();
    let (alice, bob) = connected_pair(&bus).await;

    let seen_by_alice = alice.sync.remotes();
    let seen_by_bob = bob.sync.remotes();
    assert_eq!(seen_by_alice.read().len(), 1);
    assert_eq!(seen_by_bob.read().len(), 1);
    assert!(seen_by_bob.read().contains(1));
    assert!(!seen_by_alice.read().contains(1));
}

#[tokio::test]
async fn own_messages_are_filtered() {
    let bus = LocalBus::new();
    let (mut alice, mut bob) = connected_pair(&bus).await;

    alice.player.position = Vec3::new(5.0, 1.0, 5.0);
    assert!(assert_ok!(
        alice.sync.broadcast_player_state(&alice.player, 2_000).await
    ));
    assert_ok!(
        alice
            .sync
            .broadcast_shot(Vec3::ZERO, Vec3::NEG_Z, 25)
            .await
    );

    match next_event(&mut bob.events).await {
        SyncEvent::ShotFired(shot) => {
            assert_eq!(shot.shooter_id, 1);
            assert_eq!(shot.damage, 25);
        }
        other => panic!("expected shot, got {other:?}"),
    }
    assert_quiet(&mut alice.events).await;

    let remotes = bob.sync.remotes();
    let table = remotes.read();
    let alice_seen = table.get(1).expect("alice missing");
    assert_eq!(alice_seen.position, Vec3::new(5.0, 1.0, 5.0));
}

#[tokio::test]
async fn state_broadcasts_are_throttled() {
    let bus = LocalBus::new();
    let (mut alice, _bob) = connected_pair(&bus).await;

    // Last accepted at 1_000
    assert!(!assert_ok!(
        alice.sync.broadcast_player_state(&alice.player, 1_020).await
    ));
    assert!(assert_ok!(
        alice.sync.broadcast_player_state(&alice.player, 1_050).await
    ));
}

#[tokio::test]
async fn damage_reaches_every_peer_and_names_the_shooter() {
    let bus = LocalBus::new();
    let (mut alice, mut bob) = connected_pair(&bus).await;

    assert_ok!(alice.sync.broadcast_damage(2, 30).await);

    for events in [&mut bob.events, &mut alice.events] {
        match next_event(events).await {
            SyncEvent::Damaged(damage) => {
                assert_eq!(damage.victim_id, 2);
                assert_eq!(damage.shooter_id, 1);
                assert_eq!(damage.damage, 30);
            }
            other => panic!("expected damage, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn leave_removes_the_peer() {
    let bus = LocalBus::new();
    let (mut alice, mut bob) = connected_pair(&bus).await;

    assert_ok!(bob.sync.disconnect().await);
    assert!(!bob.sync.is_connected());
    assert!(bob.sync.remotes().read().is_empty());

    match next_event(&mut alice.events).await {
        SyncEvent::Left(id) => assert_eq!(id, 2),
        other => panic!("expected leave, got {other:?}"),
    }
    assert!(alice.sync.remotes().read().is_empty());
}

#[tokio::test]
async fn silent_peer_is_reaped() {
    let bus = LocalBus::new();
    let (mut alice, _bob) = connected_pair(&bus).await;

    let now = unix_millis();
    assert!(alice.sync.reap_stale(now).is_empty());
    assert_eq!(alice.sync.reap_stale(now + 5_000), vec![2]);

    match next_event(&mut alice.events).await {
        SyncEvent::Left(id) => assert_eq!(id, 2),
        other => panic!("expected leave, got {other:?}"),
    }
}

#[tokio::test]
async fn broadcasting_requires_connection() {
    let bus = LocalBus::new();
    let mut alice = peer(&bus, 1, "alice");

    assert!(alice.sync.broadcast_shot(Vec3::ZERO, Vec3::X, 10).await.is_err());
    assert!(!assert_ok!(
        alice.sync.broadcast_player_state(&alice.player, 0).await
    ));

    assert_ok!(alice.sync.connect(&alice.player).await);
    assert!(alice.sync.connect(&alice.player).await.is_err());
}
