//! Fixed-cadence client loop: input, simulation, broadcast, draw

use std::future::Future;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::net::remote::RemoteTable;
use crate::net::sync::{PeerSync, SyncError};
use crate::util::time::{tick_delta, unix_millis, Timer};

use super::camera::CameraPose;
use super::player::Player;
use super::projectile::Projectile;
use super::replay::{Replay, ReplayEvent, ReplayPlayerState, ReplayRecorder};
use super::session::{GameSession, TickReport};
use super::PlayerInput;

/// Everything a renderer may draw for one frame
pub struct FrameView<'a> {
    pub tick: u64,
    pub camera: CameraPose,
    pub local: &'a Player,
    pub remotes: &'a RemoteTable,
    pub projectiles: &'a [Projectile],
}

/// Draws the scene. Implementations must not block.
pub trait Renderer: Send {
    fn draw(&mut self, frame: &FrameView<'_>);
}

/// Headless renderer that logs a frame summary every `every` ticks
pub struct TracingRenderer {
    every: u64,
}

impl TracingRenderer {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
        }
    }
}

impl Renderer for TracingRenderer {
    fn draw(&mut self, frame: &FrameView<'_>) {
        if frame.tick % self.every != 0 {
            return;
        }
        debug!(
            tick = frame.tick,
            x = frame.local.position.x,
            y = frame.local.position.y,
            z = frame.local.position.z,
            yaw = frame.camera.orientation.yaw,
            health = frame.local.health,
            ammo = frame.local.ammo,
            remotes = frame.remotes.len(),
            projectiles = frame.projectiles.len(),
            "Frame"
        );
    }
}

/// Supplies input once per tick
pub trait InputSource: Send {
    fn next_input(&mut self, player: &Player, dt: f32) -> PlayerInput;
}

/// Seeded random walker that strafes, jumps and fires now and then
pub struct WanderBot {
    rng: ChaCha8Rng,
    current: PlayerInput,
    /// Seconds until the next change of mind
    hold: f32,
}

impl WanderBot {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            current: PlayerInput::default(),
            hold: 0.0,
        }
    }

    fn choose(&mut self) -> PlayerInput {
        let strafe = self.rng.gen_range(0..3);
        PlayerInput {
            move_forward: self.rng.gen_bool(0.8),
            move_left: strafe == 1,
            move_right: strafe == 2,
            sprint: self.rng.gen_bool(0.3),
            shoot: self.rng.gen_bool(0.4),
            look_dx: self.rng.gen_range(-4.0..4.0),
            ..PlayerInput::default()
        }
    }
}

impl InputSource for WanderBot {
    fn next_input(&mut self, player: &Player, dt: f32) -> PlayerInput {
        self.hold -= dt;
        if self.hold <= 0.0 {
            self.current = self.choose();
            self.hold = self.rng.gen_range(0.5..2.0);
        }

        PlayerInput {
            // Only an occasional hop
            jump: player.alive && self.rng.gen_bool(0.01),
            ..self.current
        }
    }
}

/// Totals over one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub shots: u64,
    pub hits: u64,
    pub deaths: u64,
}

/// Drives a [`GameSession`] and its [`PeerSync`] at a fixed rate
pub struct MatchRunner<R: Renderer, I: InputSource> {
    session: GameSession,
    sync: PeerSync,
    renderer: R,
    input: I,
    tps: u32,
    summary: RunSummary,
    recorder: Option<ReplayRecorder>,
}

impl<R: Renderer, I: InputSource> MatchRunner<R, I> {
    /// Wires the session to the sync's remote table and event queue
    pub fn new(session: GameSession, mut sync: PeerSync, renderer: R, input: I, tps: u32) -> Self {
        let session = match sync.take_events() {
            Some(events) => session.with_peers(sync.remotes(), events),
            None => session,
        };

        Self {
            session,
            sync,
            renderer,
            input,
            tps: tps.max(1),
            summary: RunSummary::default(),
            recorder: None,
        }
    }

    /// Record the match while running
    pub fn with_replay(mut self, recorder: ReplayRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Everything recorded so far
    pub fn replay(&self) -> Option<Replay> {
        self.recorder.as_ref()?.replay()
    }

    pub fn session(&self) -> &GameSession {
        &self.session
    }

    pub fn sync(&self) -> &PeerSync {
        &self.sync
    }

    /// Connect, tick until `shutdown` resolves, then announce leave and
    /// unsubscribe
    pub async fn run<F>(&mut self, shutdown: F) -> Result<RunSummary, SyncError>
    where
        F: Future<Output = ()>,
    {
        self.sync.connect(self.session.player()).await?;
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.start(unix_millis());
        }
        info!(
            match_id = self.sync.match_id(),
            player_id = self.sync.local_id(),
            tps = self.tps,
            "Match loop started"
        );

        let dt = tick_delta(self.tps);
        let mut tick_interval = interval(Duration::from_secs_f32(dt));
        tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = tick_interval.tick() => {
                    self.step(dt, unix_millis()).await;
                }
            }
        }

        let result = self.sync.disconnect().await;
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.stop();
        }
        info!(
            match_id = self.sync.match_id(),
            ticks = self.summary.ticks,
            shots = self.summary.shots,
            hits = self.summary.hits,
            deaths = self.summary.deaths,
            "Match loop stopped"
        );
        result.map(|_| self.summary)
    }

    /// One tick: input, simulation, broadcast, reap, draw
    pub async fn step(&mut self, dt: f32, now_ms: u64) -> TickReport {
        let timer = Timer::new();

        let input = self.input.next_input(self.session.player(), dt);
        let report = self.session.tick(&input, dt, now_ms);
        self.broadcast(&report, now_ms).await;
        self.sync.reap_stale(now_ms);
        self.record(&report, now_ms);
        self.draw();

        self.summary.ticks += 1;
        self.summary.shots += report.shots.len() as u64;
        self.summary.hits += report.hits.len() as u64;
        if report.died {
            self.summary.deaths += 1;
        }

        let elapsed = timer.elapsed_micros();
        if elapsed as f32 > dt * 1_000_000.0 {
            warn!(elapsed_micros = elapsed, "Tick over budget");
        }

        report
    }

    async fn broadcast(&mut self, report: &TickReport, now_ms: u64) {
        if !self.sync.is_connected() {
            return;
        }

        for shot in &report.shots {
            if let Err(e) = self
                .sync
                .broadcast_shot(shot.origin, shot.direction, shot.damage)
                .await
            {
                warn!(error = %e, "Failed to broadcast shot");
            }
        }

        for hit in &report.hits {
            if let Err(e) = self.sync.broadcast_damage(hit.target_id, hit.damage).await {
                warn!(error = %e, "Failed to broadcast damage");
            }
        }

        if let Err(e) = self
            .sync
            .broadcast_player_state(self.session.player(), now_ms)
            .await
        {
            warn!(error = %e, "Failed to broadcast player state");
        }
    }

    fn record(&mut self, report: &TickReport, now_ms: u64) {
        let Some(recorder) = self.recorder.as_mut() else {
            return;
        };

        let local = self.session.player();
        let remotes = self.session.remotes();
        let table = remotes.read();

        let shots = report.shots.iter().map(|shot| ReplayEvent::Shot {
            shooter_id: local.id,
            position: shot.origin,
        });
        let hits = report.hits.iter().flat_map(|hit| {
            let damage = ReplayEvent::Damage {
                shooter_id: local.id,
                victim_id: hit.target_id,
                damage: hit.damage,
            };
            // Judged on the victim's last broadcast health
            let lethal = table
                .get(hit.target_id)
                .is_some_and(|remote| remote.health <= hit.damage as i32);
            let kill = lethal.then_some(ReplayEvent::Kill {
                shooter_id: local.id,
                victim_id: hit.target_id,
            });
            std::iter::once(damage).chain(kill)
        });
        let death = report
            .died
            .then_some(ReplayEvent::Death { victim_id: local.id });
        recorder.push_events(shots.chain(hits).chain(death));

        recorder.record_frame(now_ms, || {
            std::iter::once(ReplayPlayerState::from_player(local))
                .chain(table.iter().map(ReplayPlayerState::from_remote))
                .collect()
        });
    }

    fn draw(&mut self) {
        let remotes = self.session.remotes();
        let table = remotes.read();
        let frame = FrameView {
            tick: self.summary.ticks,
            camera: self.session.camera_pose(),
            local: self.session.player(),
            remotes: &table,
            projectiles: self.session.projectiles().projectiles(),
        };
        self.renderer.draw(&frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use glam::Vec3;
    use tokio::time::timeout;

    use crate::game::level::Level;
    use crate::net::bus::LocalBus;
    use crate::net::channel::{Channel, Subscription};
    use crate::net::message::{PlayerStatePayload, PLAYER_JOIN, PLAYER_LEAVE, PLAYER_UPDATE, SHOT_FIRED};
    use crate::net::remote::RemotePlayer;
    use crate::net::sync::SyncConfig;

    /// Fires on every tick, never moves
    struct Trigger;

    impl InputSource for Trigger {
        fn next_input(&mut self, _player: &Player, _dt: f32) -> PlayerInput {
            PlayerInput {
                shoot: true,
                ..PlayerInput::default()
            }
        }
    }

    #[derive(Default)]
    struct CountingRenderer {
        frames: u64,
    }

    impl Renderer for CountingRenderer {
        fn draw(&mut self, _frame: &FrameView<'_>) {
            self.frames += 1;
        }
    }

    fn runner<I: InputSource>(bus: &LocalBus, input: I) -> MatchRunner<CountingRenderer, I> {
        let mut session = GameSession::new(1, "me", Level::default(), 3);
        session.player_mut().position = Vec3::new(0.0, 0.4, 0.0);
        let sync = PeerSync::new(1, 1, Arc::new(bus.endpoint()), SyncConfig::default());
        MatchRunner::new(session, sync, CountingRenderer::default(), input, 60)
    }

    async fn next_event(sub: &mut Subscription) -> String {
        timeout(Duration::from_secs(1), sub.recv())
            .await
            .expect("timed out waiting for message")
            .expect("subscription closed")
            .event
    }

    #[tokio::test]
    async fn step_broadcasts_shot_then_state() {
        let bus = LocalBus::new();
        let observer = bus.endpoint();
        let mut sub = observer.subscribe("match:1").await.unwrap();

        let mut runner = runner(&bus, Trigger);
        let player = runner.session.player().clone();
        runner.sync.connect(&player).await.unwrap();
        assert_eq!(next_event(&mut sub).await, PLAYER_JOIN);

        let report = runner.step(1.0 / 60.0, 1_000).await;
        assert_eq!(report.shots.len(), 1);
        assert_eq!(next_event(&mut sub).await, SHOT_FIRED);
        assert_eq!(next_event(&mut sub).await, PLAYER_UPDATE);

        // Inside both the fire-rate gate and the state throttle
        let report = runner.step(1.0 / 60.0, 1_020).await;
        assert!(report.shots.is_empty());
        assert_eq!(runner.renderer.frames, 2);
        assert_eq!(runner.summary.ticks, 2);
    }

    #[tokio::test]
    async fn run_announces_leave_on_shutdown() {
        let bus = LocalBus::new();
        let observer = bus.endpoint();
        let mut sub = observer.subscribe("match:1").await.unwrap();

        let mut runner = runner(&bus, Trigger);
        let summary = runner
            .run(tokio::time::sleep(Duration::from_millis(100)))
            .await
            .unwrap();
        assert!(summary.ticks > 0);
        assert!(summary.shots > 0);

        assert_eq!(next_event(&mut sub).await, PLAYER_JOIN);
        let mut last = String::new();
        while let Ok(Some(envelope)) = timeout(Duration::from_millis(200), sub.recv()).await {
            last = envelope.event;
        }
        assert_eq!(last, PLAYER_LEAVE);
    }

    #[tokio::test]
    async fn step_records_shots_and_kills() {
        let bus = LocalBus::new();
        let mut runner = runner(&bus, Trigger).with_replay(ReplayRecorder::new(1, 50));
        runner.recorder.as_mut().unwrap().start(1_000);
        {
            let remotes = runner.session.remotes();
            let mut table = remotes.write();
            let them = Player::new(2, "them", Vec3::new(0.0, 0.4, -1.5));
            let mut victim = RemotePlayer::from_payload(&PlayerStatePayload::from_player(&them), 0);
            victim.health = 20;
            table.upsert(victim);
        }

        // Not connected, so nothing is broadcast, but the tick is recorded
        let mut hit = false;
        for i in 0..30 {
            hit |= !runner.step(1.0 / 60.0, 1_000 + i * 17).await.hits.is_empty();
            if hit {
                break;
            }
        }
        assert!(hit);

        let replay = runner.replay().expect("nothing recorded");
        let events: Vec<_> = replay.frames.iter().flat_map(|frame| frame.events.iter()).collect();
        assert!(matches!(events[0], ReplayEvent::Shot { shooter_id: 1, .. }));
        assert!(events.iter().any(|event| matches!(
            event,
            ReplayEvent::Kill {
                shooter_id: 1,
                victim_id: 2
            }
        )));
        assert_eq!(replay.frames[0].players.len(), 2);
        assert_eq!(replay.frames[0].timestamp, 0);
    }

    #[test]
    fn wander_bot_is_reproducible() {
        let player = Player::new(1, "bot", Vec3::ZERO);
        let mut a = WanderBot::new(42);
        let mut b = WanderBot::new(42);
        for _ in 0..200 {
            assert_eq!(a.next_input(&player, 1.0 / 60.0), b.next_input(&player, 1.0 / 60.0));
        }
    }
}
