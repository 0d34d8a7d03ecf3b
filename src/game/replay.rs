//! Match replays: a recorder sampling the local view of a match, and a
//! player that steps back through the captured frames

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::net::remote::RemotePlayer;
use crate::util::rate_limit::Throttle;

use super::player::Player;
use super::PlayerId;

/// Default gap between two recorded frames
pub const REPLAY_FRAME_INTERVAL_MS: u64 = 50;
pub const MIN_PLAYBACK_SPEED: f32 = 0.1;
pub const MAX_PLAYBACK_SPEED: f32 = 2.0;

/// One player as seen in a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayPlayerState {
    pub id: PlayerId,
    pub position: Vec3,
    pub rot_x: f32,
    pub rot_y: f32,
    pub health: i32,
    pub ammo: u32,
    pub is_alive: bool,
}

impl ReplayPlayerState {
    pub fn from_player(player: &Player) -> Self {
        Self {
            id: player.id,
            position: player.position,
            rot_x: player.orientation.pitch,
            rot_y: player.orientation.yaw,
            health: player.health,
            ammo: player.ammo,
            is_alive: player.alive,
        }
    }

    pub fn from_remote(remote: &RemotePlayer) -> Self {
        Self {
            id: remote.id,
            position: remote.position,
            rot_x: remote.orientation.pitch,
            rot_y: remote.orientation.yaw,
            health: remote.health,
            ammo: remote.ammo,
            is_alive: remote.alive,
        }
    }
}

/// Something that happened between two frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplayEvent {
    #[serde(rename_all = "camelCase")]
    Shot { shooter_id: PlayerId, position: Vec3 },
    #[serde(rename_all = "camelCase")]
    Damage {
        shooter_id: PlayerId,
        victim_id: PlayerId,
        damage: u32,
    },
    #[serde(rename_all = "camelCase")]
    Kill { shooter_id: PlayerId, victim_id: PlayerId },
    #[serde(rename_all = "camelCase")]
    Death { victim_id: PlayerId },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayFrame {
    /// Milliseconds since recording started
    pub timestamp: u64,
    pub players: Vec<ReplayPlayerState>,
    pub events: Vec<ReplayEvent>,
}

/// A finished recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Replay {
    pub match_id: u64,
    pub duration_ms: u64,
    pub frames: Vec<ReplayFrame>,
}

impl Replay {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Samples frames at a fixed interval while recording. Events pushed
/// between samples are attached to the next frame.
#[derive(Debug)]
pub struct ReplayRecorder {
    match_id: u64,
    frames: Vec<ReplayFrame>,
    pending: Vec<ReplayEvent>,
    started_at: u64,
    recording: bool,
    throttle: Throttle,
}

impl ReplayRecorder {
    pub fn new(match_id: u64, frame_interval_ms: u64) -> Self {
        Self {
            match_id,
            frames: Vec::new(),
            pending: Vec::new(),
            started_at: 0,
            recording: false,
            throttle: Throttle::new(frame_interval_ms),
        }
    }

    /// Start a fresh recording, discarding earlier frames
    pub fn start(&mut self, now_ms: u64) {
        self.frames.clear();
        self.pending.clear();
        self.started_at = now_ms;
        self.recording = true;
        self.throttle.reset();
        info!(match_id = self.match_id, "Replay recording started");
    }

    pub fn stop(&mut self) {
        if self.recording {
            info!(
                match_id = self.match_id,
                frames = self.frames.len(),
                duration_ms = self.duration_ms(),
                "Replay recording stopped"
            );
        }
        self.recording = false;
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Queue events for the next frame; ignored while stopped
    pub fn push_events(&mut self, events: impl IntoIterator<Item = ReplayEvent>) {
        if self.recording {
            self.pending.extend(events);
        }
    }

    /// Record a frame if one is due. `players` is only called when it is.
    pub fn record_frame<F>(&mut self, now_ms: u64, players: F) -> bool
    where
        F: FnOnce() -> Vec<ReplayPlayerState>,
    {
        if !self.recording || !self.throttle.try_acquire(now_ms) {
            return false;
        }

        self.frames.push(ReplayFrame {
            timestamp: now_ms.saturating_sub(self.started_at),
            players: players(),
            events: std::mem::take(&mut self.pending),
        });
        true
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn duration_ms(&self) -> u64 {
        self.frames.last().map_or(0, |frame| frame.timestamp)
    }

    /// Snapshot of everything recorded so far; None when empty
    pub fn replay(&self) -> Option<Replay> {
        if self.frames.is_empty() {
            return None;
        }
        Some(Replay {
            match_id: self.match_id,
            duration_ms: self.duration_ms(),
            frames: self.frames.clone(),
        })
    }
}

/// Time-driven playback over a loaded [`Replay`]
#[derive(Debug)]
pub struct ReplayPlayer {
    frames: Vec<ReplayFrame>,
    index: usize,
    /// Playback clock in replay milliseconds
    clock_ms: f64,
    playing: bool,
    speed: f32,
}

impl Default for ReplayPlayer {
    fn default() -> Self {
        Self {
            frames: Vec::new(),
            index: 0,
            clock_ms: 0.0,
            playing: false,
            speed: 1.0,
        }
    }
}

impl ReplayPlayer {
    pub fn new(replay: Replay) -> Self {
        let mut player = Self::default();
        player.load(replay);
        player
    }

    /// Replace the loaded frames and rewind
    pub fn load(&mut self, replay: Replay) {
        debug!(match_id = replay.match_id, frames = replay.frames.len(), "Replay loaded");
        self.frames = replay.frames;
        self.stop();
    }

    pub fn play(&mut self) {
        self.playing = !self.frames.is_empty();
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    /// Pause and rewind to the first frame
    pub fn stop(&mut self) {
        self.playing = false;
        self.index = 0;
        self.clock_ms = self.frames.first().map_or(0.0, |frame| frame.timestamp as f64);
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.speed = if speed.is_nan() {
            1.0
        } else {
            speed.clamp(MIN_PLAYBACK_SPEED, MAX_PLAYBACK_SPEED)
        };
    }

    /// Jump to the first frame at or after `timestamp`, or the last frame
    pub fn seek(&mut self, timestamp: u64) {
        let Some(last) = self.frames.len().checked_sub(1) else {
            return;
        };
        self.index = self
            .frames
            .iter()
            .position(|frame| frame.timestamp >= timestamp)
            .unwrap_or(last);
        self.clock_ms = self.frames[self.index].timestamp as f64;
    }

    /// Advance the playback clock by `dt` seconds scaled by the speed.
    /// Returns the new frame when playback moved onto one.
    pub fn update(&mut self, dt: f32) -> Option<&ReplayFrame> {
        if !self.playing || self.frames.is_empty() {
            return None;
        }

        self.clock_ms += f64::from(dt) * f64::from(self.speed) * 1000.0;

        let previous = self.index;
        while self.index + 1 < self.frames.len()
            && self.frames[self.index + 1].timestamp as f64 <= self.clock_ms
        {
            self.index += 1;
        }

        if self.index + 1 == self.frames.len() {
            self.playing = false;
        }

        (self.index != previous).then(|| &self.frames[self.index])
    }

    pub fn current_frame(&self) -> Option<&ReplayFrame> {
        self.frames.get(self.index)
    }

    pub fn current_index(&self) -> usize {
        self.index
    }

    pub fn total_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(id: PlayerId, x: f32) -> ReplayPlayerState {
        ReplayPlayerState {
            id,
            position: Vec3::new(x, 0.4, 0.0),
            rot_x: 0.0,
            rot_y: 0.0,
            health: 100,
            ammo: 30,
            is_alive: true,
        }
    }

    /// Frames every 100 ms from 0 to 900
    fn ten_frames() -> Replay {
        let mut recorder = ReplayRecorder::new(4, 100);
        recorder.start(5_000);
        for i in 0..10u64 {
            assert!(recorder.record_frame(5_000 + i * 100, || vec![state(1, i as f32)]));
        }
        recorder.replay().unwrap()
    }

    #[test]
    fn recorder_ignores_frames_while_stopped() {
        let mut recorder = ReplayRecorder::new(1, 50);
        assert!(!recorder.record_frame(0, Vec::new));
        recorder.push_events([ReplayEvent::Death { victim_id: 1 }]);

        recorder.start(1_000);
        assert!(recorder.record_frame(1_000, Vec::new));
        recorder.stop();
        assert!(!recorder.record_frame(2_000, Vec::new));

        let replay = recorder.replay().unwrap();
        assert_eq!(replay.frames.len(), 1);
        assert!(replay.frames[0].events.is_empty());
    }

    #[test]
    fn timestamps_are_relative_and_sampled() {
        let mut recorder = ReplayRecorder::new(1, 50);
        recorder.start(10_000);
        let mut calls = 0;
        for now in (10_000..10_200).step_by(10) {
            recorder.record_frame(now, || {
                calls += 1;
                Vec::new()
            });
        }

        assert_eq!(recorder.frame_count(), 4);
        assert_eq!(calls, 4);
        assert_eq!(recorder.duration_ms(), 150);
    }

    #[test]
    fn events_land_in_the_next_frame() {
        let mut recorder = ReplayRecorder::new(1, 50);
        recorder.start(0);
        recorder.record_frame(0, Vec::new);

        recorder.push_events([ReplayEvent::Shot {
            shooter_id: 1,
            position: Vec3::ZERO,
        }]);
        assert!(!recorder.record_frame(20, Vec::new));
        recorder.push_events([ReplayEvent::Damage {
            shooter_id: 1,
            victim_id: 2,
            damage: 25,
        }]);
        assert!(recorder.record_frame(50, Vec::new));

        let replay = recorder.replay().unwrap();
        assert!(replay.frames[0].events.is_empty());
        assert_eq!(replay.frames[1].events.len(), 2);
    }

    #[test]
    fn restart_discards_previous_recording() {
        let mut recorder = ReplayRecorder::new(1, 50);
        recorder.start(0);
        recorder.record_frame(0, Vec::new);
        recorder.record_frame(100, Vec::new);
        recorder.start(500);
        assert_eq!(recorder.frame_count(), 0);
        assert!(recorder.replay().is_none());
    }

    #[test]
    fn json_uses_wire_names() {
        let mut replay = ten_frames();
        replay.frames[0].events.push(ReplayEvent::Kill {
            shooter_id: 1,
            victim_id: 2,
        });

        let value = serde_json::to_value(&replay).unwrap();
        assert_eq!(value["matchId"], 4);
        assert_eq!(value["durationMs"], 900);
        assert_eq!(value["frames"][0]["players"][0]["isAlive"], true);
        assert_eq!(value["frames"][0]["events"][0]["type"], "kill");
        assert_eq!(value["frames"][0]["events"][0]["victimId"], 2);

        let parsed = Replay::from_json(&replay.to_json().unwrap()).unwrap();
        assert_eq!(parsed, replay);
    }

    #[test]
    fn playback_follows_the_clock() {
        let mut player = ReplayPlayer::new(ten_frames());
        assert!(player.update(1.0).is_none(), "paused by default");

        player.play();
        assert!(player.update(0.05).is_none());
        assert_eq!(player.update(0.05).map(|f| f.timestamp), Some(100));
        assert_eq!(player.update(0.25).map(|f| f.timestamp), Some(300));

        player.pause();
        assert!(player.update(1.0).is_none());
        assert_eq!(player.current_index(), 3);
    }

    #[test]
    fn speed_is_clamped_and_scales_time() {
        let mut player = ReplayPlayer::new(ten_frames());
        player.set_speed(10.0);
        assert_eq!(player.speed(), MAX_PLAYBACK_SPEED);
        player.set_speed(0.0);
        assert_eq!(player.speed(), MIN_PLAYBACK_SPEED);

        player.set_speed(2.0);
        player.play();
        assert_eq!(player.update(0.1).map(|f| f.timestamp), Some(200));

        player.set_speed(0.1);
        assert!(player.update(0.5).is_none());
        assert_eq!(player.update(0.5).map(|f| f.timestamp), Some(300));
    }

    #[test]
    fn stops_at_the_end() {
        let mut player = ReplayPlayer::new(ten_frames());
        player.play();
        assert_eq!(player.update(5.0).map(|f| f.timestamp), Some(900));
        assert!(!player.is_playing());
        assert_eq!(player.current_index(), player.total_frames() - 1);
    }

    #[test]
    fn seek_and_stop() {
        let mut player = ReplayPlayer::new(ten_frames());
        player.seek(250);
        assert_eq!(player.current_frame().unwrap().timestamp, 300);
        player.seek(10_000);
        assert_eq!(player.current_index(), 9);

        player.stop();
        assert_eq!(player.current_index(), 0);
        assert!(!player.is_playing());

        // Playback resumes from the sought frame
        player.seek(500);
        player.play();
        assert_eq!(player.update(0.1).map(|f| f.timestamp), Some(600));
    }

    #[test]
    fn empty_replay_never_plays() {
        let mut player = ReplayPlayer::default();
        player.play();
        player.seek(100);
        assert!(!player.is_playing());
        assert!(player.update(1.0).is_none());
        assert!(player.current_frame().is_none());
    }
}
