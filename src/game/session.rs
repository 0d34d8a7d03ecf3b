//! Local match session: one player's weapon, movement, look and projectiles

use glam::Vec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::net::remote::{RemoteTable, SharedRemoteTable};
use crate::net::sync::SyncEvent;

use super::camera::{CameraConfig, CameraPose, Orientation};
use super::level::Level;
use super::physics::{PhysicsConfig, PhysicsSystem};
use super::player::Player;
use super::projectile::{Ballistics, HitTarget, ProjectileSim};
use super::weapon::{WeaponKind, WeaponState};
use super::{PlayerId, PlayerInput};

/// Delay between death and respawn
pub const RESPAWN_DELAY_MS: u64 = 3_000;
/// Distance ahead of the eye where rounds appear
pub const MUZZLE_OFFSET: f32 = 1.0;
/// Rounds mirrored from other peers' `shot_fired`
pub const REMOTE_SHOT_BALLISTICS: Ballistics = Ballistics {
    speed: 150.0,
    range: f32::INFINITY,
};
/// Cosine of the melee cone half-angle (60 degrees)
const MELEE_CONE_COS: f32 = 0.5;

/// A round fired by the local player this tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShotReport {
    pub origin: Vec3,
    pub direction: Vec3,
    pub damage: u32,
}

/// Damage the local player dealt to a remote player this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitReport {
    pub target_id: PlayerId,
    pub damage: u32,
}

/// What happened during one tick, for the network layer to broadcast
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub shots: Vec<ShotReport>,
    pub hits: Vec<HitReport>,
    pub reload_finished: bool,
    pub died: bool,
    pub respawned: bool,
}

/// Owns everything the local client simulates
pub struct GameSession {
    player: Player,
    weapon: WeaponState,
    projectiles: ProjectileSim,
    level: Level,
    physics: PhysicsConfig,
    camera: CameraConfig,
    rng: ChaCha8Rng,
    remotes: SharedRemoteTable,
    events: Option<mpsc::UnboundedReceiver<SyncEvent>>,
    respawn_at: Option<u64>,
}

impl GameSession {
    pub fn new(id: PlayerId, name: impl Into<String>, level: Level, seed: u64) -> Self {
        let physics = PhysicsConfig::default();
        let weapon = WeaponState::new(WeaponKind::default());
        let mut player = Player::new(id, name, level.spawn_point(id));
        player.ammo = weapon.ammo();

        Self {
            player,
            weapon,
            projectiles: ProjectileSim::new(physics.player_radius),
            level,
            physics,
            camera: CameraConfig::default(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            remotes: RemoteTable::shared(),
            events: None,
            respawn_at: None,
        }
    }

    /// Read other peers from `remotes` and apply `events` each tick
    pub fn with_peers(mut self, remotes: SharedRemoteTable, events: mpsc::UnboundedReceiver<SyncEvent>) -> Self {
        self.remotes = remotes;
        self.events = Some(events);
        self
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut Player {
        &mut self.player
    }

    pub fn weapon(&self) -> &WeaponState {
        &self.weapon
    }

    pub fn projectiles(&self) -> &ProjectileSim {
        &self.projectiles
    }

    pub fn level(&self) -> &Level {
        &self.level
    }

    pub fn remotes(&self) -> SharedRemoteTable {
        self.remotes.clone()
    }

    pub fn camera_pose(&self) -> CameraPose {
        CameraPose::for_player(self.player.position, self.player.orientation, &self.camera)
    }

    /// Switch weapon by catalog id; unknown ids are ignored
    pub fn switch_weapon(&mut self, id: &str) -> bool {
        if !self.weapon.switch_weapon(id) {
            return false;
        }
        self.player.ammo = self.weapon.ammo();
        info!(player_id = self.player.id, weapon = id, "Switched weapon");
        true
    }

    /// Advance the simulation by `dt` seconds
    pub fn tick(&mut self, input: &PlayerInput, dt: f32, now_ms: u64) -> TickReport {
        let mut report = TickReport::default();

        self.apply_sync_events(now_ms, &mut report);

        if !self.player.alive && self.respawn_at.is_some_and(|at| now_ms >= at) {
            self.respawn();
            report.respawned = true;
        }

        let input = if self.player.alive {
            *input
        } else {
            PlayerInput::default()
        };

        // Weapon
        report.reload_finished = self.weapon.update(now_ms);
        if input.reload {
            self.weapon.reload(now_ms);
        }
        if input.shoot {
            self.fire(now_ms, &mut report);
        }
        self.player.ammo = self.weapon.ammo();

        // Movement
        PhysicsSystem::step(&mut self.player, &input, &self.level, &self.physics, dt);

        // Look, then recoil
        self.player
            .orientation
            .apply_look(input.look_dx, input.look_dy, &self.camera);
        let recoil = self.weapon.recoil();
        if recoil > f32::EPSILON {
            self.player.orientation.kick(recoil, &self.camera);
        }

        // Projectiles
        let targets = self.hit_targets();
        for hit in self.projectiles.update(dt, &self.level, &targets) {
            debug!(target_id = hit.target_id, damage = hit.damage, "Projectile hit");
            report.hits.push(HitReport {
                target_id: hit.target_id,
                damage: hit.damage,
            });
        }

        report
    }

    fn apply_sync_events(&mut self, now_ms: u64, report: &mut TickReport) {
        let Some(events) = self.events.as_mut() else {
            return;
        };

        while let Ok(event) = events.try_recv() {
            match event {
                SyncEvent::Damaged(damage) => {
                    if damage.victim_id != self.player.id || !self.player.alive {
                        continue;
                    }
                    let killed = self.player.take_damage(damage.damage);
                    debug!(
                        shooter_id = damage.shooter_id,
                        damage = damage.damage,
                        health = self.player.health,
                        "Took damage"
                    );
                    if killed {
                        info!(
                            player_id = self.player.id,
                            shooter_id = damage.shooter_id,
                            "Local player killed"
                        );
                        report.died = true;
                        self.respawn_at = Some(now_ms + RESPAWN_DELAY_MS);
                    }
                }
                SyncEvent::ShotFired(shot) => {
                    self.projectiles.spawn(
                        shot.origin(),
                        shot.direction(),
                        shot.damage,
                        shot.shooter_id,
                        REMOTE_SHOT_BALLISTICS,
                        false,
                    );
                }
                SyncEvent::Joined(_) | SyncEvent::Left(_) => {}
            }
        }
    }

    fn fire(&mut self, now_ms: u64, report: &mut TickReport) {
        if !self.weapon.shoot(now_ms) {
            return;
        }

        let damage = self.weapon.damage();

        if self.weapon.weapon().is_melee() {
            if let Some(target_id) = self.melee_target() {
                report.hits.push(HitReport { target_id, damage });
            }
            return;
        }

        let direction = self.spread_direction();
        let origin = self.camera_pose().eye + direction * MUZZLE_OFFSET;
        let ballistics = Ballistics {
            speed: self.weapon.projectile_speed(),
            range: self.weapon.range(),
        };

        self.projectiles
            .spawn(origin, direction, damage, self.player.id, ballistics, true);
        report.shots.push(ShotReport {
            origin,
            direction,
            damage,
        });
    }

    /// View direction jittered within the weapon's spread cone
    fn spread_direction(&mut self) -> Vec3 {
        let orientation = self.player.orientation;
        let half = self.weapon.spread().to_radians() / 2.0;
        if half <= 0.0 {
            return orientation.forward();
        }

        let yaw = self.rng.gen_range(-half..=half);
        let pitch = self.rng.gen_range(-half..=half);
        Orientation::new(orientation.yaw + yaw, orientation.pitch + pitch).forward()
    }

    /// Nearest alive remote player within melee range in front of us
    fn melee_target(&self) -> Option<PlayerId> {
        let forward = self.player.orientation.yaw_rotation() * Vec3::NEG_Z;
        let range = self.weapon.range();

        self.remotes
            .read()
            .iter()
            .filter(|remote| remote.alive)
            .filter_map(|remote| {
                let offset = remote.position - self.player.position;
                let distance = offset.length();
                if distance > range {
                    return None;
                }
                let flat = Vec3::new(offset.x, 0.0, offset.z).normalize_or_zero();
                if flat != Vec3::ZERO && flat.dot(forward) < MELEE_CONE_COS {
                    return None;
                }
                Some((remote.id, distance))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    fn hit_targets(&self) -> Vec<HitTarget> {
        self.remotes
            .read()
            .iter()
            .map(|remote| HitTarget {
                id: remote.id,
                position: remote.position,
                alive: remote.alive,
            })
            .collect()
    }

    fn respawn(&mut self) {
        let spawn = self.level.spawn_point(self.rng.gen());
        self.player.respawn(spawn);
        self.respawn_at = None;
        info!(player_id = self.player.id, x = spawn.x, z = spawn.z, "Respawned");
    }
}
