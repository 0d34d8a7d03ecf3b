//! Projectile spawning, integration and culling

use glam::{Vec2, Vec3};
use uuid::Uuid;

use super::level::Level;
use super::PlayerId;

/// Seconds a projectile may live regardless of range
pub const PROJECTILE_LIFETIME: f32 = 10.0;
/// Radius of the vertical cylinder used for player hits
pub const PLAYER_HIT_RADIUS: f32 = 0.5;
/// Height of the player hit cylinder, measured from the feet. Tall enough
/// to cover eye level, which sits 1.8 above a 0.4 resting position.
pub const PLAYER_HIT_HEIGHT: f32 = 2.4;

/// Speed and reach of a fired round
#[derive(Debug, Clone, Copy)]
pub struct Ballistics {
    pub speed: f32,
    pub range: f32,
}

/// Active projectile
#[derive(Debug, Clone)]
pub struct Projectile {
    pub id: Uuid,
    pub shooter_id: PlayerId,
    pub position: Vec3,
    pub velocity: Vec3,
    pub damage: u32,
    pub lifetime_remaining: f32,
    pub range_remaining: f32,
    /// Fired by this client; only these resolve player hits
    pub local: bool,
}

impl Projectile {
    /// Advance position, returns false once lifetime or range is spent
    pub fn update(&mut self, dt: f32) -> bool {
        let step = self.velocity * dt;
        self.position += step;
        self.lifetime_remaining -= dt;
        self.range_remaining -= step.length();
        self.lifetime_remaining > 0.0 && self.range_remaining > 0.0
    }

    /// Sweep the segment `from -> to` against the hit cylinder of a player
    /// whose position sits `foot_offset` above their feet. Returns the
    /// fraction along the segment of the closest approach when it lands
    /// inside the cylinder.
    pub fn check_hit(from: Vec3, to: Vec3, target: Vec3, foot_offset: f32) -> Option<f32> {
        let delta = to - from;
        let flat = Vec2::new(delta.x, delta.z);
        let to_target = Vec2::new(target.x - from.x, target.z - from.z);

        // Closest approach on the ground plane
        let len_sq = flat.length_squared();
        let t = if len_sq > 1e-8 {
            (to_target.dot(flat) / len_sq).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let point = from + delta * t;
        let dx = point.x - target.x;
        let dz = point.z - target.z;
        if dx * dx + dz * dz > PLAYER_HIT_RADIUS * PLAYER_HIT_RADIUS {
            return None;
        }

        let feet = target.y - foot_offset;
        (point.y >= feet && point.y <= feet + PLAYER_HIT_HEIGHT).then_some(t)
    }
}

/// A player a local projectile may hit
#[derive(Debug, Clone, Copy)]
pub struct HitTarget {
    pub id: PlayerId,
    pub position: Vec3,
    pub alive: bool,
}

/// Hit result from projectile resolution
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectileHit {
    pub projectile_id: Uuid,
    pub shooter_id: PlayerId,
    pub target_id: PlayerId,
    pub damage: u32,
    pub position: Vec3,
}

/// Owns every live projectile of a session
#[derive(Debug, Default)]
pub struct ProjectileSim {
    projectiles: Vec<Projectile>,
    /// Height of a player's position above their feet
    foot_offset: f32,
}

impl ProjectileSim {
    pub fn new(foot_offset: f32) -> Self {
        Self {
            projectiles: Vec::new(),
            foot_offset,
        }
    }

    /// Spawn a projectile travelling along `direction`
    pub fn spawn(
        &mut self,
        position: Vec3,
        direction: Vec3,
        damage: u32,
        shooter_id: PlayerId,
        ballistics: Ballistics,
        local: bool,
    ) -> Uuid {
        let projectile = Projectile {
            id: Uuid::new_v4(),
            shooter_id,
            position,
            velocity: direction.normalize_or_zero() * ballistics.speed,
            damage,
            lifetime_remaining: PROJECTILE_LIFETIME,
            range_remaining: ballistics.range,
            local,
        };
        let id = projectile.id;
        self.projectiles.push(projectile);
        id
    }

    pub fn projectiles(&self) -> &[Projectile] {
        &self.projectiles
    }

    pub fn len(&self) -> usize {
        self.projectiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projectiles.is_empty()
    }

    pub fn clear(&mut self) {
        self.projectiles.clear();
    }

    /// Advance all projectiles, cull expired/blocked ones, and report
    /// hits of local projectiles on `targets`.
    pub fn update(&mut self, dt: f32, level: &Level, targets: &[HitTarget]) -> Vec<ProjectileHit> {
        let mut hits = Vec::new();
        let foot_offset = self.foot_offset;

        self.projectiles.retain_mut(|projectile| {
            let from = projectile.position;
            let alive = projectile.update(dt);

            if projectile.local {
                // Nearest target along this tick's path
                let target = targets
                    .iter()
                    .filter(|target| target.alive && target.id != projectile.shooter_id)
                    .filter_map(|target| {
                        Projectile::check_hit(from, projectile.position, target.position, foot_offset)
                            .map(|t| (target, t))
                    })
                    .min_by(|a, b| a.1.total_cmp(&b.1));

                if let Some((target, t)) = target {
                    hits.push(ProjectileHit {
                        projectile_id: projectile.id,
                        shooter_id: projectile.shooter_id,
                        target_id: target.id,
                        damage: projectile.damage,
                        position: from.lerp(projectile.position, t),
                    });
                    return false;
                }
            }

            alive && !level.projectile_blocked(projectile.position)
        });

        hits
    }
}
