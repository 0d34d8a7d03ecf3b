//! Player movement, gravity and slide-on-collision against level boxes

use glam::Vec3;

use super::level::Level;
use super::player::Player;
use super::PlayerInput;

/// Movement constants
#[derive(Debug, Clone, Copy)]
pub struct PhysicsConfig {
    /// Downward acceleration (units/s²)
    pub gravity: f32,
    /// Walking speed (units/s)
    pub move_speed: f32,
    /// Sprinting speed (units/s)
    pub sprint_speed: f32,
    /// Vertical velocity applied on jump
    pub jump_force: f32,
    /// Collision radius on X/Z; also the resting height above ground
    pub player_radius: f32,
    /// Per-tick multiplier on residual horizontal velocity (None = off)
    pub friction: Option<f32>,
    pub ground_height: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: 25.0,
            move_speed: 12.0,
            sprint_speed: 18.0,
            jump_force: 10.0,
            player_radius: 0.4,
            friction: Some(0.85),
            ground_height: 0.0,
        }
    }
}

/// Physics system for stepping the local player
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Unit move direction in local space (-Z forward, +X right)
    pub fn local_move_direction(input: &PlayerInput) -> Vec3 {
        let mut direction = Vec3::ZERO;
        if input.move_forward {
            direction.z -= 1.0;
        }
        if input.move_backward {
            direction.z += 1.0;
        }
        if input.move_left {
            direction.x -= 1.0;
        }
        if input.move_right {
            direction.x += 1.0;
        }
        direction.normalize_or_zero()
    }

    /// World-space displacement for this tick
    pub fn displacement(input: &PlayerInput, yaw_rotation: glam::Quat, dt: f32, cfg: &PhysicsConfig) -> Vec3 {
        let speed = if input.sprint {
            cfg.sprint_speed
        } else {
            cfg.move_speed
        };
        yaw_rotation * Self::local_move_direction(input) * (speed * dt)
    }

    /// Advance one player by `dt` seconds
    pub fn step(player: &mut Player, input: &PlayerInput, level: &Level, cfg: &PhysicsConfig, dt: f32) {
        let displacement = Self::displacement(input, player.orientation.yaw_rotation(), dt, cfg);
        player.position = Self::resolve_move(player.position, displacement, level, cfg.player_radius);

        // Gravity
        player.velocity.y -= cfg.gravity * dt;

        // Ground clamp and jump, tested against where this tick would land
        let rest_height = cfg.ground_height + cfg.player_radius;
        if player.position.y + player.velocity.y * dt <= rest_height {
            player.position.y = rest_height;
            player.velocity.y = 0.0;

            if input.jump {
                player.velocity.y = cfg.jump_force;
            }
        } else {
            player.position.y += player.velocity.y * dt;
        }

        if let Some(friction) = cfg.friction {
            player.velocity.x *= friction;
            player.velocity.z *= friction;
        }
    }

    /// Try the full move, then each horizontal axis on its own.
    ///
    /// Not a swept test: a fast enough move can skip through thin boxes.
    pub fn resolve_move(position: Vec3, displacement: Vec3, level: &Level, radius: f32) -> Vec3 {
        if displacement == Vec3::ZERO {
            return position;
        }

        let target = position + displacement;
        if level.can_move_to(target, radius) {
            return target;
        }

        let mut resolved = position;

        let slide_x = Vec3::new(position.x + displacement.x, position.y, position.z);
        if level.can_move_to(slide_x, radius) {
            resolved.x = slide_x.x;
        }

        let slide_z = Vec3::new(position.x, position.y, position.z + displacement.z);
        if level.can_move_to(slide_z, radius) {
            resolved.z = slide_z.z;
        }

        resolved
    }
}
