//! Client-side game simulation modules

pub mod camera;
pub mod level;
pub mod physics;
pub mod player;
pub mod projectile;
pub mod replay;
pub mod runner;
pub mod session;
pub mod weapon;

pub use camera::{CameraConfig, CameraPose, Orientation};
pub use level::{Level, Obstacle};
pub use physics::{PhysicsConfig, PhysicsSystem};
pub use player::Player;
pub use projectile::{Ballistics, ProjectileHit, ProjectileSim};
pub use replay::{Replay, ReplayPlayer, ReplayRecorder};
pub use runner::{InputSource, MatchRunner, Renderer};
pub use session::{GameSession, TickReport};
pub use weapon::{WeaponKind, WeaponState};

/// Player identifier as carried on the wire
pub type PlayerId = u64;

/// Input state for a single tick
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlayerInput {
    pub move_forward: bool,
    pub move_backward: bool,
    pub move_left: bool,
    pub move_right: bool,
    pub sprint: bool,
    pub jump: bool,
    pub shoot: bool,
    pub reload: bool,
    /// Pointer delta accumulated since the previous tick (pixels)
    pub look_dx: f32,
    pub look_dy: f32,
}
