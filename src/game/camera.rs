//! First-person look orientation (yaw/pitch, no roll)

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Look tuning
#[derive(Debug, Clone, Copy)]
pub struct CameraConfig {
    /// Radians per pixel of pointer movement
    pub sensitivity: f32,
    /// Max absolute pitch in radians
    pub pitch_limit: f32,
    /// Eye height above the player position
    pub eye_height: f32,
    /// Radians of upward pitch per unit of recoil read
    pub recoil_kick: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            sensitivity: 0.004,
            pitch_limit: std::f32::consts::PI / 2.5,
            eye_height: 1.8,
            recoil_kick: 0.01,
        }
    }
}

/// Yaw/pitch pair. Yaw is unbounded, pitch is clamped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub yaw: f32,
    pub pitch: f32,
}

impl Orientation {
    pub fn new(yaw: f32, pitch: f32) -> Self {
        Self { yaw, pitch }
    }

    /// Apply an accumulated pointer delta
    pub fn apply_look(&mut self, dx: f32, dy: f32, cfg: &CameraConfig) {
        self.yaw -= dx * cfg.sensitivity;
        self.pitch -= dy * cfg.sensitivity;
        self.clamp_pitch(cfg);
    }

    /// Tilt the view upwards (recoil)
    pub fn kick(&mut self, amount: f32, cfg: &CameraConfig) {
        self.pitch += amount * cfg.recoil_kick;
        self.clamp_pitch(cfg);
    }

    fn clamp_pitch(&mut self, cfg: &CameraConfig) {
        self.pitch = self.pitch.clamp(-cfg.pitch_limit, cfg.pitch_limit);
    }

    /// Rotation with yaw applied first, then local pitch
    pub fn rotation(&self) -> Quat {
        Quat::from_rotation_y(self.yaw) * Quat::from_rotation_x(self.pitch)
    }

    /// Rotation around the vertical axis only (movement frame)
    pub fn yaw_rotation(&self) -> Quat {
        Quat::from_rotation_y(self.yaw)
    }

    /// Unit view direction; yaw 0 / pitch 0 looks down -Z
    pub fn forward(&self) -> Vec3 {
        self.rotation() * Vec3::NEG_Z
    }
}

/// Where the renderer should place the camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    pub eye: Vec3,
    pub orientation: Orientation,
}

impl CameraPose {
    pub fn for_player(position: Vec3, orientation: Orientation, cfg: &CameraConfig) -> Self {
        Self {
            eye: position + Vec3::Y * cfg.eye_height,
            orientation,
        }
    }

    pub fn forward(&self) -> Vec3 {
        self.orientation.forward()
    }
}
