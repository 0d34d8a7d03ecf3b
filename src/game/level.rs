//! Static level geometry: axis-aligned obstacles and world bounds

use glam::Vec3;

/// Squared distance under which a player counts as touching a box
pub const MOVE_BLOCK_DIST_SQ: f32 = 0.01;
/// Squared distance under which a projectile counts as hitting a box
pub const PROJECTILE_HIT_DIST_SQ: f32 = 1.0;

/// Static axis-aligned box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Obstacle {
    pub center: Vec3,
    pub half_extents: Vec3,
}

impl Obstacle {
    pub fn new(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            center,
            half_extents,
        }
    }

    /// Box of the given width/height/depth resting on the ground at (x, z)
    pub fn on_ground(x: f32, z: f32, width: f32, height: f32, depth: f32) -> Self {
        Self::new(
            Vec3::new(x, height / 2.0, z),
            Vec3::new(width / 2.0, height / 2.0, depth / 2.0),
        )
    }

    /// Squared distance from `point` to the box surface. `radius` inflates
    /// the box on X and Z only.
    pub fn distance_sq(&self, point: Vec3, radius: f32) -> f32 {
        let d = (point - self.center).abs();
        let dx = (d.x - self.half_extents.x - radius).max(0.0);
        let dy = (d.y - self.half_extents.y).max(0.0);
        let dz = (d.z - self.half_extents.z - radius).max(0.0);
        dx * dx + dy * dy + dz * dz
    }
}

/// Level geometry shared by movement and projectile collision
#[derive(Debug, Clone, Default)]
pub struct Level {
    obstacles: Vec<Obstacle>,
    /// Square play area |x|,|z| <= bound
    bound: Option<f32>,
    spawn_points: Vec<Vec3>,
}

impl Level {
    pub fn new(obstacles: Vec<Obstacle>, bound: Option<f32>) -> Self {
        Self {
            obstacles,
            bound,
            spawn_points: Vec::new(),
        }
    }

    pub fn with_spawn_points(mut self, spawn_points: Vec<Vec3>) -> Self {
        self.spawn_points = spawn_points;
        self
    }

    /// The default arena: four corner towers, a centre block, four side blocks
    pub fn arena() -> Self {
        let obstacles = vec![
            Obstacle::on_ground(-60.0, -60.0, 15.0, 12.0, 15.0),
            Obstacle::on_ground(60.0, -60.0, 15.0, 12.0, 15.0),
            Obstacle::on_ground(-60.0, 60.0, 15.0, 12.0, 15.0),
            Obstacle::on_ground(60.0, 60.0, 15.0, 12.0, 15.0),
            Obstacle::on_ground(0.0, 0.0, 20.0, 15.0, 20.0),
            Obstacle::on_ground(-80.0, 0.0, 12.0, 10.0, 12.0),
            Obstacle::on_ground(80.0, 0.0, 12.0, 10.0, 12.0),
            Obstacle::on_ground(0.0, -80.0, 12.0, 10.0, 12.0),
            Obstacle::on_ground(0.0, 80.0, 12.0, 10.0, 12.0),
        ];

        Self::new(obstacles, Some(300.0)).with_spawn_points(vec![
            Vec3::new(-30.0, 5.0, -30.0),
            Vec3::new(30.0, 5.0, 30.0),
            Vec3::new(-30.0, 5.0, 30.0),
            Vec3::new(30.0, 5.0, -30.0),
        ])
    }

    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    /// Spawn point for a player, stable per id
    pub fn spawn_point(&self, index: u64) -> Vec3 {
        if self.spawn_points.is_empty() {
            return Vec3::new(0.0, 5.0, 0.0);
        }
        self.spawn_points[(index % self.spawn_points.len() as u64) as usize]
    }

    /// Whether a body of `radius` may occupy `position`
    pub fn can_move_to(&self, position: Vec3, radius: f32) -> bool {
        if let Some(bound) = self.bound {
            if position.x.abs() > bound || position.z.abs() > bound {
                return false;
            }
        }

        !self
            .obstacles
            .iter()
            .any(|obstacle| obstacle.distance_sq(position, radius) < MOVE_BLOCK_DIST_SQ)
    }

    /// Whether a projectile at `position` hits any obstacle
    pub fn projectile_blocked(&self, position: Vec3) -> bool {
        self.obstacles
            .iter()
            .any(|obstacle| obstacle.distance_sq(position, 0.0) < PROJECTILE_HIT_DIST_SQ)
    }
}
