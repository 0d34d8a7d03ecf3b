//! Local player state

use glam::Vec3;

use super::camera::Orientation;
use super::PlayerId;

pub const MAX_HEALTH: i32 = 100;

/// A player as simulated by the client that owns it
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub position: Vec3,
    pub orientation: Orientation,
    /// Only the vertical component is integrated; x/z carry residual
    /// velocity that friction bleeds off.
    pub velocity: Vec3,
    pub health: i32,
    pub ammo: u32,
    pub alive: bool,
}

impl Player {
    pub fn new(id: PlayerId, name: impl Into<String>, spawn: Vec3) -> Self {
        Self {
            id,
            name: name.into(),
            position: spawn,
            orientation: Orientation::default(),
            velocity: Vec3::ZERO,
            health: MAX_HEALTH,
            ammo: 0,
            alive: true,
        }
    }

    /// Apply damage; returns true if this hit killed the player
    pub fn take_damage(&mut self, amount: u32) -> bool {
        if !self.alive {
            return false;
        }

        let amount = i32::try_from(amount).unwrap_or(i32::MAX);
        self.health = self.health.saturating_sub(amount).max(0);
        if self.health == 0 {
            self.alive = false;
            return true;
        }
        false
    }

    pub fn respawn(&mut self, position: Vec3) {
        self.position = position;
        self.velocity = Vec3::ZERO;
        self.health = MAX_HEALTH;
        self.alive = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn damage_clamps_at_zero_and_kills() {
        let mut player = Player::new(1, "alice", Vec3::ZERO);
        assert!(!player.take_damage(60));
        assert_eq!(player.health, 40);
        assert!(player.take_damage(80));
        assert_eq!(player.health, 0);
        assert!(!player.alive);
        // Dead players ignore further hits
        assert!(!player.take_damage(10));
        assert_eq!(player.health, 0);
    }

    #[test]
    fn respawn_restores_health() {
        let mut player = Player::new(1, "alice", Vec3::ZERO);
        player.take_damage(100);
        player.respawn(Vec3::new(5.0, 0.4, 5.0));
        assert!(player.alive);
        assert_eq!(player.health, MAX_HEALTH);
        assert_eq!(player.position, Vec3::new(5.0, 0.4, 5.0));
    }
}
