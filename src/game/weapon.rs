//! Weapon catalog and per-player weapon state (ammo, fire rate, reload, recoil)

use serde::{Deserialize, Serialize};

use crate::util::time::secs_to_millis;

/// Weapon families available in the catalog
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaponKind {
    #[default]
    Rifle,
    Pistol,
    Shotgun,
    Smg,
    Sniper,
    Melee,
}

impl WeaponKind {
    pub const ALL: [WeaponKind; 6] = [
        WeaponKind::Rifle,
        WeaponKind::Pistol,
        WeaponKind::Shotgun,
        WeaponKind::Smg,
        WeaponKind::Sniper,
        WeaponKind::Melee,
    ];

    /// Look up a kind by its catalog id
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.id() == id)
    }

    pub fn id(self) -> &'static str {
        self.stats().id
    }

    /// Catalog entry for this kind
    pub fn stats(self) -> &'static Weapon {
        match self {
            WeaponKind::Rifle => &WEAPONS[0],
            WeaponKind::Pistol => &WEAPONS[1],
            WeaponKind::Shotgun => &WEAPONS[2],
            WeaponKind::Smg => &WEAPONS[3],
            WeaponKind::Sniper => &WEAPONS[4],
            WeaponKind::Melee => &WEAPONS[5],
        }
    }
}

/// Immutable weapon stats
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Weapon {
    pub id: &'static str,
    pub name: &'static str,
    pub kind: WeaponKind,
    /// Damage per hit
    pub damage: u32,
    /// Shots per second
    pub fire_rate: f32,
    /// Rounds per magazine
    pub magazine_size: u32,
    /// Reload duration (seconds)
    pub reload_time: f32,
    /// Max travel distance (world units)
    pub range: f32,
    /// 0..1, higher is tighter
    pub accuracy: f32,
    /// 0..1 recoil kick per shot
    pub recoil: f32,
    /// Base spread (degrees)
    pub spread: f32,
    /// Projectile speed (units per second), 0 for melee
    pub projectile_speed: f32,
    /// Affects movement speed
    pub weight: f32,
}

impl Weapon {
    /// Minimum gap between two shots in milliseconds
    pub fn fire_interval_ms(&self) -> f32 {
        1000.0 / self.fire_rate
    }

    pub fn is_melee(&self) -> bool {
        self.projectile_speed <= 0.0
    }
}

pub static WEAPONS: [Weapon; 6] = [
    Weapon {
        id: "rifle",
        name: "Rifle Assault",
        kind: WeaponKind::Rifle,
        damage: 25,
        fire_rate: 10.0,
        magazine_size: 30,
        reload_time: 2.5,
        range: 100.0,
        accuracy: 0.85,
        recoil: 0.4,
        spread: 2.0,
        projectile_speed: 300.0,
        weight: 1.0,
    },
    Weapon {
        id: "pistol",
        name: "Pistol 9mm",
        kind: WeaponKind::Pistol,
        damage: 15,
        fire_rate: 8.0,
        magazine_size: 15,
        reload_time: 1.5,
        range: 50.0,
        accuracy: 0.75,
        recoil: 0.2,
        spread: 3.0,
        projectile_speed: 250.0,
        weight: 0.5,
    },
    Weapon {
        id: "shotgun",
        name: "Shotgun",
        kind: WeaponKind::Shotgun,
        damage: 60,
        fire_rate: 1.0,
        magazine_size: 8,
        reload_time: 3.0,
        range: 25.0,
        accuracy: 0.5,
        recoil: 0.8,
        spread: 15.0,
        projectile_speed: 200.0,
        weight: 1.5,
    },
    Weapon {
        id: "smg",
        name: "Submachine Gun",
        kind: WeaponKind::Smg,
        damage: 12,
        fire_rate: 20.0,
        magazine_size: 40,
        reload_time: 2.0,
        range: 40.0,
        accuracy: 0.7,
        recoil: 0.6,
        spread: 4.0,
        projectile_speed: 280.0,
        weight: 0.8,
    },
    Weapon {
        id: "sniper",
        name: "Sniper",
        kind: WeaponKind::Sniper,
        damage: 80,
        fire_rate: 1.0,
        magazine_size: 5,
        reload_time: 2.5,
        range: 300.0,
        accuracy: 0.98,
        recoil: 0.9,
        spread: 0.5,
        projectile_speed: 400.0,
        weight: 2.0,
    },
    Weapon {
        id: "melee",
        name: "Knife",
        kind: WeaponKind::Melee,
        damage: 50,
        fire_rate: 2.0,
        magazine_size: 999,
        reload_time: 0.0,
        range: 2.0,
        accuracy: 1.0,
        recoil: 0.0,
        spread: 0.0,
        projectile_speed: 0.0,
        weight: 0.3,
    },
];

/// Multiplier applied to the stored recoil on every read
const RECOIL_DECAY: f32 = 0.9;

/// Weapon state owned by one player
#[derive(Debug, Clone)]
pub struct WeaponState {
    weapon: &'static Weapon,
    ammo: u32,
    /// Timestamp at which an in-flight reload completes
    reload_deadline: Option<u64>,
    reload_started_at: Option<u64>,
    last_shot_at: Option<u64>,
    recoil: f32,
}

impl WeaponState {
    pub fn new(kind: WeaponKind) -> Self {
        let weapon = kind.stats();
        Self {
            weapon,
            ammo: weapon.magazine_size,
            reload_deadline: None,
            reload_started_at: None,
            last_shot_at: None,
            recoil: 0.0,
        }
    }

    pub fn weapon(&self) -> &'static Weapon {
        self.weapon
    }

    pub fn ammo(&self) -> u32 {
        self.ammo
    }

    pub fn magazine_size(&self) -> u32 {
        self.weapon.magazine_size
    }

    pub fn is_reloading(&self) -> bool {
        self.reload_deadline.is_some()
    }

    pub fn damage(&self) -> u32 {
        self.weapon.damage
    }

    pub fn range(&self) -> f32 {
        self.weapon.range
    }

    pub fn projectile_speed(&self) -> f32 {
        self.weapon.projectile_speed
    }

    pub fn weight(&self) -> f32 {
        self.weapon.weight
    }

    /// Settle a reload whose deadline has passed.
    /// Returns true if a reload completed on this call.
    pub fn update(&mut self, now_ms: u64) -> bool {
        match self.reload_deadline {
            Some(deadline) if now_ms >= deadline => {
                self.ammo = self.weapon.magazine_size;
                self.reload_deadline = None;
                self.reload_started_at = None;
                true
            }
            _ => false,
        }
    }

    pub fn can_shoot(&mut self, now_ms: u64) -> bool {
        self.update(now_ms);

        if self.is_reloading() || self.ammo == 0 {
            return false;
        }

        match self.last_shot_at {
            Some(last) => (now_ms.saturating_sub(last) as f32) >= self.weapon.fire_interval_ms(),
            None => true,
        }
    }

    /// Fire one round. Returns false (and changes nothing) if the weapon
    /// cannot shoot right now.
    pub fn shoot(&mut self, now_ms: u64) -> bool {
        if !self.can_shoot(now_ms) {
            return false;
        }

        self.last_shot_at = Some(now_ms);
        self.ammo -= 1;
        self.recoil = self.weapon.recoil;

        // Empty magazine reloads on its own
        if self.ammo == 0 {
            self.reload(now_ms);
        }

        true
    }

    /// Start a reload. Returns false if already reloading or full.
    pub fn reload(&mut self, now_ms: u64) -> bool {
        self.update(now_ms);

        if self.is_reloading() || self.ammo == self.weapon.magazine_size {
            return false;
        }

        self.reload_started_at = Some(now_ms);
        self.reload_deadline = Some(now_ms + secs_to_millis(self.weapon.reload_time));
        true
    }

    /// Replace the weapon by catalog id. Unknown ids are ignored.
    pub fn switch_weapon(&mut self, id: &str) -> bool {
        let Some(kind) = WeaponKind::from_id(id) else {
            return false;
        };

        self.weapon = kind.stats();
        self.ammo = self.weapon.magazine_size;
        self.reload_deadline = None;
        self.reload_started_at = None;
        true
    }

    /// Current recoil; every read decays the stored value.
    pub fn recoil(&mut self) -> f32 {
        let recoil = self.recoil;
        self.recoil *= RECOIL_DECAY;
        recoil
    }

    /// Spread in degrees, wider for less accurate weapons
    pub fn spread(&self) -> f32 {
        let accuracy_modifier = 1.0 - self.weapon.accuracy;
        self.weapon.spread * (1.0 + accuracy_modifier)
    }

    /// Reload completion in 0..1, None when not reloading
    pub fn reload_progress(&self, now_ms: u64) -> Option<f32> {
        let (start, deadline) = (self.reload_started_at?, self.reload_deadline?);
        let total = deadline.saturating_sub(start);
        if total == 0 {
            return Some(1.0);
        }
        Some((now_ms.saturating_sub(start) as f32 / total as f32).clamp(0.0, 1.0))
    }
}

impl Default for WeaponState {
    fn default() -> Self {
        Self::new(WeaponKind::default())
    }
}
