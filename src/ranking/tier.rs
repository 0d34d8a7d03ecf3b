//! Rank tiers by ELO

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rank {
    Bronze,
    Silver,
    Gold,
    Platinum,
    Diamond,
}

/// Static description of a tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankInfo {
    pub rank: Rank,
    pub min_elo: i32,
    /// Exclusive upper bound
    pub max_elo: i32,
    pub display_name: &'static str,
    pub color: &'static str,
}

pub static RANK_TIERS: [RankInfo; 5] = [
    RankInfo {
        rank: Rank::Bronze,
        min_elo: 0,
        max_elo: 1000,
        display_name: "Bronze",
        color: "#CD7F32",
    },
    RankInfo {
        rank: Rank::Silver,
        min_elo: 1000,
        max_elo: 2000,
        display_name: "Prata",
        color: "#C0C0C0",
    },
    RankInfo {
        rank: Rank::Gold,
        min_elo: 2000,
        max_elo: 3000,
        display_name: "Ouro",
        color: "#FFD700",
    },
    RankInfo {
        rank: Rank::Platinum,
        min_elo: 3000,
        max_elo: 4000,
        display_name: "Platina",
        color: "#E5E4E2",
    },
    RankInfo {
        rank: Rank::Diamond,
        min_elo: 4000,
        max_elo: 99_999,
        display_name: "Diamante",
        color: "#B9F2FF",
    },
];

impl Rank {
    pub fn info(self) -> &'static RankInfo {
        &RANK_TIERS[self as usize]
    }

    /// Next tier up, None at the top
    pub fn next(self) -> Option<Rank> {
        match self {
            Rank::Bronze => Some(Rank::Silver),
            Rank::Silver => Some(Rank::Gold),
            Rank::Gold => Some(Rank::Platinum),
            Rank::Platinum => Some(Rank::Diamond),
            Rank::Diamond => None,
        }
    }
}

/// Tier for an ELO value. Anything below 1000, negatives included, is bronze.
pub fn get_rank_by_elo(elo: i32) -> Rank {
    if elo < 1000 {
        Rank::Bronze
    } else if elo < 2000 {
        Rank::Silver
    } else if elo < 3000 {
        Rank::Gold
    } else if elo < 4000 {
        Rank::Platinum
    } else {
        Rank::Diamond
    }
}

/// Progress through the current tier
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankProgress {
    /// ELO above the tier floor
    pub current: i32,
    /// Width of the tier; 0 at the top tier
    pub next: i32,
    /// 0..=100
    pub percentage: f32,
}

pub fn rank_progress(elo: i32) -> RankProgress {
    let rank = get_rank_by_elo(elo);
    let info = rank.info();
    // Below the floor counts as no progress
    let current = elo.saturating_sub(info.min_elo).max(0);

    let Some(next_rank) = rank.next() else {
        return RankProgress {
            current,
            next: 0,
            percentage: 100.0,
        };
    };

    let next = next_rank.info().min_elo - info.min_elo;
    RankProgress {
        current,
        next,
        percentage: (current as f32 / next as f32 * 100.0).clamp(0.0, 100.0),
    }
}
