//! Post-match ranking: ELO updates, tiers and leaderboards
//!
//! Pure functions over [`PlayerRanking`] values. Persistence belongs to
//! the caller.

pub mod elo;
pub mod tier;

pub use elo::{calculate_elo_change, k_factor};
pub use tier::{get_rank_by_elo, rank_progress, Rank, RankInfo, RankProgress};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A player's standing in ranked play
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRanking {
    pub user_id: Uuid,
    pub username: String,
    pub current_elo: u32,
    pub current_rank: Rank,
    pub wins: u32,
    pub losses: u32,
    /// Percentage of matches won
    pub win_rate: f32,
    pub total_matches: u32,
    pub last_updated: DateTime<Utc>,
}

impl PlayerRanking {
    /// Unranked newcomer
    pub fn new(user_id: Uuid, username: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            username: username.into(),
            current_elo: 0,
            current_rank: Rank::Bronze,
            wins: 0,
            losses: 0,
            win_rate: 0.0,
            total_matches: 0,
            last_updated: now,
        }
    }
}

/// Apply one match result, returning the new standing
pub fn update_player_ranking(
    player: &PlayerRanking,
    opponent_elo: u32,
    player_won: bool,
    now: DateTime<Utc>,
) -> PlayerRanking {
    let current = clamp_elo(player.current_elo);
    let change = calculate_elo_change(
        current,
        clamp_elo(opponent_elo),
        player_won,
        k_factor(player.total_matches),
    );
    let new_elo = current.saturating_add(change).max(0);

    let wins = if player_won { player.wins + 1 } else { player.wins };
    let losses = if player_won { player.losses } else { player.losses + 1 };
    let total_matches = player.total_matches + 1;

    PlayerRanking {
        current_elo: new_elo as u32,
        current_rank: get_rank_by_elo(new_elo),
        wins,
        losses,
        total_matches,
        win_rate: wins as f32 / total_matches as f32 * 100.0,
        last_updated: now,
        ..player.clone()
    }
}

/// Top `limit` players by ELO, most recently updated first on ties
pub fn leaderboard(players: &[PlayerRanking], limit: usize) -> Vec<PlayerRanking> {
    let mut sorted = players.to_vec();
    sorted.sort_by(|a, b| {
        b.current_elo
            .cmp(&a.current_elo)
            .then_with(|| b.last_updated.cmp(&a.last_updated))
    });
    sorted.truncate(limit);
    sorted
}

/// ELO with "." thousands separators, e.g. 12.345
pub fn format_elo(elo: u32) -> String {
    let digits = elo.to_string();
    let mut formatted = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            formatted.push('.');
        }
        formatted.push(ch);
    }
    formatted
}

fn clamp_elo(elo: u32) -> i32 {
    i32::try_from(elo).unwrap_or(i32::MAX)
}
