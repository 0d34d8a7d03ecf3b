//! ELO rating arithmetic

/// K-factor for players still in their first matches
pub const K_FACTOR_NEW: i32 = 48;
pub const K_FACTOR_DEFAULT: i32 = 32;
/// Matches played before a player stops counting as new
pub const NEW_PLAYER_MATCHES: u32 = 30;

pub fn k_factor(total_matches: u32) -> i32 {
    if total_matches < NEW_PLAYER_MATCHES {
        K_FACTOR_NEW
    } else {
        K_FACTOR_DEFAULT
    }
}

/// Probability that `player` beats `opponent`
pub fn expected_score(player_elo: i32, opponent_elo: i32) -> f64 {
    1.0 / (1.0 + 10f64.powf(f64::from(opponent_elo - player_elo) / 400.0))
}

/// Rating delta for `player` after one match. Halves round up, so
/// -7.5 becomes -7.
pub fn calculate_elo_change(player_elo: i32, opponent_elo: i32, player_won: bool, k_factor: i32) -> i32 {
    let actual = if player_won { 1.0 } else { 0.0 };
    let change = f64::from(k_factor) * (actual - expected_score(player_elo, opponent_elo));
    (change + 0.5).floor() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_ratings_move_half_k() {
        assert_eq!(calculate_elo_change(1500, 1500, true, 32), 16);
        assert_eq!(calculate_elo_change(1500, 1500, false, 32), -16);
        assert_eq!(calculate_elo_change(1000, 1000, true, 48), 24);
    }

    #[test]
    fn winner_gains_and_loser_loses() {
        for (a, b) in [(1000, 1500), (1500, 1000), (2200, 2210), (0, 4000)] {
            assert!(calculate_elo_change(a, b, true, 32) >= 0);
            assert!(calculate_elo_change(a, b, false, 32) <= 0);
        }
        assert!(calculate_elo_change(1200, 1300, true, 32) > 0);
        assert!(calculate_elo_change(1300, 1200, false, 32) < 0);
    }

    #[test]
    fn upset_win_pays_more_than_expected_win() {
        let upset = calculate_elo_change(1000, 1500, true, 32);
        let expected = calculate_elo_change(1500, 1000, true, 32);
        assert!(upset > expected);
        assert_eq!(upset, 30);
        assert_eq!(expected, 2);
    }

    #[test]
    fn halves_round_towards_positive_infinity() {
        // 1000 vs 1000 with K = 15 gives exactly +-7.5
        assert_eq!(calculate_elo_change(1000, 1000, true, 15), 8);
        assert_eq!(calculate_elo_change(1000, 1000, false, 15), -7);
    }

    #[test]
    fn new_players_use_larger_k() {
        assert_eq!(k_factor(0), 48);
        assert_eq!(k_factor(29), 48);
        assert_eq!(k_factor(30), 32);
    }
}
