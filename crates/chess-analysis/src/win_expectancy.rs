//! Rating-aware win expectancy.
//!
//! `EP(cp, rating) = 1 / (1 + exp(-(cp / 100) × f(rating)))` where
//! `f(rating) = clamp((rating − 1200) / 2000 + 1, 0.5, 2.0)`. A stronger
//! player converts the same evaluation into a larger edge. Mate scores skip
//! the sigmoid and saturate.
//!
//! This is the only model move classification uses. The [`population`]
//! model below feeds the display path and per-player display accuracy only.

use serde::{Deserialize, Serialize};

use crate::Evaluation;

pub const RATING_PIVOT: f64 = 1200.0;
pub const RATING_SPAN: f64 = 2000.0;
pub const MIN_RATING_FACTOR: f64 = 0.5;
pub const MAX_RATING_FACTOR: f64 = 2.0;

/// Expected points when the player can force mate.
pub const MATE_WIN_EP: f64 = 0.999;
/// Expected points when the player is getting mated.
pub const MATE_LOSS_EP: f64 = 0.001;

/// How sharply `rating` converts evaluation into expected points.
pub fn rating_factor(rating: i32) -> f64 {
    ((f64::from(rating) - RATING_PIVOT) / RATING_SPAN + 1.0)
        .clamp(MIN_RATING_FACTOR, MAX_RATING_FACTOR)
}

/// Expected points for a player rated `rating`, with `eval` seen from
/// that player's side.
pub fn expected_points(eval: Evaluation, rating: i32) -> f64 {
    match eval {
        Evaluation::Mate(n) if n > 0 => MATE_WIN_EP,
        Evaluation::Mate(_) => MATE_LOSS_EP,
        Evaluation::Centipawns(cp) => {
            let x = f64::from(cp) / 100.0 * rating_factor(rating);
            1.0 / (1.0 + (-x).exp())
        }
    }
}

/// `EP(before) − EP(after)`. Negative when the move improved the position.
pub fn expected_points_loss(before: Evaluation, after: Evaluation, rating: i32) -> f64 {
    expected_points(before, rating) - expected_points(after, rating)
}

/// Expected points around one move, from the mover's side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpectedPoints {
    pub before: f64,
    pub after: f64,
    /// `before − after`, unclamped.
    pub loss: f64,
    /// `clamp((1 − loss) × 100, 0, 100)`.
    pub accuracy: f64,
}

impl ExpectedPoints {
    pub fn new(before: Evaluation, after: Evaluation, rating: i32) -> Self {
        Self::from_probabilities(
            expected_points(before, rating),
            expected_points(after, rating),
        )
    }

    pub fn from_probabilities(before: f64, after: f64) -> Self {
        let loss = before - after;
        Self {
            before,
            after,
            loss,
            accuracy: ((1.0 - loss) * 100.0).clamp(0.0, 100.0),
        }
    }

    /// Loss as the classifier sees it: improvements count as zero.
    pub fn classification_loss(&self) -> f64 {
        self.loss.max(0.0)
    }
}

/// Population-calibrated win probability and move accuracy.
///
/// Answers "how is this position going for an average player", which is
/// what an evaluation bar shows. Never used to classify moves.
pub mod population {
    pub const WIN_PROBABILITY_COEFFICIENT: f64 = 0.003_682_08;

    pub const ACCURACY_SCALE: f64 = 103.1668;
    pub const ACCURACY_DECAY: f64 = 0.04354;
    pub const ACCURACY_OFFSET: f64 = 3.1669;

    /// Win probability in `[0, 1]` for a White-relative (or mover-relative)
    /// centipawn score.
    pub fn win_probability(cp: f64) -> f64 {
        1.0 / (1.0 + (-WIN_PROBABILITY_COEFFICIENT * cp).exp())
    }

    /// Accuracy in `[0, 100]` for a drop of `delta_win_percent` percentage
    /// points of win probability.
    pub fn move_accuracy(delta_win_percent: f64) -> f64 {
        (ACCURACY_SCALE * (-ACCURACY_DECAY * delta_win_percent).exp() - ACCURACY_OFFSET)
            .clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const EPS: f64 = 1e-3;

    #[test]
    fn test_rating_factor_anchor_points() {
        assert!((rating_factor(1200) - 1.0).abs() < 1e-12);
        assert!((rating_factor(1600) - 1.2).abs() < 1e-12);
        assert!((rating_factor(2200) - 1.5).abs() < 1e-12);
        assert_eq!(rating_factor(0), MIN_RATING_FACTOR);
        assert_eq!(rating_factor(3200), MAX_RATING_FACTOR);
        assert_eq!(rating_factor(9000), MAX_RATING_FACTOR);
    }

    #[test]
    fn test_level_position_is_half_a_point() {
        for rating in [400, 1200, 1600, 2400, 3000] {
            assert_eq!(expected_points(Evaluation::Centipawns(0), rating), 0.5);
        }
    }

    #[test]
    fn test_mate_saturates() {
        assert_eq!(expected_points(Evaluation::Mate(5), 800), MATE_WIN_EP);
        assert_eq!(expected_points(Evaluation::Mate(-1), 2800), MATE_LOSS_EP);
    }

    #[test]
    fn test_rating_1600_example() {
        // f(1600) = 1.2
        let before = expected_points(Evaluation::Centipawns(150), 1600);
        let after = expected_points(Evaluation::Centipawns(100), 1600);
        assert!((before - 0.8581).abs() < EPS, "before = {before}");
        assert!((after - 0.7685).abs() < EPS, "after = {after}");

        let ep = ExpectedPoints::new(
            Evaluation::Centipawns(150),
            Evaluation::Centipawns(100),
            1600,
        );
        assert!((ep.loss - 0.0896).abs() < EPS);
        assert!((ep.accuracy - 91.04).abs() < 0.1);
    }

    #[test]
    fn test_loss_may_be_negative() {
        let loss = expected_points_loss(
            Evaluation::Centipawns(-50),
            Evaluation::Centipawns(80),
            1500,
        );
        assert!(loss < 0.0);

        let ep = ExpectedPoints::from_probabilities(0.4, 0.6);
        assert!(ep.loss < 0.0);
        assert_eq!(ep.classification_loss(), 0.0);
        assert_eq!(ep.accuracy, 100.0);
    }

    #[test]
    fn test_higher_rating_larger_edge() {
        let weak = expected_points(Evaluation::Centipawns(200), 900);
        let strong = expected_points(Evaluation::Centipawns(200), 2400);
        assert!(strong > weak);
    }

    #[test]
    fn test_population_win_probability() {
        assert_eq!(population::win_probability(0.0), 0.5);
        let p = population::win_probability(1000.0);
        assert!(p >= 0.975 && p < 0.976, "p = {p}");
        assert!((population::win_probability(-1000.0) - (1.0 - p)).abs() < 1e-12);
    }

    #[test]
    fn test_population_move_accuracy() {
        assert!((population::move_accuracy(0.0) - 99.9999).abs() < 1e-3);
        assert_eq!(population::move_accuracy(500.0), 0.0);
        assert!(population::move_accuracy(10.0) < population::move_accuracy(5.0));
        // Gains never push accuracy past 100.
        assert_eq!(population::move_accuracy(-20.0), 100.0);
    }

    proptest! {
        #[test]
        fn ep_is_a_probability(cp in -1200i32..=1200, rating in -5000i32..=10000) {
            let ep = expected_points(Evaluation::Centipawns(cp), rating);
            prop_assert!(ep > 0.0 && ep < 1.0);
        }

        #[test]
        fn ep_strictly_increasing_in_cp(cp in -1200i32..1200, rating in 0i32..=4000) {
            let lower = expected_points(Evaluation::Centipawns(cp), rating);
            let higher = expected_points(Evaluation::Centipawns(cp + 1), rating);
            prop_assert!(higher > lower);
        }

        #[test]
        fn ep_at_zero_is_half(rating in any::<i32>()) {
            prop_assert_eq!(expected_points(Evaluation::Centipawns(0), rating), 0.5);
        }

        #[test]
        fn rating_factor_clamped(rating in any::<i32>()) {
            let f = rating_factor(rating);
            prop_assert!((MIN_RATING_FACTOR..=MAX_RATING_FACTOR).contains(&f));
        }

        #[test]
        fn rating_sharpens_advantage(cp in 1i32..=1200, rating in 0i32..3000) {
            let lower = expected_points(Evaluation::Centipawns(cp), rating);
            let higher = expected_points(Evaluation::Centipawns(cp), rating + 200);
            prop_assert!(higher >= lower);
        }
    }
}
