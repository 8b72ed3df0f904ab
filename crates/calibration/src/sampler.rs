//! Per-move samples taken from analysed corpus games.

use std::collections::BTreeMap;

use chess_analysis::material::{BISHOP_VALUE, KNIGHT_VALUE, QUEEN_VALUE, ROOK_VALUE};
use chess_analysis::position::parse_fen;
use chess_analysis::{GameReview, RatingBucket, Side};
use serde::{Deserialize, Serialize};
use shakmaty::{Position, Role};

use crate::corpus::CorpusGame;

/// Moves up to this number count as the opening.
pub const OPENING_MOVES: u32 = 12;
/// Non-pawn material on the board, both sides together, at or below which
/// a position counts as an endgame.
pub const ENDGAME_MATERIAL: i32 = 26;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GamePhase {
    Opening,
    Middlegame,
    Endgame,
}

impl GamePhase {
    /// Phase of the position a move was played from.
    pub fn of(move_number: u32, fen_before: &str) -> Self {
        if move_number <= OPENING_MOVES {
            return GamePhase::Opening;
        }
        match parse_fen(fen_before) {
            Ok(pos) if non_pawn_material(&pos) <= ENDGAME_MATERIAL => GamePhase::Endgame,
            _ => GamePhase::Middlegame,
        }
    }
}

fn non_pawn_material(pos: &shakmaty::Chess) -> i32 {
    let board = pos.board();
    [
        (Role::Knight, KNIGHT_VALUE),
        (Role::Bishop, BISHOP_VALUE),
        (Role::Rook, ROOK_VALUE),
        (Role::Queen, QUEEN_VALUE),
    ]
    .iter()
    .map(|&(role, value)| value * board.by_role(role).count() as i32)
    .sum()
}

/// Expected-points loss of one move by a rated player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveStat {
    pub rating: i32,
    pub bucket: RatingBucket,
    /// Clamped at zero.
    pub ep_loss: f64,
    /// Pawns won (positive) or given up after the engine's expected reply.
    pub material_change: Option<i32>,
    pub phase: GamePhase,
    pub move_number: u32,
    /// UCI.
    pub played_move: String,
    pub best_move: Option<String>,
}

/// Samples for every evaluated move whose player has a rating.
pub fn samples_from_review(game: &CorpusGame, review: &GameReview) -> Vec<MoveStat> {
    review
        .moves
        .iter()
        .filter_map(|record| {
            let rating = match record.side {
                Side::White => game.white_elo,
                Side::Black => game.black_elo,
            }?;
            let ep = record.expected_points?;
            Some(MoveStat {
                rating,
                bucket: RatingBucket::from_rating(rating),
                ep_loss: ep.classification_loss(),
                material_change: record.material_change,
                phase: GamePhase::of(record.move_number, &record.fen_before),
                move_number: record.move_number,
                played_move: record.uci.clone(),
                best_move: record.best_move.clone(),
            })
        })
        .collect()
}

/// Samples grouped by rating bucket.
#[derive(Debug, Clone, Default)]
pub struct SampleSet {
    by_bucket: BTreeMap<RatingBucket, Vec<MoveStat>>,
}

impl SampleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, samples: impl IntoIterator<Item = MoveStat>) {
        for sample in samples {
            self.by_bucket.entry(sample.bucket).or_default().push(sample);
        }
    }

    pub fn len(&self) -> usize {
        self.by_bucket.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bucket(&self, bucket: RatingBucket) -> &[MoveStat] {
        self.by_bucket.get(&bucket).map_or(&[], Vec::as_slice)
    }

    /// Finite losses of a bucket.
    pub fn losses(&self, bucket: RatingBucket) -> Vec<f64> {
        self.bucket(bucket)
            .iter()
            .map(|s| s.ep_loss)
            .filter(|l| l.is_finite())
            .collect()
    }

    pub fn counts(&self) -> BTreeMap<RatingBucket, usize> {
        RatingBucket::ALL
            .into_iter()
            .map(|b| (b, self.bucket(b).len()))
            .collect()
    }

    pub fn phase_counts(&self, bucket: RatingBucket) -> BTreeMap<GamePhase, usize> {
        let mut counts = BTreeMap::new();
        for sample in self.bucket(bucket) {
            *counts.entry(sample.phase).or_insert(0) += 1;
        }
        counts
    }
}

impl FromIterator<MoveStat> for SampleSet {
    fn from_iter<I: IntoIterator<Item = MoveStat>>(iter: I) -> Self {
        let mut set = SampleSet::new();
        set.extend(iter);
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess_analysis::{Evaluation, ExpectedPoints, MoveRecord, PlayerStats};

    fn stat(rating: i32, loss: f64, phase: GamePhase) -> MoveStat {
        MoveStat {
            rating,
            bucket: RatingBucket::from_rating(rating),
            ep_loss: loss,
            material_change: None,
            phase,
            move_number: 20,
            played_move: "e2e4".to_string(),
            best_move: None,
        }
    }

    #[test]
    fn test_phase() {
        let start = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
        assert_eq!(GamePhase::of(5, start), GamePhase::Opening);
        assert_eq!(GamePhase::of(30, start), GamePhase::Middlegame);
        // Two rooks each.
        let rooks = "r3k2r/pppp1ppp/8/8/8/8/PPPP1PPP/R3K2R w - - 0 30";
        assert_eq!(GamePhase::of(30, rooks), GamePhase::Endgame);
        assert_eq!(GamePhase::of(30, "garbage"), GamePhase::Middlegame);
    }

    #[test]
    fn test_sample_set_groups_by_bucket() {
        let set: SampleSet = [
            stat(1000, 0.1, GamePhase::Opening),
            stat(1100, 0.2, GamePhase::Endgame),
            stat(2200, 0.01, GamePhase::Middlegame),
        ]
        .into_iter()
        .collect();

        assert_eq!(set.len(), 3);
        assert_eq!(set.losses(RatingBucket::UpTo1200), vec![0.1, 0.2]);
        assert!(set.bucket(RatingBucket::From1601To2000).is_empty());

        let counts = set.counts();
        assert_eq!(counts[&RatingBucket::UpTo1200], 2);
        assert_eq!(counts[&RatingBucket::From2001], 1);
        assert_eq!(counts[&RatingBucket::From1201To1600], 0);

        let phases = set.phase_counts(RatingBucket::UpTo1200);
        assert_eq!(phases[&GamePhase::Opening], 1);
        assert_eq!(phases[&GamePhase::Endgame], 1);
    }

    #[test]
    fn test_losses_skip_non_finite() {
        let set: SampleSet = [
            stat(1000, 0.1, GamePhase::Opening),
            stat(1000, f64::NAN, GamePhase::Opening),
            stat(1000, f64::INFINITY, GamePhase::Middlegame),
        ]
        .into_iter()
        .collect();
        assert_eq!(set.losses(RatingBucket::UpTo1200), vec![0.1]);
        assert_eq!(set.counts()[&RatingBucket::UpTo1200], 3);
    }

    fn record(side: Side, ply: usize, uci: &str, best: &str, after_cp: i32) -> MoveRecord {
        MoveRecord {
            ply,
            move_number: ply as u32 / 2 + 1,
            side,
            uci: uci.to_string(),
            san: uci.to_string(),
            fen_before: "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1".to_string(),
            best_move: Some(best.to_string()),
            eval_before: Some(Evaluation::Centipawns(20)),
            eval_after: Some(Evaluation::Centipawns(after_cp)),
            expected_points: Some(ExpectedPoints::from_probabilities(0.55, 0.50)),
            classification: None,
            rationale: None,
            confidence: None,
            material_change: Some(-3),
            population_accuracy: None,
            win_probability_swing: None,
            display: None,
            error: None,
        }
    }

    #[test]
    fn test_samples_from_review() {
        let game = CorpusGame {
            white_elo: Some(1450),
            black_elo: None,
            start_fen: None,
            moves: vec!["e2e4".to_string(), "e7e5".to_string()],
        };
        let unevaluated = MoveRecord {
            expected_points: None,
            ..record(Side::White, 2, "g1f3", "g1f3", 30)
        };
        let moves = vec![
            record(Side::White, 0, "e2e4", "d2d4", 20),
            record(Side::Black, 1, "e7e5", "e7e5", 20),
            unevaluated,
        ];
        let review = GameReview {
            start_fen: None,
            opening: None,
            white: PlayerStats::from_moves(Side::White, 1450, &moves),
            black: PlayerStats::from_moves(Side::Black, 1500, &moves),
            moves,
            critical_moments: Vec::new(),
        };

        let samples = samples_from_review(&game, &review);
        // Black is unrated and the last move has no evaluation.
        assert_eq!(samples.len(), 1);
        let sample = &samples[0];
        assert_eq!(sample.rating, 1450);
        assert_eq!(sample.bucket, RatingBucket::From1201To1600);
        assert!((sample.ep_loss - 0.05).abs() < 1e-12);
        assert_eq!(sample.material_change, Some(-3));
        assert_eq!(sample.played_move, "e2e4");
        assert_eq!(sample.best_move.as_deref(), Some("d2d4"));
        assert_eq!(sample.phase, GamePhase::Opening);
        assert_eq!(sample.move_number, 1);
    }
}
