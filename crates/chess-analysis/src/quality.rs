//! Move classification tiers and game review results.

use std::collections::BTreeMap;
use std::fmt;

use engine_pool::EngineEvaluation;
use serde::{Deserialize, Serialize};

use crate::position::Side;
use crate::smoothing::DisplayEvaluation;
use crate::thresholds::RatingBucket;
use crate::win_expectancy::ExpectedPoints;
use crate::Evaluation;

/// Classification of a move, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveClassification {
    /// Known opening theory
    Book,
    /// The best move, found despite giving up material
    Brilliant,
    /// The best move when every alternative was clearly worse
    Great,
    /// The best move, or one just as good
    Best,
    /// Minimal loss of expected points
    Excellent,
    /// Small loss of expected points
    Good,
    /// Noticeable loss of expected points
    Inaccuracy,
    /// Significant loss of expected points
    Mistake,
    /// Large loss, short of a blunder
    Miss,
    /// Major loss of expected points
    Blunder,
}

impl MoveClassification {
    pub const ALL: [MoveClassification; 10] = [
        MoveClassification::Book,
        MoveClassification::Brilliant,
        MoveClassification::Great,
        MoveClassification::Best,
        MoveClassification::Excellent,
        MoveClassification::Good,
        MoveClassification::Inaccuracy,
        MoveClassification::Mistake,
        MoveClassification::Miss,
        MoveClassification::Blunder,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MoveClassification::Book => "book",
            MoveClassification::Brilliant => "brilliant",
            MoveClassification::Great => "great",
            MoveClassification::Best => "best",
            MoveClassification::Excellent => "excellent",
            MoveClassification::Good => "good",
            MoveClassification::Inaccuracy => "inaccuracy",
            MoveClassification::Mistake => "mistake",
            MoveClassification::Miss => "miss",
            MoveClassification::Blunder => "blunder",
        }
    }

    /// Whether a move of this class is a turning point worth highlighting.
    pub fn is_critical(self) -> bool {
        matches!(
            self,
            MoveClassification::Brilliant
                | MoveClassification::Mistake
                | MoveClassification::Miss
                | MoveClassification::Blunder
        )
    }
}

impl fmt::Display for MoveClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Review of a single move.
///
/// Evaluations are White-relative; expected points are from the mover's
/// side. Fields derived from the engine are `None` when its evaluation of
/// the position before or after the move failed, and `error` says why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveRecord {
    /// Zero-based half-move index
    pub ply: usize,
    /// Full-move number
    pub move_number: u32,
    /// Side that played the move
    pub side: Side,
    /// The move in UCI notation
    pub uci: String,
    /// The move in SAN
    pub san: String,
    /// Position the move was played from
    pub fen_before: String,
    /// The engine's choice in that position
    pub best_move: Option<String>,
    /// Evaluation before the move
    pub eval_before: Option<Evaluation>,
    /// Evaluation after the move
    pub eval_after: Option<Evaluation>,
    /// Rating-aware expected points around the move
    pub expected_points: Option<ExpectedPoints>,
    pub classification: Option<MoveClassification>,
    /// Why the classifier picked this tier
    pub rationale: Option<String>,
    /// How far the loss sits from a tier boundary, in `[0.05, 1]`
    pub confidence: Option<f64>,
    /// Mover's material change in pawns once the expected reply is played
    pub material_change: Option<i32>,
    /// Population-model accuracy in `[0, 100]`, for display only
    pub population_accuracy: Option<f64>,
    /// Change in the mover's population win probability
    pub win_probability_swing: Option<f64>,
    /// Evaluation bar state after the move
    pub display: Option<DisplayEvaluation>,
    /// Why engine data is missing for this move
    pub error: Option<String>,
}

impl MoveRecord {
    pub fn is_classified(&self) -> bool {
        self.classification.is_some()
    }
}

/// Statistics for one player's moves in a game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub side: Side,
    /// Rating used for expected points and thresholds
    pub rating: i32,
    pub bucket: RatingBucket,
    /// Moves played
    pub total_moves: u32,
    /// Classified moves per tier
    pub counts: BTreeMap<MoveClassification, u32>,
    /// Mean expected-points loss, improvements counted as zero
    pub average_ep_loss: f64,
    /// Mean expected-points accuracy (0-100)
    pub ep_accuracy: f64,
    /// Mean population accuracy (0-100), for display
    pub population_accuracy: f64,
    /// Moves that could not be evaluated
    pub failed_moves: u32,
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0u32), |(sum, n), v| (sum + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / f64::from(n)
    }
}

impl PlayerStats {
    /// Aggregate the moves `side` played. Averages are 0 when no move of
    /// that side could be evaluated.
    pub fn from_moves(side: Side, rating: i32, moves: &[MoveRecord]) -> Self {
        let own: Vec<&MoveRecord> = moves.iter().filter(|m| m.side == side).collect();

        let mut counts = BTreeMap::new();
        for class in own.iter().filter_map(|m| m.classification) {
            *counts.entry(class).or_insert(0) += 1;
        }

        Self {
            side,
            rating,
            bucket: RatingBucket::from_rating(rating),
            total_moves: own.len() as u32,
            counts,
            average_ep_loss: mean(
                own.iter()
                    .filter_map(|m| m.expected_points)
                    .map(|ep| ep.classification_loss()),
            ),
            ep_accuracy: mean(own.iter().filter_map(|m| m.expected_points).map(|ep| ep.accuracy)),
            population_accuracy: mean(own.iter().filter_map(|m| m.population_accuracy)),
            failed_moves: own.iter().filter(|m| m.error.is_some()).count() as u32,
        }
    }

    pub fn count(&self, class: MoveClassification) -> u32 {
        self.counts.get(&class).copied().unwrap_or(0)
    }
}

/// A move that changed the course of the game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalMoment {
    pub ply: usize,
    pub move_number: u32,
    pub side: Side,
    pub san: String,
    pub classification: Option<MoveClassification>,
    /// Change in the mover's population win probability
    pub win_probability_swing: f64,
}

/// Complete review of a game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameReview {
    /// Starting position, `None` for the standard one
    pub start_fen: Option<String>,
    /// Most specific named opening the game followed
    pub opening: Option<String>,
    /// One record per half-move, in order
    pub moves: Vec<MoveRecord>,
    pub white: PlayerStats,
    pub black: PlayerStats,
    pub critical_moments: Vec<CriticalMoment>,
}

/// Evaluation of a single position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionReport {
    pub fen: String,
    pub side_to_move: Side,
    /// Raw engine result, scores relative to the side to move
    pub evaluation: EngineEvaluation,
    /// The main line's score from White's side
    pub white_relative: Evaluation,
    pub display: DisplayEvaluation,
}
