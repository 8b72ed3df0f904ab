//! Chess position evaluation types.

use std::fmt;

use serde::{Deserialize, Serialize};
use uci::Score;

/// Mate distances are mapped onto `100 × (BASE − min(MAX_DISTANCE, n))`.
pub const MATE_EQUIVALENT_BASE: i32 = 21;
pub const MATE_EQUIVALENT_MAX_DISTANCE: i32 = 10;

/// Represents a chess position evaluation.
///
/// Evaluations can be either centipawn scores (for normal positions)
/// or mate scores (when a forced mate is found). Unless stated otherwise
/// an `Evaluation` is White-relative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Evaluation {
    /// Centipawn evaluation (positive = white advantage)
    Centipawns(i32),
    /// Mate in N moves (positive = white wins, negative = black wins)
    Mate(i32),
}

impl Evaluation {
    /// Convert an engine score, which is relative to the side to move, into a
    /// White-relative evaluation.
    ///
    /// An engine reports `mate 0` when the side to move is already mated;
    /// that becomes a distance of 1 towards the winner so the sign is kept.
    pub fn from_engine(score: Score, white_to_move: bool) -> Self {
        let relative = Self::relative(score);
        if white_to_move {
            relative
        } else {
            relative.flip()
        }
    }

    /// An engine score kept relative to the side to move.
    pub fn relative(score: Score) -> Self {
        match score {
            Score::Cp(cp) => Evaluation::Centipawns(cp),
            Score::Mate(0) => Evaluation::Mate(-1),
            Score::Mate(n) => Evaluation::Mate(n),
        }
    }

    /// The same evaluation from the other side's point of view.
    pub fn flip(self) -> Self {
        match self {
            Evaluation::Centipawns(cp) => Evaluation::Centipawns(cp.saturating_neg()),
            Evaluation::Mate(n) => Evaluation::Mate(n.saturating_neg()),
        }
    }

    /// View a White-relative evaluation from `white`'s or Black's side.
    pub fn for_side(self, white: bool) -> Self {
        if white {
            self
        } else {
            self.flip()
        }
    }

    pub fn is_mate(self) -> bool {
        matches!(self, Evaluation::Mate(_))
    }

    /// Centipawns, with mate in N mapped to `±100 × (21 − min(10, |N|))`.
    ///
    /// This is the only place a mate score turns into centipawns.
    pub fn mate_equivalent_cp(self) -> i32 {
        match self {
            Evaluation::Centipawns(cp) => cp,
            Evaluation::Mate(n) => {
                let distance = n.unsigned_abs().min(MATE_EQUIVALENT_MAX_DISTANCE as u32) as i32;
                n.signum() * 100 * (MATE_EQUIVALENT_BASE - distance)
            }
        }
    }

    /// [`mate_equivalent_cp`](Self::mate_equivalent_cp) limited to `±ceiling`.
    pub fn capped_cp(self, ceiling: i32) -> i32 {
        self.mate_equivalent_cp().clamp(-ceiling, ceiling)
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Evaluation::Centipawns(cp) => write!(f, "{:+.2}", f64::from(*cp) / 100.0),
            Evaluation::Mate(n) => write!(f, "#{}", n),
        }
    }
}
