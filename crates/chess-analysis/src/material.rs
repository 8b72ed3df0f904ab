//! Material counting and sacrifice detection.

use serde::{Deserialize, Serialize};
use shakmaty::{Board, Chess, Color, Position, Role};

use crate::position::{parse_fen, parse_move, PositionError, Side};
use crate::thresholds::RatingBucket;

pub const PAWN_VALUE: i32 = 1;
pub const KNIGHT_VALUE: i32 = 3;
pub const BISHOP_VALUE: i32 = 3;
pub const ROOK_VALUE: i32 = 5;
pub const QUEEN_VALUE: i32 = 9;

const VALUED_ROLES: [(Role, i32); 5] = [
    (Role::Pawn, PAWN_VALUE),
    (Role::Knight, KNIGHT_VALUE),
    (Role::Bishop, BISHOP_VALUE),
    (Role::Rook, ROOK_VALUE),
    (Role::Queen, QUEEN_VALUE),
];

/// Material of one colour in pawns, king excluded.
pub fn material_count(board: &Board, color: Color) -> i32 {
    VALUED_ROLES
        .iter()
        .map(|&(role, value)| {
            let count = (board.by_role(role) & board.by_color(color)).count();
            value * count as i32
        })
        .sum()
}

/// `side`'s material minus the opponent's.
pub fn material_balance(pos: &Chess, side: Side) -> i32 {
    let color = Color::from(side);
    material_count(pos.board(), color) - material_count(pos.board(), !color)
}

/// Mover's balance once the opponent has answered with `reply`.
///
/// A capture that is only recaptured next move is not a sacrifice, so the
/// balance is measured after the engine's expected reply. Without a reply
/// (game over or unknown) the position after the move is used.
pub fn material_after_reply(
    fen_after: &str,
    reply: Option<&str>,
    mover: Side,
) -> Result<i32, PositionError> {
    let mut pos = parse_fen(fen_after)?;
    if let Some(reply) = reply {
        let mv = parse_move(&pos, reply).map_err(|reason| PositionError::IllegalMove {
            ply: 0,
            mv: reply.to_string(),
            reason,
        })?;
        pos.play_unchecked(mv);
    }
    Ok(material_balance(&pos, mover))
}

/// Pawns a move must give up, net of the expected reply, to count as a
/// sacrifice. Stronger players need a larger offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SacrificeThresholds {
    pub up_to_1200: i32,
    pub from_1201_to_1600: i32,
    pub from_1601_to_2000: i32,
    pub from_2001: i32,
}

impl Default for SacrificeThresholds {
    fn default() -> Self {
        Self {
            up_to_1200: 2,
            from_1201_to_1600: 3,
            from_1601_to_2000: 3,
            from_2001: 4,
        }
    }
}

impl SacrificeThresholds {
    pub fn for_bucket(&self, bucket: RatingBucket) -> i32 {
        match bucket {
            RatingBucket::UpTo1200 => self.up_to_1200,
            RatingBucket::From1201To1600 => self.from_1201_to_1600,
            RatingBucket::From1601To2000 => self.from_1601_to_2000,
            RatingBucket::From2001 => self.from_2001,
        }
    }

    /// Whether a material change (negative = given up) is a sacrifice.
    pub fn is_sacrifice(&self, material_change: i32, bucket: RatingBucket) -> bool {
        -material_change >= self.for_bucket(bucket)
    }
}
