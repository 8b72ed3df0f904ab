//! Game replay on top of `shakmaty`.
//!
//! Every move is checked for legality before any engine work starts, and
//! each ply carries the FENs the engine will be asked about.

use serde::{Deserialize, Serialize};
use shakmaty::fen::Fen;
use shakmaty::san::{San, SanPlus};
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Move, Position};
use thiserror::Error;

use crate::material::material_balance;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PositionError {
    #[error("invalid FEN '{fen}': {reason}")]
    InvalidFen { fen: String, reason: String },
    #[error("illegal move '{mv}' at ply {ply}: {reason}")]
    IllegalMove {
        ply: usize,
        mv: String,
        reason: String,
    },
    #[error("game has no moves")]
    NoMoves,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn flip(self) -> Self {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }

    pub fn is_white(self) -> bool {
        self == Side::White
    }
}

impl From<Color> for Side {
    fn from(color: Color) -> Self {
        match color {
            Color::White => Side::White,
            Color::Black => Side::Black,
        }
    }
}

impl From<Side> for Color {
    fn from(side: Side) -> Self {
        match side {
            Side::White => Color::White,
            Side::Black => Color::Black,
        }
    }
}

/// One half-move of a replayed game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ply {
    /// Zero-based half-move index.
    pub index: usize,
    /// Full-move number the move was played on.
    pub move_number: u32,
    pub mover: Side,
    pub uci: String,
    pub san: String,
    pub fen_before: String,
    pub fen_after: String,
    /// Mover's material balance in pawns before the move.
    pub material_before: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayedGame {
    /// `None` for the standard starting position.
    pub start_fen: Option<String>,
    pub plies: Vec<Ply>,
    pub final_fen: String,
}

impl ReplayedGame {
    pub fn uci_moves(&self) -> Vec<String> {
        self.plies.iter().map(|p| p.uci.clone()).collect()
    }

    /// FEN of the position before ply `index`, or the final position when
    /// `index == plies.len()`.
    pub fn fen_at(&self, index: usize) -> &str {
        self.plies
            .get(index)
            .map_or(self.final_fen.as_str(), |p| p.fen_before.as_str())
    }
}

pub fn parse_fen(fen: &str) -> Result<Chess, PositionError> {
    let invalid = |reason: String| PositionError::InvalidFen {
        fen: fen.to_string(),
        reason,
    };
    fen.parse::<Fen>()
        .map_err(|e| invalid(e.to_string()))?
        .into_position::<Chess>(CastlingMode::Standard)
        .map_err(|e| invalid(e.to_string()))
}

pub fn to_fen(pos: &Chess) -> String {
    Fen::from_position(pos, EnPassantMode::Legal).to_string()
}

pub fn side_to_move(pos: &Chess) -> Side {
    pos.turn().into()
}

/// Resolve `text` as UCI, falling back to SAN.
pub fn parse_move(pos: &Chess, text: &str) -> Result<Move, String> {
    if let Ok(uci) = text.parse::<UciMove>() {
        return uci.to_move(pos).map_err(|e| e.to_string());
    }
    let san: SanPlus = text.parse().map_err(|_| "not UCI or SAN".to_string())?;
    san.san.to_move(pos).map_err(|e| e.to_string())
}

/// Replay `moves` from `start_fen` (or the standard start).
///
/// Moves may be given in UCI or SAN; output is normalised to both.
pub fn replay<S: AsRef<str>>(
    start_fen: Option<&str>,
    moves: &[S],
) -> Result<ReplayedGame, PositionError> {
    if moves.is_empty() {
        return Err(PositionError::NoMoves);
    }

    let mut pos = match start_fen {
        Some(fen) => parse_fen(fen)?,
        None => Chess::default(),
    };
    let mut plies = Vec::with_capacity(moves.len());

    for (index, text) in moves.iter().enumerate() {
        let text = text.as_ref().trim();
        let mv = parse_move(&pos, text).map_err(|reason| PositionError::IllegalMove {
            ply: index,
            mv: text.to_string(),
            reason,
        })?;

        let mover = side_to_move(&pos);
        let fen_before = to_fen(&pos);
        let material_before = material_balance(&pos, mover);
        let move_number = pos.fullmoves().get();
        let uci = mv.to_uci(CastlingMode::Standard).to_string();
        let san = San::from_move(&pos, mv.clone()).to_string();

        pos.play_unchecked(mv);

        plies.push(Ply {
            index,
            move_number,
            mover,
            uci,
            san,
            fen_before,
            fen_after: to_fen(&pos),
            material_before,
        });
    }

    Ok(ReplayedGame {
        start_fen: start_fen.map(str::to_string),
        plies,
        final_fen: to_fen(&pos),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const START: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    #[test]
    fn test_replay_uci() {
        let game = replay(None, &["e2e4", "e7e5", "g1f3"]).unwrap();
        assert_eq!(game.plies.len(), 3);

        let first = &game.plies[0];
        assert_eq!(first.fen_before, START);
        assert_eq!(first.mover, Side::White);
        assert_eq!(first.move_number, 1);
        assert_eq!(first.san, "e4");
        assert_eq!(first.material_before, 0);

        let second = &game.plies[1];
        assert_eq!(second.mover, Side::Black);
        assert_eq!(second.move_number, 1);
        assert_eq!(second.fen_before, first.fen_after);

        assert_eq!(game.plies[2].move_number, 2);
        assert_eq!(game.plies[2].san, "Nf3");
        assert_eq!(game.final_fen, game.plies[2].fen_after);
        assert_eq!(game.fen_at(3), game.final_fen);
    }

    #[test]
    fn test_replay_san_normalises_to_uci() {
        let game = replay(None, &["e4", "e5", "Nf3", "Nc6", "Bb5", "a6", "O-O"]).unwrap();
        assert_eq!(
            game.uci_moves(),
            vec!["e2e4", "e7e5", "g1f3", "b8c6", "f1b5", "a7a6", "e1g1"]
        );
        assert_eq!(game.plies[6].san, "O-O");
    }

    #[test]
    fn test_replay_mixed_notation() {
        let game = replay(None, &["d2d4", "d5", "c4"]).unwrap();
        assert_eq!(game.uci_moves(), vec!["d2d4", "d7d5", "c2c4"]);
    }

    #[test]
    fn test_illegal_move_reports_ply() {
        match replay(None, &["e2e4", "e2e4"]) {
            Err(PositionError::IllegalMove { ply, mv, .. }) => {
                assert_eq!(ply, 1);
                assert_eq!(mv, "e2e4");
            }
            other => panic!("Expected IllegalMove, got {:?}", other),
        }
        assert!(matches!(
            replay(None, &["Ke2"]),
            Err(PositionError::IllegalMove { ply: 0, .. })
        ));
        assert!(matches!(
            replay(None, &["zz"]),
            Err(PositionError::IllegalMove { ply: 0, .. })
        ));
    }

    #[test]
    fn test_invalid_fen() {
        assert!(matches!(
            replay(Some("not a fen"), &["e2e4"]),
            Err(PositionError::InvalidFen { .. })
        ));
    }

    #[test]
    fn test_empty_game() {
        assert_eq!(replay::<&str>(None, &[]), Err(PositionError::NoMoves));
    }

    #[test]
    fn test_replay_from_fen() {
        let fen = "4k3/8/8/8/8/8/4P3/4K3 b - - 3 40";
        let game = replay(Some(fen), &["e8d7", "e2e4"]).unwrap();
        assert_eq!(game.start_fen.as_deref(), Some(fen));
        assert_eq!(game.plies[0].mover, Side::Black);
        assert_eq!(game.plies[0].move_number, 40);
        assert_eq!(game.plies[0].material_before, -1);
        assert_eq!(game.plies[1].move_number, 41);
        assert_eq!(game.plies[1].material_before, 1);
    }

    #[test]
    fn test_side_conversions() {
        assert_eq!(Side::from(Color::Black), Side::Black);
        assert_eq!(Color::from(Side::White), Color::White);
        assert_eq!(Side::White.flip(), Side::Black);
        assert!(!Side::Black.is_white());
    }
}
