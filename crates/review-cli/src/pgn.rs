//! Reading the game to review from PGN.

use std::io::Read;
use std::ops::ControlFlow;

use pgn_reader::{RawTag, Reader, SanPlus, Skip, Visitor};

/// Headers and mainline moves of one game.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PgnGame {
    pub white: Option<String>,
    pub black: Option<String>,
    pub white_elo: Option<i32>,
    pub black_elo: Option<i32>,
    pub fen: Option<String>,
    /// Mainline moves in SAN, as written.
    pub moves: Vec<String>,
}

struct FirstGame;

impl Visitor for FirstGame {
    type Tags = PgnGame;
    type Movetext = PgnGame;
    type Output = PgnGame;

    fn begin_tags(&mut self) -> ControlFlow<Self::Output, Self::Tags> {
        ControlFlow::Continue(PgnGame::default())
    }

    fn tag(
        &mut self,
        game: &mut PgnGame,
        name: &[u8],
        value: RawTag<'_>,
    ) -> ControlFlow<Self::Output> {
        let value = value.decode_utf8_lossy().trim().to_string();
        match name {
            b"White" => game.white = Some(value),
            b"Black" => game.black = Some(value),
            b"WhiteElo" => game.white_elo = value.parse().ok().filter(|elo| *elo > 0),
            b"BlackElo" => game.black_elo = value.parse().ok().filter(|elo| *elo > 0),
            b"FEN" => game.fen = Some(value),
            _ => {}
        }
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, game: PgnGame) -> ControlFlow<Self::Output, Self::Movetext> {
        ControlFlow::Continue(game)
    }

    fn san(&mut self, game: &mut PgnGame, san_plus: SanPlus) -> ControlFlow<Self::Output> {
        game.moves.push(san_plus.to_string());
        ControlFlow::Continue(())
    }

    fn begin_variation(&mut self, _game: &mut PgnGame) -> ControlFlow<Self::Output, Skip> {
        ControlFlow::Continue(Skip(true))
    }

    fn end_game(&mut self, game: PgnGame) -> Self::Output {
        game
    }
}

/// The first game in a PGN stream, if there is one.
///
/// Moves are not checked here; the analyzer validates them before any
/// engine work starts.
pub fn read_first_game(reader: impl Read) -> std::io::Result<Option<PgnGame>> {
    Reader::new(reader).read_game(&mut FirstGame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_headers_and_mainline() {
        let pgn = r#"[Event "Club night"]
[White "Anna"]
[Black "Ben"]
[WhiteElo "1720"]
[BlackElo "-"]
[Result "1-0"]

1. e4 {best by test} e5 2. Qh5 (2. Nf3 Nc6) 2... Nc6 3. Bc4 Nf6?? 4. Qxf7# 1-0

[White "Second"]

1. d4 *
"#;
        let game = read_first_game(pgn.as_bytes()).unwrap().unwrap();
        assert_eq!(game.white.as_deref(), Some("Anna"));
        assert_eq!(game.black.as_deref(), Some("Ben"));
        assert_eq!(game.white_elo, Some(1720));
        assert_eq!(game.black_elo, None);
        assert_eq!(game.fen, None);
        assert_eq!(game.moves, vec!["e4", "e5", "Qh5", "Nc6", "Bc4", "Nf6", "Qxf7#"]);
    }

    #[test]
    fn test_fen_header() {
        let pgn = "[FEN \"4k3/8/8/8/8/8/4P3/4K3 w - - 0 1\"]\n\n1. e4 Kd7 *\n";
        let game = read_first_game(pgn.as_bytes()).unwrap().unwrap();
        assert_eq!(game.fen.as_deref(), Some("4k3/8/8/8/8/8/4P3/4K3 w - - 0 1"));
        assert_eq!(game.moves, vec!["e4", "Kd7"]);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(read_first_game("".as_bytes()).unwrap(), None);
    }
}
