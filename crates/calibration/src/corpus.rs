//! Rated games read from PGN.

use std::fs::File;
use std::io::{BufReader, Read};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use pgn_reader::{RawTag, Reader, SanPlus, Skip, Visitor};
use shakmaty::fen::Fen;
use shakmaty::{CastlingMode, Chess, Position};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum CorpusError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read PGN: {0}")]
    Read(#[from] std::io::Error),
    #[error("invalid corpus pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("no .pgn files in {0}")]
    NoFiles(PathBuf),
}

/// One game usable for calibration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusGame {
    pub white_elo: Option<i32>,
    pub black_elo: Option<i32>,
    /// Set when the game starts from a `FEN` tag.
    pub start_fen: Option<String>,
    /// Moves in UCI notation.
    pub moves: Vec<String>,
}

/// Games read from one or more PGN sources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Corpus {
    pub games: Vec<CorpusGame>,
    /// Games with neither `WhiteElo` nor `BlackElo`.
    pub skipped_unrated: usize,
    /// Games with a bad start position, an illegal move, or no moves.
    pub skipped_invalid: usize,
}

impl Corpus {
    pub fn skipped(&self) -> usize {
        self.skipped_unrated + self.skipped_invalid
    }

    pub fn extend(&mut self, other: Corpus) {
        self.games.extend(other.games);
        self.skipped_unrated += other.skipped_unrated;
        self.skipped_invalid += other.skipped_invalid;
    }
}

#[derive(Default)]
struct GameTags {
    white_elo: Option<i32>,
    black_elo: Option<i32>,
    fen: Option<String>,
}

struct GameState {
    board: Chess,
    white_elo: Option<i32>,
    black_elo: Option<i32>,
    start_fen: Option<String>,
    moves: Vec<String>,
    illegal: bool,
}

/// Visitor that collects rated games as UCI move lists.
#[derive(Default)]
struct CorpusBuilder {
    corpus: Corpus,
}

fn parse_elo(value: RawTag<'_>) -> Option<i32> {
    value
        .decode_utf8_lossy()
        .trim()
        .parse::<i32>()
        .ok()
        .filter(|elo| *elo > 0)
}

impl Visitor for CorpusBuilder {
    type Tags = GameTags;
    type Movetext = GameState;
    type Output = ();

    fn begin_tags(&mut self) -> ControlFlow<(), GameTags> {
        ControlFlow::Continue(GameTags::default())
    }

    fn tag(&mut self, tags: &mut GameTags, name: &[u8], value: RawTag<'_>) -> ControlFlow<()> {
        match name {
            b"WhiteElo" => tags.white_elo = parse_elo(value),
            b"BlackElo" => tags.black_elo = parse_elo(value),
            b"FEN" => tags.fen = Some(value.decode_utf8_lossy().into_owned()),
            _ => {}
        }
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, tags: GameTags) -> ControlFlow<(), GameState> {
        if tags.white_elo.is_none() && tags.black_elo.is_none() {
            self.corpus.skipped_unrated += 1;
            return ControlFlow::Break(());
        }

        let board = match &tags.fen {
            None => Chess::default(),
            Some(fen) => {
                let pos = fen
                    .parse::<Fen>()
                    .ok()
                    .and_then(|f| f.into_position::<Chess>(CastlingMode::Standard).ok());
                match pos {
                    Some(pos) => pos,
                    None => {
                        debug!(fen = %fen, "skipping game with invalid FEN");
                        self.corpus.skipped_invalid += 1;
                        return ControlFlow::Break(());
                    }
                }
            }
        };

        ControlFlow::Continue(GameState {
            board,
            white_elo: tags.white_elo,
            black_elo: tags.black_elo,
            start_fen: tags.fen,
            moves: Vec::new(),
            illegal: false,
        })
    }

    fn san(&mut self, state: &mut GameState, san_plus: SanPlus) -> ControlFlow<()> {
        if state.illegal {
            return ControlFlow::Continue(());
        }
        match san_plus.san.to_move(&state.board) {
            Ok(mv) => {
                state
                    .moves
                    .push(mv.to_uci(CastlingMode::Standard).to_string());
                state.board.play_unchecked(mv);
            }
            Err(_) => {
                debug!(san = %san_plus, ply = state.moves.len(), "illegal move in corpus game");
                state.illegal = true;
            }
        }
        ControlFlow::Continue(())
    }

    fn begin_variation(&mut self, _state: &mut GameState) -> ControlFlow<(), Skip> {
        ControlFlow::Continue(Skip(true))
    }

    fn end_game(&mut self, state: GameState) {
        if state.illegal || state.moves.is_empty() {
            self.corpus.skipped_invalid += 1;
            return;
        }
        self.corpus.games.push(CorpusGame {
            white_elo: state.white_elo,
            black_elo: state.black_elo,
            start_fen: state.start_fen,
            moves: state.moves,
        });
    }
}

/// Read every game in a PGN stream.
pub fn read_pgn(reader: impl Read) -> Result<Corpus, CorpusError> {
    let mut builder = CorpusBuilder::default();
    let mut pgn = Reader::new(reader);
    while pgn.read_game(&mut builder)?.is_some() {}
    Ok(builder.corpus)
}

pub fn read_pgn_file(path: impl AsRef<Path>) -> Result<Corpus, CorpusError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| CorpusError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_pgn(BufReader::new(file))
}

/// Read every `*.pgn` file directly inside `dir`, in name order.
pub fn read_corpus_dir(dir: impl AsRef<Path>) -> Result<Corpus, CorpusError> {
    let dir = dir.as_ref();
    let pattern = dir.join("*.pgn");
    let mut files: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())?
        .filter_map(Result::ok)
        .collect();
    files.sort();
    if files.is_empty() {
        return Err(CorpusError::NoFiles(dir.to_path_buf()));
    }

    let mut corpus = Corpus::default();
    for path in &files {
        let part = read_pgn_file(path)?;
        info!(
            file = %path.display(),
            games = part.games.len(),
            skipped = part.skipped(),
            "read corpus file"
        );
        corpus.extend(part);
    }
    Ok(corpus)
}
