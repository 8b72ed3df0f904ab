//! Opening book storage and lookup.

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::opening::Opening;
use crate::OpeningTheory;

/// Errors that can occur when loading an opening book.
#[derive(Debug, Error)]
pub enum BookError {
    #[error("failed to read opening book: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse opening book: {0}")]
    Json(#[from] serde_json::Error),

    #[error("opening '{opening}' contains invalid move '{mv}'")]
    InvalidMove { opening: String, mv: String },
}

#[derive(Serialize, Deserialize)]
struct BookFile {
    openings: Vec<Opening>,
}

/// Known theory, indexed by move history.
///
/// The key of a position is its move history joined with single spaces,
/// the empty string being the starting position.
#[derive(Debug, Clone, Default)]
pub struct TheoryBook {
    continuations: HashMap<String, HashSet<String>>,
    named: HashMap<String, Opening>,
    max_plies: usize,
}

fn history_key(moves: &[String]) -> String {
    moves.join(" ")
}

impl TheoryBook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a book from named lines.
    pub fn from_openings(
        openings: impl IntoIterator<Item = Opening>,
    ) -> Result<Self, BookError> {
        let mut book = Self::new();
        for opening in openings {
            book.add_opening(opening)?;
        }
        Ok(book)
    }

    /// Read a book from JSON of the form `{"openings": [{"name", "eco", "moves"}]}`.
    pub fn from_json(reader: impl Read) -> Result<Self, BookError> {
        let file: BookFile = serde_json::from_reader(reader)?;
        Self::from_openings(file.openings)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, BookError> {
        let file = std::fs::File::open(path)?;
        Self::from_json(std::io::BufReader::new(file))
    }

    /// Add every prefix of `opening` as theory and remember its name.
    pub fn add_opening(&mut self, opening: Opening) -> Result<(), BookError> {
        if let Some(mv) = opening.first_malformed_move() {
            return Err(BookError::InvalidMove {
                opening: opening.name.clone(),
                mv: mv.to_string(),
            });
        }

        for (ply, mv) in opening.moves.iter().enumerate() {
            self.continuations
                .entry(history_key(&opening.moves[..ply]))
                .or_default()
                .insert(mv.clone());
        }
        self.max_plies = self.max_plies.max(opening.moves.len());
        self.named.insert(history_key(&opening.moves), opening);
        Ok(())
    }

    /// Number of positions with at least one book continuation.
    #[must_use]
    pub fn len(&self) -> usize {
        self.continuations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.continuations.is_empty()
    }

    /// Longest line in the book, in plies.
    #[must_use]
    pub fn max_plies(&self) -> usize {
        self.max_plies
    }

    /// Book moves after `history`, sorted.
    #[must_use]
    pub fn continuations(&self, history: &[String]) -> Vec<&str> {
        let mut moves: Vec<&str> = self
            .continuations
            .get(&history_key(history))
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default();
        moves.sort_unstable();
        moves
    }

    /// The most specific named opening whose moves are a prefix of `moves`.
    #[must_use]
    pub fn identify(&self, moves: &[String]) -> Option<&Opening> {
        let longest = moves.len().min(self.max_plies);
        (1..=longest)
            .rev()
            .find_map(|plies| self.named.get(&history_key(&moves[..plies])))
    }

    /// All named openings, in no particular order.
    pub fn openings(&self) -> impl Iterator<Item = &Opening> {
        self.named.values()
    }
}

impl OpeningTheory for TheoryBook {
    fn is_book(&self, history: &[String], uci: &str) -> bool {
        self.continuations
            .get(&history_key(history))
            .is_some_and(|moves| moves.contains(uci))
    }

    fn opening_name(&self, moves: &[String]) -> Option<String> {
        self.identify(moves).map(Opening::label)
    }
}
