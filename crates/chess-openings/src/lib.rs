//! Opening theory lookup.
//!
//! Answers one question for the move classifier: is this move known theory
//! after this sequence of moves? A small built-in book ships with the crate;
//! larger books load from JSON.

pub mod book;
pub mod builtin;
pub mod opening;

pub use book::{BookError, TheoryBook};
pub use builtin::builtin_book;
pub use opening::Opening;

/// Source of opening theory.
pub trait OpeningTheory: Send + Sync {
    /// Whether `uci` is a book move after `history` (UCI moves from the
    /// standard starting position).
    fn is_book(&self, history: &[String], uci: &str) -> bool;

    /// Name of the most specific known opening `moves` belongs to.
    fn opening_name(&self, _moves: &[String]) -> Option<String> {
        None
    }
}

/// A theory source that knows nothing. Used when analysing from a custom
/// start position or when book detection is turned off.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTheory;

impl OpeningTheory for NoTheory {
    fn is_book(&self, _history: &[String], _uci: &str) -> bool {
        false
    }
}
