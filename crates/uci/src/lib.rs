//! Client-side UCI (Universal Chess Interface) codec.
//!
//! This crate formats the commands a GUI sends to an engine and parses the
//! lines an engine writes back. It holds no process state; the engine pool
//! owns the pipes and uses these types to talk over them.
//!
//! # Commands (GUI to engine)
//!
//! - `uci` - Start the handshake, engine answers with `id`/`option` and `uciok`
//! - `isready` / `readyok` - Synchronization
//! - `setoption name <id> value <x>` - Configure an idle engine
//! - `ucinewgame` - Drop state carried over from a previous game
//! - `position startpos|fen <fen> [moves <move>...]` - Set position
//! - `go [depth <d>] [movetime <ms>]` - Start search
//! - `stop` - Stop search, engine still answers with `bestmove`
//! - `quit` - Exit engine
//!
//! # Messages (engine to GUI)
//!
//! `bestmove` is the only line that terminates a search. Engines emit many
//! `info` lines per search; fields the codec does not know are skipped so
//! newer engines keep working.

mod command;
mod info;
mod message;

pub use command::{EngineCommand, GoOptions};
pub use info::{EngineInfo, InfoBuilder, Score, ScoreBound};
pub use message::EngineMessage;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum UciError {
    #[error("Invalid command: {0}")]
    InvalidCommand(String),
    #[error("Parse error: {0}")]
    ParseError(String),
}
