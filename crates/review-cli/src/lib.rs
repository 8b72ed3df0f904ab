//! Building blocks of the `review` binary: configuration, PGN input and
//! text output.

pub mod config;
pub mod pgn;
pub mod report;

pub use config::{CalibrationSettings, ConfigError, PoolConfig, ReviewConfig};
pub use pgn::{read_first_game, PgnGame};
