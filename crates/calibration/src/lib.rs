//! Threshold calibration from rated games.
//!
//! Reads a corpus of rated PGN games, analyses every move with a fixed
//! search depth and derives EP-loss percentiles for each rating bucket.
//!
//! # Overview
//!
//! - [`corpus`] - PGN reading; unrated and broken games are skipped
//! - [`sampler`] - Per-move EP losses grouped by rating bucket
//! - [`percentile`] - Linear-interpolation percentiles
//! - [`Calibrator`] - Runs the corpus through a bounded set of engines
//!
//! # Example
//!
//! ```ignore
//! use calibration::{read_corpus_dir, CalibrationConfig, Calibrator};
//! use chess_analysis::ThresholdTable;
//!
//! let corpus = read_corpus_dir("corpus/")?;
//! let calibrator = Calibrator::new(pool, ThresholdTable::defaults(), CalibrationConfig::default());
//! let report = calibrator.run(corpus, |_, _| {}, &CancelToken::new()).await?;
//! report.table.save("thresholds.json")?;
//! ```

pub mod calibrator;
pub mod corpus;
pub mod percentile;
pub mod sampler;

pub use calibrator::{finalize, CalibrationConfig, CalibrationError, CalibrationReport, Calibrator};
pub use corpus::{read_corpus_dir, read_pgn, read_pgn_file, Corpus, CorpusError, CorpusGame};
pub use sampler::{samples_from_review, GamePhase, MoveStat, SampleSet};
