//! Rating-aware move review.
//!
//! This crate turns engine evaluations into move classifications that
//! depend on the player's strength, and into smoothed values for an
//! evaluation bar.
//!
//! # Overview
//!
//! - [`Evaluation`] - Position evaluation (centipawn or mate score)
//! - [`win_expectancy`] - Rating-aware expected points, plus the population model used for display
//! - [`smoothing`] - Display smoothing and the end-of-game second pass
//! - [`ThresholdTable`] / [`ThresholdStore`] - EP-loss percentiles per rating bucket
//! - [`MoveClassifier`] - Book, Brilliant, Great, and the loss bands down to Blunder
//! - [`GameAnalyzer`] - Analyzes complete games and single positions with pooled engines
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use chess_analysis::{AnalysisOptions, GameAnalyzer, Ratings, ThresholdStore, ThresholdTable};
//! use engine_pool::{CancelToken, EngineConfig, EnginePool};
//!
//! let pool = EnginePool::start(EngineConfig::new("stockfish"), 4, Duration::from_secs(30)).await?;
//! let thresholds = Arc::new(ThresholdStore::open("thresholds.json", ThresholdTable::defaults()));
//! let analyzer = GameAnalyzer::new(pool, thresholds);
//!
//! let review = analyzer
//!     .analyze_game(None, &moves, Ratings::new(1600, 1650), &AnalysisOptions::default(), |_| {}, &CancelToken::new())
//!     .await?;
//! println!("White EP accuracy: {:.1}%", review.white.ep_accuracy);
//! ```

pub mod analyzer;
pub mod classifier;
pub mod evaluation;
pub mod material;
pub mod position;
pub mod quality;
pub mod smoothing;
pub mod thresholds;
pub mod win_expectancy;

pub use analyzer::{AnalysisOptions, AnalyzerError, GameAnalyzer, Progress, Ratings};
pub use classifier::{ClassificationOutcome, ClassifierConfig, MoveClassifier, MoveFacts};
pub use evaluation::Evaluation;
pub use position::{replay, PositionError, ReplayedGame, Side};
pub use quality::{
    CriticalMoment, GameReview, MoveClassification, MoveRecord, PlayerStats, PositionReport,
};
pub use smoothing::{DisplayEvaluation, DisplaySmoother};
pub use thresholds::{
    BucketThresholds, EpThresholds, RatingBucket, ThresholdError, ThresholdStore, ThresholdTable,
};
pub use win_expectancy::ExpectedPoints;
