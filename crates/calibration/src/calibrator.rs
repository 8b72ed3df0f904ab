//! Corpus analysis and threshold derivation.

use std::collections::BTreeMap;
use std::sync::Arc;

use chess_analysis::{
    AnalysisOptions, AnalyzerError, BucketThresholds, EpThresholds, GameAnalyzer, RatingBucket,
    Ratings, ThresholdError, ThresholdStore, ThresholdTable,
};
use chrono::{DateTime, Utc};
use engine_pool::{CancelToken, EngineSource, PoolError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::corpus::{Corpus, CorpusError, CorpusGame};
use crate::percentile::loss_percentiles;
use crate::sampler::{samples_from_review, SampleSet};

#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error(transparent)]
    Corpus(#[from] CorpusError),
    #[error("engine pool error: {0}")]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Threshold(#[from] ThresholdError),
    #[error("corpus contains no usable games")]
    NoGames,
    #[error("calibration cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Fixed search depth for every position.
    pub depth: u32,
    /// Buckets with fewer samples keep their defaults.
    pub min_samples: usize,
    /// Stop after this many games, if set.
    pub max_games: Option<usize>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            depth: 12,
            min_samples: 100,
            max_games: None,
        }
    }
}

impl CalibrationConfig {
    fn analysis_options(&self) -> AnalysisOptions {
        AnalysisOptions {
            depth: self.depth,
            movetime_ms: 0,
            lines: 1,
            detect_book: false,
            ..AnalysisOptions::default()
        }
    }
}

/// Result of a calibration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub table: ThresholdTable,
    pub games_used: usize,
    /// Games skipped while reading the corpus.
    pub games_skipped: usize,
    /// Games whose analysis failed.
    pub games_failed: usize,
    pub samples_per_bucket: BTreeMap<RatingBucket, usize>,
    /// Buckets that kept their defaults for lack of samples.
    pub insufficient: Vec<RatingBucket>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Build a threshold table from samples.
///
/// Buckets with at least `min_samples` moves get their percentiles from the
/// samples; the rest keep the entry from `defaults`. Returns the table and
/// the buckets that fell short.
pub fn finalize(
    samples: &SampleSet,
    defaults: &ThresholdTable,
    min_samples: usize,
) -> Result<(ThresholdTable, Vec<RatingBucket>), ThresholdError> {
    let mut table = defaults.clone();
    let mut insufficient = Vec::new();

    for bucket in RatingBucket::ALL {
        let losses = samples.losses(bucket);
        let values = if losses.len() >= min_samples.max(1) {
            loss_percentiles(&losses)
        } else {
            None
        };
        match values {
            Some(values) => {
                let thresholds = EpThresholds::new(values)?;
                info!(
                    %bucket,
                    samples = losses.len(),
                    p5 = thresholds.p5(),
                    p50 = thresholds.p50(),
                    p90 = thresholds.p90(),
                    "calibrated bucket"
                );
                table.set(
                    bucket,
                    BucketThresholds {
                        thresholds,
                        sample_count: losses.len(),
                        calibrated: true,
                    },
                );
            }
            None => {
                warn!(
                    %bucket,
                    samples = losses.len(),
                    required = min_samples,
                    "not enough samples, keeping default thresholds"
                );
                insufficient.push(bucket);
            }
        }
    }

    table.set_calibrated_at(Utc::now());
    Ok((table, insufficient))
}

/// Runs calibration games concurrently, one engine session per game.
pub struct Calibrator<S> {
    analyzer: Arc<GameAnalyzer<S>>,
    defaults: ThresholdTable,
    config: CalibrationConfig,
}

impl<S> Calibrator<S>
where
    S: EngineSource + 'static,
{
    pub fn new(source: S, defaults: ThresholdTable, config: CalibrationConfig) -> Self {
        let store = Arc::new(ThresholdStore::new(defaults.clone()));
        Self {
            analyzer: Arc::new(GameAnalyzer::new(source, store)),
            defaults,
            config,
        }
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        self.analyzer.source()
    }

    /// Analyse the corpus and derive thresholds.
    ///
    /// `progress` is called with the number of finished games and the
    /// total after each game.
    pub async fn run(
        &self,
        corpus: Corpus,
        mut progress: impl FnMut(usize, usize),
        cancel: &CancelToken,
    ) -> Result<CalibrationReport, CalibrationError> {
        let started_at = Utc::now();
        let games_skipped = corpus.skipped();
        let mut games = corpus.games;
        if let Some(max) = self.config.max_games {
            games.truncate(max);
        }
        if games.is_empty() {
            return Err(CalibrationError::NoGames);
        }

        let total = games.len();
        let concurrency = self.analyzer.source().capacity().max(1);
        let options = Arc::new(self.config.analysis_options());
        info!(games = total, concurrency, depth = self.config.depth, "starting calibration");

        let mut pending = games.into_iter().enumerate();
        let mut running = JoinSet::new();
        let mut samples = SampleSet::new();
        let mut games_used = 0;
        let mut games_failed = 0;
        let mut done = 0;

        for (index, game) in pending.by_ref().take(concurrency) {
            self.spawn_game(&mut running, index, game, &options, cancel);
        }

        while let Some(joined) = running.join_next().await {
            done += 1;
            match joined {
                Ok((game, Ok(review))) => {
                    games_used += 1;
                    samples.extend(samples_from_review(&game, &review));
                }
                Ok((_, Err(AnalyzerError::Cancelled))) => {
                    running.abort_all();
                    return Err(CalibrationError::Cancelled);
                }
                Ok((_, Err(AnalyzerError::Pool(e)))) if !e.is_transient() => {
                    running.abort_all();
                    return Err(e.into());
                }
                Ok((_, Err(e))) => {
                    games_failed += 1;
                    warn!(error = %e, "calibration game failed");
                }
                Err(e) => {
                    games_failed += 1;
                    warn!(error = %e, "calibration task panicked");
                }
            }
            progress(done, total);

            if let Some((index, game)) = pending.next() {
                self.spawn_game(&mut running, index, game, &options, cancel);
            }
        }

        let (table, insufficient) = finalize(&samples, &self.defaults, self.config.min_samples)?;
        info!(
            games_used,
            games_failed,
            games_skipped,
            samples = samples.len(),
            "calibration complete"
        );

        Ok(CalibrationReport {
            table,
            games_used,
            games_skipped,
            games_failed,
            samples_per_bucket: samples.counts(),
            insufficient,
            started_at,
            finished_at: Utc::now(),
        })
    }

    fn spawn_game(
        &self,
        running: &mut JoinSet<(CorpusGame, Result<chess_analysis::GameReview, AnalyzerError>)>,
        index: usize,
        game: CorpusGame,
        options: &Arc<AnalysisOptions>,
        cancel: &CancelToken,
    ) {
        let analyzer = Arc::clone(&self.analyzer);
        let options = Arc::clone(options);
        let cancel = cancel.clone();
        running.spawn(async move {
            debug!(game = index, moves = game.moves.len(), "analysing calibration game");
            let ratings = Ratings {
                white: game.white_elo,
                black: game.black_elo,
            };
            let result = analyzer
                .analyze_game(
                    game.start_fen.as_deref(),
                    &game.moves,
                    ratings,
                    &options,
                    |_| {},
                    &cancel,
                )
                .await;
            (game, result)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::{GamePhase, MoveStat};

    fn samples(bucket_rating: i32, losses: impl IntoIterator<Item = f64>) -> Vec<MoveStat> {
        losses
            .into_iter()
            .map(|loss| MoveStat {
                rating: bucket_rating,
                bucket: RatingBucket::from_rating(bucket_rating),
                ep_loss: loss,
                material_change: None,
                phase: GamePhase::Middlegame,
                move_number: 20,
                played_move: "e2e4".to_string(),
                best_move: Some("d2d4".to_string()),
            })
            .collect()
    }

    #[test]
    fn test_finalize_calibrates_full_buckets_only() {
        let mut set = SampleSet::new();
        // 0.000, 0.001, ..., 0.100
        set.extend(samples(1000, (0..=100).map(|i| f64::from(i) / 1000.0)));
        set.extend(samples(1800, [0.01; 20]));

        let defaults = ThresholdTable::defaults();
        let (table, insufficient) = finalize(&set, &defaults, 100).unwrap();

        let low = table.get(RatingBucket::UpTo1200);
        assert!(low.calibrated);
        assert_eq!(low.sample_count, 101);
        assert!((low.thresholds.p50() - 0.05).abs() < 1e-12);
        assert!((low.thresholds.p90() - 0.09).abs() < 1e-12);
        assert!((low.thresholds.p1() - 0.001).abs() < 1e-12);

        assert_eq!(
            insufficient,
            vec![
                RatingBucket::From1201To1600,
                RatingBucket::From1601To2000,
                RatingBucket::From2001
            ]
        );
        assert_eq!(
            table.get(RatingBucket::From1601To2000),
            defaults.get(RatingBucket::From1601To2000)
        );
        assert!(table.calibrated_at().is_some());
    }

    #[test]
    fn test_finalize_with_no_samples_keeps_defaults() {
        let defaults = ThresholdTable::defaults();
        let (table, insufficient) = finalize(&SampleSet::new(), &defaults, 100).unwrap();
        assert_eq!(insufficient.len(), 4);
        for bucket in RatingBucket::ALL {
            assert_eq!(table.get(bucket), defaults.get(bucket));
        }
    }

    #[test]
    fn test_finalize_counts_finite_losses_only() {
        let mut set = SampleSet::new();
        set.extend(samples(1000, [0.01; 99]));
        set.extend(samples(1000, [f64::NAN, f64::INFINITY]));

        let defaults = ThresholdTable::defaults();
        let (table, insufficient) = finalize(&set, &defaults, 100).unwrap();
        assert!(insufficient.contains(&RatingBucket::UpTo1200));
        assert_eq!(
            table.get(RatingBucket::UpTo1200),
            defaults.get(RatingBucket::UpTo1200)
        );

        set.extend(samples(1000, [0.02]));
        let (table, _) = finalize(&set, &defaults, 100).unwrap();
        let low = table.get(RatingBucket::UpTo1200);
        assert!(low.calibrated);
        assert_eq!(low.sample_count, 100);
    }

    #[test]
    fn test_analysis_options_for_calibration() {
        let options = CalibrationConfig::default().analysis_options();
        assert_eq!(options.depth, 12);
        assert_eq!(options.lines, 1);
        assert_eq!(options.movetime_ms, 0);
        assert!(!options.detect_book);
    }
}
