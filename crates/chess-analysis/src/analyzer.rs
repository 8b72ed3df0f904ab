//! Game and position analysis.
//!
//! This module provides the [`GameAnalyzer`], which walks a game once,
//! evaluates every position exactly once, and turns each pair of adjacent
//! evaluations into a classified [`MoveRecord`].

use std::sync::Arc;
use std::time::Duration;

use chess_openings::{NoTheory, OpeningTheory};
use engine_pool::{
    CancelToken, EngineError, EngineEvaluation, EngineSession, EngineSource, PoolError,
    SearchRequest,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::classifier::{MoveClassifier, MoveFacts};
use crate::material::material_after_reply;
use crate::position::{parse_fen, replay, side_to_move, Ply, PositionError, Side};
use crate::quality::{CriticalMoment, GameReview, MoveRecord, PlayerStats, PositionReport};
use crate::smoothing::{next_frame, resmooth_game, DisplayEvaluation, DisplaySmoother, DISPLAY_CEILING_CP};
use crate::thresholds::{RatingBucket, ThresholdStore, ThresholdTable};
use crate::win_expectancy::{expected_points, population, ExpectedPoints};
use crate::Evaluation;

/// Population win-probability swing that marks a move as critical.
pub const CRITICAL_SWING: f64 = 0.20;

/// Errors that end an analysis.
///
/// Engine trouble on a single position does not end a game analysis; it is
/// recorded on the affected moves instead.
#[derive(Error, Debug)]
pub enum AnalyzerError {
    /// The game or position was rejected before any engine work.
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] PositionError),
    /// No engine could be obtained.
    #[error("Engine pool error: {0}")]
    Pool(#[from] PoolError),
    /// The only position could not be evaluated.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("Analysis cancelled")]
    Cancelled,
}

/// Why a position in a game has no evaluation.
#[derive(Error, Debug)]
enum PositionFailure {
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// The engine was lost and no replacement could be checked out. Every
    /// later position shares the same cause.
    #[error("no engine available: {0}")]
    NoEngine(Arc<PoolError>),
}

/// Per-request analysis settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisOptions {
    /// Search depth per position.
    pub depth: u32,
    /// Time budget per position in milliseconds, 0 for depth only.
    pub movetime_ms: u64,
    /// Lines requested per search. Two or more enable the only-move test.
    pub lines: u32,
    /// Extra checkout attempts after an acquire timeout.
    pub acquire_retries: u32,
    /// Wait before the first retry; later retries wait proportionally longer.
    pub retry_backoff_ms: u64,
    /// Rating used for a side whose rating is unknown.
    pub default_rating: i32,
    /// Recognise opening theory for games from the standard start.
    pub detect_book: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            depth: 16,
            movetime_ms: 1000,
            lines: 2,
            acquire_retries: 2,
            retry_backoff_ms: 500,
            default_rating: 1500,
            detect_book: true,
        }
    }
}

impl AnalysisOptions {
    fn request(&self, start_fen: Option<&str>, moves: Vec<String>) -> SearchRequest {
        let mut request = SearchRequest::startpos(moves, self.depth)
            .with_movetime(self.movetime_ms)
            .with_lines(self.lines);
        request.fen = start_fen.map(str::to_string);
        request
    }
}

/// Player ratings for a game.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ratings {
    pub white: Option<i32>,
    pub black: Option<i32>,
}

impl Ratings {
    pub fn new(white: i32, black: i32) -> Self {
        Self {
            white: Some(white),
            black: Some(black),
        }
    }

    pub fn get(&self, side: Side) -> Option<i32> {
        match side {
            Side::White => self.white,
            Side::Black => self.black,
        }
    }
}

/// Analysis progress, reported after every completed move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

/// Analyzes games and positions with engines from an [`EngineSource`].
pub struct GameAnalyzer<S> {
    source: S,
    theory: Arc<dyn OpeningTheory>,
    thresholds: Arc<ThresholdStore>,
    classifier: MoveClassifier,
}

impl<S: EngineSource> GameAnalyzer<S> {
    /// Creates an analyzer without opening theory and with the default
    /// classifier settings.
    pub fn new(source: S, thresholds: Arc<ThresholdStore>) -> Self {
        Self {
            source,
            theory: Arc::new(NoTheory),
            thresholds,
            classifier: MoveClassifier::default(),
        }
    }

    pub fn with_theory(mut self, theory: Arc<dyn OpeningTheory>) -> Self {
        self.theory = theory;
        self
    }

    pub fn with_classifier(mut self, classifier: MoveClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn thresholds(&self) -> &Arc<ThresholdStore> {
        &self.thresholds
    }

    /// Analyzes a complete game.
    ///
    /// The moves are replayed first and rejected as a whole if any is
    /// illegal. One engine session then evaluates the N+1 positions in
    /// order; the evaluation after move k is the evaluation before move
    /// k+1. Each move is classified as soon as the position after it has
    /// been evaluated, and `progress` is called once per move.
    ///
    /// # Arguments
    ///
    /// * `start_fen` - Starting position, `None` for the standard one.
    /// * `moves` - Moves in UCI or SAN.
    /// * `ratings` - Player ratings; unknown ones use `options.default_rating`.
    /// * `options` - Search and retry settings.
    /// * `progress` - Called after each move with the number of moves done.
    /// * `cancel` - Stops the analysis and returns the engine promptly.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is invalid, if no engine can be
    /// obtained at the start, or if the analysis is cancelled. Failed
    /// evaluations of individual positions are reported on the affected
    /// moves instead. When the engine is lost mid-game and no other can be
    /// checked out, the remaining moves carry that error and the moves
    /// already evaluated are kept.
    pub async fn analyze_game(
        &self,
        start_fen: Option<&str>,
        moves: &[String],
        ratings: Ratings,
        options: &AnalysisOptions,
        mut progress: impl FnMut(Progress) + Send,
        cancel: &CancelToken,
    ) -> Result<GameReview, AnalyzerError> {
        let game = replay(start_fen, moves)?;
        let table = self.thresholds.current();
        let total = game.plies.len();
        let uci_moves = game.uci_moves();
        info!(moves = total, depth = options.depth, "analyzing game");

        let mut session = Some(self.checkout(options, cancel).await?);
        let mut walk = GameWalk {
            analyzer: self,
            table: &table,
            options,
            ratings,
            start_fen,
            uci_moves: &uci_moves,
            records: Vec::with_capacity(total),
            frames: Vec::with_capacity(total + 1),
            smoother: DisplaySmoother::new(),
        };

        let mut previous: Option<Result<EngineEvaluation, PositionFailure>> = None;
        let mut engine_lost: Option<Arc<PoolError>> = None;
        let mut outcome = Ok(());
        for position in 0..=total {
            let current = match &engine_lost {
                Some(cause) => Err(PositionFailure::NoEngine(Arc::clone(cause))),
                None => {
                    let request = options.request(start_fen, uci_moves[..position].to_vec());
                    match self.evaluate(&mut session, &request, options, cancel).await {
                        Ok(current) => current.map_err(PositionFailure::from),
                        Err(AnalyzerError::Pool(e)) => {
                            warn!(position, error = %e, "engine lost, remaining positions left unevaluated");
                            let cause = Arc::new(e);
                            engine_lost = Some(Arc::clone(&cause));
                            Err(PositionFailure::NoEngine(cause))
                        }
                        Err(e) => {
                            outcome = Err(e);
                            break;
                        }
                    }
                }
            };
            match &current {
                Ok(eval) => debug!(position, score = ?eval.score, best = ?eval.best_move, "evaluated"),
                Err(PositionFailure::Engine(e)) => warn!(position, error = %e, "position evaluation failed"),
                Err(PositionFailure::NoEngine(_)) => {}
            }
            let white_to_move = match game.plies.get(position) {
                Some(ply) => ply.mover.is_white(),
                None => game.plies.last().map_or(true, |last| !last.mover.is_white()),
            };
            walk.frame(position, white_to_move, &current);

            if let Some(before) = previous.take() {
                walk.record(&game.plies[position - 1], &before, &current);
                progress(Progress {
                    completed: position,
                    total,
                });
            }
            previous = Some(current);
        }

        if let Some(session) = session.take() {
            session.finish().await;
        }
        outcome?;

        let GameWalk {
            mut records,
            frames,
            ..
        } = walk;
        let smoothed = resmooth_game(&frames.iter().map(|(_, f)| *f).collect::<Vec<_>>());
        for ((position, _), frame) in frames.iter().zip(smoothed) {
            if let Some(record) = position.checked_sub(1).and_then(|i| records.get_mut(i)) {
                record.display = Some(frame);
            }
        }

        let white_rating = ratings.white.unwrap_or(options.default_rating);
        let black_rating = ratings.black.unwrap_or(options.default_rating);
        let critical_moments = critical_moments(&records);
        let opening = if start_fen.is_none() {
            self.theory.opening_name(&uci_moves)
        } else {
            None
        };
        info!(
            moves = total,
            critical = critical_moments.len(),
            failed = records.iter().filter(|r| r.error.is_some()).count(),
            "game analysis complete"
        );

        Ok(GameReview {
            start_fen: start_fen.map(str::to_string),
            opening,
            white: PlayerStats::from_moves(Side::White, white_rating, &records),
            black: PlayerStats::from_moves(Side::Black, black_rating, &records),
            moves: records,
            critical_moments,
        })
    }

    /// Evaluates a single position.
    ///
    /// `prior` is the previously displayed frame, if the caller is showing
    /// a sequence of positions; the display is blended with it.
    ///
    /// # Errors
    ///
    /// Returns an error if the FEN is invalid, no engine can be obtained,
    /// the engine fails, or the request is cancelled.
    pub async fn analyze_position(
        &self,
        fen: &str,
        options: &AnalysisOptions,
        prior: Option<&DisplayEvaluation>,
        cancel: &CancelToken,
    ) -> Result<PositionReport, AnalyzerError> {
        let pos = parse_fen(fen)?;
        let side = side_to_move(&pos);
        let request = SearchRequest::fen(fen, options.depth)
            .with_movetime(options.movetime_ms)
            .with_lines(options.lines);

        let mut session = Some(self.checkout(options, cancel).await?);
        let result = self.evaluate(&mut session, &request, options, cancel).await;
        if let Some(session) = session.take() {
            session.finish().await;
        }
        let evaluation = result??;

        let white_relative = Evaluation::from_engine(evaluation.score, side.is_white());
        Ok(PositionReport {
            fen: fen.to_string(),
            side_to_move: side,
            white_relative,
            display: next_frame(white_relative, prior),
            evaluation,
        })
    }

    /// Check out a session, retrying acquire timeouts with a growing wait.
    async fn checkout(
        &self,
        options: &AnalysisOptions,
        cancel: &CancelToken,
    ) -> Result<S::Session, AnalyzerError> {
        let mut attempt = 0;
        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AnalyzerError::Cancelled),
                result = self.source.checkout() => result,
            };
            match result {
                Ok(session) => return Ok(session),
                Err(e) if e.is_transient() && attempt < options.acquire_retries => {
                    attempt += 1;
                    let wait = Duration::from_millis(options.retry_backoff_ms * u64::from(attempt));
                    warn!(attempt, ?wait, error = %e, "engine checkout failed, retrying");
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(AnalyzerError::Cancelled),
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Run one search. A process-fatal failure hands the session back and
    /// retries once on a fresh one; other engine errors are returned as
    /// data for the caller to attach.
    async fn evaluate(
        &self,
        session: &mut Option<S::Session>,
        request: &SearchRequest,
        options: &AnalysisOptions,
        cancel: &CancelToken,
    ) -> Result<Result<EngineEvaluation, EngineError>, AnalyzerError> {
        let mut swapped = false;
        loop {
            if cancel.is_cancelled() {
                return Err(AnalyzerError::Cancelled);
            }
            let active = match session.as_mut() {
                Some(active) => active,
                None => {
                    let fresh = self.checkout(options, cancel).await?;
                    session.insert(fresh)
                }
            };
            match active.evaluate(request, cancel).await {
                Ok(eval) => return Ok(Ok(eval)),
                Err(EngineError::Cancelled) => return Err(AnalyzerError::Cancelled),
                Err(e) if e.is_process_fatal() && !swapped => {
                    warn!(error = %e, "engine failed, switching to a fresh one");
                    swapped = true;
                    if let Some(failed) = session.take() {
                        failed.finish().await;
                    }
                }
                Err(e) => return Ok(Err(e)),
            }
        }
    }
}

/// State carried through one game analysis.
struct GameWalk<'a, S> {
    analyzer: &'a GameAnalyzer<S>,
    table: &'a ThresholdTable,
    options: &'a AnalysisOptions,
    ratings: Ratings,
    start_fen: Option<&'a str>,
    uci_moves: &'a [String],
    records: Vec<MoveRecord>,
    /// First-pass display frames keyed by position index.
    frames: Vec<(usize, DisplayEvaluation)>,
    smoother: DisplaySmoother,
}

impl<S: EngineSource> GameWalk<'_, S> {
    fn rating(&self, side: Side) -> i32 {
        self.ratings.get(side).unwrap_or(self.options.default_rating)
    }

    fn frame(
        &mut self,
        position: usize,
        white_to_move: bool,
        eval: &Result<EngineEvaluation, PositionFailure>,
    ) {
        let Ok(eval) = eval else { return };
        let frame = self
            .smoother
            .push(Evaluation::from_engine(eval.score, white_to_move));
        self.frames.push((position, frame));
    }

    fn record(
        &mut self,
        ply: &Ply,
        before: &Result<EngineEvaluation, PositionFailure>,
        after: &Result<EngineEvaluation, PositionFailure>,
    ) {
        let rating = self.rating(ply.mover);
        let mut record = MoveRecord {
            ply: ply.index,
            move_number: ply.move_number,
            side: ply.mover,
            uci: ply.uci.clone(),
            san: ply.san.clone(),
            fen_before: ply.fen_before.clone(),
            best_move: None,
            eval_before: None,
            eval_after: None,
            expected_points: None,
            classification: None,
            rationale: None,
            confidence: None,
            material_change: None,
            population_accuracy: None,
            win_probability_swing: None,
            display: None,
            error: None,
        };

        let (before, after) = match (before, after) {
            (Ok(before), Ok(after)) => (before, after),
            (Err(e), _) => {
                record.error = Some(format!("position before the move: {e}"));
                self.records.push(record);
                return;
            }
            (_, Err(e)) => {
                record.error = Some(format!("position after the move: {e}"));
                self.records.push(record);
                return;
            }
        };

        let white = ply.mover.is_white();
        let eval_before = Evaluation::from_engine(before.score, white);
        let eval_after = Evaluation::from_engine(after.score, !white);
        let ep = ExpectedPoints::new(eval_before.for_side(white), eval_after.for_side(white), rating);

        let material_change = material_after_reply(&ply.fen_after, after.best_move.as_deref(), ply.mover)
            .map(|balance| balance - ply.material_before)
            .map_err(|e| debug!(ply = ply.index, error = %e, "expected reply not playable"))
            .ok();

        let second_best_gap = before.second_best().map(|line| {
            expected_points(Evaluation::relative(before.score), rating)
                - expected_points(Evaluation::relative(line.score), rating)
        });

        let is_book = self.options.detect_book
            && self.start_fen.is_none()
            && self
                .analyzer
                .theory
                .is_book(&self.uci_moves[..ply.index], &ply.uci);

        let bucket = RatingBucket::from_rating(rating);
        let facts = MoveFacts {
            move_number: ply.move_number,
            is_book,
            is_best: before.best_move.as_deref() == Some(ply.uci.as_str()),
            expected_points: ep,
            material_change,
            bucket,
            second_best_gap,
        };
        let outcome = self
            .analyzer
            .classifier
            .classify(&facts, &self.table.get(bucket).thresholds);

        let p_before = mover_win_probability(eval_before, white);
        let p_after = mover_win_probability(eval_after, white);

        record.best_move = before.best_move.clone();
        record.eval_before = Some(eval_before);
        record.eval_after = Some(eval_after);
        record.expected_points = Some(ep);
        record.classification = Some(outcome.classification);
        record.rationale = Some(outcome.rationale);
        record.confidence = Some(outcome.confidence);
        record.material_change = material_change;
        record.population_accuracy = Some(population::move_accuracy((p_before - p_after) * 100.0));
        record.win_probability_swing = Some(p_after - p_before);
        self.records.push(record);
    }
}

fn mover_win_probability(white_relative: Evaluation, white: bool) -> f64 {
    let cp = white_relative.for_side(white).capped_cp(DISPLAY_CEILING_CP);
    population::win_probability(f64::from(cp))
}

fn critical_moments(records: &[MoveRecord]) -> Vec<CriticalMoment> {
    records
        .iter()
        .filter_map(|record| {
            let swing = record.win_probability_swing?;
            let flagged = record.classification.is_some_and(|c| c.is_critical())
                || swing.abs() >= CRITICAL_SWING;
            flagged.then(|| CriticalMoment {
                ply: record.ply,
                move_number: record.move_number,
                side: record.side,
                san: record.san.clone(),
                classification: record.classification,
                win_probability_swing: swing,
            })
        })
        .collect()
}
