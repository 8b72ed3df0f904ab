//! Search requests and the results assembled from an engine's `info` stream.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uci::{EngineInfo, Score, ScoreBound};

use crate::EngineError;

/// One search to run on an engine.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    /// Starting position, `None` for the standard initial position.
    pub fen: Option<String>,
    /// Moves in UCI notation applied on top of `fen`.
    pub moves: Vec<String>,
    pub depth: u32,
    /// Time budget in milliseconds, 0 for none.
    pub movetime_ms: u64,
    /// Number of principal variations to request (`MultiPV`).
    pub lines: u32,
}

impl SearchRequest {
    pub fn fen(fen: impl Into<String>, depth: u32) -> Self {
        Self {
            fen: Some(fen.into()),
            moves: Vec::new(),
            depth,
            movetime_ms: 0,
            lines: 1,
        }
    }

    pub fn startpos(moves: Vec<String>, depth: u32) -> Self {
        Self {
            fen: None,
            moves,
            depth,
            movetime_ms: 0,
            lines: 1,
        }
    }

    pub fn with_movetime(mut self, movetime_ms: u64) -> Self {
        self.movetime_ms = movetime_ms;
        self
    }

    pub fn with_lines(mut self, lines: u32) -> Self {
        self.lines = lines.max(1);
        self
    }

    pub(crate) fn position_command(&self) -> uci::EngineCommand {
        uci::EngineCommand::Position {
            fen: self.fen.clone(),
            moves: self.moves.clone(),
        }
    }
}

/// One principal variation from a multi-PV search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchLine {
    /// 1-based line index.
    pub multipv: u32,
    /// Score relative to the side to move.
    pub score: Score,
    pub bound: ScoreBound,
    pub depth: u32,
    pub pv: Vec<String>,
}

impl SearchLine {
    pub fn first_move(&self) -> Option<&str> {
        self.pv.first().map(String::as_str)
    }
}

/// Result of one completed search.
///
/// `score` is relative to the side to move, exactly as the engine reported
/// it. Mate scores stay mate scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineEvaluation {
    pub score: Score,
    pub bound: ScoreBound,
    pub depth: u32,
    /// `None` when the position has no legal moves.
    pub best_move: Option<String>,
    pub pv: Vec<String>,
    pub nodes: u64,
    pub time_ms: u64,
    /// Lines 2..K of a multi-PV search, best first.
    pub alternatives: Vec<SearchLine>,
}

impl EngineEvaluation {
    /// The engine's expected reply to `best_move`.
    pub fn expected_reply(&self) -> Option<&str> {
        self.pv.get(1).map(String::as_str)
    }

    /// The second-best line, if the search produced one.
    pub fn second_best(&self) -> Option<&SearchLine> {
        self.alternatives.first()
    }

    /// Whether the side to move has no legal moves (mate or stalemate).
    pub fn is_terminal(&self) -> bool {
        self.best_move.is_none() && matches!(self.score, Score::Mate(0) | Score::Cp(0))
    }
}

/// Accumulates `info` lines for one search.
///
/// Engines repeat every line at increasing depth; for each multi-PV index
/// only the most recent scored line counts.
#[derive(Debug)]
pub(crate) struct SearchCollector {
    lines: BTreeMap<u32, SearchLine>,
    max_lines: u32,
    nodes: u64,
    time_ms: u64,
}

impl SearchCollector {
    pub(crate) fn new(max_lines: u32) -> Self {
        Self {
            lines: BTreeMap::new(),
            max_lines: max_lines.max(1),
            nodes: 0,
            time_ms: 0,
        }
    }

    pub(crate) fn observe(&mut self, info: EngineInfo) {
        if let Some(nodes) = info.nodes {
            self.nodes = nodes;
        }
        if let Some(time) = info.time {
            self.time_ms = time;
        }

        let Some(score) = info.score else {
            return;
        };
        let index = info.line_index();
        if index > self.max_lines {
            return;
        }
        let depth = info
            .depth
            .or_else(|| self.lines.get(&index).map(|l| l.depth))
            .unwrap_or(0);

        self.lines.insert(
            index,
            SearchLine {
                multipv: index,
                score,
                bound: info.bound,
                depth,
                pv: info.pv,
            },
        );
    }

    pub(crate) fn finish(mut self, best_move: Option<String>) -> Result<EngineEvaluation, EngineError> {
        let primary = self.lines.remove(&1).ok_or(EngineError::NoScore)?;

        let best_move = best_move.or_else(|| primary.first_move().map(str::to_string));
        if best_move.is_none() && !matches!(primary.score, Score::Mate(0) | Score::Cp(0)) {
            return Err(EngineError::MissingBestMove);
        }

        // The reported best move wins over a stale pv from an earlier depth.
        let mut pv = primary.pv;
        if let Some(mv) = &best_move {
            if pv.first() != Some(mv) {
                pv = vec![mv.clone()];
            }
        }

        Ok(EngineEvaluation {
            score: primary.score,
            bound: primary.bound,
            depth: primary.depth,
            best_move,
            pv,
            nodes: self.nodes,
            time_ms: self.time_ms,
            alternatives: self.lines.into_values().collect(),
        })
    }
}
