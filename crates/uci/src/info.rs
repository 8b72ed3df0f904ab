//! UCI `info` line types.

use std::iter::Peekable;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Score in centipawns or mate distance, relative to the side to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Score {
    /// Centipawn score (100 = 1 pawn advantage).
    Cp(i32),
    /// Mate in N moves (positive = side to move mates, negative = gets mated).
    Mate(i32),
}

/// Whether a reported score is exact or only a bound from an aspiration window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScoreBound {
    #[default]
    Exact,
    Lower,
    Upper,
}

/// Search information from engine.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EngineInfo {
    /// Search depth in plies.
    pub depth: Option<u32>,
    /// Selective search depth.
    pub seldepth: Option<u32>,
    /// 1-based index of the line in multi-PV mode.
    pub multipv: Option<u32>,
    /// Score evaluation.
    pub score: Option<Score>,
    /// Bound qualifier attached to `score`.
    pub bound: ScoreBound,
    /// Nodes searched.
    pub nodes: Option<u64>,
    /// Nodes per second.
    pub nps: Option<u64>,
    /// Time spent in milliseconds.
    pub time: Option<u64>,
    /// Tablebase hits.
    pub tbhits: Option<u64>,
    /// Principal variation (best line found).
    pub pv: Vec<String>,
    /// Current move being searched.
    pub currmove: Option<String>,
    /// Current move number.
    pub currmovenumber: Option<u32>,
    /// Hash table usage (per mille).
    pub hashfull: Option<u32>,
    /// Arbitrary string info.
    pub string: Option<String>,
}

impl EngineInfo {
    /// Create a new empty info.
    pub fn new() -> Self {
        Self::default()
    }

    /// Multi-PV index, defaulting to 1 for engines that omit it.
    pub fn line_index(&self) -> u32 {
        self.multipv.unwrap_or(1).max(1)
    }

    /// Parse an engine `info` line.
    ///
    /// Returns `None` only when the line is not an `info` line. Unknown
    /// tokens and malformed values are skipped.
    pub fn parse(line: &str) -> Option<Self> {
        let mut tokens = line.split_whitespace().peekable();
        if tokens.next() != Some("info") {
            return None;
        }

        let mut info = EngineInfo::new();
        while let Some(token) = tokens.next() {
            match token {
                "depth" => info.depth = parse_next(&mut tokens),
                "seldepth" => info.seldepth = parse_next(&mut tokens),
                "multipv" => info.multipv = parse_next(&mut tokens),
                "score" => match tokens.peek().copied() {
                    Some("cp") => {
                        tokens.next();
                        info.score = parse_next(&mut tokens).map(Score::Cp);
                    }
                    Some("mate") => {
                        tokens.next();
                        info.score = parse_next(&mut tokens).map(Score::Mate);
                    }
                    _ => {}
                },
                "lowerbound" => info.bound = ScoreBound::Lower,
                "upperbound" => info.bound = ScoreBound::Upper,
                "nodes" => info.nodes = parse_next(&mut tokens),
                "nps" => info.nps = parse_next(&mut tokens),
                "time" => info.time = parse_next(&mut tokens),
                "tbhits" => info.tbhits = parse_next(&mut tokens),
                "hashfull" => info.hashfull = parse_next(&mut tokens),
                "currmove" => info.currmove = tokens.next().map(str::to_string),
                "currmovenumber" => info.currmovenumber = parse_next(&mut tokens),
                // Moves run until the next keyword.
                "pv" => {
                    while let Some(mv) = tokens.next_if(|t| !is_info_keyword(t)) {
                        info.pv.push(mv.to_string());
                    }
                }
                "string" => {
                    info.string = Some(tokens.collect::<Vec<_>>().join(" "));
                    break;
                }
                _ => {}
            }
        }

        Some(info)
    }
}

/// Parse the value following a keyword. The token is consumed even when
/// it does not parse.
fn parse_next<'a, T: FromStr>(tokens: &mut Peekable<impl Iterator<Item = &'a str>>) -> Option<T> {
    tokens.next().and_then(|t| t.parse().ok())
}

fn is_info_keyword(s: &str) -> bool {
    matches!(
        s,
        "depth"
            | "seldepth"
            | "multipv"
            | "score"
            | "lowerbound"
            | "upperbound"
            | "nodes"
            | "nps"
            | "time"
            | "tbhits"
            | "pv"
            | "currmove"
            | "currmovenumber"
            | "hashfull"
            | "string"
            | "refutation"
            | "currline"
            | "cpuload"
            | "wdl"
            | "bmc"
    )
}

/// Builder for constructing EngineInfo.
#[derive(Default)]
pub struct InfoBuilder {
    info: EngineInfo,
}

impl InfoBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(mut self, d: u32) -> Self {
        self.info.depth = Some(d);
        self
    }

    pub fn multipv(mut self, index: u32) -> Self {
        self.info.multipv = Some(index);
        self
    }

    pub fn score_cp(mut self, cp: i32) -> Self {
        self.info.score = Some(Score::Cp(cp));
        self
    }

    pub fn score_mate(mut self, moves: i32) -> Self {
        self.info.score = Some(Score::Mate(moves));
        self
    }

    pub fn bound(mut self, bound: ScoreBound) -> Self {
        self.info.bound = bound;
        self
    }

    pub fn nodes(mut self, n: u64) -> Self {
        self.info.nodes = Some(n);
        self
    }

    pub fn time(mut self, ms: u64) -> Self {
        self.info.time = Some(ms);
        self
    }

    pub fn pv(mut self, moves: &[&str]) -> Self {
        self.info.pv = moves.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn build(self) -> EngineInfo {
        self.info
    }
}
