//! Display smoothing for a stream of evaluations.
//!
//! Engines jump around from depth to depth and from move to move. The
//! display path turns each raw evaluation into a [`DisplayEvaluation`] that
//! is blended with the previous frame, so a bar or a number moves smoothly
//! but still follows real swings quickly. A second pass,
//! [`resmooth_game`], evens out a finished game using sliding windows.

use serde::{Deserialize, Serialize};

use crate::win_expectancy::population;
use crate::Evaluation;

/// Largest magnitude shown, in centipawns. Mate scores cap here too.
pub const DISPLAY_CEILING_CP: i32 = 1000;

/// Probability changes below this are damped the most.
pub const SMALL_SWING: f64 = 0.05;
/// Probability changes above this are damped the least.
pub const LARGE_SWING: f64 = 0.15;
pub const CALM_WEIGHT: f64 = 0.12;
pub const VOLATILE_WEIGHT: f64 = 0.35;
/// The score follows the probability with this fraction of its weight.
pub const SCORE_DAMPING: f64 = 0.8;

/// Half-width of the flat region of the bar, in units of bar deflection.
/// The bar starts to move past 55% either way.
pub const BAR_DEAD_ZONE: f64 = 0.10;
/// Above 1, so the curve stays flat near even and steepens towards the ends.
pub const BAR_EXPONENT: f64 = 1.5;

/// Frames whose probability moved less than this are stable.
pub const STABILITY_TOLERANCE: f64 = 0.05;

const MIN_WINDOW: usize = 2;
const MAX_WINDOW: usize = 8;
const MIN_SIGMA_PP: f64 = 0.5;
const MAX_SIGMA_PP: f64 = 12.0;

/// Verbal assessment of a position, from White's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Assessment {
    WhiteWinning,
    WhiteMuchBetter,
    WhiteSlightlyBetter,
    Equal,
    BlackSlightlyBetter,
    BlackMuchBetter,
    BlackWinning,
}

impl Assessment {
    /// Label for White's win probability `p`.
    pub fn from_probability(p: f64) -> Self {
        match p {
            p if p >= 0.90 => Assessment::WhiteWinning,
            p if p >= 0.75 => Assessment::WhiteMuchBetter,
            p if p >= 0.60 => Assessment::WhiteSlightlyBetter,
            p if p > 0.40 => Assessment::Equal,
            p if p > 0.25 => Assessment::BlackSlightlyBetter,
            p if p > 0.10 => Assessment::BlackMuchBetter,
            _ => Assessment::BlackWinning,
        }
    }
}

/// One displayed frame. All values are White-relative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayEvaluation {
    /// Smoothed win probability in `[0, 1]`.
    pub win_probability: f64,
    /// Raw evaluation capped to `±DISPLAY_CEILING_CP`.
    pub capped_score: i32,
    /// Smoothed centipawn score for display.
    pub display_score: f64,
    /// Bar deflection in `[-1, 1]`.
    pub evaluation_bar: f64,
    pub assessment: Assessment,
    /// Whether the probability moved less than [`STABILITY_TOLERANCE`].
    pub stable: bool,
}

impl DisplayEvaluation {
    /// Whether this frame is pinned to the level position.
    pub fn is_anchored(&self) -> bool {
        self.capped_score == 0
    }
}

/// Cap an evaluation for display, mapping mate scores first.
pub fn cap_score(eval: Evaluation) -> i32 {
    eval.capped_cp(DISPLAY_CEILING_CP)
}

/// Weight given to the new frame for a probability change of `delta`.
pub fn blend_weight(delta: f64) -> f64 {
    let delta = delta.abs();
    if delta < SMALL_SWING {
        CALM_WEIGHT
    } else if delta > LARGE_SWING {
        VOLATILE_WEIGHT
    } else {
        let t = (delta - SMALL_SWING) / (LARGE_SWING - SMALL_SWING);
        CALM_WEIGHT + t * (VOLATILE_WEIGHT - CALM_WEIGHT)
    }
}

/// Bar deflection for White's win probability `p`.
///
/// Flat around even, then a power curve that compresses small edges so
/// they stay near the centre while decisive ones reach the ends.
pub fn evaluation_bar(p: f64) -> f64 {
    let edge = ((p - 0.5) * 2.0).clamp(-1.0, 1.0);
    if edge.abs() <= BAR_DEAD_ZONE {
        return 0.0;
    }
    let scaled = (edge.abs() - BAR_DEAD_ZONE) / (1.0 - BAR_DEAD_ZONE);
    edge.signum() * scaled.powf(BAR_EXPONENT)
}

fn frame(win_probability: f64, capped_score: i32, display_score: f64, stable: bool) -> DisplayEvaluation {
    DisplayEvaluation {
        win_probability,
        capped_score,
        display_score,
        evaluation_bar: evaluation_bar(win_probability),
        assessment: Assessment::from_probability(win_probability),
        stable,
    }
}

/// Compute the next frame from a White-relative raw evaluation.
///
/// Without a prior frame the raw values are shown as they are. A level
/// position (exactly 0 cp) always shows 50% and a centred bar.
pub fn next_frame(raw: Evaluation, prior: Option<&DisplayEvaluation>) -> DisplayEvaluation {
    let capped = cap_score(raw);
    let raw_p = population::win_probability(f64::from(capped));

    let (p, score) = match prior {
        _ if capped == 0 => (0.5, 0.0),
        None => (raw_p, f64::from(capped)),
        Some(prev) => {
            let delta = raw_p - prev.win_probability;
            let weight = blend_weight(delta);
            let p = prev.win_probability + weight * delta;
            let score = prev.display_score
                + SCORE_DAMPING * weight * (f64::from(capped) - prev.display_score);
            (p, score)
        }
    };

    let stable = prior.map_or(true, |prev| {
        (p - prev.win_probability).abs() < STABILITY_TOLERANCE
    });
    frame(p, capped, score, stable)
}

/// Keeps the previous frame between calls to [`next_frame`].
#[derive(Debug, Clone, Default)]
pub struct DisplaySmoother {
    last: Option<DisplayEvaluation>,
}

impl DisplaySmoother {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue from an existing frame.
    pub fn resume(prior: DisplayEvaluation) -> Self {
        Self { last: Some(prior) }
    }

    pub fn push(&mut self, raw: Evaluation) -> DisplayEvaluation {
        let next = next_frame(raw, self.last.as_ref());
        self.last = Some(next);
        next
    }

    pub fn last(&self) -> Option<&DisplayEvaluation> {
        self.last.as_ref()
    }
}

/// Window length used by [`resmooth_game`] for a game of `len` frames.
pub fn window_len(len: usize) -> usize {
    (len / 10).clamp(MIN_WINDOW, MAX_WINDOW)
}

/// Frames actually averaged around each position: the window centred on
/// the frame, so an even [`window_len`] rounds up to the next odd span.
pub fn window_span(len: usize) -> usize {
    window_len(len) / 2 * 2 + 1
}

/// Second pass over a finished game.
///
/// Each frame with a full centred window of context ([`window_span`]
/// frames) is pulled towards the window mean. The pull is stronger where the window is volatile: the
/// frame keeps `0.5 / σ` of its own value, with σ the window's standard
/// deviation in percentage points clamped to `[0.5, 12]`. Frames near either
/// end of the game and level-anchored frames keep their first-pass values.
pub fn resmooth_game(frames: &[DisplayEvaluation]) -> Vec<DisplayEvaluation> {
    let half = window_span(frames.len()) / 2;
    let percent: Vec<f64> = frames.iter().map(|f| f.win_probability * 100.0).collect();

    let mut out: Vec<DisplayEvaluation> = Vec::with_capacity(frames.len());
    for (i, original) in frames.iter().enumerate() {
        let has_context = i >= half && i + half < frames.len();
        let mut next = *original;

        if has_context && !original.is_anchored() {
            let window = &percent[i - half..=i + half];
            let n = window.len() as f64;
            let mean = window.iter().sum::<f64>() / n;
            let variance = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let sigma = variance.sqrt().clamp(MIN_SIGMA_PP, MAX_SIGMA_PP);
            let own = 0.5 / sigma;
            let smoothed = (own * percent[i] + (1.0 - own) * mean) / 100.0;

            next = frame(smoothed, original.capped_score, original.display_score, true);
        }

        next.stable = match out.last() {
            Some(prev) => (next.win_probability - prev.win_probability).abs() < STABILITY_TOLERANCE,
            None => true,
        };
        out.push(next);
    }
    out
}
