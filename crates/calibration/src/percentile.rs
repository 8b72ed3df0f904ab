//! Percentiles by linear interpolation between order statistics.

use chess_analysis::thresholds::PERCENTILES;

/// The `p`-th percentile (0-100) of `sorted`, which must be ascending.
///
/// The rank is `p / 100 × (n − 1)`; values between two order statistics are
/// interpolated linearly.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let rank = (p / 100.0).clamp(0.0, 1.0) * last as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// P1, P5, P10, P25, P50, P75 and P90 of EP losses. Negative losses
/// (improvements) count as zero.
pub fn loss_percentiles(losses: &[f64]) -> Option<[f64; 7]> {
    let mut sorted: Vec<f64> = losses
        .iter()
        .filter(|l| l.is_finite())
        .map(|l| l.max(0.0))
        .collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    let mut out = [0.0; 7];
    for (slot, p) in out.iter_mut().zip(PERCENTILES) {
        *slot = percentile(&sorted, f64::from(p))?;
    }
    Some(out)
}
