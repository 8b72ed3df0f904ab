//! Plain-text rendering of reviews and calibration results.

use std::fmt::Write;

use calibration::CalibrationReport;
use chess_analysis::{GameReview, MoveClassification, MoveRecord, PlayerStats, PositionReport, Side};

fn move_label(record: &MoveRecord) -> String {
    match record.side {
        Side::White => format!("{}. {}", record.move_number, record.san),
        Side::Black => format!("{}... {}", record.move_number, record.san),
    }
}

fn player_line(name: &str, stats: &PlayerStats) -> String {
    let mut line = format!(
        "{name:<6} rating {} ({})  EP accuracy {:.1}%  avg EP loss {:.3}  accuracy {:.1}%",
        stats.rating, stats.bucket, stats.ep_accuracy, stats.average_ep_loss, stats.population_accuracy
    );
    let counts: Vec<String> = MoveClassification::ALL
        .iter()
        .filter(|c| stats.count(**c) > 0)
        .map(|c| format!("{} {}", c, stats.count(*c)))
        .collect();
    if !counts.is_empty() {
        let _ = write!(line, "\n       {}", counts.join(", "));
    }
    if stats.failed_moves > 0 {
        let _ = write!(line, "\n       {} move(s) could not be evaluated", stats.failed_moves);
    }
    line
}

/// One line per move, then a summary per player and the critical moments.
pub fn render_review(review: &GameReview) -> String {
    let mut out = String::new();
    if let Some(opening) = &review.opening {
        let _ = writeln!(out, "Opening: {opening}\n");
    }

    for record in &review.moves {
        let label = move_label(record);
        match (&record.classification, &record.error) {
            (Some(class), _) => {
                let eval = record
                    .eval_after
                    .map(|e| e.to_string())
                    .unwrap_or_default();
                let best = match &record.best_move {
                    Some(best) if *best != record.uci => format!("  best {best}"),
                    _ => String::new(),
                };
                let _ = writeln!(out, "{label:<14} {class:<11} {eval:>7}{best}");
            }
            (None, Some(error)) => {
                let _ = writeln!(out, "{label:<14} (not evaluated: {error})");
            }
            (None, None) => {
                let _ = writeln!(out, "{label:<14} -");
            }
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "{}", player_line("White", &review.white));
    let _ = writeln!(out, "{}", player_line("Black", &review.black));

    if !review.critical_moments.is_empty() {
        let _ = writeln!(out, "\nCritical moments:");
        for moment in &review.critical_moments {
            let class = moment
                .classification
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".to_string());
            let _ = writeln!(
                out,
                "  ply {:>3}  {:<8} {:<10} swing {:+.0}%",
                moment.ply + 1,
                moment.san,
                class,
                moment.win_probability_swing * 100.0
            );
        }
    }
    out
}

pub fn render_position(report: &PositionReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", report.fen);
    let _ = writeln!(
        out,
        "Evaluation {} (White), depth {}",
        report.white_relative, report.evaluation.depth
    );
    if let Some(best) = &report.evaluation.best_move {
        let _ = writeln!(out, "Best move {best}  line {}", report.evaluation.pv.join(" "));
    }
    for line in &report.evaluation.alternatives {
        let _ = writeln!(out, "Line {}: {}", line.multipv, line.pv.join(" "));
    }
    let _ = writeln!(
        out,
        "White wins {:.0}%  bar {:+.2}  {:?}",
        report.display.win_probability * 100.0,
        report.display.evaluation_bar,
        report.display.assessment
    );
    out
}

pub fn render_calibration(report: &CalibrationReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Games used {}, skipped {}, failed {}",
        report.games_used, report.games_skipped, report.games_failed
    );
    for (bucket, samples) in &report.samples_per_bucket {
        let entry = report.table.get(*bucket);
        let status = if report.insufficient.contains(bucket) {
            "default"
        } else {
            "calibrated"
        };
        let values: Vec<String> = entry
            .thresholds
            .values()
            .iter()
            .map(|v| format!("{v:.4}"))
            .collect();
        let _ = writeln!(
            out,
            "{:<10} {:>7} moves  {:<10}  [{}]",
            bucket.label(),
            samples,
            status,
            values.join(", ")
        );
    }
    out
}
