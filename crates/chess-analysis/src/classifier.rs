//! Move classification against rating-bucket thresholds.
//!
//! Rules are tried in a fixed order and the first that matches wins:
//! Book, Brilliant, Great, then the loss bands Best through Miss, and
//! Blunder for everything beyond P90.

use serde::{Deserialize, Serialize};

use crate::material::SacrificeThresholds;
use crate::quality::MoveClassification;
use crate::thresholds::{EpThresholds, RatingBucket};
use crate::win_expectancy::ExpectedPoints;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Book moves are only recognised up to this full-move number.
    pub opening_window: u32,
    /// A brilliant move cannot start from a position already this good.
    pub winning_before_limit: f64,
    /// A brilliant move must leave the mover at least this well off.
    pub losing_after_floor: f64,
    /// Great requires the next best line to be clearly worse.
    pub require_only_move: bool,
    /// EP gap between the best and the second-best line for Great.
    pub only_move_gap: f64,
    pub sacrifice: SacrificeThresholds,
    /// Distance from a tier boundary at which confidence reaches 1.
    pub confidence_margin: f64,
    pub min_confidence: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            opening_window: 15,
            winning_before_limit: 0.90,
            losing_after_floor: 0.50,
            require_only_move: true,
            only_move_gap: 0.10,
            sacrifice: SacrificeThresholds::default(),
            confidence_margin: 0.02,
            min_confidence: 0.05,
        }
    }
}

/// Everything the classifier needs to know about one move.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveFacts {
    pub move_number: u32,
    /// The move continues known theory.
    pub is_book: bool,
    /// The move is the engine's first choice.
    pub is_best: bool,
    /// Mover-relative expected points before and after.
    pub expected_points: ExpectedPoints,
    /// Mover's material change after the expected reply, if known.
    pub material_change: Option<i32>,
    pub bucket: RatingBucket,
    /// EP of the best line minus EP of the second-best line, if the search
    /// produced more than one line.
    pub second_best_gap: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationOutcome {
    pub classification: MoveClassification,
    pub rationale: String,
    /// `1.0` far from any tier boundary, down to the configured floor on one.
    pub confidence: f64,
}

const LOSS_BANDS: [(MoveClassification, &str); 6] = [
    (MoveClassification::Best, "P5"),
    (MoveClassification::Excellent, "P10"),
    (MoveClassification::Good, "P25"),
    (MoveClassification::Inaccuracy, "P50"),
    (MoveClassification::Mistake, "P75"),
    (MoveClassification::Miss, "P90"),
];

#[derive(Debug, Clone, Default)]
pub struct MoveClassifier {
    config: ClassifierConfig,
}

impl MoveClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify one move using `thresholds` for the mover's bucket.
    pub fn classify(&self, facts: &MoveFacts, thresholds: &EpThresholds) -> ClassificationOutcome {
        let cfg = &self.config;
        let ep = &facts.expected_points;
        let loss = ep.classification_loss();

        if facts.is_book && facts.move_number <= cfg.opening_window {
            return ClassificationOutcome {
                classification: MoveClassification::Book,
                rationale: format!("known theory at move {}", facts.move_number),
                confidence: 1.0,
            };
        }

        if facts.is_best && loss <= thresholds.p1() {
            if let Some(given_up) = self.sacrifice(facts) {
                if ep.before <= cfg.winning_before_limit && ep.after >= cfg.losing_after_floor {
                    return self.outcome(
                        MoveClassification::Brilliant,
                        format!(
                            "best move giving up {given_up} pawns of material, EP {:.3} -> {:.3}",
                            ep.before, ep.after
                        ),
                        (cfg.winning_before_limit - ep.before).min(ep.after - cfg.losing_after_floor),
                    );
                }
            }
        }

        if facts.is_best && loss <= thresholds.p5() {
            let gap = facts.second_best_gap;
            let only_move = match gap {
                Some(gap) if cfg.require_only_move => gap >= cfg.only_move_gap,
                _ => true,
            };
            if only_move {
                let rationale = match gap {
                    Some(gap) => format!("best move; the next best line is {gap:.3} EP worse"),
                    None => "best move; no alternative line to compare".to_string(),
                };
                let mut distance = thresholds.p5() - loss;
                if let (Some(gap), true) = (gap, cfg.require_only_move) {
                    distance = distance.min(gap - cfg.only_move_gap);
                }
                return self.outcome(MoveClassification::Great, rationale, distance);
            }
        }

        let boundaries = thresholds.tier_boundaries();
        for (i, (class, label)) in LOSS_BANDS.iter().enumerate() {
            if loss <= boundaries[i] {
                return self.outcome(
                    *class,
                    format!(
                        "EP loss {loss:.4} within {label} ({:.4}) for {}",
                        boundaries[i], facts.bucket
                    ),
                    nearest_boundary(loss, &boundaries),
                );
            }
        }

        self.outcome(
            MoveClassification::Blunder,
            format!(
                "EP loss {loss:.4} beyond P90 ({:.4}) for {}",
                thresholds.p90(),
                facts.bucket
            ),
            loss - thresholds.p90(),
        )
    }

    /// Pawns given up when the move qualifies as a sacrifice for the bucket.
    fn sacrifice(&self, facts: &MoveFacts) -> Option<i32> {
        let change = facts.material_change?;
        self.config
            .sacrifice
            .is_sacrifice(change, facts.bucket)
            .then_some(-change)
    }

    fn outcome(
        &self,
        classification: MoveClassification,
        rationale: String,
        distance: f64,
    ) -> ClassificationOutcome {
        ClassificationOutcome {
            classification,
            rationale,
            confidence: self.confidence(distance),
        }
    }

    fn confidence(&self, distance: f64) -> f64 {
        let margin = self.config.confidence_margin;
        let raw = if margin > 0.0 {
            (distance.abs() / margin).min(1.0)
        } else {
            1.0
        };
        raw.max(self.config.min_confidence)
    }
}

fn nearest_boundary(loss: f64, boundaries: &[f64]) -> f64 {
    boundaries
        .iter()
        .map(|b| (loss - b).abs())
        .fold(f64::INFINITY, f64::min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thresholds::ThresholdTable;

    fn thresholds() -> EpThresholds {
        // 1201-1600 defaults: 0, .001, .004, .015, .04, .10, .22
        *ThresholdTable::defaults().for_rating(1500)
    }

    fn facts(before: f64, after: f64) -> MoveFacts {
        MoveFacts {
            move_number: 20,
            is_book: false,
            is_best: false,
            expected_points: ExpectedPoints::from_probabilities(before, after),
            material_change: Some(0),
            bucket: RatingBucket::From1201To1600,
            second_best_gap: None,
        }
    }

    fn classify(facts: &MoveFacts) -> ClassificationOutcome {
        MoveClassifier::default().classify(facts, &thresholds())
    }

    #[test]
    fn test_book_only_inside_opening_window() {
        let mut f = facts(0.5, 0.3);
        f.is_book = true;
        f.move_number = 15;
        let outcome = classify(&f);
        assert_eq!(outcome.classification, MoveClassification::Book);
        assert_eq!(outcome.confidence, 1.0);

        f.move_number = 16;
        assert_eq!(classify(&f).classification, MoveClassification::Miss);
    }

    #[test]
    fn test_loss_bands() {
        let cases = [
            (0.0005, MoveClassification::Best),
            (0.003, MoveClassification::Excellent),
            (0.01, MoveClassification::Good),
            (0.03, MoveClassification::Inaccuracy),
            (0.08, MoveClassification::Mistake),
            (0.2, MoveClassification::Miss),
            (0.3, MoveClassification::Blunder),
        ];
        for (loss, expected) in cases {
            let outcome = classify(&facts(0.6, 0.6 - loss));
            assert_eq!(outcome.classification, expected, "loss {loss}");
        }
    }

    #[test]
    fn test_band_boundaries_are_inclusive() {
        let t = EpThresholds::new([0.0, 0.01, 0.02, 0.04, 0.08, 0.16, 0.32]).unwrap();
        let classifier = MoveClassifier::default();
        let f = facts(0.75, 0.5);
        assert_eq!(
            classifier.classify(&f, &t).classification,
            MoveClassification::Miss
        );
        let mut f = facts(0.5, 0.5);
        f.expected_points.loss = 0.32;
        assert_eq!(
            classifier.classify(&f, &t).classification,
            MoveClassification::Miss
        );
    }

    #[test]
    fn test_improvement_is_zero_loss() {
        let outcome = classify(&facts(0.4, 0.55));
        assert_eq!(outcome.classification, MoveClassification::Best);
    }

    #[test]
    fn test_brilliant_sacrifice() {
        let mut f = facts(0.62, 0.62);
        f.is_best = true;
        f.material_change = Some(-3);
        f.second_best_gap = Some(0.3);
        let outcome = classify(&f);
        assert_eq!(outcome.classification, MoveClassification::Brilliant);
        assert!(outcome.rationale.contains("3 pawns"));
    }

    #[test]
    fn test_sacrifice_too_small_for_bucket() {
        let mut f = facts(0.62, 0.62);
        f.is_best = true;
        f.material_change = Some(-2);
        f.second_best_gap = Some(0.3);
        assert_eq!(classify(&f).classification, MoveClassification::Great);

        // The same offer is enough below 1200.
        f.bucket = RatingBucket::UpTo1200;
        let low = *ThresholdTable::defaults().for_rating(1000);
        assert_eq!(
            MoveClassifier::default().classify(&f, &low).classification,
            MoveClassification::Brilliant
        );
    }

    #[test]
    fn test_no_brilliant_when_already_winning_or_losing() {
        let mut f = facts(0.95, 0.95);
        f.is_best = true;
        f.material_change = Some(-5);
        assert_ne!(classify(&f).classification, MoveClassification::Brilliant);

        let mut f = facts(0.3, 0.3);
        f.is_best = true;
        f.material_change = Some(-5);
        assert_ne!(classify(&f).classification, MoveClassification::Brilliant);
    }

    #[test]
    fn test_brilliant_needs_the_best_move() {
        let mut f = facts(0.6, 0.6);
        f.material_change = Some(-9);
        assert_eq!(classify(&f).classification, MoveClassification::Best);
    }

    #[test]
    fn test_great_requires_only_move() {
        let mut f = facts(0.55, 0.5495);
        f.is_best = true;
        f.second_best_gap = Some(0.02);
        assert_eq!(classify(&f).classification, MoveClassification::Best);

        f.second_best_gap = Some(0.12);
        assert_eq!(classify(&f).classification, MoveClassification::Great);

        let relaxed = MoveClassifier::new(ClassifierConfig {
            require_only_move: false,
            ..ClassifierConfig::default()
        });
        f.second_best_gap = Some(0.02);
        assert_eq!(
            relaxed.classify(&f, &thresholds()).classification,
            MoveClassification::Great
        );
    }

    #[test]
    fn test_confidence_near_boundary() {
        // P25 = 0.015: a loss of 0.0149 sits right on the Good/Inaccuracy edge.
        let near = classify(&facts(0.5, 0.5 - 0.0149));
        assert_eq!(near.classification, MoveClassification::Good);
        assert!(near.confidence < 0.1);
        assert!(near.confidence >= 0.05);

        let far = classify(&facts(0.9, 0.4));
        assert_eq!(far.classification, MoveClassification::Blunder);
        assert_eq!(far.confidence, 1.0);
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: ClassifierConfig =
            serde_json::from_str(r#"{"opening_window": 10, "sacrifice": {"from_2001": 5}}"#).unwrap();
        assert_eq!(config.opening_window, 10);
        assert_eq!(config.sacrifice.from_2001, 5);
        assert_eq!(config.sacrifice.up_to_1200, 2);
        assert!(config.require_only_move);
    }
}
