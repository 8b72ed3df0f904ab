//! Integration tests for chess-analysis crate.
//!
//! These tests require Stockfish to be installed and available in PATH.
//! Run with: `cargo test -p chess-analysis --test integration -- --ignored`

use std::sync::Arc;
use std::time::Duration;

use chess_analysis::{
    AnalysisOptions, GameAnalyzer, MoveClassification, Ratings, ThresholdStore, ThresholdTable,
};
use engine_pool::{CancelToken, EngineConfig, EnginePool};

/// Check if Stockfish is available in PATH.
fn stockfish_available() -> bool {
    std::process::Command::new("stockfish")
        .arg("--version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok()
}

fn options() -> AnalysisOptions {
    AnalysisOptions {
        depth: 10,
        movetime_ms: 0,
        ..AnalysisOptions::default()
    }
}

async fn analyzer(size: usize) -> GameAnalyzer<EnginePool> {
    let pool = EnginePool::start(EngineConfig::new("stockfish"), size, Duration::from_secs(30))
        .await
        .expect("Failed to start engine pool");
    GameAnalyzer::new(pool, Arc::new(ThresholdStore::new(ThresholdTable::defaults())))
        .with_theory(Arc::new(chess_openings::builtin_book()))
}

#[tokio::test]
#[ignore = "requires Stockfish"]
async fn test_starting_position() {
    if !stockfish_available() {
        eprintln!("Skipping test: Stockfish not available");
        return;
    }

    let analyzer = analyzer(1).await;
    let report = analyzer
        .analyze_position(
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
            &options(),
            None,
            &CancelToken::new(),
        )
        .await
        .expect("Failed to analyze starting position");

    assert!(report.evaluation.best_move.is_some());
    assert!(report.evaluation.depth >= 10);
    // Nobody is winning from the start.
    assert!(report.display.win_probability > 0.4 && report.display.win_probability < 0.6);

    analyzer.source().shutdown().await;
}

#[tokio::test]
#[ignore = "requires Stockfish"]
async fn test_scholars_mate_game_analysis() {
    if !stockfish_available() {
        eprintln!("Skipping test: Stockfish not available");
        return;
    }

    // Scholar's mate: 1.e4 e5 2.Qh5 Nc6 3.Bc4 Nf6?? 4.Qxf7#
    let moves: Vec<String> = ["e4", "e5", "Qh5", "Nc6", "Bc4", "Nf6", "Qxf7#"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let analyzer = analyzer(2).await;
    let mut progress = Vec::new();
    let review = analyzer
        .analyze_game(
            None,
            &moves,
            Ratings::new(1400, 1400),
            &options(),
            |p| progress.push(p.completed),
            &CancelToken::new(),
        )
        .await
        .expect("Failed to analyze game");

    assert_eq!(review.moves.len(), 7);
    assert_eq!(progress, vec![1, 2, 3, 4, 5, 6, 7]);
    assert_eq!(review.moves[0].classification, Some(MoveClassification::Book));

    // Nf6?? allows mate in one.
    let nf6 = &review.moves[5];
    assert_eq!(nf6.san, "Nf6");
    assert_eq!(nf6.classification, Some(MoveClassification::Blunder));
    assert!(review.critical_moments.iter().any(|m| m.ply == 5));

    // The mating move loses nothing.
    let mate = &review.moves[6];
    assert!(mate.expected_points.unwrap().classification_loss() < 1e-9);
    assert_eq!(review.black.count(MoveClassification::Blunder), 1);

    analyzer.source().shutdown().await;
}
