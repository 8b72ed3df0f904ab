//! review - rating-aware chess move review.
//!
//! Analyses a game from PGN, evaluates a single position, or calibrates
//! the classification thresholds from a corpus of rated games.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use calibration::{read_corpus_dir, read_pgn_file, Calibrator};
use chess_analysis::{GameAnalyzer, MoveClassifier, Ratings, ThresholdStore, ThresholdTable};
use chess_openings::{builtin_book, OpeningTheory, TheoryBook};
use clap::{Parser, Subcommand};
use engine_pool::{CancelToken, EnginePool};
use review_cli::{read_first_game, report, ReviewConfig};
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "review")]
#[command(about = "Rating-aware chess move review")]
struct Cli {
    /// Configuration file (default: review.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Engine executable, overrides [engine].path
    #[arg(long, global = true)]
    engine: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Review the first game of a PGN file
    Analyze {
        pgn: PathBuf,
        /// White's rating, overrides the WhiteElo tag
        #[arg(long)]
        white_elo: Option<i32>,
        /// Black's rating, overrides the BlackElo tag
        #[arg(long)]
        black_elo: Option<i32>,
        /// Search depth per position
        #[arg(short, long)]
        depth: Option<u32>,
    },
    /// Evaluate one position
    Position {
        fen: String,
        #[arg(short, long)]
        depth: Option<u32>,
        /// Number of lines to search
        #[arg(short, long)]
        lines: Option<u32>,
    },
    /// Derive thresholds from rated games
    Calibrate {
        /// A .pgn file or a directory of them
        corpus: PathBuf,
        /// Where to write the table (default: the configured thresholds path)
        #[arg(short, long)]
        out: Option<PathBuf>,
        #[arg(short, long)]
        depth: Option<u32>,
        #[arg(long)]
        min_samples: Option<usize>,
        #[arg(long)]
        max_games: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = ReviewConfig::load(cli.config.as_deref())?;
    if let Some(engine) = cli.engine {
        config.engine.path = engine;
    }

    let cancel = CancelToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling");
            on_signal.cancel();
        }
    });

    match cli.command {
        Commands::Analyze {
            pgn,
            white_elo,
            black_elo,
            depth,
        } => {
            if let Some(depth) = depth {
                config.analysis.depth = depth;
            }
            analyze(&config, &pgn, white_elo, black_elo, cli.json, &cancel).await
        }
        Commands::Position { fen, depth, lines } => {
            if let Some(depth) = depth {
                config.analysis.depth = depth;
            }
            if let Some(lines) = lines {
                config.analysis.lines = lines;
            }
            position(&config, &fen, cli.json, &cancel).await
        }
        Commands::Calibrate {
            corpus,
            out,
            depth,
            min_samples,
            max_games,
        } => {
            let run = &mut config.calibration.run;
            if let Some(depth) = depth {
                run.depth = depth;
            }
            if let Some(min_samples) = min_samples {
                run.min_samples = min_samples;
            }
            if max_games.is_some() {
                run.max_games = max_games;
            }
            let out = out.unwrap_or_else(|| config.thresholds.clone());
            calibrate(&config, &corpus, &out, cli.json, &cancel).await
        }
    }
}

fn opening_theory(config: &ReviewConfig) -> Result<Arc<dyn OpeningTheory>> {
    Ok(match &config.book {
        Some(path) => Arc::new(
            TheoryBook::load(path)
                .with_context(|| format!("loading opening book {}", path.display()))?,
        ),
        None => Arc::new(builtin_book()),
    })
}

async fn start_analyzer(config: &ReviewConfig) -> Result<GameAnalyzer<EnginePool>> {
    let pool = EnginePool::start(
        config.engine.clone(),
        config.pool.size.max(1),
        config.pool.acquire_timeout(),
    )
        .await
        .with_context(|| format!("starting engine {}", config.engine.path.display()))?;
    let thresholds = Arc::new(ThresholdStore::open(
        &config.thresholds,
        ThresholdTable::defaults(),
    ));
    Ok(GameAnalyzer::new(pool, thresholds)
        .with_theory(opening_theory(config)?)
        .with_classifier(MoveClassifier::new(config.classifier.clone())))
}

async fn analyze(
    config: &ReviewConfig,
    path: &Path,
    white_elo: Option<i32>,
    black_elo: Option<i32>,
    json: bool,
    cancel: &CancelToken,
) -> Result<()> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let game = read_first_game(BufReader::new(file))
        .with_context(|| format!("reading {}", path.display()))?
        .with_context(|| format!("no game in {}", path.display()))?;

    let ratings = Ratings {
        white: white_elo.or(game.white_elo),
        black: black_elo.or(game.black_elo),
    };
    info!(
        white = game.white.as_deref().unwrap_or("?"),
        black = game.black.as_deref().unwrap_or("?"),
        moves = game.moves.len(),
        "Reviewing game"
    );

    let analyzer = start_analyzer(config).await?;
    let result = analyzer
        .analyze_game(
            game.fen.as_deref(),
            &game.moves,
            ratings,
            &config.analysis,
            |p| debug!(completed = p.completed, total = p.total, "progress"),
            cancel,
        )
        .await;
    analyzer.source().shutdown().await;
    let review = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&review)?);
    } else {
        print!("{}", report::render_review(&review));
    }
    Ok(())
}

async fn position(config: &ReviewConfig, fen: &str, json: bool, cancel: &CancelToken) -> Result<()> {
    let analyzer = start_analyzer(config).await?;
    let result = analyzer
        .analyze_position(fen, &config.analysis, None, cancel)
        .await;
    analyzer.source().shutdown().await;
    let evaluation = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&evaluation)?);
    } else {
        print!("{}", report::render_position(&evaluation));
    }
    Ok(())
}

async fn calibrate(
    config: &ReviewConfig,
    corpus_path: &Path,
    out: &Path,
    json: bool,
    cancel: &CancelToken,
) -> Result<()> {
    let corpus = if corpus_path.is_dir() {
        read_corpus_dir(corpus_path)?
    } else {
        read_pgn_file(corpus_path)?
    };
    info!(
        games = corpus.games.len(),
        skipped = corpus.skipped(),
        "Corpus loaded"
    );

    let pool = EnginePool::start(
        config.engine.clone(),
        config.calibration.pool_size,
        config.pool.acquire_timeout(),
    )
    .await
    .with_context(|| format!("starting engine {}", config.engine.path.display()))?;

    // Existing values stay in place for buckets the corpus cannot fill.
    let defaults = match ThresholdTable::load(out) {
        Ok(table) => table,
        Err(e) => {
            if out.exists() {
                warn!(path = %out.display(), error = %e, "Ignoring unreadable threshold table");
            }
            ThresholdTable::defaults()
        }
    };

    let calibrator = Calibrator::new(pool, defaults, config.calibration.run.clone());
    let result = calibrator
        .run(
            corpus,
            |done, total| {
                if done % 50 == 0 || done == total {
                    info!(done, total, "Calibration progress");
                }
            },
            cancel,
        )
        .await;
    calibrator.source().shutdown().await;
    let summary = result?;

    summary
        .table
        .save(out)
        .with_context(|| format!("writing {}", out.display()))?;
    info!(path = %out.display(), "Threshold table written");

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", report::render_calibration(&summary));
    }
    Ok(())
}
