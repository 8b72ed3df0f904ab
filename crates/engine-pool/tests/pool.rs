//! Pool lifecycle tests against a scripted shell engine.

#![cfg(unix)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use engine_pool::{
    CancelToken, EngineConfig, EngineError, EnginePool, EngineProcess, EngineSession,
    EngineSource, PoolError, SearchRequest,
};
use uci::Score;

const WAIT: Duration = Duration::from_secs(2);

/// A minimal UCI engine written in POSIX shell.
fn fake_engine(on_go: &str, on_stop: &str) -> EngineConfig {
    let script = format!(
        r#"while read -r line; do
  case "$line" in
    uci) echo "id name FakeFish"; echo "option name Hash type spin default 16 min 1 max 1024"; echo uciok;;
    isready) echo readyok;;
    go*) {on_go};;
    stop) {on_stop};;
    quit) exit 0;;
  esac
done"#
    );
    let mut config = EngineConfig::new("sh").with_args(["-c".to_string(), script]);
    config.handshake_timeout = Duration::from_secs(2);
    config.search_grace = Duration::from_millis(100);
    config
}

fn quick_engine() -> EngineConfig {
    fake_engine(
        r#"echo "info depth 1 score cp 20 nodes 10 pv e2e4 e7e5"; echo "garbage from the engine"; echo "info depth 2 score cp 24 nodes 30 pv e2e4 e7e5"; echo "bestmove e2e4 ponder e7e5""#,
        ":",
    )
}

/// Never finishes a search on its own; answers `stop` with a best move.
fn stalling_engine() -> EngineConfig {
    fake_engine(
        r#"echo "info depth 1 score cp 5 pv d2d4""#,
        r#"echo "bestmove d2d4""#,
    )
}

fn request() -> SearchRequest {
    SearchRequest::startpos(vec![], 2)
}

#[tokio::test]
async fn test_start_and_evaluate() {
    let pool = EnginePool::start(quick_engine(), 2, WAIT).await.unwrap();
    assert_eq!(pool.capacity(), 2);
    assert_eq!(pool.available(), 2);

    let eval = pool.evaluate(&request()).await.unwrap();
    assert_eq!(eval.score, Score::Cp(24));
    assert_eq!(eval.depth, 2);
    assert_eq!(eval.best_move.as_deref(), Some("e2e4"));
    assert_eq!(eval.expected_reply(), Some("e7e5"));

    // Released engines are immediately available again.
    assert_eq!(pool.available(), 2);
    pool.shutdown().await;
}

#[tokio::test]
async fn test_handshake_records_advertised_options() {
    let config = quick_engine().with_option("Contempt", "10");
    let engine = EngineProcess::spawn(0, &config).await.unwrap();
    assert_eq!(engine.name(), "FakeFish");
    assert!(engine.supports("Hash"));
    assert!(engine.supports("hash"));
    assert!(!engine.supports("MultiPV"));
    engine.quit().await;
}

#[tokio::test]
async fn test_missing_executable_gives_no_engines() {
    let config = EngineConfig::new("/nonexistent/path/to/stockfish");
    match EnginePool::start(config, 2, WAIT).await {
        Err(PoolError::NoEngines { requested }) => assert_eq!(requested, 2),
        other => panic!("Expected NoEngines, got {:?}", other.map(|p| p.capacity())),
    }
}

#[tokio::test]
async fn test_silent_engine_fails_handshake() {
    let mut config = EngineConfig::new("sh").with_args(["-c", "while read -r line; do :; done"]);
    config.handshake_timeout = Duration::from_millis(200);
    assert!(matches!(
        EnginePool::start(config, 1, WAIT).await,
        Err(PoolError::NoEngines { .. })
    ));
}

#[tokio::test]
async fn test_acquire_beyond_capacity_times_out() {
    let pool = EnginePool::start(quick_engine(), 1, WAIT).await.unwrap();

    let held = pool.acquire().await.unwrap();
    let err = pool
        .acquire_timeout(Duration::from_millis(50))
        .await
        .err()
        .expect("second acquire should time out");
    assert!(matches!(err, PoolError::AcquireTimeout(_)));
    assert!(err.is_transient());

    pool.release(held).await;
    let again = pool.acquire_timeout(Duration::from_millis(500)).await;
    assert!(again.is_ok());
}

#[tokio::test]
async fn test_waiting_caller_succeeds_after_release() {
    let pool = EnginePool::start(quick_engine(), 1, WAIT).await.unwrap();
    let held = pool.acquire().await.unwrap();

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire_timeout(Duration::from_secs(2)).await.is_ok() })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    held.release().await;
    assert!(waiter.await.unwrap());
}

#[tokio::test]
async fn test_handles_never_double_issued() {
    let pool = EnginePool::start(quick_engine(), 2, WAIT).await.unwrap();
    let in_use = Arc::new(Mutex::new(HashSet::new()));

    let mut tasks = Vec::new();
    for _ in 0..6 {
        let pool = pool.clone();
        let in_use = Arc::clone(&in_use);
        tasks.push(tokio::spawn(async move {
            let mut engine = pool.acquire_timeout(Duration::from_secs(5)).await.unwrap();
            let id = engine.id().unwrap();
            assert!(in_use.lock().unwrap().insert(id), "engine {id} issued twice");

            engine.search(&request(), &CancelToken::new()).await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;

            in_use.lock().unwrap().remove(&id);
            engine.release().await;
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(pool.available(), 2);
}

#[tokio::test]
async fn test_cancel_stops_search_and_keeps_engine() {
    let pool = EnginePool::start(stalling_engine(), 1, WAIT).await.unwrap();
    let mut engine = pool.acquire().await.unwrap();

    let cancel = CancelToken::new();
    let trigger = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        })
    };

    let result = engine.search(&request(), &cancel).await;
    trigger.await.unwrap();
    assert!(matches!(result, Err(EngineError::Cancelled)));
    assert!(engine.is_healthy());

    engine.release().await;
    assert_eq!(pool.capacity(), 1);
    assert_eq!(pool.available(), 1);
}

#[tokio::test]
async fn test_overrunning_search_is_stopped_at_deadline() {
    let pool = EnginePool::start(stalling_engine(), 1, WAIT).await.unwrap();
    let req = request().with_movetime(50);

    let eval = tokio::time::timeout(Duration::from_secs(2), pool.evaluate(&req))
        .await
        .expect("deadline should stop the search")
        .unwrap();
    assert_eq!(eval.score, Score::Cp(5));
    assert_eq!(eval.best_move.as_deref(), Some("d2d4"));
}

#[tokio::test]
async fn test_crashed_engine_is_discarded() {
    let pool = EnginePool::start(fake_engine("exit 1", ":"), 1, WAIT)
        .await
        .unwrap();
    let mut engine = pool.acquire().await.unwrap();

    let result = engine.search(&request(), &CancelToken::new()).await;
    assert!(matches!(result, Err(EngineError::Exited)));
    assert!(!engine.is_healthy());

    engine.release().await;
    assert_eq!(pool.capacity(), 0);
    assert!(matches!(
        pool.acquire_timeout(Duration::from_millis(100)).await,
        Err(PoolError::NoEngines { .. })
    ));
}

#[tokio::test]
async fn test_dropped_handle_returns_to_pool() {
    let pool = EnginePool::start(quick_engine(), 1, WAIT).await.unwrap();
    {
        let _engine = pool.acquire().await.unwrap();
    }
    let again = pool.acquire_timeout(Duration::from_secs(1)).await;
    assert!(again.is_ok());
}

#[tokio::test]
async fn test_multipv_alternatives() {
    let config = fake_engine(
        r#"echo "info depth 3 multipv 1 score cp 40 pv e2e4 e7e5"; echo "info depth 3 multipv 2 score cp 10 pv d2d4"; echo "bestmove e2e4""#,
        ":",
    );
    let pool = EnginePool::start(config, 1, WAIT).await.unwrap();

    let eval = pool.evaluate(&request().with_lines(2)).await.unwrap();
    assert_eq!(eval.score, Score::Cp(40));
    let second = eval.second_best().unwrap();
    assert_eq!(second.score, Score::Cp(10));
    assert_eq!(second.first_move(), Some("d2d4"));
}

#[tokio::test]
async fn test_terminal_position() {
    let config = fake_engine(
        r#"echo "info depth 0 score mate 0"; echo "bestmove (none)""#,
        ":",
    );
    let pool = EnginePool::start(config, 1, WAIT).await.unwrap();

    let eval = pool.evaluate(&request()).await.unwrap();
    assert_eq!(eval.score, Score::Mate(0));
    assert!(eval.best_move.is_none());
    assert!(eval.is_terminal());
}

#[tokio::test]
async fn test_configure_applies_to_idle_engines() {
    let pool = EnginePool::start(quick_engine(), 2, WAIT).await.unwrap();
    pool.configure("Hash", "128").await.unwrap();
    assert_eq!(pool.capacity(), 2);
    assert_eq!(pool.available(), 2);
}

#[tokio::test]
async fn test_configure_waits_for_busy_engines() {
    let pool = EnginePool::start(quick_engine(), 1, Duration::from_millis(100))
        .await
        .unwrap();
    let held = pool.acquire().await.unwrap();

    assert!(matches!(
        pool.configure("Hash", "128").await,
        Err(PoolError::AcquireTimeout(_))
    ));

    held.release().await;
    assert!(pool.configure("Hash", "128").await.is_ok());
}

#[tokio::test]
async fn test_shutdown_closes_pool() {
    let pool = EnginePool::start(quick_engine(), 1, WAIT).await.unwrap();
    pool.shutdown().await;
    assert!(matches!(
        pool.acquire_timeout(Duration::from_millis(100)).await,
        Err(PoolError::Closed)
    ));
}

#[tokio::test]
async fn test_pool_as_engine_source() {
    let pool = EnginePool::start(quick_engine(), 1, WAIT).await.unwrap();
    assert_eq!(EngineSource::capacity(&pool), 1);

    let mut session = pool.checkout().await.unwrap();
    let eval = session
        .evaluate(&request(), &CancelToken::new())
        .await
        .unwrap();
    assert_eq!(eval.best_move.as_deref(), Some("e2e4"));
    session.finish().await;
    assert_eq!(pool.available(), 1);
}
