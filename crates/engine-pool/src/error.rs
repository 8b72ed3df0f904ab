use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while driving a single engine process.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The executable could not be started.
    #[error("Failed to spawn engine {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The engine started but never completed the `uci`/`isready` exchange.
    #[error("Engine handshake failed: {0}")]
    Handshake(String),
    /// The engine closed its output.
    #[error("Engine process exited unexpectedly")]
    Exited,
    /// Reading from or writing to the engine failed.
    #[error("Engine I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The engine did not answer within the allowed time.
    #[error("Engine timed out during {0}")]
    Timeout(&'static str),
    /// The search ended without a single scored `info` line.
    #[error("Engine reported no score")]
    NoScore,
    /// The search ended without a move although the position has legal moves.
    #[error("Engine reported no best move")]
    MissingBestMove,
    /// The caller cancelled the search. The process is still usable.
    #[error("Search cancelled")]
    Cancelled,
    /// A command could not be formatted.
    #[error(transparent)]
    Protocol(#[from] uci::UciError),
}

impl EngineError {
    /// Whether the process that produced this error must be discarded.
    pub fn is_process_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::Spawn { .. }
                | EngineError::Handshake(_)
                | EngineError::Exited
                | EngineError::Io(_)
                | EngineError::Timeout(_)
        )
    }
}

/// Errors raised by the pool itself.
#[derive(Error, Debug)]
pub enum PoolError {
    /// No engine became free within the acquire timeout.
    #[error("No engine available within {0:?}")]
    AcquireTimeout(Duration),
    /// Every engine failed to start, or every slot has since been discarded.
    #[error("No engines available ({requested} requested)")]
    NoEngines { requested: usize },
    /// The pool has been shut down.
    #[error("Engine pool is closed")]
    Closed,
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl PoolError {
    /// Whether waiting and trying again may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, PoolError::AcquireTimeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(EngineError::Exited.is_process_fatal());
        assert!(EngineError::Handshake("no uciok".to_string()).is_process_fatal());
        assert!(EngineError::Timeout("search").is_process_fatal());
        assert!(!EngineError::Cancelled.is_process_fatal());
        assert!(!EngineError::NoScore.is_process_fatal());
        assert!(!EngineError::MissingBestMove.is_process_fatal());
    }

    #[test]
    fn test_pool_error_display() {
        let err = PoolError::AcquireTimeout(Duration::from_millis(250));
        assert!(err.to_string().contains("250ms"));
        assert!(err.is_transient());

        let err = PoolError::NoEngines { requested: 4 };
        assert!(err.to_string().contains("4 requested"));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_spawn_error_names_path() {
        let err = EngineError::Spawn {
            path: PathBuf::from("/opt/engines/stockfish"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert!(err.to_string().contains("/opt/engines/stockfish"));
    }
}
