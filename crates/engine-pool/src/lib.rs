//! Pool of long-lived UCI analysis engines.
//!
//! # Overview
//!
//! - [`EngineProcess`] - One engine process driven over its stdin/stdout
//! - [`EnginePool`] - Fixed set of processes handed out one caller at a time
//! - [`PooledEngine`] - A checked-out engine; release resets it for the next game
//! - [`CancelToken`] - Cooperative cancellation of running searches
//! - [`EngineSource`] / [`EngineSession`] - The seam analysis code is written
//!   against, so it runs the same on a real pool or a scripted engine
//!
//! # Example
//!
//! ```ignore
//! use engine_pool::{EngineConfig, EnginePool, SearchRequest};
//!
//! let pool = EnginePool::start(EngineConfig::new("stockfish"), 4, Duration::from_secs(5)).await?;
//! let eval = pool.evaluate(&SearchRequest::startpos(vec![], 18)).await?;
//! println!("{:?} best {:?}", eval.score, eval.best_move);
//! ```

mod cancel;
mod config;
mod error;
mod pool;
mod process;
mod search;

use std::future::Future;

pub use cancel::CancelToken;
pub use config::EngineConfig;
pub use error::{EngineError, PoolError};
pub use pool::{EnginePool, PooledEngine};
pub use process::EngineProcess;
pub use search::{EngineEvaluation, SearchLine, SearchRequest};

/// An engine checked out for a sequence of searches.
pub trait EngineSession: Send {
    fn evaluate(
        &mut self,
        request: &SearchRequest,
        cancel: &CancelToken,
    ) -> impl Future<Output = Result<EngineEvaluation, EngineError>> + Send;

    /// Hand the engine back. Consumes the session.
    fn finish(self) -> impl Future<Output = ()> + Send;
}

/// Something that hands out engine sessions.
pub trait EngineSource: Send + Sync {
    type Session: EngineSession;

    fn checkout(&self) -> impl Future<Output = Result<Self::Session, PoolError>> + Send;

    /// How many sessions can be held at once.
    fn capacity(&self) -> usize;
}

impl EngineSession for PooledEngine {
    fn evaluate(
        &mut self,
        request: &SearchRequest,
        cancel: &CancelToken,
    ) -> impl Future<Output = Result<EngineEvaluation, EngineError>> + Send {
        self.search(request, cancel)
    }

    fn finish(self) -> impl Future<Output = ()> + Send {
        self.release()
    }
}

impl EngineSource for EnginePool {
    type Session = PooledEngine;

    fn checkout(&self) -> impl Future<Output = Result<PooledEngine, PoolError>> + Send {
        self.acquire()
    }

    fn capacity(&self) -> usize {
        EnginePool::capacity(self)
    }
}
