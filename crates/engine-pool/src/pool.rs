//! Bounded pool of engine processes.
//!
//! A semaphore limits how many callers hold an engine at once; the idle
//! processes sit in a list guarded by a short-lived lock. A permit is only
//! ever handed out together with exactly one idle process, so no process is
//! held by two callers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::{
    CancelToken, EngineConfig, EngineError, EngineEvaluation, EngineProcess, PoolError,
    SearchRequest,
};

struct PoolShared {
    config: EngineConfig,
    idle: Mutex<Vec<EngineProcess>>,
    permits: Arc<Semaphore>,
    live: AtomicUsize,
    acquire_timeout: Duration,
    requested: usize,
}

impl PoolShared {
    fn push_idle(&self, engine: EngineProcess) {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(engine);
    }

    fn pop_idle(&self) -> Option<EngineProcess> {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
    }

    fn take_idle(&self) -> Vec<EngineProcess> {
        std::mem::take(&mut *self.idle.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Drop a slot for good. Its permit is forgotten so capacity shrinks.
    fn discard(&self, permit: OwnedSemaphorePermit, reason: &str) {
        permit.forget();
        let remaining = self.live.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        warn!(remaining, reason, "engine slot discarded, pool capacity reduced");
        if remaining == 0 {
            // Waiters would otherwise block until their timeout.
            self.permits.close();
        }
    }
}

/// A fixed set of engine processes shared by concurrent callers.
///
/// Cloning is cheap; clones share the same processes.
#[derive(Clone)]
pub struct EnginePool {
    shared: Arc<PoolShared>,
}

impl EnginePool {
    /// Spawn `size` engines concurrently.
    ///
    /// Engines that fail to start are logged and left out; the pool runs
    /// with reduced capacity. Fails only when no engine started at all.
    pub async fn start(
        config: EngineConfig,
        size: usize,
        acquire_timeout: Duration,
    ) -> Result<Self, PoolError> {
        let mut spawns = JoinSet::new();
        for id in 0..size {
            let config = config.clone();
            spawns.spawn(async move { (id, EngineProcess::spawn(id, &config).await) });
        }

        let mut engines = Vec::with_capacity(size);
        while let Some(joined) = spawns.join_next().await {
            match joined {
                Ok((_, Ok(engine))) => engines.push(engine),
                Ok((id, Err(e))) => warn!(engine = id, error = %e, "engine failed to start"),
                Err(e) => warn!(error = %e, "engine spawn task failed"),
            }
        }

        if engines.is_empty() {
            return Err(PoolError::NoEngines { requested: size });
        }
        if engines.len() < size {
            warn!(
                started = engines.len(),
                requested = size,
                "engine pool running with reduced capacity"
            );
        }
        info!(
            engines = engines.len(),
            path = %config.path.display(),
            "engine pool started"
        );

        let live = engines.len();
        Ok(Self {
            shared: Arc::new(PoolShared {
                config,
                idle: Mutex::new(engines),
                permits: Arc::new(Semaphore::new(live)),
                live: AtomicUsize::new(live),
                acquire_timeout,
                requested: size,
            }),
        })
    }

    /// Number of live engines.
    pub fn capacity(&self) -> usize {
        self.shared.live.load(Ordering::SeqCst)
    }

    /// Number of engines that could be acquired right now.
    pub fn available(&self) -> usize {
        self.shared.permits.available_permits()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Acquire an engine using the pool's default timeout.
    pub async fn acquire(&self) -> Result<PooledEngine, PoolError> {
        self.acquire_timeout(self.shared.acquire_timeout).await
    }

    /// Acquire an engine, waiting at most `wait`.
    ///
    /// Expiry is reported as [`PoolError::AcquireTimeout`] and never retried
    /// here.
    pub async fn acquire_timeout(&self, wait: Duration) -> Result<PooledEngine, PoolError> {
        let permit = match timeout(wait, self.shared.permits.clone().acquire_owned()).await {
            Err(_) => return Err(PoolError::AcquireTimeout(wait)),
            Ok(Err(_)) => return Err(self.closed_error()),
            Ok(Ok(permit)) => permit,
        };

        match self.shared.pop_idle() {
            Some(engine) => {
                debug!(engine = engine.id(), "engine acquired");
                Ok(PooledEngine {
                    engine: Some(engine),
                    permit: Some(permit),
                    shared: Arc::clone(&self.shared),
                    healthy: true,
                })
            }
            // Permits and idle engines move together, so this only happens
            // while `configure` or `shutdown` holds the engines.
            None => Err(self.closed_error()),
        }
    }

    /// Return an engine to the pool. See [`PooledEngine::release`].
    pub async fn release(&self, handle: PooledEngine) {
        handle.release().await
    }

    /// Acquire, search once, release.
    pub async fn evaluate(&self, request: &SearchRequest) -> Result<EngineEvaluation, PoolError> {
        let mut engine = self.acquire().await?;
        let result = engine.search(request, &CancelToken::new()).await;
        engine.release().await;
        Ok(result?)
    }

    /// Set an option on every engine.
    ///
    /// Waits until every engine is idle, blocking new acquisitions in the
    /// meantime. Engines that fail to apply the option are discarded.
    pub async fn configure(&self, name: &str, value: &str) -> Result<(), PoolError> {
        let live = self.capacity();
        let wait = self.shared.acquire_timeout;
        let all = u32::try_from(live).unwrap_or(u32::MAX);
        let permits = match timeout(wait, self.shared.permits.clone().acquire_many_owned(all)).await
        {
            Err(_) => return Err(PoolError::AcquireTimeout(wait)),
            Ok(Err(_)) => return Err(self.closed_error()),
            Ok(Ok(permits)) => permits,
        };

        let mut kept = 0;
        let mut first_error = None;
        for mut engine in self.shared.take_idle() {
            match engine.set_option(name, value).await {
                Ok(()) => {
                    self.shared.push_idle(engine);
                    kept += 1;
                }
                Err(e) => {
                    warn!(engine = engine.id(), option = name, error = %e, "engine rejected option");
                    first_error.get_or_insert(e);
                    engine.quit().await;
                }
            }
        }

        if kept == live {
            drop(permits);
        } else {
            permits.forget();
            self.shared.live.store(kept, Ordering::SeqCst);
            self.shared.permits.add_permits(kept);
            warn!(remaining = kept, "engine slots discarded while configuring");
            if kept == 0 {
                self.shared.permits.close();
            }
        }
        info!(option = name, value, engines = kept, "engine option applied");

        match first_error {
            Some(e) => Err(PoolError::Engine(e)),
            None => Ok(()),
        }
    }

    /// Stop handing out engines and quit the idle ones.
    ///
    /// Engines still held by callers exit when their handles are dropped.
    pub async fn shutdown(&self) {
        self.shared.permits.close();
        let idle = self.shared.take_idle();
        info!(engines = idle.len(), "shutting down engine pool");
        for engine in idle {
            engine.quit().await;
        }
    }

    fn closed_error(&self) -> PoolError {
        if self.capacity() == 0 {
            PoolError::NoEngines {
                requested: self.shared.requested,
            }
        } else {
            PoolError::Closed
        }
    }
}

/// An engine checked out of an [`EnginePool`].
///
/// Call [`release`](Self::release) when done. Dropping the handle instead
/// schedules the same reset on the current runtime.
pub struct PooledEngine {
    engine: Option<EngineProcess>,
    permit: Option<OwnedSemaphorePermit>,
    shared: Arc<PoolShared>,
    healthy: bool,
}

impl PooledEngine {
    /// Pool slot number of the held engine.
    pub fn id(&self) -> Option<usize> {
        self.engine.as_ref().map(EngineProcess::id)
    }

    /// Whether the engine is still usable.
    pub fn is_healthy(&self) -> bool {
        self.healthy && self.engine.is_some()
    }

    /// Run a search on the held engine.
    ///
    /// A process-fatal error marks the handle unhealthy; releasing it then
    /// discards the slot.
    pub async fn search(
        &mut self,
        request: &SearchRequest,
        cancel: &CancelToken,
    ) -> Result<EngineEvaluation, EngineError> {
        let engine = match self.engine.as_mut() {
            Some(engine) if self.healthy => engine,
            _ => return Err(EngineError::Exited),
        };
        let result = engine.search(request, cancel).await;
        if let Err(e) = &result {
            if e.is_process_fatal() {
                warn!(engine = engine.id(), error = %e, "engine failed during search");
                self.healthy = false;
            }
        }
        result
    }

    /// Give the engine back.
    ///
    /// On return the engine has been reset with `ucinewgame` and is already
    /// back in the idle list. An engine that failed, or that cannot be reset,
    /// is shut down and its slot removed from the pool.
    pub async fn release(mut self) {
        let engine = self.engine.take();
        let permit = self.permit.take();
        release_slot(Arc::clone(&self.shared), engine, permit, self.healthy).await;
    }
}

async fn release_slot(
    shared: Arc<PoolShared>,
    engine: Option<EngineProcess>,
    permit: Option<OwnedSemaphorePermit>,
    healthy: bool,
) {
    let (Some(mut engine), Some(permit)) = (engine, permit) else {
        return;
    };

    if !healthy {
        let id = engine.id();
        engine.quit().await;
        shared.discard(permit, &format!("engine {id} failed"));
        return;
    }

    match engine.new_game().await {
        Ok(()) => {
            debug!(engine = engine.id(), "engine released");
            shared.push_idle(engine);
            drop(permit);
        }
        Err(e) => {
            let id = engine.id();
            engine.quit().await;
            shared.discard(permit, &format!("engine {id} failed to reset: {e}"));
        }
    }
}

impl Drop for PooledEngine {
    fn drop(&mut self) {
        let (Some(engine), Some(permit)) = (self.engine.take(), self.permit.take()) else {
            return;
        };
        let shared = Arc::clone(&self.shared);
        let healthy = self.healthy;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(release_slot(shared, Some(engine), Some(permit), healthy));
            }
            Err(_) => {
                // No runtime to reset on; the process is killed with the handle.
                drop(engine);
                shared.discard(permit, "dropped outside a runtime");
            }
        }
    }
}
