use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info};

use appointflow_core::error::{AppointflowError, Result};
use appointflow_core::types::RunContext;

use crate::resume::Stage;

/// Keyed storage for runs paused between invocations.
pub trait PauseStore: Send + Sync {
    /// Insert or replace the run under its own id.
    fn store(&self, ctx: &RunContext) -> Result<()>;

    /// Fetch a copy. A miss is [`AppointflowError::RunNotFound`].
    fn retrieve(&self, run_id: &str) -> Result<RunContext>;

    /// Remove the run. Returns whether it was present.
    fn consume(&self, run_id: &str) -> Result<bool>;

    fn contains(&self, run_id: &str) -> bool {
        self.retrieve(run_id).is_ok()
    }

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-process pause store. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryPauseStore {
    runs: Mutex<HashMap<String, RunContext>>,
}

impl MemoryPauseStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> AppointflowError {
    AppointflowError::Store(e.to_string())
}

impl PauseStore for MemoryPauseStore {
    fn store(&self, ctx: &RunContext) -> Result<()> {
        let mut runs = self.runs.lock().map_err(poisoned)?;
        runs.insert(ctx.run_id().to_string(), ctx.clone());
        Ok(())
    }

    fn retrieve(&self, run_id: &str) -> Result<RunContext> {
        let runs = self.runs.lock().map_err(poisoned)?;
        runs.get(run_id)
            .cloned()
            .ok_or_else(|| AppointflowError::RunNotFound(run_id.to_string()))
    }

    fn consume(&self, run_id: &str) -> Result<bool> {
        let mut runs = self.runs.lock().map_err(poisoned)?;
        Ok(runs.remove(run_id).is_some())
    }

    fn contains(&self, run_id: &str) -> bool {
        self.runs
            .lock()
            .map(|runs| runs.contains_key(run_id))
            .unwrap_or(false)
    }

    fn len(&self) -> usize {
        self.runs.lock().map(|runs| runs.len()).unwrap_or(0)
    }
}

/// Serializes resumers per run id on top of a [`PauseStore`].
///
/// Callers take [`RunCoordinator::lock_run`] before reading a paused run and
/// keep the guard until the run has been stored again or consumed. Runs with
/// different ids only share the brief lookup in the lock table.
pub struct RunCoordinator {
    store: Arc<dyn PauseStore>,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl RunCoordinator {
    pub fn new(store: Arc<dyn PauseStore>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryPauseStore::new()))
    }

    pub fn store(&self) -> &Arc<dyn PauseStore> {
        &self.store
    }

    /// Wait for exclusive access to one stored run.
    ///
    /// Ids with nothing stored, including runs finished while waiting, fail
    /// with [`AppointflowError::RunNotFound`] and leave no lock entry behind.
    pub async fn lock_run(&self, run_id: &str) -> Result<OwnedMutexGuard<()>> {
        if !self.store.contains(run_id) {
            return Err(AppointflowError::RunNotFound(run_id.to_string()));
        }
        let lock = {
            let mut locks = self.locks.lock().map_err(poisoned)?;
            locks.entry(run_id.to_string()).or_default().clone()
        };
        let guard = lock.lock_owned().await;

        if !self.store.contains(run_id) {
            drop(guard);
            self.locks.lock().map_err(poisoned)?.remove(run_id);
            return Err(AppointflowError::RunNotFound(run_id.to_string()));
        }
        debug!(run_id, "Run lock acquired");
        Ok(guard)
    }

    /// Store a run that is waiting for `stage`.
    pub fn pause(&self, mut ctx: RunContext, stage: Stage) -> Result<RunContext> {
        stage.mark(&mut ctx);
        self.store.store(&ctx)?;
        info!(run_id = %ctx.run_id(), stage = stage.as_str(), "Run paused");
        Ok(ctx)
    }

    /// Re-store a run that already carries its stage marker.
    pub fn save(&self, ctx: &RunContext) -> Result<()> {
        self.store.store(ctx)
    }

    pub fn load(&self, run_id: &str) -> Result<RunContext> {
        self.store.retrieve(run_id)
    }

    /// Load a run and check it is waiting for `expected`.
    pub fn load_at(&self, run_id: &str, expected: Stage) -> Result<RunContext> {
        let ctx = self.store.retrieve(run_id)?;
        match Stage::of(&ctx) {
            Some(stage) if stage == expected => Ok(ctx),
            other => Err(AppointflowError::RunConflict {
                run_id: run_id.to_string(),
                expected: expected.as_str().to_string(),
                actual: other.map(|s| s.as_str()).unwrap_or("nothing").to_string(),
            }),
        }
    }

    /// Drop a finished run and its lock entry.
    pub fn finish(&self, run_id: &str) -> Result<bool> {
        let removed = self.store.consume(run_id)?;
        self.locks.lock().map_err(poisoned)?.remove(run_id);
        if removed {
            info!(run_id, "Run consumed");
        }
        Ok(removed)
    }

    pub fn pending(&self) -> usize {
        self.store.len()
    }

    pub fn lock_count(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}
