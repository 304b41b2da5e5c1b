use chrono::Utc;
use std::sync::Mutex;

use crate::models::{RunStatus, ScrapeRun};
use crate::store::{RunCounters, Store};
use crate::utils::error::{AppError, Result};

/// Handle to the open run, passed explicitly into reconcile and task calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub run_id: String,
}

/// Records start, counters and completion of one orchestration pass.
/// At most one run is open per tracker.
pub struct RunTracker {
    store: Store,
    open: Mutex<Option<RunContext>>,
}

impl RunTracker {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            open: Mutex::new(None),
        }
    }

    pub async fn start(&self) -> Result<RunContext> {
        if self.current().is_some() {
            return Err(AppError::Validation("A run is already in progress".into()));
        }

        let run = ScrapeRun::new();
        self.store.insert_run(&run).await?;

        let context = RunContext { run_id: run.id.clone() };
        *self.lock_open() = Some(context.clone());
        tracing::info!("Started scrape run {}", run.id);
        Ok(context)
    }

    pub fn current(&self) -> Option<RunContext> {
        self.lock_open().clone()
    }

    /// Apply counter deltas under the store write lock.
    pub async fn record(&self, context: &RunContext, delta: RunCounters) -> Result<()> {
        let _guard = self.store.write_guard().await;
        let mut conn = self.store.pool().acquire().await?;
        Store::add_run_counters(&mut conn, &context.run_id, delta).await
    }

    /// Close the open run. Called exactly once per pass, whatever the outcome.
    pub async fn complete(&self, status: RunStatus, errors: Option<&str>) -> Result<ScrapeRun> {
        let context = self
            .lock_open()
            .take()
            .ok_or_else(|| AppError::NotFound { resource: "open scrape run".into() })?;

        self.store
            .complete_run(&context.run_id, status, errors, Utc::now())
            .await?;

        let run = self
            .store
            .get_run(&context.run_id)
            .await?
            .ok_or_else(|| AppError::NotFound { resource: format!("scrape run {}", context.run_id) })?;

        tracing::info!("Scrape run {} finished: {}", run.id, status.as_str());
        Ok(run)
    }

    fn lock_open(&self) -> std::sync::MutexGuard<'_, Option<RunContext>> {
        // The guarded value is a plain Option; a poisoned lock still holds valid data
        self.open.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
