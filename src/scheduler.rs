use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::config::SchedulerConfig;
use crate::models::RunStatus;
use crate::notifications::{self, ChangeNotifier, NotificationQueue};
use crate::orchestrator::{Orchestrator, RunStats};
use crate::plugins::PlatformRegistry;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchedulerStats {
    pub completed_runs: u64,
    pub failed_runs: u64,
    pub skipped_runs: u64,
}

/// Shared state for the cron job and for direct `run_once` calls.
struct PassRunner {
    orchestrator: Arc<Orchestrator>,
    registry: Arc<PlatformRegistry>,
    notifier: Option<Arc<dyn ChangeNotifier>>,
    in_flight: AtomicBool,
    completed_runs: AtomicU64,
    failed_runs: AtomicU64,
    skipped_runs: AtomicU64,
}

impl PassRunner {
    /// Run a pass unless one is already in flight. `None` when skipped.
    async fn run_once(&self) -> Option<RunStats> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            tracing::warn!("Previous pass still running; skipping this tick");
            self.skipped_runs.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let stats = match self.orchestrator.run(&self.registry).await {
            Ok(stats) => {
                if stats.status == RunStatus::Completed {
                    self.completed_runs.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.failed_runs.fetch_add(1, Ordering::Relaxed);
                }
                Some(stats)
            }
            Err(e) => {
                tracing::error!("Scheduled pass could not run: {}", e);
                self.failed_runs.fetch_add(1, Ordering::Relaxed);
                None
            }
        };

        if let Some(notifier) = &self.notifier {
            let queue = NotificationQueue::new(self.orchestrator.store().clone());
            if let Err(e) = notifications::drain(&queue, notifier.as_ref()).await {
                tracing::error!("Notification drain failed: {}", e);
            }
        }

        self.in_flight.store(false, Ordering::SeqCst);
        stats
    }
}

/// Repeats full passes on a seconds-first cron schedule.
pub struct PassScheduler {
    scheduler: JobScheduler,
    runner: Arc<PassRunner>,
    config: SchedulerConfig,
}

impl PassScheduler {
    pub async fn new(
        orchestrator: Arc<Orchestrator>,
        registry: Arc<PlatformRegistry>,
        notifier: Option<Arc<dyn ChangeNotifier>>,
        config: SchedulerConfig,
    ) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler,
            runner: Arc::new(PassRunner {
                orchestrator,
                registry,
                notifier,
                in_flight: AtomicBool::new(false),
                completed_runs: AtomicU64::new(0),
                failed_runs: AtomicU64::new(0),
                skipped_runs: AtomicU64::new(0),
            }),
            config,
        })
    }

    pub async fn start(&mut self) -> Result<()> {
        let runner = Arc::clone(&self.runner);

        let job = Job::new_async(self.config.cron.as_str(), move |_uuid, _l| {
            let runner = Arc::clone(&runner);
            Box::pin(async move {
                runner.run_once().await;
            })
        })?;

        self.scheduler.add(job).await?;
        self.scheduler.start().await?;
        tracing::info!("Pass scheduler started with schedule: {}", self.config.cron);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.scheduler.shutdown().await?;
        tracing::info!("Pass scheduler shutdown");
        Ok(())
    }

    /// Run a pass now, outside the schedule. Skipped while another is in flight.
    pub async fn run_once(&self) -> Option<RunStats> {
        self.runner.run_once().await
    }

    pub fn is_running(&self) -> bool {
        self.runner.in_flight.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            completed_runs: self.runner.completed_runs.load(Ordering::Relaxed),
            failed_runs: self.runner.failed_runs.load(Ordering::Relaxed),
            skipped_runs: self.runner.skipped_runs.load(Ordering::Relaxed),
        }
    }
}
