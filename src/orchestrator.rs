//! One orchestration pass: every tracked product against every enabled
//! platform, through the matcher and the reconciler.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::{Catalog, ConcurrencyMode, OrchestratorConfig};
use crate::matcher::Matcher;
use crate::models::{Platform, Product, RunStatus};
use crate::plugins::manager::{PlatformRegistry, PlatformScraperRef};
use crate::plugins::traits::PlatformScraper;
use crate::reconciler::Reconciler;
use crate::run_tracker::{RunContext, RunTracker};
use crate::store::{RunCounters, Store};
use crate::utils::error::{AppError, Result};

/// Totals for one pass, mirrored into the Run row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunStats {
    pub run_id: String,
    pub status: RunStatus,
    pub items_checked: usize,
    /// Platform tasks that finished without an error.
    pub platforms_checked: usize,
    pub new_listings: usize,
    pub changes: usize,
    pub errors: usize,
    /// Set when the pass was aborted.
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl RunStats {
    fn new(run_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            status: RunStatus::Running,
            items_checked: 0,
            platforms_checked: 0,
            new_listings: 0,
            changes: 0,
            errors: 0,
            error: None,
            duration_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitSummary {
    pub products: usize,
    pub platforms: usize,
}

/// Result of one (product, platform) task.
#[derive(Debug)]
struct TaskOutcome {
    platform: String,
    records: usize,
    new_listings: usize,
    changes: usize,
    error: Option<AppError>,
}

impl TaskOutcome {
    fn new(platform: &str) -> Self {
        Self {
            platform: platform.to_string(),
            records: 0,
            new_listings: 0,
            changes: 0,
            error: None,
        }
    }

    fn label(&self) -> &'static str {
        match &self.error {
            None => "ok",
            Some(AppError::Timeout { .. }) => "timeout",
            Some(_) => "error",
        }
    }
}

pub struct Orchestrator {
    store: Store,
    matcher: Matcher,
    reconciler: Reconciler,
    tracker: RunTracker,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(store: Store, matcher: Matcher, config: OrchestratorConfig) -> Self {
        Self {
            reconciler: Reconciler::new(store.clone()),
            tracker: RunTracker::new(store.clone()),
            store,
            matcher,
            config,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Load the catalog into the store. Safe to repeat.
    pub async fn initialize(&self, catalog: &Catalog) -> Result<InitSummary> {
        catalog.validate()?;

        for platform in catalog.new_platforms() {
            self.store.upsert_platform(&platform).await?;
        }
        for product in &catalog.products {
            self.store.upsert_product(product).await?;
        }

        let summary = InitSummary {
            products: catalog.products.len(),
            platforms: catalog.platforms.len(),
        };
        tracing::info!(
            "Catalog loaded: {} products, {} platforms",
            summary.products,
            summary.platforms
        );
        Ok(summary)
    }

    /// Run one pass in the configured mode.
    pub async fn run(&self, registry: &PlatformRegistry) -> Result<RunStats> {
        self.run_with_mode(registry, self.config.mode).await
    }

    /// Run one pass. A failed pass still returns `Ok` with a failed status;
    /// `Err` means the Run row itself could not be written.
    pub async fn run_with_mode(&self, registry: &PlatformRegistry, mode: ConcurrencyMode) -> Result<RunStats> {
        let started = Instant::now();
        let context = self.tracker.start().await?;
        let mut stats = RunStats::new(&context.run_id);

        tracing::info!("Starting pass {} ({:?} mode)", context.run_id, mode);
        let result = self.run_pass(&context, registry, mode, &mut stats).await;

        registry.close_all().await;

        let (status, errors) = match result {
            Ok(()) => (RunStatus::Completed, None),
            Err(e) => {
                tracing::error!("Pass {} failed: {}", context.run_id, e);
                (RunStatus::Failed, Some(e.to_string()))
            }
        };

        self.tracker.complete(status, errors.as_deref()).await?;

        stats.status = status;
        stats.error = errors;
        stats.duration_ms = started.elapsed().as_millis() as u64;
        metrics::histogram!("watcher_pass_duration_seconds").record(started.elapsed().as_secs_f64());

        tracing::info!(
            "Pass {} {}: {} products, {} platform tasks ok, {} new, {} changes, {} errors in {}ms",
            stats.run_id,
            status.as_str(),
            stats.items_checked,
            stats.platforms_checked,
            stats.new_listings,
            stats.changes,
            stats.errors,
            stats.duration_ms
        );
        Ok(stats)
    }

    async fn run_pass(
        &self,
        context: &RunContext,
        registry: &PlatformRegistry,
        mode: ConcurrencyMode,
        stats: &mut RunStats,
    ) -> Result<()> {
        let products = self.store.list_products().await?;
        let targets = self.resolve_targets(registry).await?;

        if targets.is_empty() {
            tracing::warn!("No enabled platform has a registered collaborator");
        }

        for product in &products {
            stats.items_checked += 1;

            if !product.has_keywords() {
                tracing::warn!("Product {} ({}) has no search keywords; skipping", product.id, product.name);
                self.tracker
                    .record(context, RunCounters { items_checked: 1, ..Default::default() })
                    .await?;
                continue;
            }

            tracing::info!("Checking product {} ({})", product.id, product.name);
            let outcomes = match mode {
                ConcurrencyMode::Sequential => {
                    let mut outcomes = Vec::with_capacity(targets.len());
                    for (platform, worker) in &targets {
                        outcomes.push(self.run_task(context, product, platform, worker).await);
                    }
                    outcomes
                }
                ConcurrencyMode::Concurrent => {
                    let tasks: Vec<_> = targets
                        .iter()
                        .map(|(platform, worker)| self.run_task(context, product, platform, worker))
                        .collect();
                    stream::iter(tasks)
                        .buffer_unordered(self.config.max_workers.max(1))
                        .collect::<Vec<_>>()
                        .await
                }
            };

            let mut delta = RunCounters { items_checked: 1, ..Default::default() };
            let mut fatal = None;

            for outcome in outcomes {
                metrics::counter!(
                    "watcher_platform_tasks_total",
                    "platform" => outcome.platform.clone(),
                    "outcome" => outcome.label()
                )
                .increment(1);

                stats.new_listings += outcome.new_listings;
                stats.changes += outcome.changes;

                match outcome.error {
                    None => {
                        stats.platforms_checked += 1;
                        delta.platforms_checked += 1;
                    }
                    Some(e) => {
                        stats.errors += 1;
                        delta.error_count += 1;
                        if e.is_fatal() {
                            fatal.get_or_insert(e);
                        } else {
                            tracing::warn!("Task failed for {} on {}: {}", product.name, outcome.platform, e);
                        }
                    }
                }
            }

            let recorded = self.tracker.record(context, delta).await;
            if let Some(e) = fatal {
                return Err(e);
            }
            recorded?;
        }

        Ok(())
    }

    /// Enabled platform rows with a registered collaborator, in registration order.
    async fn resolve_targets(&self, registry: &PlatformRegistry) -> Result<Vec<(Platform, PlatformScraperRef)>> {
        let platforms = self.store.list_platforms().await?;
        let mut targets = Vec::new();

        for worker in registry.iter() {
            match platforms.iter().find(|p| p.name == worker.name()) {
                Some(platform) if platform.enabled => targets.push((platform.clone(), worker.clone())),
                Some(_) => tracing::debug!("Platform {} is disabled", worker.name()),
                None => tracing::warn!("Collaborator {} has no platform row; run initialize first", worker.name()),
            }
        }

        Ok(targets)
    }

    /// One platform task under the task deadline. The collaborator is closed
    /// afterwards whatever the outcome.
    async fn run_task(
        &self,
        context: &RunContext,
        product: &Product,
        platform: &Platform,
        worker: &PlatformScraperRef,
    ) -> TaskOutcome {
        let seconds = self.config.task_timeout_secs;
        let mut outcome = TaskOutcome::new(&platform.name);

        let result = tokio::time::timeout(
            Duration::from_secs(seconds),
            self.scrape_platform(context, product, platform, worker.as_ref(), &mut outcome),
        )
        .await;

        match result {
            Ok(Ok(())) => {
                tracing::info!(
                    "{} on {}: {} records, {} new, {} changes",
                    product.name,
                    platform.name,
                    outcome.records,
                    outcome.new_listings,
                    outcome.changes
                );
            }
            Ok(Err(e)) => outcome.error = Some(e),
            Err(_) => {
                outcome.error = Some(AppError::Timeout {
                    platform: platform.name.clone(),
                    seconds,
                })
            }
        }

        if let Err(e) = worker.close().await {
            tracing::warn!("Error closing platform {}: {}", platform.name, e);
        }
        outcome
    }

    async fn scrape_platform(
        &self,
        context: &RunContext,
        product: &Product,
        platform: &Platform,
        worker: &dyn PlatformScraper,
        outcome: &mut TaskOutcome,
    ) -> Result<()> {
        worker.ensure_ready().await?;

        let keywords = product.search_keywords();
        let urls = worker.search(&keywords).await?;
        tracing::debug!("{} returned {} candidates for {}", platform.name, urls.len(), product.name);

        for url in urls {
            let Some(record) = worker.scrape_detail(&url).await? else {
                tracing::debug!("No record extracted from {}", url);
                continue;
            };
            outcome.records += 1;

            if !self.matcher.matches(&record, product) {
                tracing::debug!("Skipping non-matching record: {}", record.title);
                continue;
            }

            let reconciled = self
                .reconciler
                .reconcile(Some(context), product, platform, &record)
                .await?;
            outcome.new_listings += reconciled.created as usize;
            outcome.changes += reconciled.events.len();
        }

        Ok(())
    }
}
