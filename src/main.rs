use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use market_watcher::config::{AppConfig, Catalog, ConcurrencyMode, MetricsConfig};
use market_watcher::matcher::Matcher;
use market_watcher::notifications::{self, LogNotifier, NotificationQueue};
use market_watcher::orchestrator::Orchestrator;
use market_watcher::plugins::PlatformRegistry;
use market_watcher::scheduler::PassScheduler;
use market_watcher::store::Store;
use market_watcher::utils::logging;

/// Marketplace listing watcher.
#[derive(Debug, Parser)]
#[command(name = "market-watcher")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Catalog file; overrides `catalog_path` from configuration.
    #[arg(long, env = "WATCHER_CATALOG")]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create the schema and load the catalog.
    InitDb,
    /// Run one pass now.
    Run {
        /// Process platforms one at a time.
        #[arg(long)]
        sequential: bool,
        /// Leave detected changes pending.
        #[arg(long)]
        no_notify: bool,
    },
    /// List change events not yet notified.
    Pending,
    /// Run passes on the configured schedule until interrupted.
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let _log_guard = logging::init(&config.logging)?;

    if config.metrics.enabled {
        install_metrics(&config.metrics)?;
    }

    info!("Starting Market Watcher...");
    let store = Store::connect(&config.database).await?;

    let result = execute(cli, &config, store.clone()).await;
    store.close().await;
    result
}

async fn execute(cli: Cli, config: &AppConfig, store: Store) -> Result<()> {
    let catalog_path = cli
        .catalog
        .unwrap_or_else(|| PathBuf::from(&config.catalog_path));

    match cli.command {
        Commands::InitDb => {
            let catalog = load_catalog(&catalog_path)?;
            let orchestrator = orchestrator(config, &catalog, store);
            let summary = orchestrator.initialize(&catalog).await?;
            println!(
                "Database ready: {} products, {} platforms",
                summary.products, summary.platforms
            );
        }
        Commands::Run { sequential, no_notify } => {
            let catalog = load_catalog(&catalog_path)?;
            let orchestrator = orchestrator(config, &catalog, store.clone());
            orchestrator.initialize(&catalog).await?;

            let registry = PlatformRegistry::from_catalog(&catalog, &config.scraper)?;
            let mode = if sequential {
                ConcurrencyMode::Sequential
            } else {
                config.orchestrator.mode
            };

            let stats = orchestrator.run_with_mode(&registry, mode).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);

            if !no_notify {
                notifications::drain(&NotificationQueue::new(store), &LogNotifier).await?;
            }
        }
        Commands::Pending => {
            let events = NotificationQueue::new(store).pending().await?;
            for event in &events {
                println!(
                    "{}\t{}\t{}",
                    event.created_at.format("%Y-%m-%d %H:%M:%S"),
                    event.event_type.as_str(),
                    event.description.as_deref().unwrap_or_default()
                );
            }
            println!("{} pending events", events.len());
        }
        Commands::Watch => {
            let catalog = load_catalog(&catalog_path)?;
            let orchestrator = orchestrator(config, &catalog, store);
            orchestrator.initialize(&catalog).await?;

            let registry = PlatformRegistry::from_catalog(&catalog, &config.scraper)?;
            let mut scheduler = PassScheduler::new(
                Arc::new(orchestrator),
                Arc::new(registry),
                Some(Arc::new(LogNotifier)),
                config.scheduler.clone(),
            )
            .await?;

            scheduler.start().await?;
            tokio::signal::ctrl_c().await?;
            info!("Shutting down...");
            scheduler.shutdown().await?;
        }
    }

    Ok(())
}

fn load_catalog(path: &Path) -> Result<Catalog> {
    Catalog::from_file(path).with_context(|| format!("Failed to load catalog {}", path.display()))
}

fn orchestrator(config: &AppConfig, catalog: &Catalog, store: Store) -> Orchestrator {
    Orchestrator::new(
        store,
        Matcher::new(catalog.category_keywords.clone()),
        config.orchestrator.clone(),
    )
}

fn install_metrics(config: &MetricsConfig) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config.port))
        .install()
        .context("Failed to install Prometheus exporter")?;

    metrics::describe_counter!("watcher_listings_new_total", "Listings seen for the first time");
    metrics::describe_counter!("watcher_changes_total", "Change events recorded, by type");
    metrics::describe_counter!("watcher_platform_tasks_total", "Platform tasks, by platform and outcome");
    metrics::describe_histogram!("watcher_pass_duration_seconds", "Duration of one orchestration pass");

    info!("Prometheus exporter listening on port {}", config.port);
    Ok(())
}
