// Integration tests for Market Watcher
// These tests drive full passes against an in-memory store with scripted platforms

pub mod notification_tests;
pub mod reconcile_tests;
pub mod store_tests;

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use market_watcher::config::{
    default_category_keywords, DatabaseConfig, Catalog, ConcurrencyMode, OrchestratorConfig, PlatformConfig, SelectorConfig,
};
use market_watcher::matcher::Matcher;
use market_watcher::models::NewProduct;
use market_watcher::plugins::{PlatformRegistry, PlatformScraper, ScrapedRecord};
use market_watcher::{AppError, Orchestrator, Store};

/// How a scripted platform fails its search call.
#[derive(Debug, Clone, Copy)]
pub enum Failure {
    Scraping,
    Database,
}

/// Platform collaborator with scripted results. Search returns the URLs of
/// its records in order; detail returns the first record with that URL.
pub struct FakePlatform {
    name: String,
    records: Mutex<Vec<ScrapedRecord>>,
    extra_urls: Mutex<Vec<String>>,
    failure: Mutex<Option<Failure>>,
    delay: Mutex<Option<Duration>>,
    pub ready_calls: AtomicUsize,
    pub search_calls: AtomicUsize,
    pub close_calls: AtomicUsize,
}

impl FakePlatform {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            records: Mutex::new(Vec::new()),
            extra_urls: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
            delay: Mutex::new(None),
            ready_calls: AtomicUsize::new(0),
            search_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
        })
    }

    pub fn set_records(&self, records: Vec<ScrapedRecord>) {
        *self.records.lock().unwrap() = records;
    }

    /// URLs returned by search that have no readable detail page.
    pub fn set_dead_urls(&self, urls: Vec<String>) {
        *self.extra_urls.lock().unwrap() = urls;
    }

    pub fn fail_with(&self, failure: Option<Failure>) {
        *self.failure.lock().unwrap() = failure;
    }

    pub fn slow_down(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn closes(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn searches(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlatformScraper for FakePlatform {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ensure_ready(&self) -> market_watcher::Result<()> {
        self.ready_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn search(&self, _keywords: &[String]) -> market_watcher::Result<Vec<String>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = *self.failure.lock().unwrap();
        match failure {
            Some(Failure::Scraping) => {
                return Err(AppError::Scraping(format!("{} search page did not load", self.name)));
            }
            Some(Failure::Database) => return Err(AppError::Database(sqlx::Error::PoolClosed)),
            None => {}
        }

        let mut urls: Vec<String> = self.records.lock().unwrap().iter().map(|r| r.url.clone()).collect();
        urls.extend(self.extra_urls.lock().unwrap().iter().cloned());
        Ok(urls)
    }

    async fn scrape_detail(&self, url: &str) -> market_watcher::Result<Option<ScrapedRecord>> {
        Ok(self.records.lock().unwrap().iter().find(|r| r.url == url).cloned())
    }

    async fn close(&self) -> market_watcher::Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn product(id: i64, character: &str, keywords: &[&str]) -> NewProduct {
    NewProduct {
        id,
        name: format!("{} cover", character),
        name_jp: None,
        series: String::new(),
        character: character.to_string(),
        circle: String::new(),
        event: None,
        artist: String::new(),
        search_keywords: keywords.iter().map(|k| k.to_string()).collect(),
    }
}

pub fn platform_config(name: &str, enabled: bool) -> PlatformConfig {
    PlatformConfig {
        name: name.to_string(),
        display_name: name.to_uppercase(),
        base_url: format!("https://{}.example", name),
        enabled,
        search_url: format!("https://{}.example/search?q={{keyword}}", name),
        item_url_pattern: None,
        delay_secs: 0.0,
        jitter_secs: 0.0,
        selectors: SelectorConfig::default(),
        sold_markers: Vec::new(),
        ended_markers: Vec::new(),
    }
}

pub fn catalog(products: Vec<NewProduct>, platforms: &[&str]) -> Catalog {
    Catalog {
        category_keywords: default_category_keywords(),
        products,
        platforms: platforms.iter().map(|name| platform_config(name, true)).collect(),
    }
}

pub fn record(platform: &str, item: &str, title: &str, price: f64) -> ScrapedRecord {
    ScrapedRecord::new(title, item_url(platform, item)).with_price(price)
}

pub fn item_url(platform: &str, item: &str) -> String {
    format!("https://{}.example/item/{}", platform, item)
}

pub fn orchestrator_config(mode: ConcurrencyMode) -> OrchestratorConfig {
    OrchestratorConfig {
        mode,
        max_workers: 4,
        task_timeout_secs: 30,
    }
}

/// Fresh in-memory store with the catalog loaded.
pub async fn setup(catalog: &Catalog, config: OrchestratorConfig) -> anyhow::Result<Orchestrator> {
    setup_with_store(Store::in_memory().await?, catalog, config).await
}

pub async fn setup_with_store(
    store: Store,
    catalog: &Catalog,
    config: OrchestratorConfig,
) -> anyhow::Result<Orchestrator> {
    let orchestrator = Orchestrator::new(store, Matcher::new(catalog.category_keywords.clone()), config);
    orchestrator.initialize(catalog).await?;
    Ok(orchestrator)
}

/// Database file with a multi-connection pool. Unlike the in-memory store,
/// transactions from different tasks really interleave here.
pub async fn file_store(dir: &tempfile::TempDir) -> anyhow::Result<Store> {
    let config = DatabaseConfig {
        url: format!("sqlite://{}", dir.path().join("watcher.db").display()),
        max_connections: 4,
    };
    Ok(Store::connect(&config).await?)
}

pub fn registry(platforms: &[Arc<FakePlatform>]) -> PlatformRegistry {
    let mut registry = PlatformRegistry::new();
    for platform in platforms {
        registry
            .register(platform.clone())
            .expect("platform names are unique in tests");
    }
    registry
}
