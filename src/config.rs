use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::Path;
use url::Url;

use crate::models::{NewPlatform, NewProduct};
use crate::utils::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default = "default_catalog_path")]
    pub catalog_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrencyMode {
    Sequential,
    Concurrent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub mode: ConcurrencyMode,
    pub max_workers: usize,
    /// Upper bound for one platform task (search plus every detail page).
    pub task_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub headless: bool,
    pub chrome_path: Option<String>,
    pub user_agent: String,
    pub navigation_timeout_secs: u64,
    pub max_results_per_keyword: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// Seconds-first cron expression.
    pub cron: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub directory: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            scraper: ScraperConfig::default(),
            scheduler: SchedulerConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
            catalog_path: default_catalog_path(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://market-watcher.db".to_string(),
            max_connections: 4,
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            mode: ConcurrencyMode::Concurrent,
            max_workers: 4,
            task_timeout_secs: 600,
        }
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36".to_string(),
            navigation_timeout_secs: 30,
            max_results_per_keyword: 20,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cron: "0 0 9,21 * * *".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9001,
        }
    }
}

fn default_catalog_path() -> String {
    "config/catalog.toml".to_string()
}

impl AppConfig {
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        // A missing .env is fine
        let _ = dotenvy::dotenv();
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with default configuration
            .add_source(File::with_name("config/default").required(false))
            // Add environment-specific config
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local config (ignored by git)
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix "WATCHER_"
            .add_source(Environment::with_prefix("WATCHER").separator("__"))
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;

        // Add Chrome path from environment if not set
        if config.scraper.chrome_path.is_none() {
            config.scraper.chrome_path = env::var("CHROME_PATH").ok();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Message("Database url must not be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Message("Database max_connections must be greater than 0".into()));
        }

        if self.orchestrator.max_workers == 0 {
            return Err(ConfigError::Message("Orchestrator max_workers must be greater than 0".into()));
        }

        if self.orchestrator.task_timeout_secs == 0 {
            return Err(ConfigError::Message("Orchestrator task_timeout_secs must be greater than 0".into()));
        }

        if self.scraper.navigation_timeout_secs == 0 {
            return Err(ConfigError::Message("Scraper navigation_timeout_secs must be greater than 0".into()));
        }

        if self.scraper.max_results_per_keyword == 0 {
            return Err(ConfigError::Message("Scraper max_results_per_keyword must be greater than 0".into()));
        }

        if !Self::is_valid_cron(&self.scheduler.cron) {
            return Err(ConfigError::Message("Invalid cron expression in scheduler.cron".into()));
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(ConfigError::Message("Metrics port must be greater than 0".into()));
        }

        Ok(())
    }

    /// Seconds-first cron: sec min hour day month weekday [year].
    fn is_valid_cron(cron_expr: &str) -> bool {
        let parts: Vec<&str> = cron_expr.split_whitespace().collect();
        if parts.len() != 6 && parts.len() != 7 {
            return false;
        }

        parts.iter().all(|part| {
            part.chars().all(|c| {
                c.is_ascii_alphanumeric() || matches!(c, '*' | '-' | ',' | '/' | '?')
            })
        })
    }
}

/// Per-platform CSS selectors used by the marketplace collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SelectorConfig {
    pub result_link: String,
    pub title: String,
    pub price: Option<String>,
    pub image: Option<String>,
    pub seller: Option<String>,
    pub description: Option<String>,
    /// Element to wait for before reading a detail page.
    pub wait_for: Option<String>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            result_link: "a[href]".to_string(),
            title: "h1".to_string(),
            price: None,
            image: None,
            seller: None,
            description: None,
            wait_for: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlatformConfig {
    pub name: String,
    pub display_name: String,
    pub base_url: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Search page template; `{keyword}` is replaced with the encoded keyword.
    pub search_url: String,
    /// Result links must contain this substring to count as item pages.
    #[serde(default)]
    pub item_url_pattern: Option<String>,
    #[serde(default = "default_delay_secs")]
    pub delay_secs: f64,
    #[serde(default = "default_jitter_secs")]
    pub jitter_secs: f64,
    #[serde(default)]
    pub selectors: SelectorConfig,
    #[serde(default = "default_sold_markers")]
    pub sold_markers: Vec<String>,
    #[serde(default)]
    pub ended_markers: Vec<String>,
}

impl PlatformConfig {
    pub fn to_new_platform(&self) -> NewPlatform {
        NewPlatform {
            name: self.name.clone(),
            display_name: self.display_name.clone(),
            base_url: self.base_url.clone(),
            enabled: self.enabled,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Upper bound for per-platform delay and jitter.
pub const MAX_RATE_LIMIT_SECS: f64 = 3600.0;

fn default_delay_secs() -> f64 {
    3.0
}

fn default_jitter_secs() -> f64 {
    1.0
}

fn default_sold_markers() -> Vec<String> {
    ["売り切れ", "SOLD", "売切れ", "販売終了", "在庫なし", "品切"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

pub fn default_category_keywords() -> Vec<String> {
    ["抱き枕", "だき枕", "ダキ枕", "カバー", "抱枕"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Tracked products and the platforms to search, loaded from the catalog file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Catalog {
    #[serde(default = "default_category_keywords")]
    pub category_keywords: Vec<String>,
    #[serde(default)]
    pub products: Vec<NewProduct>,
    #[serde(default)]
    pub platforms: Vec<PlatformConfig>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            category_keywords: default_category_keywords(),
            products: Vec::new(),
            platforms: Vec::new(),
        }
    }
}

impl Catalog {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let catalog: Catalog = toml::from_str(content)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.category_keywords.iter().any(|k| !k.trim().is_empty()) {
            return Err(AppError::Validation("category_keywords must not be empty".into()));
        }

        let mut product_ids = HashSet::new();
        for product in &self.products {
            if product.name.trim().is_empty() {
                return Err(AppError::Validation(format!("Product {} has an empty name", product.id)));
            }
            if !product_ids.insert(product.id) {
                return Err(AppError::Validation(format!("Duplicate product id {}", product.id)));
            }
        }

        let mut platform_names = HashSet::new();
        for platform in &self.platforms {
            if platform.name.trim().is_empty() {
                return Err(AppError::Validation("Platform name must not be empty".into()));
            }
            if !platform_names.insert(platform.name.as_str()) {
                return Err(AppError::Validation(format!("Duplicate platform {}", platform.name)));
            }
            if Url::parse(&platform.base_url).is_err() {
                return Err(AppError::Validation(format!(
                    "Invalid base URL for platform {}: {}",
                    platform.name, platform.base_url
                )));
            }
            for (field, secs) in [("delay_secs", platform.delay_secs), ("jitter_secs", platform.jitter_secs)] {
                if !(0.0..=MAX_RATE_LIMIT_SECS).contains(&secs) {
                    return Err(AppError::Validation(format!(
                        "{} for platform {} must be between 0 and {}, got {}",
                        field, platform.name, MAX_RATE_LIMIT_SECS, secs
                    )));
                }
            }
            if !platform.search_url.contains("{keyword}") {
                return Err(AppError::Validation(format!(
                    "search_url for platform {} must contain {{keyword}}",
                    platform.name
                )));
            }
        }

        Ok(())
    }

    pub fn new_platforms(&self) -> Vec<NewPlatform> {
        self.platforms.iter().map(PlatformConfig::to_new_platform).collect()
    }
}
