use std::sync::Arc;

use super::platforms::MarketplacePlatform;
use super::traits::PlatformScraper;
use crate::config::{Catalog, ScraperConfig};
use crate::utils::error::{AppError, Result};

pub type PlatformScraperRef = Arc<dyn PlatformScraper>;

/// Platform collaborators keyed by name, kept in registration order.
#[derive(Clone, Default)]
pub struct PlatformRegistry {
    platforms: Vec<PlatformScraperRef>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One marketplace collaborator per enabled catalog platform.
    pub fn from_catalog(catalog: &Catalog, scraper_config: &ScraperConfig) -> Result<Self> {
        let mut registry = Self::new();
        for platform_config in catalog.platforms.iter().filter(|p| p.enabled) {
            let platform = MarketplacePlatform::new(platform_config.clone(), scraper_config)?;
            registry.register(Arc::new(platform))?;
        }
        Ok(registry)
    }

    /// Register a platform collaborator
    pub fn register(&mut self, platform: PlatformScraperRef) -> Result<()> {
        if self.contains(platform.name()) {
            return Err(AppError::Validation(format!(
                "Platform '{}' is already registered",
                platform.name()
            )));
        }
        tracing::debug!("Registered platform collaborator: {}", platform.name());
        self.platforms.push(platform);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<PlatformScraperRef> {
        self.platforms.iter().find(|p| p.name() == name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.platforms.iter().any(|p| p.name() == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.platforms.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlatformScraperRef> {
        self.platforms.iter()
    }

    pub fn len(&self) -> usize {
        self.platforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.platforms.is_empty()
    }

    /// Close every collaborator. Failures are logged, never returned.
    pub async fn close_all(&self) {
        for platform in &self.platforms {
            if let Err(e) = platform.close().await {
                tracing::warn!("Error closing platform {}: {}", platform.name(), e);
            }
        }
    }
}
