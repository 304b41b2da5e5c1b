use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::{ListingStatus, NewListing};
use crate::utils::error::Result;

/// Fields extracted from one candidate listing page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScrapedRecord {
    pub title: String,
    pub url: String,
    pub price: Option<f64>,
    pub status: ListingStatus,
    /// Raw status string as shown by the platform.
    pub status_text: Option<String>,
    pub image_url: Option<String>,
    pub seller: Option<String>,
    pub description: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl ScrapedRecord {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            price: None,
            status: ListingStatus::Available,
            status_text: None,
            image_url: None,
            seller: None,
            description: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_status(mut self, status: ListingStatus, status_text: Option<&str>) -> Self {
        self.status = status;
        self.status_text = status_text.map(str::to_string);
        self
    }

    pub fn to_new_listing(&self, product_id: i64, platform_id: &str) -> NewListing {
        NewListing {
            product_id,
            platform_id: platform_id.to_string(),
            url: self.url.clone(),
            title: self.title.clone(),
            price: self.price,
            image_url: self.image_url.clone(),
            status: self.status,
            status_text: self.status_text.clone(),
            seller: self.seller.clone(),
            description: self.description.clone(),
            extra_metadata: if self.metadata.is_empty() {
                None
            } else {
                serde_json::to_value(&self.metadata).ok()
            },
        }
    }
}

/// A marketplace the orchestrator can search and scrape.
///
/// Implementations own their session resources and their own request pacing.
/// The orchestrator calls `ensure_ready` before and `close` after every task.
#[async_trait]
pub trait PlatformScraper: Send + Sync {
    /// Unique platform name, matching the `platforms.name` row.
    fn name(&self) -> &str;

    /// Prepare session resources. Called before each task; must be cheap when
    /// already initialized.
    async fn ensure_ready(&self) -> Result<()> {
        Ok(())
    }

    /// Candidate detail URLs for the given keywords. Zero results is not an error.
    async fn search(&self, keywords: &[String]) -> Result<Vec<String>>;

    /// Extract one listing. `Ok(None)` for pages that cannot be read as a listing.
    async fn scrape_detail(&self, url: &str) -> Result<Option<ScrapedRecord>>;

    /// Release session resources. Idempotent.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
