use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use crate::models::{ListingStatus, generate_id};

/// Observed state of one candidate item, keyed by (product_id, platform_id, url).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Listing {
    pub id: String,
    pub product_id: i64,
    pub platform_id: String,

    // Item information
    pub url: String,
    pub title: String,
    pub price: Option<f64>,
    pub image_url: Option<String>,

    // Status
    pub status: ListingStatus,
    pub status_text: Option<String>,

    // Last-known-good details
    pub seller: Option<String>,
    pub description: Option<String>,
    pub extra_metadata_json: Option<String>,

    // Timestamps
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub last_checked: DateTime<Utc>,

    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewListing {
    pub product_id: i64,
    pub platform_id: String,
    pub url: String,
    pub title: String,
    pub price: Option<f64>,
    pub image_url: Option<String>,
    pub status: ListingStatus,
    pub status_text: Option<String>,
    pub seller: Option<String>,
    pub description: Option<String>,
    pub extra_metadata: Option<serde_json::Value>,
}

impl Listing {
    pub fn new(new_listing: NewListing, now: DateTime<Utc>) -> Self {
        Self {
            id: generate_id(),
            product_id: new_listing.product_id,
            platform_id: new_listing.platform_id,
            url: new_listing.url,
            title: new_listing.title,
            price: new_listing.price,
            image_url: non_empty(new_listing.image_url),
            status: new_listing.status,
            status_text: new_listing.status_text,
            seller: non_empty(new_listing.seller),
            description: non_empty(new_listing.description),
            extra_metadata_json: new_listing.extra_metadata.map(|v| v.to_string()),
            first_seen: now,
            last_seen: now,
            last_checked: now,
            is_active: true,
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_seen = now;
        self.last_checked = now;
    }

    /// Overwrite optional details only with non-empty values.
    pub fn merge_details(
        &mut self,
        image_url: Option<&str>,
        seller: Option<&str>,
        description: Option<&str>,
    ) {
        if let Some(image_url) = image_url.filter(|v| !v.trim().is_empty()) {
            self.image_url = Some(image_url.to_string());
        }
        if let Some(seller) = seller.filter(|v| !v.trim().is_empty()) {
            self.seller = Some(seller.to_string());
        }
        if let Some(description) = description.filter(|v| !v.trim().is_empty()) {
            self.description = Some(description.to_string());
        }
    }

    pub fn extra_metadata(&self) -> Option<serde_json::Value> {
        self.extra_metadata_json
            .as_ref()
            .and_then(|json_str| serde_json::from_str(json_str).ok())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
