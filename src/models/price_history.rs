use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use crate::models::generate_id;

/// Append-only price observation for a listing.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct PriceHistory {
    pub id: String,
    pub listing_id: String,
    pub price: f64,
    pub recorded_at: DateTime<Utc>,
}

impl PriceHistory {
    pub fn new(listing_id: String, price: f64, recorded_at: DateTime<Utc>) -> Self {
        Self {
            id: generate_id(),
            listing_id,
            price,
            recorded_at,
        }
    }
}
