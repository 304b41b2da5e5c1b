use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use crate::models::{ChangeEventType, ListingStatus, format_price, generate_id};

/// One detected transition, queued for the notification consumer.
///
/// `notified` starts false and is only flipped by the notification queue.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct ChangeEvent {
    pub id: String,
    pub listing_id: Option<String>,
    pub event_type: ChangeEventType,
    pub description: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub notified: bool,
    pub created_at: DateTime<Utc>,
}

impl ChangeEvent {
    fn new(
        listing_id: &str,
        event_type: ChangeEventType,
        description: String,
        old_value: Option<String>,
        new_value: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: generate_id(),
            listing_id: Some(listing_id.to_string()),
            event_type,
            description: Some(description),
            old_value,
            new_value,
            notified: false,
            created_at,
        }
    }

    pub fn new_item(listing_id: &str, title: &str, price: Option<f64>, now: DateTime<Utc>) -> Self {
        Self::new(
            listing_id,
            ChangeEventType::NewItem,
            format!("New listing: {}", title),
            None,
            Some(format_price(price)),
            now,
        )
    }

    pub fn price_change(listing_id: &str, old: Option<f64>, new: f64, now: DateTime<Utc>) -> Self {
        Self::new(
            listing_id,
            ChangeEventType::PriceChange,
            format!("Price changed: {} → {}", format_price(old), format_price(Some(new))),
            old.map(|p| p.to_string()),
            Some(new.to_string()),
            now,
        )
    }

    pub fn status_change(
        listing_id: &str,
        old: ListingStatus,
        new: ListingStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(
            listing_id,
            ChangeEventType::for_status_transition(old, new),
            format!("Status changed: {} → {}", old, new),
            Some(old.to_string()),
            Some(new.to_string()),
            now,
        )
    }
}
