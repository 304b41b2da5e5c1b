use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod product;
pub mod platform;
pub mod listing;
pub mod price_history;
pub mod change_event;
pub mod scrape_run;

// Re-exports for convenience
pub use product::*;
pub use platform::*;
pub use listing::*;
pub use price_history::*;
pub use change_event::*;
pub use scrape_run::*;

/// Observed availability of a listing on its platform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT")]
pub enum ListingStatus {
    #[sqlx(rename = "available")]
    Available,
    #[sqlx(rename = "sold")]
    Sold,
    #[sqlx(rename = "ended")]
    Ended,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Available => "available",
            ListingStatus::Sold => "sold",
            ListingStatus::Ended => "ended",
        }
    }

    /// Sold and ended listings can come back as available.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ListingStatus::Sold | ListingStatus::Ended)
    }
}

impl std::fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT")]
pub enum ChangeEventType {
    #[sqlx(rename = "new_item")]
    NewItem,
    #[sqlx(rename = "price_change")]
    PriceChange,
    #[sqlx(rename = "sold_out")]
    SoldOut,
    #[sqlx(rename = "back_in_stock")]
    BackInStock,
    #[sqlx(rename = "status_change")]
    StatusChange,
}

impl ChangeEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeEventType::NewItem => "new_item",
            ChangeEventType::PriceChange => "price_change",
            ChangeEventType::SoldOut => "sold_out",
            ChangeEventType::BackInStock => "back_in_stock",
            ChangeEventType::StatusChange => "status_change",
        }
    }

    /// Classify a status transition. Callers only ask when `old != new`.
    pub fn for_status_transition(old: ListingStatus, new: ListingStatus) -> Self {
        if old.is_unavailable() && new == ListingStatus::Available {
            ChangeEventType::BackInStock
        } else if new == ListingStatus::Sold {
            ChangeEventType::SoldOut
        } else {
            ChangeEventType::StatusChange
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT")]
pub enum RunStatus {
    #[sqlx(rename = "running")]
    Running,
    #[sqlx(rename = "completed")]
    Completed,
    #[sqlx(rename = "failed")]
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

// Helper function to generate UUIDs in the format expected by the database
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Yen formatting used in event descriptions.
pub fn format_price(price: Option<f64>) -> String {
    match price {
        Some(p) if p.fract() == 0.0 => format!("¥{}", p as i64),
        Some(p) => format!("¥{:.2}", p),
        None => "N/A".to_string(),
    }
}
