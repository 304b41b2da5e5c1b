use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use crate::models::{RunStatus, generate_id};

/// One orchestration pass across the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct ScrapeRun {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub items_checked: i64,
    pub platforms_checked: i64,
    pub new_listings_found: i64,
    pub changes_detected: i64,
    pub errors: Option<String>,
    pub error_count: i64,
}

impl ScrapeRun {
    pub fn new() -> Self {
        Self {
            id: generate_id(),
            started_at: Utc::now(),
            completed_at: None,
            status: RunStatus::Running,
            items_checked: 0,
            platforms_checked: 0,
            new_listings_found: 0,
            changes_detected: 0,
            errors: None,
            error_count: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == RunStatus::Running && self.completed_at.is_none()
    }
}

impl Default for ScrapeRun {
    fn default() -> Self {
        Self::new()
    }
}
