use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use crate::models::generate_id;

/// A marketplace source. Identified by its unique `name`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Platform {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub base_url: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPlatform {
    pub name: String,
    pub display_name: String,
    pub base_url: String,
    pub enabled: bool,
}

impl Platform {
    pub fn new(new_platform: NewPlatform) -> Self {
        Self {
            id: generate_id(),
            name: new_platform.name,
            display_name: new_platform.display_name,
            base_url: new_platform.base_url,
            enabled: new_platform.enabled,
            created_at: Utc::now(),
        }
    }

    /// Copy catalog attributes onto an existing row. Identity is preserved.
    pub fn refresh(&mut self, update: &NewPlatform) {
        self.display_name = update.display_name.clone();
        self.base_url = update.base_url.clone();
        self.enabled = update.enabled;
    }
}
