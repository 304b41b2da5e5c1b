use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A tracked catalog entry. The id is assigned by the catalog, not the store.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub name_jp: Option<String>,
    pub series: String,

    // Matching attributes
    pub character: String,
    pub circle: String,
    pub event: Option<String>,
    pub artist: String,

    // Keyword list (JSON array), replaceable from configuration
    pub search_keywords_json: String,

    // Metadata
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Catalog entry as written in the catalog file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewProduct {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub name_jp: Option<String>,
    #[serde(default)]
    pub series: String,
    #[serde(default)]
    pub character: String,
    #[serde(default)]
    pub circle: String,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub search_keywords: Vec<String>,
}

impl Product {
    pub fn new(new_product: NewProduct) -> Self {
        let now = Utc::now();
        Self {
            id: new_product.id,
            name: new_product.name,
            name_jp: new_product.name_jp,
            series: new_product.series,
            character: new_product.character,
            circle: new_product.circle,
            event: new_product.event,
            artist: new_product.artist,
            search_keywords_json: keywords_to_json(&new_product.search_keywords),
            created_at: now,
            updated_at: now,
        }
    }

    /// Keywords stored on the row. A malformed column reads as no keywords.
    pub fn search_keywords(&self) -> Vec<String> {
        serde_json::from_str(&self.search_keywords_json).unwrap_or_default()
    }

    pub fn set_search_keywords(&mut self, keywords: &[String]) {
        self.search_keywords_json = keywords_to_json(keywords);
        self.updated_at = Utc::now();
    }

    pub fn has_keywords(&self) -> bool {
        self.search_keywords().iter().any(|k| !k.trim().is_empty())
    }
}

fn keywords_to_json(keywords: &[String]) -> String {
    // Vec<String> always serializes
    serde_json::to_string(keywords).unwrap_or_else(|_| "[]".to_string())
}
