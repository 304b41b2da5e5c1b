//! Title matching of scraped records against tracked products.

use crate::config::default_category_keywords;
use crate::models::Product;
use crate::plugins::traits::ScrapedRecord;

/// Decides whether a scraped record is the tracked product.
///
/// Character and circle names must appear literally in the title when set,
/// and at least one category keyword must appear. The artist is not required
/// since platforms often leave it out of titles.
#[derive(Debug, Clone)]
pub struct Matcher {
    category_keywords: Vec<String>,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(default_category_keywords())
    }
}

impl Matcher {
    pub fn new(category_keywords: Vec<String>) -> Self {
        Self { category_keywords }
    }

    pub fn matches(&self, record: &ScrapedRecord, product: &Product) -> bool {
        let title = record.title.as_str();

        if !product.character.is_empty() && !title.contains(product.character.as_str()) {
            return false;
        }

        if !product.circle.is_empty() && !title.contains(product.circle.as_str()) {
            return false;
        }

        self.category_keywords
            .iter()
            .any(|keyword| title.contains(keyword.as_str()))
    }
}
