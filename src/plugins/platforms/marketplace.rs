use async_trait::async_trait;
use scraper::Html;
use std::collections::HashSet;
use url::Url;

use crate::config::{PlatformConfig, ScraperConfig};
use crate::models::ListingStatus;
use crate::plugins::traits::{PlatformScraper, ScrapedRecord};
use crate::scraper::{BrowserSession, element_text, select_attr, select_text, parse_price};
use crate::utils::error::{AppError, Result};
use crate::utils::RateLimiter;

const DESCRIPTION_MAX_CHARS: usize = 500;
const SCRAPE_METHOD: &str = "headless_chrome";

/// Selector-driven marketplace collaborator. Every platform in the catalog
/// is one of these, differing only in its `PlatformConfig`.
pub struct MarketplacePlatform {
    config: PlatformConfig,
    base_url: Url,
    max_results: usize,
    session: BrowserSession,
    rate_limiter: RateLimiter,
}

impl MarketplacePlatform {
    pub fn new(config: PlatformConfig, scraper_config: &ScraperConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            AppError::Validation(format!("Invalid base URL for platform {}: {}", config.name, e))
        })?;

        Ok(Self {
            rate_limiter: RateLimiter::from_secs_f64(config.delay_secs, config.jitter_secs)?,
            session: BrowserSession::new(scraper_config.clone()),
            max_results: scraper_config.max_results_per_keyword,
            base_url,
            config,
        })
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    pub fn search_url(&self, keyword: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(keyword.as_bytes()).collect();
        self.config.search_url.replace("{keyword}", &encoded)
    }

    fn detail_wait_selector(&self) -> &str {
        self.config
            .selectors
            .wait_for
            .as_deref()
            .unwrap_or(&self.config.selectors.title)
    }
}

#[async_trait]
impl PlatformScraper for MarketplacePlatform {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn ensure_ready(&self) -> Result<()> {
        self.session.ensure_started().await
    }

    async fn search(&self, keywords: &[String]) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let mut urls = Vec::new();

        for keyword in keywords.iter().filter(|k| !k.trim().is_empty()) {
            self.rate_limiter.acquire().await;
            let search_url = self.search_url(keyword);
            tracing::info!("Searching {}: {}", self.config.name, keyword);

            let html = match self.session.fetch_html(&search_url, None).await {
                Ok(html) => html,
                Err(AppError::Scraping(message)) => {
                    tracing::warn!("Search failed on {} for '{}': {}", self.config.name, keyword, message);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let found = parse_search_results(
                &html,
                &self.base_url,
                &self.config.selectors.result_link,
                self.config.item_url_pattern.as_deref(),
                self.max_results,
            )?;
            tracing::info!("Keyword '{}' found {} item links on {}", keyword, found.len(), self.config.name);

            for url in found {
                if seen.insert(url.clone()) {
                    urls.push(url);
                }
            }
        }

        Ok(urls)
    }

    async fn scrape_detail(&self, url: &str) -> Result<Option<ScrapedRecord>> {
        self.rate_limiter.acquire().await;
        tracing::debug!("Scraping {} detail: {}", self.config.name, url);

        let html = match self.session.fetch_html(url, Some(self.detail_wait_selector())).await {
            Ok(html) => html,
            Err(AppError::Scraping(message)) => {
                tracing::warn!("Failed to load {}: {}", url, message);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let record = parse_detail(&html, url, &self.base_url, &self.config)?;
        if record.is_none() {
            tracing::warn!("Could not extract a title from {}", url);
        }
        Ok(record)
    }

    async fn close(&self) -> Result<()> {
        self.session.close().await;
        Ok(())
    }
}

/// Absolute item URLs from a search results page, query and fragment
/// stripped, deduplicated in page order and capped at `limit`.
pub fn parse_search_results(
    html: &str,
    base_url: &Url,
    link_selector: &str,
    item_url_pattern: Option<&str>,
    limit: usize,
) -> Result<Vec<String>> {
    let document = Html::parse_document(html);
    let selector = crate::scraper::parse_selector(link_selector)?;

    let mut seen = HashSet::new();
    let mut urls = Vec::new();

    for element in document.select(&selector) {
        if urls.len() >= limit {
            break;
        }
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Ok(mut resolved) = base_url.join(href.trim()) else {
            continue;
        };
        if !matches!(resolved.scheme(), "http" | "https") {
            continue;
        }
        resolved.set_query(None);
        resolved.set_fragment(None);

        let resolved = resolved.to_string();
        if let Some(pattern) = item_url_pattern {
            if !resolved.contains(pattern) {
                continue;
            }
        }
        if seen.insert(resolved.clone()) {
            urls.push(resolved);
        }
    }

    Ok(urls)
}

/// Extract a record from a detail page. `None` when the page has no title.
pub fn parse_detail(
    html: &str,
    url: &str,
    base_url: &Url,
    config: &PlatformConfig,
) -> Result<Option<ScrapedRecord>> {
    let document = Html::parse_document(html);
    let selectors = &config.selectors;

    let Some(title) = select_text(&document, &selectors.title)? else {
        return Ok(None);
    };

    let mut record = ScrapedRecord::new(title, url);

    if let Some(price_selector) = &selectors.price {
        record.price = select_text(&document, price_selector)?.as_deref().and_then(parse_price);
    }

    let page_text = element_text(document.root_element());
    if let Some(marker) = find_marker(&page_text, &config.sold_markers) {
        record = record.with_status(ListingStatus::Sold, Some(marker));
    } else if let Some(marker) = find_marker(&page_text, &config.ended_markers) {
        record = record.with_status(ListingStatus::Ended, Some(marker));
    }

    if let Some(image_selector) = &selectors.image {
        record.image_url = select_attr(&document, image_selector, "src")?
            .and_then(|src| base_url.join(&src).ok())
            .map(String::from);
    }

    if let Some(seller_selector) = &selectors.seller {
        record.seller = select_text(&document, seller_selector)?;
    }

    if let Some(description_selector) = &selectors.description {
        record.description = select_text(&document, description_selector)?
            .map(|text| text.chars().take(DESCRIPTION_MAX_CHARS).collect());
    }

    record.metadata.insert("platform".to_string(), config.name.clone());
    record.metadata.insert("scrape_method".to_string(), SCRAPE_METHOD.to_string());

    Ok(Some(record))
}

fn find_marker<'a>(text: &str, markers: &'a [String]) -> Option<&'a str> {
    markers
        .iter()
        .map(String::as_str)
        .find(|marker| !marker.is_empty() && text.contains(marker))
}
