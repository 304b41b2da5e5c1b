use headless_chrome::{Browser, LaunchOptions};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::ScraperConfig;
use crate::utils::error::{AppError, Result};

static PRICE_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[¥￥]?\s*([0-9][0-9,]*(?:\.[0-9]+)?)").ok());

/// One lazily launched headless browser, shared by every request a platform
/// collaborator makes. The browser is started on first use and released by
/// `close`; a later request launches a fresh one.
pub struct BrowserSession {
    config: ScraperConfig,
    browser: Mutex<Option<Browser>>,
}

impl BrowserSession {
    pub fn new(config: ScraperConfig) -> Self {
        Self {
            config,
            browser: Mutex::new(None),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.browser.lock().await.is_some()
    }

    /// Launch the browser if it is not already running.
    pub async fn ensure_started(&self) -> Result<()> {
        self.browser().await.map(|_| ())
    }

    async fn browser(&self) -> Result<Browser> {
        let mut slot = self.browser.lock().await;
        if let Some(browser) = slot.as_ref() {
            return Ok(browser.clone());
        }

        let config = self.config.clone();
        let browser = tokio::task::spawn_blocking(move || launch(&config))
            .await
            .map_err(|e| AppError::Internal(format!("Browser launch task failed: {}", e)))??;

        tracing::debug!("Launched headless browser");
        *slot = Some(browser.clone());
        Ok(browser)
    }

    /// Load a page and return its rendered HTML.
    pub async fn fetch_html(&self, url: &str, wait_for: Option<&str>) -> Result<String> {
        let browser = self.browser().await?;
        let url = url.to_string();
        let wait_for = wait_for.map(str::to_string);
        let user_agent = self.config.user_agent.clone();
        let timeout = Duration::from_secs(self.config.navigation_timeout_secs);

        tokio::task::spawn_blocking(move || {
            let tab = browser
                .new_tab()
                .map_err(|e| AppError::Browser(format!("Failed to create tab: {}", e)))?;
            tab.set_default_timeout(timeout);

            tab.set_user_agent(&user_agent, None, None)
                .map_err(|e| AppError::Browser(format!("Failed to set user agent: {}", e)))?;

            let loaded = tab
                .navigate_to(&url)
                .and_then(|tab| tab.wait_until_navigated())
                .map_err(|e| AppError::Scraping(format!("Navigation to {} failed: {}", url, e)));

            let content = loaded.and_then(|tab| {
                if let Some(selector) = &wait_for {
                    // Pages without the element are still read; extraction decides
                    if let Err(e) = tab.wait_for_element_with_custom_timeout(selector, timeout) {
                        tracing::debug!("Element '{}' not found on {}: {}", selector, url, e);
                    }
                }
                tab.get_content()
                    .map_err(|e| AppError::Scraping(format!("Failed to read {}: {}", url, e)))
            });

            if let Err(e) = tab.close(true) {
                tracing::debug!("Failed to close tab for {}: {}", url, e);
            }
            content
        })
        .await
        .map_err(|e| AppError::Internal(format!("Page fetch task failed: {}", e)))?
    }

    /// Drop the browser process. Safe to call when nothing was launched.
    pub async fn close(&self) {
        if let Some(browser) = self.browser.lock().await.take() {
            // Dropping the handle kills the child process; that blocks briefly
            match tokio::task::spawn_blocking(move || drop(browser)).await {
                Ok(()) => tracing::debug!("Closed headless browser"),
                Err(e) => tracing::debug!("Browser shutdown task failed: {}", e),
            }
        }
    }
}

fn launch(config: &ScraperConfig) -> Result<Browser> {
    let mut launch_options = LaunchOptions::default_builder()
        .headless(config.headless)
        .sandbox(false)
        .idle_browser_timeout(Duration::from_secs(config.navigation_timeout_secs.max(60) * 4))
        .args(vec![
            std::ffi::OsStr::new("--no-sandbox"),
            std::ffi::OsStr::new("--disable-dev-shm-usage"),
            std::ffi::OsStr::new("--disable-gpu"),
            std::ffi::OsStr::new("--disable-extensions"),
            std::ffi::OsStr::new("--disable-blink-features=AutomationControlled"),
        ])
        .build()
        .map_err(|e| AppError::Browser(format!("Failed to create launch options: {}", e)))?;

    if let Some(chrome_path) = &config.chrome_path {
        launch_options.path = Some(std::path::PathBuf::from(chrome_path));
    }

    Browser::new(launch_options).map_err(|e| AppError::Browser(format!("Failed to launch browser: {}", e)))
}

// ---------------------------------------------------------------
// HTML extraction helpers
// ---------------------------------------------------------------

pub fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| AppError::Scraping(format!("Invalid CSS selector '{}': {:?}", selector, e)))
}

/// Whitespace-collapsed text of an element.
pub fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text of the first element matching `selector` that has any text.
pub fn select_text(document: &Html, selector: &str) -> Result<Option<String>> {
    let selector = parse_selector(selector)?;
    Ok(document
        .select(&selector)
        .map(element_text)
        .find(|text| !text.is_empty()))
}

/// Attribute of the first matching element that carries it.
pub fn select_attr(document: &Html, selector: &str, attr: &str) -> Result<Option<String>> {
    let selector = parse_selector(selector)?;
    Ok(document
        .select(&selector)
        .filter_map(|element| element.value().attr(attr))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string))
}

/// Read a yen amount such as "¥1,200" or "1200円". None when no digits appear.
pub fn parse_price(text: &str) -> Option<f64> {
    let pattern = PRICE_PATTERN.as_ref()?;
    let captures = pattern.captures(text)?;
    captures.get(1)?.as_str().replace(',', "").parse().ok()
}
