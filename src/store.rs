//! SQLite-backed persistent store.
//!
//! The store exclusively owns every entity. Reads used by the reconcile
//! transition take an explicit connection so the caller can run them inside
//! one transaction; everything else goes through the pool.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteConnection, Transaction};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

use crate::config::DatabaseConfig;
use crate::models::{
    ChangeEvent, Listing, NewPlatform, NewProduct, Platform, PriceHistory, Product, RunStatus,
    ScrapeRun,
};
use crate::utils::error::Result;

/// Counter deltas applied to an open run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    pub items_checked: i64,
    pub platforms_checked: i64,
    pub new_listings_found: i64,
    pub changes_detected: i64,
    pub error_count: i64,
}

impl RunCounters {
    pub fn is_empty(&self) -> bool {
        *self == RunCounters::default()
    }
}

/// Clones share the pool and the write lock.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

impl Store {
    /// Open the database and bring the schema up to date.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(10));

        // Every connection to ":memory:" is its own database
        let max_connections = if config.url.contains(":memory:") {
            1
        } else {
            config.max_connections
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
        };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn in_memory() -> Result<Self> {
        Self::connect(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        })
        .await
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Coarse lock serializing every read-then-write unit (one reconcile, one
    /// batch of run counter updates). Never hold it across a scrape call.
    pub async fn write_guard(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().await
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ---------------------------------------------------------------
    // Catalog
    // ---------------------------------------------------------------

    /// Create the platform if absent, otherwise refresh its attributes.
    pub async fn upsert_platform(&self, new_platform: &NewPlatform) -> Result<Platform> {
        match self.get_platform_by_name(&new_platform.name).await? {
            Some(mut platform) => {
                platform.refresh(new_platform);
                sqlx::query(
                    "UPDATE platforms SET display_name = ?, base_url = ?, enabled = ? WHERE id = ?",
                )
                .bind(&platform.display_name)
                .bind(&platform.base_url)
                .bind(platform.enabled)
                .bind(&platform.id)
                .execute(&self.pool)
                .await?;
                Ok(platform)
            }
            None => {
                let platform = Platform::new(new_platform.clone());
                sqlx::query(
                    r"
                    INSERT INTO platforms (id, name, display_name, base_url, enabled, created_at)
                    VALUES (?, ?, ?, ?, ?, ?)
                    ",
                )
                .bind(&platform.id)
                .bind(&platform.name)
                .bind(&platform.display_name)
                .bind(&platform.base_url)
                .bind(platform.enabled)
                .bind(platform.created_at)
                .execute(&self.pool)
                .await?;
                tracing::info!("Added platform: {}", platform.display_name);
                Ok(platform)
            }
        }
    }

    /// Create the product if absent, otherwise replace its keyword list.
    pub async fn upsert_product(&self, new_product: &NewProduct) -> Result<Product> {
        match self.get_product(new_product.id).await? {
            Some(mut product) => {
                product.set_search_keywords(&new_product.search_keywords);
                sqlx::query("UPDATE products SET search_keywords_json = ?, updated_at = ? WHERE id = ?")
                    .bind(&product.search_keywords_json)
                    .bind(product.updated_at)
                    .bind(product.id)
                    .execute(&self.pool)
                    .await?;
                Ok(product)
            }
            None => {
                let product = Product::new(new_product.clone());
                sqlx::query(
                    r"
                    INSERT INTO products
                    (id, name, name_jp, series, character, circle, event, artist,
                     search_keywords_json, created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    ",
                )
                .bind(product.id)
                .bind(&product.name)
                .bind(&product.name_jp)
                .bind(&product.series)
                .bind(&product.character)
                .bind(&product.circle)
                .bind(&product.event)
                .bind(&product.artist)
                .bind(&product.search_keywords_json)
                .bind(product.created_at)
                .bind(product.updated_at)
                .execute(&self.pool)
                .await?;
                tracing::info!("Added product: {}", product.name);
                Ok(product)
            }
        }
    }

    pub async fn get_product(&self, id: i64) -> Result<Option<Product>> {
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(product)
    }

    pub async fn list_products(&self) -> Result<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>("SELECT * FROM products ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(products)
    }

    pub async fn get_platform_by_name(&self, name: &str) -> Result<Option<Platform>> {
        let platform = sqlx::query_as::<_, Platform>("SELECT * FROM platforms WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(platform)
    }

    pub async fn list_platforms(&self) -> Result<Vec<Platform>> {
        let platforms = sqlx::query_as::<_, Platform>("SELECT * FROM platforms ORDER BY rowid")
            .fetch_all(&self.pool)
            .await?;
        Ok(platforms)
    }

    // ---------------------------------------------------------------
    // Reconcile transition (connection-scoped)
    // ---------------------------------------------------------------

    pub async fn find_listing(
        conn: &mut SqliteConnection,
        product_id: i64,
        platform_id: &str,
        url: &str,
    ) -> Result<Option<Listing>> {
        let listing = sqlx::query_as::<_, Listing>(
            "SELECT * FROM listings WHERE product_id = ? AND platform_id = ? AND url = ?",
        )
        .bind(product_id)
        .bind(platform_id)
        .bind(url)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(listing)
    }

    pub async fn insert_listing(conn: &mut SqliteConnection, listing: &Listing) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO listings
            (id, product_id, platform_id, url, title, price, image_url, status, status_text,
             seller, description, extra_metadata_json, first_seen, last_seen, last_checked, is_active)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&listing.id)
        .bind(listing.product_id)
        .bind(&listing.platform_id)
        .bind(&listing.url)
        .bind(&listing.title)
        .bind(listing.price)
        .bind(&listing.image_url)
        .bind(listing.status)
        .bind(&listing.status_text)
        .bind(&listing.seller)
        .bind(&listing.description)
        .bind(&listing.extra_metadata_json)
        .bind(listing.first_seen)
        .bind(listing.last_seen)
        .bind(listing.last_checked)
        .bind(listing.is_active)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Persist the mutable observation fields. Identity and first_seen never change.
    pub async fn update_listing(conn: &mut SqliteConnection, listing: &Listing) -> Result<()> {
        sqlx::query(
            r"
            UPDATE listings
            SET price = ?, image_url = ?, status = ?, status_text = ?, seller = ?,
                description = ?, last_seen = ?, last_checked = ?, is_active = ?
            WHERE id = ?
            ",
        )
        .bind(listing.price)
        .bind(&listing.image_url)
        .bind(listing.status)
        .bind(&listing.status_text)
        .bind(&listing.seller)
        .bind(&listing.description)
        .bind(listing.last_seen)
        .bind(listing.last_checked)
        .bind(listing.is_active)
        .bind(&listing.id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn insert_price_history(conn: &mut SqliteConnection, entry: &PriceHistory) -> Result<()> {
        sqlx::query("INSERT INTO price_history (id, listing_id, price, recorded_at) VALUES (?, ?, ?, ?)")
            .bind(&entry.id)
            .bind(&entry.listing_id)
            .bind(entry.price)
            .bind(entry.recorded_at)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn insert_change_event(conn: &mut SqliteConnection, event: &ChangeEvent) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO change_events
            (id, listing_id, event_type, description, old_value, new_value, notified, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&event.id)
        .bind(&event.listing_id)
        .bind(event.event_type)
        .bind(&event.description)
        .bind(&event.old_value)
        .bind(&event.new_value)
        .bind(event.notified)
        .bind(event.created_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn add_run_counters(
        conn: &mut SqliteConnection,
        run_id: &str,
        delta: RunCounters,
    ) -> Result<()> {
        if delta.is_empty() {
            return Ok(());
        }
        sqlx::query(
            r"
            UPDATE scrape_runs
            SET items_checked = items_checked + ?,
                platforms_checked = platforms_checked + ?,
                new_listings_found = new_listings_found + ?,
                changes_detected = changes_detected + ?,
                error_count = error_count + ?
            WHERE id = ?
            ",
        )
        .bind(delta.items_checked)
        .bind(delta.platforms_checked)
        .bind(delta.new_listings_found)
        .bind(delta.changes_detected)
        .bind(delta.error_count)
        .bind(run_id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Runs
    // ---------------------------------------------------------------

    pub async fn insert_run(&self, run: &ScrapeRun) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO scrape_runs
            (id, started_at, completed_at, status, items_checked, platforms_checked,
             new_listings_found, changes_detected, errors, error_count)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&run.id)
        .bind(run.started_at)
        .bind(run.completed_at)
        .bind(run.status)
        .bind(run.items_checked)
        .bind(run.platforms_checked)
        .bind(run.new_listings_found)
        .bind(run.changes_detected)
        .bind(&run.errors)
        .bind(run.error_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn complete_run(
        &self,
        run_id: &str,
        status: RunStatus,
        errors: Option<&str>,
        completed_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE scrape_runs SET status = ?, completed_at = ?, errors = COALESCE(?, errors) WHERE id = ?",
        )
        .bind(status)
        .bind(completed_at)
        .bind(errors)
        .bind(run_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_run(&self, run_id: &str) -> Result<Option<ScrapeRun>> {
        let run = sqlx::query_as::<_, ScrapeRun>("SELECT * FROM scrape_runs WHERE id = ?")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(run)
    }

    pub async fn latest_run(&self) -> Result<Option<ScrapeRun>> {
        let run = sqlx::query_as::<_, ScrapeRun>("SELECT * FROM scrape_runs ORDER BY rowid DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(run)
    }

    // ---------------------------------------------------------------
    // Notification queue
    // ---------------------------------------------------------------

    pub async fn pending_events(&self) -> Result<Vec<ChangeEvent>> {
        let events = sqlx::query_as::<_, ChangeEvent>(
            "SELECT * FROM change_events WHERE notified = 0 ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    /// Returns true when this call flipped the flag.
    pub async fn mark_event_sent(&self, event_id: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE change_events SET notified = 1 WHERE id = ? AND notified = 0")
            .bind(event_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ---------------------------------------------------------------
    // Read helpers
    // ---------------------------------------------------------------

    pub async fn get_listing(
        &self,
        product_id: i64,
        platform_id: &str,
        url: &str,
    ) -> Result<Option<Listing>> {
        let mut conn = self.pool.acquire().await?;
        Self::find_listing(&mut conn, product_id, platform_id, url).await
    }

    pub async fn listings_for_product(&self, product_id: i64) -> Result<Vec<Listing>> {
        let listings = sqlx::query_as::<_, Listing>(
            "SELECT * FROM listings WHERE product_id = ? ORDER BY rowid",
        )
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(listings)
    }

    pub async fn price_history(&self, listing_id: &str) -> Result<Vec<PriceHistory>> {
        let history = sqlx::query_as::<_, PriceHistory>(
            "SELECT * FROM price_history WHERE listing_id = ? ORDER BY rowid",
        )
        .bind(listing_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(history)
    }

    pub async fn events_for_listing(&self, listing_id: &str) -> Result<Vec<ChangeEvent>> {
        let events = sqlx::query_as::<_, ChangeEvent>(
            "SELECT * FROM change_events WHERE listing_id = ? ORDER BY rowid",
        )
        .bind(listing_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    pub async fn all_events(&self) -> Result<Vec<ChangeEvent>> {
        let events = sqlx::query_as::<_, ChangeEvent>("SELECT * FROM change_events ORDER BY rowid")
            .fetch_all(&self.pool)
            .await?;
        Ok(events)
    }

    pub async fn count_listings(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM listings")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
