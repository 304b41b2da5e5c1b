//! Change detection: maps one scraped record plus stored state to store
//! mutations and change events.

use chrono::Utc;

use crate::models::{ChangeEvent, ChangeEventType, Listing, Platform, PriceHistory, Product};
use crate::plugins::traits::ScrapedRecord;
use crate::run_tracker::RunContext;
use crate::store::{RunCounters, Store};
use crate::utils::error::Result;

#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub listing: Listing,
    /// One event per detected change type. Empty when nothing changed.
    pub events: Vec<ChangeEvent>,
    pub created: bool,
}

impl ReconcileOutcome {
    pub fn has_changes(&self) -> bool {
        !self.events.is_empty()
    }

    /// Event types in emission order. Callers comparing outcomes should treat
    /// this as a set.
    pub fn event_types(&self) -> Vec<ChangeEventType> {
        self.events.iter().map(|e| e.event_type).collect()
    }
}

#[derive(Clone)]
pub struct Reconciler {
    store: Store,
}

impl Reconciler {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Apply one record under the store write lock, as a single transaction.
    ///
    /// Only store failures surface as errors; missing optional fields on the
    /// record are never an error.
    pub async fn reconcile(
        &self,
        context: Option<&RunContext>,
        product: &Product,
        platform: &Platform,
        record: &ScrapedRecord,
    ) -> Result<ReconcileOutcome> {
        let _guard = self.store.write_guard().await;
        let mut tx = self.store.begin().await?;
        let now = Utc::now();

        let existing = Store::find_listing(&mut tx, product.id, &platform.id, &record.url).await?;

        let outcome = match existing {
            None => {
                let listing = Listing::new(record.to_new_listing(product.id, &platform.id), now);
                Store::insert_listing(&mut tx, &listing).await?;

                if let Some(price) = record.price {
                    let entry = PriceHistory::new(listing.id.clone(), price, now);
                    Store::insert_price_history(&mut tx, &entry).await?;
                }

                let event = ChangeEvent::new_item(&listing.id, &record.title, record.price, now);
                Store::insert_change_event(&mut tx, &event).await?;

                tracing::info!(
                    "New listing on {}: {} - {}",
                    platform.name,
                    record.title,
                    crate::models::format_price(record.price)
                );

                ReconcileOutcome {
                    listing,
                    events: vec![event],
                    created: true,
                }
            }
            Some(mut listing) => {
                let mut events = Vec::new();
                listing.touch(now);

                if let Some(price) = record.price {
                    if listing.price != Some(price) {
                        let event = ChangeEvent::price_change(&listing.id, listing.price, price, now);
                        let entry = PriceHistory::new(listing.id.clone(), price, now);
                        Store::insert_price_history(&mut tx, &entry).await?;
                        Store::insert_change_event(&mut tx, &event).await?;

                        tracing::info!(
                            "Price change on {}: {} - {}",
                            platform.name,
                            record.title,
                            event.description.as_deref().unwrap_or_default()
                        );
                        listing.price = Some(price);
                        events.push(event);
                    }
                }

                if record.status != listing.status {
                    let event = ChangeEvent::status_change(&listing.id, listing.status, record.status, now);
                    Store::insert_change_event(&mut tx, &event).await?;

                    tracing::info!(
                        "Status change on {}: {} - {} -> {}",
                        platform.name,
                        record.title,
                        listing.status,
                        record.status
                    );
                    listing.status = record.status;
                    listing.status_text = record.status_text.clone();
                    events.push(event);
                }

                listing.merge_details(
                    record.image_url.as_deref(),
                    record.seller.as_deref(),
                    record.description.as_deref(),
                );
                Store::update_listing(&mut tx, &listing).await?;

                ReconcileOutcome {
                    listing,
                    events,
                    created: false,
                }
            }
        };

        if let Some(context) = context {
            let delta = RunCounters {
                new_listings_found: outcome.created as i64,
                changes_detected: outcome.events.len() as i64,
                ..Default::default()
            };
            Store::add_run_counters(&mut tx, &context.run_id, delta).await?;
        }

        tx.commit().await?;

        for event in &outcome.events {
            metrics::counter!("watcher_changes_total", "event_type" => event.event_type.as_str())
                .increment(1);
        }
        if outcome.created {
            metrics::counter!("watcher_listings_new_total").increment(1);
        }

        Ok(outcome)
    }
}
