//! Boundary between the change log and whatever delivers reports.

use async_trait::async_trait;

use crate::models::ChangeEvent;
use crate::store::Store;
use crate::utils::error::Result;

/// Read side of the change log for external consumers.
#[derive(Clone)]
pub struct NotificationQueue {
    store: Store,
}

impl NotificationQueue {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Every event not yet marked sent, in store order.
    pub async fn pending(&self) -> Result<Vec<ChangeEvent>> {
        self.store.pending_events().await
    }

    /// Marking an already-sent or unknown event is a no-op.
    pub async fn mark_sent(&self, event_id: &str) -> Result<()> {
        if !self.store.mark_event_sent(event_id).await? {
            tracing::debug!("Event {} was already sent or does not exist", event_id);
        }
        Ok(())
    }
}

/// Delivers a batch of events. Returns false when delivery did not happen,
/// in which case the events stay pending.
#[async_trait]
pub trait ChangeNotifier: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, events: &[ChangeEvent]) -> Result<bool>;
}

/// Writes each event to the log. Used when no other transport is configured.
pub struct LogNotifier;

#[async_trait]
impl ChangeNotifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, events: &[ChangeEvent]) -> Result<bool> {
        for event in events {
            tracing::info!(
                "[{}] {} (listing {})",
                event.event_type.as_str(),
                event.description.as_deref().unwrap_or_default(),
                event.listing_id.as_deref().unwrap_or("-")
            );
        }
        Ok(true)
    }
}

/// Send every pending event through `notifier`, marking them sent only after
/// a successful delivery. Returns the number of events marked.
pub async fn drain(queue: &NotificationQueue, notifier: &dyn ChangeNotifier) -> Result<usize> {
    let events = queue.pending().await?;
    if events.is_empty() {
        tracing::info!("No pending change events");
        return Ok(0);
    }

    if !notifier.notify(&events).await? {
        tracing::warn!(
            "Notifier {} did not deliver {} events; leaving them pending",
            notifier.name(),
            events.len()
        );
        return Ok(0);
    }

    for event in &events {
        queue.mark_sent(&event.id).await?;
    }
    tracing::info!("Delivered {} change events via {}", events.len(), notifier.name());
    Ok(events.len())
}
