use super::*;
use market_watcher::models::{ChangeEvent, ChangeEventType};
use market_watcher::notifications::{drain, ChangeNotifier, LogNotifier, NotificationQueue};

/// Remembers every batch; delivery succeeds unless told otherwise.
struct RecordingNotifier {
    deliver: bool,
    batches: Mutex<Vec<Vec<ChangeEventType>>>,
}

impl RecordingNotifier {
    fn new(deliver: bool) -> Self {
        Self {
            deliver,
            batches: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ChangeNotifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn notify(&self, events: &[ChangeEvent]) -> market_watcher::Result<bool> {
        self.batches
            .lock()
            .unwrap()
            .push(events.iter().map(|e| e.event_type).collect());
        Ok(self.deliver)
    }
}

async fn orchestrator_with_events() -> anyhow::Result<Orchestrator> {
    let catalog = catalog(vec![product(1, "アリス", &["アリス 抱き枕"])], &["x"]);
    let orchestrator = setup(&catalog, orchestrator_config(ConcurrencyMode::Concurrent)).await?;

    let x = FakePlatform::new("x");
    x.set_records(vec![
        record("x", "1", "アリス 抱き枕カバー", 1000.0),
        record("x", "2", "アリス 抱き枕カバー 再販", 1200.0),
    ]);
    orchestrator.run(&registry(&[x])).await?;
    Ok(orchestrator)
}

#[tokio::test]
async fn test_pending_and_mark_sent() -> anyhow::Result<()> {
    let orchestrator = orchestrator_with_events().await?;
    let queue = NotificationQueue::new(orchestrator.store().clone());

    let pending = queue.pending().await?;
    assert_eq!(pending.len(), 2);
    assert!(pending.iter().all(|e| !e.notified));

    queue.mark_sent(&pending[0].id).await?;
    // already sent
    queue.mark_sent(&pending[0].id).await?;
    queue.mark_sent("no-such-event").await?;

    let remaining = queue.pending().await?;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, pending[1].id);
    Ok(())
}

#[tokio::test]
async fn test_drain_marks_delivered_events() -> anyhow::Result<()> {
    let orchestrator = orchestrator_with_events().await?;
    let queue = NotificationQueue::new(orchestrator.store().clone());
    let notifier = RecordingNotifier::new(true);

    assert_eq!(drain(&queue, &notifier).await?, 2);
    assert!(queue.pending().await?.is_empty());

    // nothing left, notifier not called again
    assert_eq!(drain(&queue, &notifier).await?, 0);
    assert_eq!(notifier.batches.lock().unwrap().len(), 1);
    assert_eq!(
        notifier.batches.lock().unwrap()[0],
        vec![ChangeEventType::NewItem, ChangeEventType::NewItem]
    );
    Ok(())
}

#[tokio::test]
async fn test_failed_delivery_leaves_events_pending() -> anyhow::Result<()> {
    let orchestrator = orchestrator_with_events().await?;
    let queue = NotificationQueue::new(orchestrator.store().clone());

    assert_eq!(drain(&queue, &RecordingNotifier::new(false)).await?, 0);
    assert_eq!(queue.pending().await?.len(), 2);

    assert_eq!(drain(&queue, &LogNotifier).await?, 2);
    assert!(queue.pending().await?.is_empty());
    Ok(())
}
