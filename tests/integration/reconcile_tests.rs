use super::*;
use market_watcher::models::{ChangeEventType, ListingStatus, NewPlatform};
use market_watcher::reconciler::Reconciler;
use market_watcher::run_tracker::RunTracker;

async fn fixture() -> anyhow::Result<(Store, market_watcher::models::Product, market_watcher::models::Platform)> {
    fixture_on(Store::in_memory().await?).await
}

async fn fixture_on(
    store: Store,
) -> anyhow::Result<(Store, market_watcher::models::Product, market_watcher::models::Platform)> {
    let product = store.upsert_product(&product(1, "アリス", &["アリス"])).await?;
    let platform = store
        .upsert_platform(&NewPlatform {
            name: "x".to_string(),
            display_name: "X".to_string(),
            base_url: "https://x.example".to_string(),
            enabled: true,
        })
        .await?;
    Ok((store, product, platform))
}

#[tokio::test]
async fn test_concurrent_reconciles_of_one_key_create_one_listing() -> anyhow::Result<()> {
    let (store, product, platform) = fixture().await?;
    let reconciler = Reconciler::new(store.clone());
    let item = record("x", "1", "アリス 抱き枕カバー", 1000.0);

    let outcomes = futures::future::try_join_all(
        (0..8).map(|_| reconciler.reconcile(None, &product, &platform, &item)),
    )
    .await?;

    assert_eq!(outcomes.iter().filter(|o| o.created).count(), 1);
    assert_eq!(store.count_listings().await?, 1);

    let events = store.all_events().await?;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, ChangeEventType::NewItem);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_reconciles_across_tasks() -> anyhow::Result<()> {
    let (store, product, platform) = fixture().await?;
    let reconciler = Reconciler::new(store.clone());

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let reconciler = reconciler.clone();
            let product = product.clone();
            let platform = platform.clone();
            tokio::spawn(async move {
                // three distinct keys, each reconciled twice
                let item = record("x", &(i % 3).to_string(), "アリス 抱き枕カバー", 1000.0);
                reconciler.reconcile(None, &product, &platform, &item).await
            })
        })
        .collect();

    for handle in handles {
        handle.await??;
    }

    assert_eq!(store.count_listings().await?, 3);
    assert_eq!(store.all_events().await?.len(), 3);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reconciles_on_pooled_file_store() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let (store, product, platform) = fixture_on(file_store(&dir).await?).await?;
    let reconciler = Reconciler::new(store.clone());

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let reconciler = reconciler.clone();
            let product = product.clone();
            let platform = platform.clone();
            tokio::spawn(async move {
                // two keys, eight racing reconciles each
                let item = record("x", &(i % 2).to_string(), "アリス 抱き枕カバー", 1000.0);
                reconciler.reconcile(None, &product, &platform, &item).await
            })
        })
        .collect();

    let mut created = 0;
    for handle in handles {
        if handle.await??.created {
            created += 1;
        }
    }

    assert_eq!(created, 2);
    assert_eq!(store.count_listings().await?, 2);

    let events = store.all_events().await?;
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.event_type == ChangeEventType::NewItem));
    Ok(())
}

#[tokio::test]
async fn test_reconcile_is_idempotent() -> anyhow::Result<()> {
    let (store, product, platform) = fixture().await?;
    let reconciler = Reconciler::new(store.clone());
    let item = record("x", "1", "アリス 抱き枕カバー", 1000.0)
        .with_status(ListingStatus::Available, Some("販売中"));

    let first = reconciler.reconcile(None, &product, &platform, &item).await?;
    let second = reconciler.reconcile(None, &product, &platform, &item).await?;

    assert!(first.created);
    assert!(!second.created);
    assert!(second.events.is_empty());
    assert_eq!(store.price_history(&first.listing.id).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_reconcile_counts_into_the_given_run_only() -> anyhow::Result<()> {
    let (store, product, platform) = fixture().await?;
    let reconciler = Reconciler::new(store.clone());

    // two trackers over one store, one open run each
    let first = RunTracker::new(store.clone());
    let second = RunTracker::new(store.clone());
    let first_run = first.start().await?;
    let second_run = second.start().await?;

    reconciler
        .reconcile(Some(&first_run), &product, &platform, &record("x", "1", "アリス カバー", 1.0))
        .await?;
    reconciler
        .reconcile(Some(&second_run), &product, &platform, &record("x", "2", "アリス カバー", 1.0))
        .await?;
    reconciler
        .reconcile(Some(&second_run), &product, &platform, &record("x", "3", "アリス カバー", 1.0))
        .await?;

    let first_row = store.get_run(&first_run.run_id).await?.expect("first run");
    let second_row = store.get_run(&second_run.run_id).await?.expect("second run");
    assert_eq!(first_row.new_listings_found, 1);
    assert_eq!(second_row.new_listings_found, 2);
    Ok(())
}

#[tokio::test]
async fn test_metadata_is_persisted() -> anyhow::Result<()> {
    let (store, product, platform) = fixture().await?;
    let reconciler = Reconciler::new(store.clone());

    let mut item = record("x", "1", "アリス 抱き枕カバー", 1000.0);
    item.metadata.insert("platform".to_string(), "x".to_string());
    let outcome = reconciler.reconcile(None, &product, &platform, &item).await?;

    let stored = store
        .get_listing(product.id, &platform.id, &outcome.listing.url)
        .await?
        .expect("listing stored");
    assert_eq!(stored.extra_metadata(), Some(serde_json::json!({"platform": "x"})));
    Ok(())
}
