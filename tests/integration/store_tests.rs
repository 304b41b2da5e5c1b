use super::*;
use market_watcher::config::DatabaseConfig;
use market_watcher::models::RunStatus;

#[tokio::test]
async fn test_file_database_survives_reopen() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = DatabaseConfig {
        url: format!("sqlite://{}", dir.path().join("watcher.db").display()),
        max_connections: 4,
    };
    let catalog = catalog(vec![product(1, "アリス", &["アリス 抱き枕"])], &["x"]);

    let run_id = {
        let store = Store::connect(&config).await?;
        let orchestrator = Orchestrator::new(store.clone(), Matcher::default(), orchestrator_config(ConcurrencyMode::Concurrent));
        orchestrator.initialize(&catalog).await?;

        let x = FakePlatform::new("x");
        x.set_records(vec![record("x", "1", "アリス 抱き枕カバー", 1000.0)]);
        let stats = orchestrator.run(&registry(&[x])).await?;
        store.close().await;
        stats.run_id
    };

    let store = Store::connect(&config).await?;
    assert_eq!(store.count_listings().await?, 1);
    assert_eq!(store.pending_events().await?.len(), 1);

    let run = store.get_run(&run_id).await?.expect("run persisted");
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.new_listings_found, 1);
    Ok(())
}

#[tokio::test]
async fn test_initialize_is_repeatable() -> anyhow::Result<()> {
    let mut catalog = catalog(vec![product(1, "アリス", &["old"])], &["x"]);
    let orchestrator = setup(&catalog, orchestrator_config(ConcurrencyMode::Concurrent)).await?;
    let store = orchestrator.store();
    let platform_id = store.get_platform_by_name("x").await?.expect("platform row").id;

    catalog.products[0].search_keywords = vec!["new".to_string()];
    catalog.platforms[0].enabled = false;
    let summary = orchestrator.initialize(&catalog).await?;
    assert_eq!(summary.products, 1);
    assert_eq!(summary.platforms, 1);

    let products = store.list_products().await?;
    assert_eq!(products.len(), 1);
    assert_eq!(products[0].search_keywords(), vec!["new"]);

    let platforms = store.list_platforms().await?;
    assert_eq!(platforms.len(), 1);
    assert_eq!(platforms[0].id, platform_id);
    assert!(!platforms[0].enabled);
    Ok(())
}

#[tokio::test]
async fn test_initialize_rejects_invalid_catalog() -> anyhow::Result<()> {
    let orchestrator = setup(&catalog(vec![], &[]), orchestrator_config(ConcurrencyMode::Concurrent)).await?;

    let duplicate = catalog(vec![product(1, "アリス", &["a"]), product(1, "ボブ", &["b"])], &["x"]);
    let result = orchestrator.initialize(&duplicate).await;
    assert!(matches!(result, Err(AppError::Validation(_))));
    assert!(orchestrator.store().list_products().await?.is_empty());
    Ok(())
}

#[test]
fn test_shipped_catalog_is_valid() -> anyhow::Result<()> {
    let catalog = Catalog::from_file("config/catalog.toml")?;

    assert!(!catalog.products.is_empty());
    assert!(catalog.platforms.iter().any(|p| p.name == "mercari" && p.enabled));
    assert!(catalog.platforms.iter().all(|p| p.search_url.contains("{keyword}")));

    let registry = PlatformRegistry::from_catalog(&catalog, &Default::default())?;
    assert_eq!(
        registry.len(),
        catalog.platforms.iter().filter(|p| p.enabled).count()
    );
    Ok(())
}
