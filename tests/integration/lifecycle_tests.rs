use restock_watcher::models::StockStatus;
use restock_watcher::product_manager::DEFAULT_HISTORY_LIMIT;
use restock_watcher::utils::error::{AppError, FetchError};

use super::*;

#[tokio::test]
async fn test_register_list_and_remove() -> anyhow::Result<()> {
    let app = create_test_app().await?;
    app.fetcher.push_page(&product_url(1), "First", false);
    app.fetcher.push_page(&product_url(2), "Second", true);

    let first = app.manager.register_product("u1", &product_url(1), "131").await?;
    assert!(first.first_observation);
    assert_eq!(first.item.status, StockStatus::OutOfStock);
    assert_eq!(first.item.title.as_deref(), Some("First"));

    let second = app
        .manager
        .register_product("u1", "/product/2/test-product-2", " 131 ")
        .await?;
    assert_eq!(second.item.status, StockStatus::InStock);
    assert_eq!(second.item.url, product_url(2));

    let listed = app.manager.list_products("u1").await?;
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].position, 1);
    assert_eq!(listed[0].item.id, first.item.id);
    assert_eq!(listed[1].position, 2);
    assert_eq!(listed[1].item.id, second.item.id);

    let removal = app.manager.remove_product("u1", 1).await?;
    assert_eq!(removal.item_id, first.item.id);
    assert!(removal.item_deleted);

    let listed = app.manager.list_products("u1").await?;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].position, 1);
    assert_eq!(listed[0].item.id, second.item.id);

    Ok(())
}

#[tokio::test]
async fn test_registering_twice_keeps_one_subscription() -> anyhow::Result<()> {
    let app = create_test_app().await?;
    app.fetcher.push_page(&product_url(1), "Widget", false);

    let first = app.manager.register_product("u1", &product_url(1), "131").await?;
    let second = app
        .manager
        .register_product("u1", &format!("{}?utm_source=discord", product_url(1)), "131")
        .await?;

    assert_eq!(first.item.id, second.item.id);
    assert_eq!(first.subscription.id, second.subscription.id);
    assert!(!second.first_observation);
    assert_eq!(app.manager.list_products("u1").await?.len(), 1);
    assert_eq!(app.store.count_tracked_items().await?, 1);

    Ok(())
}

#[tokio::test]
async fn test_registration_probe_does_not_overwrite_known_status() -> anyhow::Result<()> {
    let app = create_test_app().await?;
    app.fetcher.push_page(&product_url(1), "Widget", false);
    app.manager.register_product("u1", &product_url(1), "131").await?;

    // A second user registers while the page briefly shows stock; the sweep
    // must still see the out-of-stock -> in-stock transition and notify both.
    app.fetcher.push_page(&product_url(1), "Widget", true);
    let second = app.manager.register_product("u2", &product_url(1), "131").await?;
    assert!(second.availability.in_stock);
    assert_eq!(second.item.status, StockStatus::OutOfStock);

    let report = app.monitor.run_sweep().await?;
    assert_eq!(report.notifications_sent, 2);
    assert_eq!(app.notifier.sent_to("u1"), 1);
    assert_eq!(app.notifier.sent_to("u2"), 1);

    Ok(())
}

#[tokio::test]
async fn test_invalid_registrations_are_rejected_without_side_effects() -> anyhow::Result<()> {
    let app = create_test_app().await?;
    app.fetcher.push(&product_url(1), Err(FetchError::HttpStatus { status: 404 }));

    let bad_store = app.manager.register_product("u1", &product_url(1), "13").await;
    assert!(matches!(bad_store, Err(AppError::Validation(_))));

    let bad_url = app
        .manager
        .register_product("u1", "https://example.com/product/1/widget", "131")
        .await;
    assert!(matches!(bad_url, Err(AppError::Validation(_))));

    let unreachable = app.manager.register_product("u1", &product_url(1), "131").await;
    assert!(matches!(unreachable, Err(AppError::Check(_))));

    assert_eq!(app.store.count_tracked_items().await?, 0);
    assert!(app.manager.list_products("u1").await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_remove_out_of_range_position() -> anyhow::Result<()> {
    let app = create_test_app().await?;
    app.fetcher.push_page(&product_url(1), "Widget", false);
    app.manager.register_product("u1", &product_url(1), "131").await?;

    for position in [0, 2] {
        let result = app.manager.remove_product("u1", position).await;
        assert!(matches!(result, Err(AppError::NotFound { .. })), "position {}", position);
    }
    assert_eq!(app.manager.list_products("u1").await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_manual_check_covers_only_own_items_but_notifies_all_subscribers() -> anyhow::Result<()> {
    let app = create_test_app().await?;
    app.fetcher.push_page(&product_url(1), "Shared", false);
    app.fetcher.push_page(&product_url(2), "Other", false);

    app.manager.register_product("u1", &product_url(1), "131").await?;
    app.manager.register_product("u2", &product_url(1), "131").await?;
    app.manager.register_product("u2", &product_url(2), "131").await?;

    app.fetcher.push_page(&product_url(1), "Shared", true);
    app.fetcher.push_page(&product_url(2), "Other", true);
    let calls_before = app.fetcher.call_count(&product_url(2));

    let report = app.manager.check_user_products("u1").await?;
    assert_eq!(report.items_checked, 1);
    assert_eq!(report.notifications_sent, 2);
    assert_eq!(app.notifier.sent_to("u1"), 1);
    assert_eq!(app.notifier.sent_to("u2"), 1);

    // u2's other item was not part of u1's check
    assert_eq!(app.fetcher.call_count(&product_url(2)), calls_before);

    Ok(())
}

#[tokio::test]
async fn test_product_history_groups_runs() -> anyhow::Result<()> {
    let app = create_test_app().await?;
    app.fetcher.push_page(&product_url(1), "Widget", false);
    app.manager.register_product("u1", &product_url(1), "131").await?;

    for in_stock in [false, true, true] {
        app.fetcher.push_page(&product_url(1), "Widget", in_stock);
        app.monitor.run_sweep().await?;
    }

    let history = app.manager.product_history("u1", 1, DEFAULT_HISTORY_LIMIT).await?;
    assert_eq!(history.entries.len(), 4);
    assert_eq!(history.runs.len(), 2);
    assert!(history.runs[0].in_stock);
    assert_eq!(history.runs[0].checks, 2);
    assert!(!history.runs[1].in_stock);
    assert_eq!(history.runs[1].checks, 2);

    assert!(app.manager.product_history("u1", 2, DEFAULT_HISTORY_LIMIT).await.is_err());

    Ok(())
}
