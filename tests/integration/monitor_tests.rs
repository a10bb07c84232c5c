use restock_watcher::models::{CheckOutcomeKind, StockStatus};
use restock_watcher::utils::error::FetchError;

use super::*;

async fn status_of(store: &TrackingStore, item_id: i64) -> anyhow::Result<StockStatus> {
    Ok(store.get_tracked_item(item_id).await?.unwrap().status)
}

/// Runs one sweep per scripted observation and returns notifications per sweep.
async fn notifications_per_sweep(
    notify_on_first_observation: bool,
    observations: &[bool],
) -> anyhow::Result<Vec<usize>> {
    let store = test_store().await?;
    let fetcher = ScriptedFetcher::new();
    let notifier = RecordingNotifier::new();
    track(&store, 100, &["u1"]).await?;

    for in_stock in observations {
        fetcher.push_page(&product_url(100), "Widget", *in_stock);
    }

    let monitor = build_monitor(&store, &fetcher, &notifier, &test_monitor_config(notify_on_first_observation));
    let mut counts = Vec::new();
    for _ in observations {
        counts.push(monitor.run_sweep().await?.notifications_sent);
    }
    Ok(counts)
}

#[tokio::test]
async fn test_unknown_then_out_then_in_notifies_at_restock() -> anyhow::Result<()> {
    assert_eq!(notifications_per_sweep(true, &[false, true]).await?, vec![0, 1]);
    assert_eq!(notifications_per_sweep(false, &[false, true]).await?, vec![0, 1]);
    Ok(())
}

#[tokio::test]
async fn test_out_out_in_notifies_once_at_last_step() -> anyhow::Result<()> {
    assert_eq!(notifications_per_sweep(true, &[false, false, true]).await?, vec![0, 0, 1]);
    Ok(())
}

#[tokio::test]
async fn test_staying_in_stock_never_renotifies() -> anyhow::Result<()> {
    assert_eq!(notifications_per_sweep(false, &[true, true, true]).await?, vec![0, 0, 0]);
    assert_eq!(notifications_per_sweep(true, &[true, true]).await?, vec![1, 0]);
    Ok(())
}

#[tokio::test]
async fn test_restock_after_sellout_notifies_again() -> anyhow::Result<()> {
    assert_eq!(
        notifications_per_sweep(true, &[false, true, false, true]).await?,
        vec![0, 1, 0, 1]
    );
    Ok(())
}

#[tokio::test]
async fn test_first_observation_policy_both_ways() -> anyhow::Result<()> {
    for (flag, expected) in [(true, 1), (false, 0)] {
        let store = test_store().await?;
        let fetcher = ScriptedFetcher::new();
        let notifier = RecordingNotifier::new();
        let item = track(&store, 100, &["u1"]).await?;
        fetcher.push_page(&product_url(100), "Widget", true);

        let monitor = build_monitor(&store, &fetcher, &notifier, &test_monitor_config(flag));
        let report = monitor.run_sweep().await?;

        assert_eq!(report.notifications_sent, expected, "notify_on_first_observation = {}", flag);
        assert_eq!(status_of(&store, item.id).await?, StockStatus::InStock);
    }
    Ok(())
}

#[tokio::test]
async fn test_failed_fetch_does_not_stop_the_sweep() -> anyhow::Result<()> {
    let store = test_store().await?;
    let fetcher = ScriptedFetcher::new();
    let notifier = RecordingNotifier::new();

    let item1 = track(&store, 1, &["u1"]).await?;
    let item2 = track(&store, 2, &["u2"]).await?;
    let item3 = track(&store, 3, &["u3"]).await?;

    let monitor = build_monitor(&store, &fetcher, &notifier, &test_monitor_config(false));

    // Establish out-of-stock for all three
    for id in 1..=3 {
        fetcher.push_page(&product_url(id), &format!("Item {}", id), false);
    }
    monitor.run_sweep().await?;

    // Items 1 and 3 restock while item 2's page times out
    fetcher.push_page(&product_url(1), "Item 1", true);
    fetcher.push(&product_url(2), Err(FetchError::Timeout { timeout_secs: 30 }));
    fetcher.push_page(&product_url(3), "Item 3", true);

    let report = monitor.run_sweep().await?;
    assert_eq!(report.items_checked, 3);
    assert_eq!(report.items_succeeded, 2);
    assert_eq!(report.items_failed, 1);
    assert_eq!(report.notifications_sent, 2);

    assert_eq!(notifier.sent_to("u1"), 1);
    assert_eq!(notifier.sent_to("u2"), 0);
    assert_eq!(notifier.sent_to("u3"), 1);

    assert_eq!(status_of(&store, item1.id).await?, StockStatus::InStock);
    assert_eq!(status_of(&store, item3.id).await?, StockStatus::InStock);

    let failed = store.get_tracked_item(item2.id).await?.unwrap();
    assert_eq!(failed.status, StockStatus::OutOfStock);
    assert_eq!(failed.last_outcome, Some(CheckOutcomeKind::FetchTimeout));
    assert_eq!(store.stock_history(item2.id, 50).await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_structure_change_leaves_status_unchanged() -> anyhow::Result<()> {
    let store = test_store().await?;
    let fetcher = ScriptedFetcher::new();
    let notifier = RecordingNotifier::new();
    let item = track(&store, 100, &["u1"]).await?;

    fetcher.push_page(&product_url(100), "Widget", false);
    fetcher.push(
        &product_url(100),
        Ok("<html><body><h1>We're redesigning!</h1></body></html>".to_string()),
    );
    fetcher.push_page(&product_url(100), "Widget", true);

    let monitor = build_monitor(&store, &fetcher, &notifier, &test_monitor_config(true));
    monitor.run_sweep().await?;

    let report = monitor.run_sweep().await?;
    assert_eq!(report.items_failed, 1);
    let after_failure = store.get_tracked_item(item.id).await?.unwrap();
    assert_eq!(after_failure.status, StockStatus::OutOfStock);
    assert_eq!(after_failure.last_outcome, Some(CheckOutcomeKind::StructureChanged));
    assert!(after_failure.last_error.is_some());

    // The restock after the failed check is still caught
    let report = monitor.run_sweep().await?;
    assert_eq!(report.notifications_sent, 1);
    assert_eq!(store.stock_history(item.id, 50).await?.len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_one_failed_delivery_does_not_block_others() -> anyhow::Result<()> {
    let store = test_store().await?;
    let fetcher = ScriptedFetcher::new();
    let notifier = RecordingNotifier::new();
    notifier.fail_for("blocked");

    let item = track(&store, 100, &["blocked", "reachable"]).await?;
    fetcher.push_page(&product_url(100), "Widget", false);
    fetcher.push_page(&product_url(100), "Widget", true);

    let monitor = build_monitor(&store, &fetcher, &notifier, &test_monitor_config(true));
    monitor.run_sweep().await?;
    let report = monitor.run_sweep().await?;

    assert_eq!(report.transitions, 1);
    assert_eq!(report.notifications_sent, 1);
    assert_eq!(report.delivery_failures, 1);
    assert_eq!(notifier.sent_to("reachable"), 1);
    assert_eq!(status_of(&store, item.id).await?, StockStatus::InStock);

    for subscription in store.subscribers_of(item.id).await? {
        match subscription.user_id.as_str() {
            "reachable" => assert!(subscription.last_notified_at.is_some()),
            _ => assert!(subscription.last_notified_at.is_none()),
        }
    }

    Ok(())
}

#[tokio::test]
async fn test_end_to_end_store_131() -> anyhow::Result<()> {
    let store = test_store().await?;
    let fetcher = ScriptedFetcher::new();
    let notifier = RecordingNotifier::new();

    let item = track(&store, 674503, &["U1"]).await?;
    assert_eq!(item.status, StockStatus::Unknown);
    assert_eq!(item.store_number, "131");

    let url = product_url(674503);
    fetcher.push_page(&url, "AMD Ryzen 7 9800X3D", false);
    fetcher.push_page(&url, "AMD Ryzen 7 9800X3D", true);
    fetcher.push_page(&url, "AMD Ryzen 7 9800X3D", true);

    let monitor = build_monitor(&store, &fetcher, &notifier, &test_monitor_config(true));

    let sweep1 = monitor.run_sweep().await?;
    assert_eq!(sweep1.notifications_sent, 0);
    assert_eq!(status_of(&store, item.id).await?, StockStatus::OutOfStock);

    let sweep2 = monitor.run_sweep().await?;
    assert_eq!(sweep2.notifications_sent, 1);
    assert_eq!(status_of(&store, item.id).await?, StockStatus::InStock);

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].user_id, "U1");
    assert_eq!(sent[0].display_name, "AMD Ryzen 7 9800X3D");
    assert_eq!(sent[0].store_number, "131");
    assert_eq!(sent[0].url, url);

    let subscribers = store.subscribers_of(item.id).await?;
    let notified_at = subscribers[0].last_notified_at;
    assert!(notified_at.is_some());

    let sweep3 = monitor.run_sweep().await?;
    assert_eq!(sweep3.notifications_sent, 0);
    assert_eq!(status_of(&store, item.id).await?, StockStatus::InStock);
    assert_eq!(notifier.sent().len(), 1);
    assert_eq!(store.subscribers_of(item.id).await?[0].last_notified_at, notified_at);

    assert_eq!(store.stock_history(item.id, 50).await?.len(), 3);
    assert_eq!(fetcher.call_count(&url), 3);

    Ok(())
}

#[tokio::test]
async fn test_concurrent_checks_of_one_item_notify_once() -> anyhow::Result<()> {
    let store = test_store().await?;
    let fetcher = ScriptedFetcher::new();
    let notifier = RecordingNotifier::new();
    let item = track(&store, 100, &["u1"]).await?;
    fetcher.push_page(&product_url(100), "Widget", false);
    fetcher.push_page(&product_url(100), "Widget", true);

    let monitor = build_monitor(&store, &fetcher, &notifier, &test_monitor_config(true));
    monitor.run_sweep().await?;

    let stale = store.get_tracked_item(item.id).await?.unwrap();
    let (a, b) = tokio::join!(monitor.check_item(&stale), monitor.check_item(&stale));

    assert_eq!(a.notifications_sent + b.notifications_sent, 1);
    assert_eq!(notifier.sent().len(), 1);

    Ok(())
}
