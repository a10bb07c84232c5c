//! Per-item check routine and sweeps over all tracked items.
//!
//! Each item goes Fetch -> Extract -> Persist -> Notify. The transition is
//! decided on the `previous` status returned by the store's atomic write, so
//! two overlapping checks of the same item can never both notify.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::config::MonitorConfig;
use crate::models::{
    CheckFailure, CheckOutcome, StockStatus, Subscription, TrackedItem, UNKNOWN_PRODUCT_NAME,
};
use crate::plugins::traits::{Availability, AvailabilityExtractor, Notifier, StockNotification};
use crate::scraper::PageFetcher;
use crate::tracking_store::TrackingStore;
use crate::utils::error::Result;

/// Decides which status changes are worth a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionPolicy {
    pub notify_on_first_observation: bool,
}

impl TransitionPolicy {
    pub fn qualifies(&self, previous: StockStatus, current: StockStatus) -> bool {
        if current != StockStatus::InStock {
            return false;
        }
        match previous {
            StockStatus::OutOfStock => true,
            StockStatus::Unknown => self.notify_on_first_observation,
            StockStatus::InStock => false,
        }
    }
}

impl From<&MonitorConfig> for TransitionPolicy {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            notify_on_first_observation: config.notify_on_first_observation,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemCheckResult {
    pub item_id: i64,
    /// The observation was made and recorded.
    pub success: bool,
    pub status: StockStatus,
    pub transitioned: bool,
    pub notifications_sent: usize,
    pub delivery_failures: usize,
    pub error: Option<String>,
}

impl ItemCheckResult {
    fn failed(item: &TrackedItem, error: String) -> Self {
        Self {
            item_id: item.id,
            success: false,
            status: item.status,
            transitioned: false,
            notifications_sent: 0,
            delivery_failures: 0,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepReport {
    pub items_checked: usize,
    pub items_succeeded: usize,
    pub items_failed: usize,
    pub transitions: usize,
    pub notifications_sent: usize,
    pub delivery_failures: usize,
    pub duration_ms: u64,
    pub results: Vec<ItemCheckResult>,
}

impl SweepReport {
    fn from_results(results: Vec<ItemCheckResult>, elapsed: Duration) -> Self {
        let items_succeeded = results.iter().filter(|r| r.success).count();
        Self {
            items_checked: results.len(),
            items_succeeded,
            items_failed: results.len() - items_succeeded,
            transitions: results.iter().filter(|r| r.transitioned).count(),
            notifications_sent: results.iter().map(|r| r.notifications_sent).sum(),
            delivery_failures: results.iter().map(|r| r.delivery_failures).sum(),
            duration_ms: elapsed.as_millis() as u64,
            results,
        }
    }
}

type ProbeKey = (String, String);

pub struct Monitor {
    store: TrackingStore,
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<dyn AvailabilityExtractor>,
    notifier: Arc<dyn Notifier>,
    policy: TransitionPolicy,
    max_concurrent_checks: usize,
    cache_duration: Duration,
    cache: Mutex<HashMap<ProbeKey, (Availability, Instant)>>,
    sweep_lock: Mutex<()>,
}

impl Monitor {
    pub fn new(
        store: TrackingStore,
        fetcher: Arc<dyn PageFetcher>,
        extractor: Arc<dyn AvailabilityExtractor>,
        notifier: Arc<dyn Notifier>,
        config: &MonitorConfig,
    ) -> Self {
        tracing::debug!(
            "Monitor using {} extractor, {} concurrent check(s)",
            extractor.name(),
            config.max_concurrent_checks
        );
        Self {
            store,
            fetcher,
            extractor,
            notifier,
            policy: TransitionPolicy::from(config),
            max_concurrent_checks: config.max_concurrent_checks.max(1),
            cache_duration: config.cache_duration(),
            cache: Mutex::new(HashMap::new()),
            sweep_lock: Mutex::new(()),
        }
    }

    /// Fetches and reads one page. Successful reads are cached for the
    /// configured duration; `use_cache` only controls whether a cached read
    /// may be returned.
    pub async fn probe(
        &self,
        url: &str,
        store_number: &str,
        use_cache: bool,
    ) -> std::result::Result<Availability, CheckFailure> {
        let key = (url.to_string(), store_number.to_string());

        if use_cache && !self.cache_duration.is_zero() {
            let cache = self.cache.lock().await;
            if let Some((availability, at)) = cache.get(&key) {
                if at.elapsed() < self.cache_duration {
                    tracing::debug!("Using cached result for {} at store {}", url, store_number);
                    return Ok(availability.clone());
                }
            }
        }

        let content = self.fetcher.fetch(url, store_number).await?;
        let availability = self.extractor.extract_stock(&content, store_number)?;

        if !self.cache_duration.is_zero() {
            self.cache
                .lock()
                .await
                .insert(key, (availability.clone(), Instant::now()));
        }

        Ok(availability)
    }

    async fn purge_cache(&self) {
        let ttl = self.cache_duration;
        let mut cache = self.cache.lock().await;
        cache.retain(|_, (_, at)| at.elapsed() < ttl);
    }

    /// Checks one item and notifies its subscribers on a qualifying transition.
    /// Never fails: every problem is logged and reported in the result.
    pub async fn check_item(&self, item: &TrackedItem) -> ItemCheckResult {
        tracing::debug!(
            "Checking item {} (product {} at store {})",
            item.id,
            item.product_key,
            item.store_number
        );
        metrics::counter!("restock_checks_total").increment(1);

        let outcome = match self.probe(&item.url, &item.store_number, true).await {
            Ok(availability) => CheckOutcome::Observed(availability),
            Err(failure) => {
                tracing::warn!("Check failed for item {} ({}): {}", item.id, item.url, failure);
                metrics::counter!("restock_check_failures_total", "kind" => failure.kind.as_str()).increment(1);
                CheckOutcome::Failed(failure)
            }
        };

        // Loaded before the write so a lookup failure leaves the transition pending.
        let subscribers = match &outcome {
            CheckOutcome::Observed(availability) if availability.in_stock => {
                match self.store.subscribers_of(item.id).await {
                    Ok(subscribers) => subscribers,
                    Err(e) => {
                        tracing::error!("Failed to load subscribers of item {}: {}", item.id, e);
                        return ItemCheckResult::failed(item, e.to_string());
                    }
                }
            }
            _ => Vec::new(),
        };

        let record = match self.store.record_check_result(item.id, &outcome, Utc::now()).await {
            Ok(record) => record,
            Err(e) => {
                tracing::error!("Failed to record check of item {}: {}", item.id, e);
                return ItemCheckResult::failed(item, e.to_string());
            }
        };

        let availability = match outcome {
            CheckOutcome::Observed(availability) => availability,
            CheckOutcome::Failed(failure) => return ItemCheckResult::failed(item, failure.to_string()),
        };

        let mut result = ItemCheckResult {
            item_id: item.id,
            success: true,
            status: record.current,
            transitioned: false,
            notifications_sent: 0,
            delivery_failures: 0,
            error: None,
        };

        if !self.policy.qualifies(record.previous, record.current) {
            if record.changed() {
                tracing::info!(
                    "Item {} changed {} -> {}",
                    item.id,
                    record.previous.as_str(),
                    record.current.as_str()
                );
            }
            return result;
        }

        result.transitioned = true;
        tracing::info!(
            "Item {} is back in stock at store {}, notifying {} subscriber(s)",
            item.id,
            item.store_number,
            subscribers.len()
        );

        let display_name = availability
            .title
            .or_else(|| item.title.clone())
            .unwrap_or_else(|| UNKNOWN_PRODUCT_NAME.to_string());

        for subscription in &subscribers {
            if self.notify_subscriber(item, subscription, &display_name).await {
                result.notifications_sent += 1;
            } else {
                result.delivery_failures += 1;
            }
        }

        result
    }

    async fn notify_subscriber(&self, item: &TrackedItem, subscription: &Subscription, display_name: &str) -> bool {
        let notification = StockNotification {
            user_id: subscription.user_id.clone(),
            item_id: item.id,
            display_name: display_name.to_string(),
            url: item.url.clone(),
            store_number: item.store_number.clone(),
        };

        match self.notifier.notify(&notification).await {
            Ok(_) => {
                metrics::counter!("restock_notifications_total", "result" => "sent").increment(1);
                if let Err(e) = self.store.mark_notified(subscription.id, Utc::now()).await {
                    tracing::error!("Failed to mark subscription {} as notified: {}", subscription.id, e);
                }
                true
            }
            Err(e) => {
                metrics::counter!("restock_notifications_total", "result" => "failed").increment(1);
                tracing::warn!(
                    "Failed to notify user {} about item {}: {}",
                    subscription.user_id,
                    item.id,
                    e
                );
                false
            }
        }
    }

    /// Checks the given items, waiting for any sweep already in flight.
    pub async fn check_items(&self, items: Vec<TrackedItem>) -> SweepReport {
        let _guard = self.sweep_lock.lock().await;
        self.check_items_locked(items).await
    }

    /// Sweeps every tracked item, waiting for any sweep already in flight.
    pub async fn run_sweep(&self) -> Result<SweepReport> {
        let _guard = self.sweep_lock.lock().await;
        self.sweep_locked().await
    }

    /// Sweeps every tracked item unless a sweep is already running, in which
    /// case `None` is returned.
    pub async fn try_run_sweep(&self) -> Option<Result<SweepReport>> {
        let _guard = self.sweep_lock.try_lock().ok()?;
        Some(self.sweep_locked().await)
    }

    async fn sweep_locked(&self) -> Result<SweepReport> {
        let items = self.store.list_all_tracked_items().await?;
        tracing::info!("Starting sweep over {} tracked item(s)", items.len());

        let report = self.check_items_locked(items).await;
        tracing::info!(
            "Sweep finished in {}ms: {} checked, {} failed, {} notification(s) sent, {} delivery failure(s)",
            report.duration_ms,
            report.items_checked,
            report.items_failed,
            report.notifications_sent,
            report.delivery_failures
        );
        Ok(report)
    }

    async fn check_items_locked(&self, items: Vec<TrackedItem>) -> SweepReport {
        let start = Instant::now();
        self.purge_cache().await;

        let results: Vec<ItemCheckResult> = stream::iter(items)
            .map(|item| async move { self.check_item(&item).await })
            .buffer_unordered(self.max_concurrent_checks)
            .collect()
            .await;

        SweepReport::from_results(results, start.elapsed())
    }
}
