use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::{
    group_history, HistoryRun, Removal, StockHistoryEntry, Subscription, TrackedItem,
};
use crate::monitor::{Monitor, SweepReport};
use crate::plugins::traits::Availability;
use crate::tracking_store::TrackingStore;
use crate::utils::error::{AppError, Result, StoreError};
use crate::utils::product_url::{normalize_product_url, validate_store_number, ProductUrl};

pub const DEFAULT_HISTORY_LIMIT: i64 = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredProduct {
    pub item: TrackedItem,
    pub subscription: Subscription,
    /// Availability seen by the registration probe.
    pub availability: Availability,
    /// The probe was stored as the item's first observation.
    pub first_observation: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedProduct {
    /// 1-based position in the user's listing, as used by `remove_product`.
    pub position: usize,
    pub subscription: Subscription,
    pub item: TrackedItem,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductHistory {
    pub item: TrackedItem,
    pub entries: Vec<StockHistoryEntry>,
    pub runs: Vec<HistoryRun>,
}

/// User-facing operations behind the bot commands, without any rendering.
pub struct ProductManager {
    store: TrackingStore,
    monitor: Arc<Monitor>,
}

impl ProductManager {
    pub fn new(store: TrackingStore, monitor: Arc<Monitor>) -> Self {
        Self { store, monitor }
    }

    /// Starts tracking a product at a store for `user_id`.
    ///
    /// The page is probed before anything is written so that a bad link or
    /// store never leaves an item behind. Registering the same pair twice is
    /// harmless.
    pub async fn register_product(&self, user_id: &str, raw_url: &str, raw_store: &str) -> Result<RegisteredProduct> {
        let store_number = validate_store_number(raw_store)?;
        let product = normalize_product_url(raw_url)?;

        let availability = self
            .monitor
            .probe(&product.url, &store_number, true)
            .await
            .map_err(AppError::Check)?;

        let item = self.store.upsert_tracked_item(&product, &store_number).await?;
        let (item, subscription) = self.subscribe(user_id, &product, &store_number, item).await?;

        let first_observation = self
            .store
            .record_first_observation(item.id, &availability, Utc::now())
            .await?;

        let item = if first_observation {
            self.store
                .get_tracked_item(item.id)
                .await?
                .ok_or_else(|| AppError::NotFound {
                    resource: format!("tracked item {}", item.id),
                })?
        } else {
            item
        };

        tracing::info!(
            "User {} is tracking item {} ({} at store {})",
            user_id,
            item.id,
            item.display_name(),
            item.store_number
        );

        Ok(RegisteredProduct {
            item,
            subscription,
            availability,
            first_observation,
        })
    }

    pub async fn list_products(&self, user_id: &str) -> Result<Vec<TrackedProduct>> {
        let subscriptions = self.store.list_subscriptions(user_id).await?;

        Ok(subscriptions
            .into_iter()
            .enumerate()
            .map(|(index, (subscription, item))| TrackedProduct {
                position: index + 1,
                subscription,
                item,
            })
            .collect())
    }

    pub async fn remove_product(&self, user_id: &str, position: usize) -> Result<Removal> {
        let product = self.product_at(user_id, position).await?;
        let removal = self.store.remove_subscription(user_id, product.item.id).await?;

        tracing::info!(
            "User {} stopped tracking item {}{}",
            user_id,
            removal.item_id,
            if removal.item_deleted { " (item removed)" } else { "" }
        );
        Ok(removal)
    }

    /// Manual check of the user's own items through the regular check routine.
    pub async fn check_user_products(&self, user_id: &str) -> Result<SweepReport> {
        let items: Vec<TrackedItem> = self
            .store
            .list_subscriptions(user_id)
            .await?
            .into_iter()
            .map(|(_, item)| item)
            .collect();

        tracing::info!("Manual check of {} item(s) for user {}", items.len(), user_id);
        Ok(self.monitor.check_items(items).await)
    }

    pub async fn product_history(&self, user_id: &str, position: usize, limit: i64) -> Result<ProductHistory> {
        let product = self.product_at(user_id, position).await?;
        let entries = self.store.stock_history(product.item.id, limit).await?;
        let runs = group_history(&entries);

        Ok(ProductHistory {
            item: product.item,
            entries,
            runs,
        })
    }

    /// Subscribes `user_id` to `item`. The item can be deleted between the
    /// upsert and this call when its last subscriber leaves, in which case it
    /// is recreated and subscribed once more.
    async fn subscribe(
        &self,
        user_id: &str,
        product: &ProductUrl,
        store_number: &str,
        item: TrackedItem,
    ) -> Result<(TrackedItem, Subscription)> {
        match self.store.add_subscription(user_id, item.id).await {
            Ok(subscription) => Ok((item, subscription)),
            Err(StoreError::NotFound { entity: "TrackedItem", .. }) => {
                tracing::warn!("Item {} was removed during registration, recreating it", item.id);
                let item = self.store.upsert_tracked_item(product, store_number).await?;
                let subscription = self.store.add_subscription(user_id, item.id).await?;
                Ok((item, subscription))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn product_at(&self, user_id: &str, position: usize) -> Result<TrackedProduct> {
        let products = self.list_products(user_id).await?;
        let count = products.len();

        position
            .checked_sub(1)
            .and_then(|index| products.into_iter().nth(index))
            .ok_or_else(|| AppError::NotFound {
                resource: format!("product #{} (user tracks {} product(s))", position, count),
            })
    }
}
