//! Durable storage for tracked items, subscriptions and stock history.
//!
//! Every mutating operation runs in a single SQLite transaction. Identity is
//! enforced by unique constraints on `(product_key, store_number)` and
//! `(user_id, item_id)`, so concurrent registrations of the same pair converge
//! on one row instead of racing on a read-then-insert.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::models::{
    CheckOutcome, CheckOutcomeKind, CheckRecord, Removal, StockHistoryEntry, StockStatus, Subscription,
    TrackedItem,
};
use crate::plugins::traits::Availability;
use crate::utils::error::StoreError;
use crate::utils::product_url::ProductUrl;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

const ITEM_COLUMNS: &str =
    "id, product_key, store_number, url, title, status, last_checked_at, last_outcome, last_error, created_at";

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, item_id, created_at, last_notified_at";

#[derive(Debug, FromRow)]
struct SubscriptionWithItem {
    subscription_id: i64,
    user_id: String,
    subscribed_at: DateTime<Utc>,
    last_notified_at: Option<DateTime<Utc>>,
    #[sqlx(flatten)]
    item: TrackedItem,
}

impl SubscriptionWithItem {
    fn into_parts(self) -> (Subscription, TrackedItem) {
        let subscription = Subscription {
            id: self.subscription_id,
            user_id: self.user_id,
            item_id: self.item.id,
            created_at: self.subscribed_at,
            last_notified_at: self.last_notified_at,
        };
        (subscription, self.item)
    }
}

#[derive(Debug, Clone)]
pub struct TrackingStore {
    pool: SqlitePool,
}

impl TrackingStore {
    /// Connects to the configured SQLite database.
    ///
    /// An in-memory database lives and dies with its connection, so it is
    /// pinned to a single connection that is never recycled.
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let in_memory = config.url.contains(":memory:");
        let mut pool_options = SqlitePoolOptions::new().acquire_timeout(Duration::from_secs(30));
        pool_options = if in_memory {
            pool_options
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            pool_options.max_connections(config.max_connections)
        };

        let pool = pool_options.connect_with(options).await?;
        tracing::info!("Connected to database: {}", config.url);

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        tracing::debug!("Running database migrations");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Returns the item for `(product, store)`, creating it with status
    /// `unknown` if it does not exist yet.
    pub async fn upsert_tracked_item(&self, product: &ProductUrl, store_number: &str) -> StoreResult<TrackedItem> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO tracked_items (product_key, store_number, url, status, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (product_key, store_number) DO NOTHING
            "#,
        )
        .bind(&product.product_key)
        .bind(store_number)
        .bind(&product.url)
        .bind(StockStatus::Unknown)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        let item = sqlx::query_as::<_, TrackedItem>(&format!(
            "SELECT {} FROM tracked_items WHERE product_key = ? AND store_number = ?",
            ITEM_COLUMNS
        ))
        .bind(&product.product_key)
        .bind(store_number)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        if inserted.rows_affected() == 1 {
            tracing::info!(
                "Tracking new item {} (product {} at store {})",
                item.id,
                item.product_key,
                item.store_number
            );
        }
        Ok(item)
    }

    /// Subscribes `user_id` to an item. Re-subscribing returns the existing row.
    pub async fn add_subscription(&self, user_id: &str, item_id: i64) -> StoreResult<Subscription> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO subscriptions (user_id, item_id, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT (user_id, item_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(item_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.is_foreign_key_violation() {
                    return StoreError::NotFound {
                        entity: "TrackedItem",
                        id: item_id.to_string(),
                    };
                }
            }
            StoreError::Sqlx(e)
        })?;

        let subscription = sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {} FROM subscriptions WHERE user_id = ? AND item_id = ?",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(user_id)
        .bind(item_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(subscription)
    }

    /// Removes a subscription. The last subscription takes the item and its
    /// history with it.
    pub async fn remove_subscription(&self, user_id: &str, item_id: i64) -> StoreResult<Removal> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM subscriptions WHERE user_id = ? AND item_id = ?")
            .bind(user_id)
            .bind(item_id)
            .execute(&mut *tx)
            .await?;

        if deleted.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "Subscription",
                id: format!("{}/{}", user_id, item_id),
            });
        }

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM subscriptions WHERE item_id = ?")
            .bind(item_id)
            .fetch_one(&mut *tx)
            .await?;

        let item_deleted = remaining == 0;
        if item_deleted {
            sqlx::query("DELETE FROM tracked_items WHERE id = ?")
                .bind(item_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        if item_deleted {
            tracing::info!("Item {} has no subscribers left and was removed", item_id);
        }
        Ok(Removal { item_id, item_deleted })
    }

    /// A user's subscriptions in the order they were created.
    pub async fn list_subscriptions(&self, user_id: &str) -> StoreResult<Vec<(Subscription, TrackedItem)>> {
        let rows = sqlx::query_as::<_, SubscriptionWithItem>(
            r#"
            SELECT s.id AS subscription_id, s.user_id, s.created_at AS subscribed_at, s.last_notified_at,
                   t.id, t.product_key, t.store_number, t.url, t.title, t.status,
                   t.last_checked_at, t.last_outcome, t.last_error, t.created_at
            FROM subscriptions s
            INNER JOIN tracked_items t ON t.id = s.item_id
            WHERE s.user_id = ?
            ORDER BY s.created_at ASC, s.id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SubscriptionWithItem::into_parts).collect())
    }

    /// Every tracked item, least recently checked first.
    pub async fn list_all_tracked_items(&self) -> StoreResult<Vec<TrackedItem>> {
        let items = sqlx::query_as::<_, TrackedItem>(&format!(
            "SELECT {} FROM tracked_items ORDER BY last_checked_at IS NOT NULL, last_checked_at ASC, id ASC",
            ITEM_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    pub async fn get_tracked_item(&self, item_id: i64) -> StoreResult<Option<TrackedItem>> {
        let item = sqlx::query_as::<_, TrackedItem>(&format!(
            "SELECT {} FROM tracked_items WHERE id = ?",
            ITEM_COLUMNS
        ))
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(item)
    }

    pub async fn count_tracked_items(&self) -> StoreResult<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM tracked_items")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Deletes an item outright, with its subscriptions and history.
    pub async fn delete_tracked_item(&self, item_id: i64) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM tracked_items WHERE id = ?")
            .bind(item_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "TrackedItem",
                id: item_id.to_string(),
            });
        }
        Ok(())
    }

    pub async fn subscribers_of(&self, item_id: i64) -> StoreResult<Vec<Subscription>> {
        let subscriptions = sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {} FROM subscriptions WHERE item_id = ? ORDER BY id ASC",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(item_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(subscriptions)
    }

    /// Records one check of an item.
    ///
    /// A successful observation updates status and title and appends a
    /// history row; a failure only updates the failure metadata. The returned
    /// `previous` status is read inside the same transaction, after the write
    /// lock is held, so each transition is reported to exactly one caller.
    pub async fn record_check_result(
        &self,
        item_id: i64,
        outcome: &CheckOutcome,
        checked_at: DateTime<Utc>,
    ) -> StoreResult<CheckRecord> {
        let mut tx = self.pool.begin().await?;

        // Write first so the transaction holds the write lock before reading the prior status.
        let touched = sqlx::query("UPDATE tracked_items SET last_checked_at = ? WHERE id = ?")
            .bind(checked_at)
            .bind(item_id)
            .execute(&mut *tx)
            .await?;

        if touched.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "TrackedItem",
                id: item_id.to_string(),
            });
        }

        let previous: StockStatus = sqlx::query_scalar("SELECT status FROM tracked_items WHERE id = ?")
            .bind(item_id)
            .fetch_one(&mut *tx)
            .await?;

        let current = match outcome {
            CheckOutcome::Observed(availability) => {
                let current = StockStatus::from_in_stock(availability.in_stock);
                sqlx::query(
                    r#"
                    UPDATE tracked_items
                    SET status = ?, title = COALESCE(?, title), last_outcome = ?, last_error = NULL
                    WHERE id = ?
                    "#,
                )
                .bind(current)
                .bind(availability.title.as_deref())
                .bind(CheckOutcomeKind::Success)
                .bind(item_id)
                .execute(&mut *tx)
                .await?;

                Self::append_history(&mut tx, item_id, availability.in_stock, checked_at).await?;
                current
            }
            CheckOutcome::Failed(failure) => {
                sqlx::query("UPDATE tracked_items SET last_outcome = ?, last_error = ? WHERE id = ?")
                    .bind(failure.kind)
                    .bind(&failure.detail)
                    .bind(item_id)
                    .execute(&mut *tx)
                    .await?;
                previous
            }
        };

        tx.commit().await?;
        Ok(CheckRecord { previous, current })
    }

    /// Stores an observation only if the item has never been observed.
    ///
    /// Used for the probe made at registration time: it seeds a brand-new item
    /// but can never overwrite a status a sweep has already established.
    pub async fn record_first_observation(
        &self,
        item_id: i64,
        availability: &Availability,
        observed_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE tracked_items
            SET status = ?, title = COALESCE(?, title), last_checked_at = ?, last_outcome = ?, last_error = NULL
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(StockStatus::from_in_stock(availability.in_stock))
        .bind(availability.title.as_deref())
        .bind(observed_at)
        .bind(CheckOutcomeKind::Success)
        .bind(item_id)
        .bind(StockStatus::Unknown)
        .execute(&mut *tx)
        .await?;

        let seeded = updated.rows_affected() == 1;
        if seeded {
            Self::append_history(&mut tx, item_id, availability.in_stock, observed_at).await?;
        }

        tx.commit().await?;
        Ok(seeded)
    }

    pub async fn mark_notified(&self, subscription_id: i64, notified_at: DateTime<Utc>) -> StoreResult<()> {
        let result = sqlx::query("UPDATE subscriptions SET last_notified_at = ? WHERE id = ?")
            .bind(notified_at)
            .bind(subscription_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "Subscription",
                id: subscription_id.to_string(),
            });
        }
        Ok(())
    }

    /// Most recent observations first.
    pub async fn stock_history(&self, item_id: i64, limit: i64) -> StoreResult<Vec<StockHistoryEntry>> {
        let entries = sqlx::query_as::<_, StockHistoryEntry>(
            r#"
            SELECT id, item_id, in_stock, observed_at
            FROM stock_history
            WHERE item_id = ?
            ORDER BY observed_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(item_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    async fn append_history(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        item_id: i64,
        in_stock: bool,
        observed_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query("INSERT INTO stock_history (item_id, in_stock, observed_at) VALUES (?, ?, ?)")
            .bind(item_id)
            .bind(in_stock)
            .bind(observed_at)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}
