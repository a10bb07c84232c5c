use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A user's interest in one tracked item.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Subscription {
    pub id: i64,
    pub user_id: String,
    pub item_id: i64,
    pub created_at: DateTime<Utc>,
    pub last_notified_at: Option<DateTime<Utc>>,
}

/// Whether removing a subscription also removed the item it pointed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Removal {
    pub item_id: i64,
    pub item_deleted: bool,
}
