use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::{CheckOutcomeKind, StockStatus};

pub const UNKNOWN_PRODUCT_NAME: &str = "Unknown Product";

/// A unique (product, store) monitoring target shared by every subscriber.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct TrackedItem {
    pub id: i64,
    pub product_key: String,
    pub store_number: String,
    pub url: String,

    // Filled in by the first check that finds a title
    pub title: Option<String>,
    pub status: StockStatus,

    // Last check
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<CheckOutcomeKind>,
    pub last_error: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl TrackedItem {
    pub fn display_name(&self) -> &str {
        self.title.as_deref().unwrap_or(UNKNOWN_PRODUCT_NAME)
    }

    pub fn last_check_failed(&self) -> bool {
        matches!(self.last_outcome, Some(kind) if kind != CheckOutcomeKind::Success)
    }
}

/// Status before and after a recorded check, read inside the same transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRecord {
    pub previous: StockStatus,
    pub current: StockStatus,
}

impl CheckRecord {
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}
