use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::utils::error::DeliveryError;

/// A single restock alert for one subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockNotification {
    pub user_id: String,
    pub item_id: i64,
    pub display_name: String,
    pub url: String,
    pub store_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub message_id: Option<String>,
}

/// Delivers private restock messages to users.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &StockNotification) -> Result<DeliveryReceipt, DeliveryError>;
}
