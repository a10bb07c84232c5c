use serde::{Deserialize, Serialize};

pub mod tracked_item;
pub mod subscription;
pub mod stock_history;

// Re-exports for convenience
pub use tracked_item::*;
pub use subscription::*;
pub use stock_history::*;

use crate::plugins::traits::Availability;
use crate::utils::error::{ExtractionError, FetchError};

/// Last known availability of a tracked item. `Unknown` until the first
/// successful observation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT")]
pub enum StockStatus {
    #[sqlx(rename = "unknown")]
    Unknown,
    #[sqlx(rename = "in_stock")]
    InStock,
    #[sqlx(rename = "out_of_stock")]
    OutOfStock,
}

impl StockStatus {
    pub fn from_in_stock(in_stock: bool) -> Self {
        if in_stock {
            StockStatus::InStock
        } else {
            StockStatus::OutOfStock
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::Unknown => "unknown",
            StockStatus::InStock => "in_stock",
            StockStatus::OutOfStock => "out_of_stock",
        }
    }
}

/// Persisted classification of the most recent check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT")]
pub enum CheckOutcomeKind {
    #[sqlx(rename = "success")]
    Success,
    #[sqlx(rename = "fetch_timeout")]
    FetchTimeout,
    #[sqlx(rename = "http_error")]
    HttpError,
    #[sqlx(rename = "network_error")]
    NetworkError,
    #[sqlx(rename = "store_not_found")]
    StoreNotFound,
    #[sqlx(rename = "structure_changed")]
    StructureChanged,
}

impl CheckOutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckOutcomeKind::Success => "success",
            CheckOutcomeKind::FetchTimeout => "fetch_timeout",
            CheckOutcomeKind::HttpError => "http_error",
            CheckOutcomeKind::NetworkError => "network_error",
            CheckOutcomeKind::StoreNotFound => "store_not_found",
            CheckOutcomeKind::StructureChanged => "structure_changed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckFailure {
    pub kind: CheckOutcomeKind,
    pub detail: String,
}

impl From<FetchError> for CheckFailure {
    fn from(err: FetchError) -> Self {
        let kind = match err {
            FetchError::Timeout { .. } => CheckOutcomeKind::FetchTimeout,
            FetchError::HttpStatus { .. } => CheckOutcomeKind::HttpError,
            FetchError::Network(_) => CheckOutcomeKind::NetworkError,
        };
        Self {
            kind,
            detail: err.to_string(),
        }
    }
}

impl From<ExtractionError> for CheckFailure {
    fn from(err: ExtractionError) -> Self {
        let kind = match err {
            ExtractionError::StoreNotFound { .. } => CheckOutcomeKind::StoreNotFound,
            ExtractionError::StructureChanged(_) => CheckOutcomeKind::StructureChanged,
        };
        Self {
            kind,
            detail: err.to_string(),
        }
    }
}

impl std::fmt::Display for CheckFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.detail)
    }
}

/// Result of one fetch + extract attempt, as handed to the tracking store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Observed(Availability),
    Failed(CheckFailure),
}

impl CheckOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CheckOutcome::Observed(_))
    }
}
