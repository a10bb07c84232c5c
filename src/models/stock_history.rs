use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::StockStatus;

/// One successful observation. Rows are only ever appended.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct StockHistoryEntry {
    pub id: i64,
    pub item_id: i64,
    pub in_stock: bool,
    pub observed_at: DateTime<Utc>,
}

impl StockHistoryEntry {
    pub fn status(&self) -> StockStatus {
        StockStatus::from_in_stock(self.in_stock)
    }
}

/// Consecutive observations with the same availability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRun {
    pub in_stock: bool,
    pub checks: usize,
    pub first_observed_at: DateTime<Utc>,
    pub last_observed_at: DateTime<Utc>,
}

/// Collapses history (most recent first, as returned by the store) into runs,
/// also most recent first.
pub fn group_history(entries: &[StockHistoryEntry]) -> Vec<HistoryRun> {
    let mut runs: Vec<HistoryRun> = Vec::new();

    for entry in entries.iter().rev() {
        match runs.last_mut() {
            Some(run) if run.in_stock == entry.in_stock => {
                run.checks += 1;
                run.last_observed_at = entry.observed_at;
            }
            _ => runs.push(HistoryRun {
                in_stock: entry.in_stock,
                checks: 1,
                first_observed_at: entry.observed_at,
                last_observed_at: entry.observed_at,
            }),
        }
    }

    runs.reverse();
    runs
}
