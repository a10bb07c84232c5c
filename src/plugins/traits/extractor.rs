use serde::{Deserialize, Serialize};

use crate::utils::error::ExtractionError;

/// What a product page says about one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub in_stock: bool,
    pub title: Option<String>,
}

/// Reads store-level availability out of a fetched product page.
///
/// Implementations are pure: no I/O, same answer for the same input.
pub trait AvailabilityExtractor: Send + Sync {
    fn name(&self) -> &str;

    fn extract_stock(&self, content: &str, store_number: &str) -> Result<Availability, ExtractionError>;
}
