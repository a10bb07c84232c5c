pub mod extractor;
pub mod notifier;

pub use extractor::{Availability, AvailabilityExtractor};
pub use notifier::{DeliveryReceipt, Notifier, StockNotification};
