pub mod traits;
pub mod extractors;
pub mod notifiers;

pub use traits::{Availability, AvailabilityExtractor, Notifier, StockNotification};
