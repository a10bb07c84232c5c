// Availability extraction strategies, one per retailer
pub mod micro_center;

pub use micro_center::MicroCenterExtractor;
