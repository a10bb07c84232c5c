pub mod config;
pub mod models;
pub mod monitor;
pub mod plugins;
pub mod product_manager;
pub mod scheduler;
pub mod scraper;
pub mod tracking_store;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use monitor::{Monitor, SweepReport, TransitionPolicy};
pub use product_manager::ProductManager;
pub use scheduler::SweepScheduler;
pub use tracking_store::TrackingStore;
pub use utils::error::AppError;

pub type Result<T> = std::result::Result<T, AppError>;
