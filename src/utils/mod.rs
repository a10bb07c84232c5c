pub mod error;
pub mod product_url;

pub use error::{AppError, DeliveryError, ExtractionError, FetchError, StoreError};
pub use product_url::{ProductUrl, normalize_product_url, validate_store_number};
