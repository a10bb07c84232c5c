//! Normalization of user-supplied product links and store numbers.
//!
//! Two links that point at the same product page must collapse to the same
//! [`ProductUrl::product_key`], otherwise the tracking store would hold
//! duplicate items for one (product, store) pair.

use regex::Regex;
use url::Url;

use crate::utils::error::AppError;

pub const MICRO_CENTER_BASE: &str = "https://www.microcenter.com";

const ACCEPTED_HOSTS: [&str; 2] = ["www.microcenter.com", "microcenter.com"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductUrl {
    /// Numeric product id taken from `/product/<id>/<slug>`.
    pub product_key: String,
    /// Canonical page URL without query string or fragment.
    pub url: String,
}

/// Accepts a full product URL or a site-relative `/product/<id>/<slug>` path.
///
/// The slug is required by the retailer, so `/product/12345` alone is rejected.
pub fn normalize_product_url(input: &str) -> Result<ProductUrl, AppError> {
    let input = input.trim();
    let invalid = || AppError::Validation(format!("Invalid product URL: {}", input));

    let parsed = if input.starts_with("/product/") {
        Url::parse(MICRO_CENTER_BASE)
            .and_then(|base| base.join(input))
            .map_err(|_| invalid())?
    } else {
        Url::parse(input).map_err(|_| invalid())?
    };

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid());
    }
    match parsed.host_str() {
        Some(host) if ACCEPTED_HOSTS.contains(&host) => {}
        _ => return Err(invalid()),
    }

    let path_regex = Regex::new(r"^/product/(\d+)/([^/]+)/?$")
        .map_err(|e| AppError::Internal(e.to_string()))?;
    let captures = path_regex.captures(parsed.path()).ok_or_else(invalid)?;
    let product_key = captures[1].to_string();
    let slug = &captures[2];

    Ok(ProductUrl {
        url: format!("{}/product/{}/{}", MICRO_CENTER_BASE, product_key, slug),
        product_key,
    })
}

/// Store numbers are exactly three ASCII digits; leading zeros are significant.
pub fn validate_store_number(input: &str) -> Result<String, AppError> {
    let store_number = input.trim();
    if store_number.len() == 3 && store_number.chars().all(|c| c.is_ascii_digit()) {
        Ok(store_number.to_string())
    } else {
        Err(AppError::Validation(format!(
            "Invalid store number '{}': expected 3 digits (e.g. 131, 065)",
            store_number
        )))
    }
}
