use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, COOKIE};
use reqwest::Client;
use std::time::{Duration, Instant};

use crate::config::MonitorConfig;
use crate::utils::error::{AppError, FetchError};

/// Retrieves the HTML of a product page as seen from one store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, store_number: &str) -> Result<String, FetchError>;
}

/// Plain HTTP fetcher. The store is selected with the `storeSelected` cookie
/// the site itself sets when a shopper picks a store.
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(config: &MonitorConfig) -> Result<Self, AppError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .timeout(config.fetch_timeout())
            .build()?;

        Ok(Self {
            client,
            timeout: config.fetch_timeout(),
        })
    }

    fn classify(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout {
                timeout_secs: self.timeout.as_secs(),
            }
        } else if let Some(status) = err.status() {
            FetchError::HttpStatus {
                status: status.as_u16(),
            }
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, store_number: &str) -> Result<String, FetchError> {
        let start = Instant::now();

        let response = self
            .client
            .get(url)
            .header(COOKIE, format!("storeSelected={}", store_number))
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!("{} answered {} for store {}", url, status, store_number);
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| self.classify(e))?;

        tracing::debug!(
            "Fetched {} for store {} ({} bytes in {}ms)",
            url,
            store_number,
            body.len(),
            start.elapsed().as_millis()
        );
        Ok(body)
    }
}
