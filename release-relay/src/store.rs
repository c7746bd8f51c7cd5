use async_trait::async_trait;
use std::time::Duration;

use release_relay_core::config::StorefrontConfig;
use release_relay_core::contract::Storefront;
use release_relay_core::HostError;

/// Queries a storefront file-listing service for the package's current files.
pub struct StoreClient {
    http: reqwest::Client,
    config: StorefrontConfig,
    timeout: Duration,
}

impl StoreClient {
    pub fn new(http: reqwest::Client, config: StorefrontConfig, timeout: Duration) -> Self {
        Self {
            http,
            config,
            timeout,
        }
    }
}

#[async_trait]
impl Storefront for StoreClient {
    async fn fetch_listing(&self) -> Result<String, HostError> {
        tracing::info!(
            endpoint = %self.config.endpoint,
            product_id = %self.config.product_id,
            ring = %self.config.ring,
            "Fetching store listing"
        );
        let form = [
            ("type", "ProductId"),
            ("url", self.config.product_id.as_str()),
            ("ring", self.config.ring.as_str()),
            ("lang", self.config.locale.as_str()),
        ];
        let response = self
            .http
            .post(&self.config.endpoint)
            .form(&form)
            .timeout(self.timeout)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            tracing::error!(status = %status, "Store listing returned error");
            return Err(HostError::Rejected {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }
}
