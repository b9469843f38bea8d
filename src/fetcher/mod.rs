use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};
use url::Url;

use crate::error::FetchError;
use crate::models::Page;
use crate::traits::{PageFetcher, ScraperConfig};

/// Fetches listing pages over plain HTTP
pub struct HttpFetcher {
    client: Client,
    config: ScraperConfig,
}

impl HttpFetcher {
    pub fn new(
        config: ScraperConfig,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;

        Ok(Self { client, config })
    }

    async fn fetch_url(&self, page_number: u32, url: Url) -> Result<Page, FetchError> {
        debug!("GET {}", url);
        let response = self.client.get(url.clone()).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body = response.text().await?;
        info!(
            "Fetched page {} of {} ({} bytes)",
            page_number,
            self.config.name,
            body.len()
        );

        Ok(Page::new(page_number, url, body))
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_page(&self, page_number: u32) -> Result<Page, FetchError> {
        self.fetch_url(page_number, self.config.page_url(page_number))
            .await
    }
}

impl Clone for HttpFetcher {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            config: self.config.clone(),
        }
    }
}
