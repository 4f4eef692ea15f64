// Native upstream fetcher implementation using reqwest

use crate::error::CoreError;
use crate::fetcher::{FetchResult, UpstreamFetcher};
use crate::models::FeedKind;
use crate::providers;
use crate::settings::FeedSettings;
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use url::Url;

const ERROR_BODY_LIMIT: usize = 200;

/// Polls one provider endpoint with a per-request timeout.
pub struct HttpFetcher {
    feed: FeedKind,
    client: Client,
    url: Url,
}

impl HttpFetcher {
    pub fn new(feed: FeedKind, settings: &FeedSettings) -> Result<Self, CoreError> {
        let url = providers::build_url(feed, settings)?;
        let client = Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .user_agent(settings.user_agent.as_str())
            .build()
            .map_err(|e| CoreError::Init(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { feed, client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn request(&self) -> Result<Value, CoreError> {
        let response = self
            .client
            .get(self.url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CoreError::Http(format!("Request timed out: {}", e))
                } else {
                    CoreError::Http(format!("HTTP request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::Upstream {
                status: status.as_u16(),
                body: body.chars().take(ERROR_BODY_LIMIT).collect(),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| CoreError::Parse(format!("Failed to parse upstream body: {}", e)))
    }
}

#[async_trait]
impl UpstreamFetcher for HttpFetcher {
    async fn fetch(&self) -> FetchResult {
        debug!("Fetching {} from {}", self.feed, self.url);
        match self.request().await {
            Ok(raw) => FetchResult::Success(raw),
            Err(e) => {
                warn!("Upstream fetch for {} failed: {}", self.feed, e);
                FetchResult::Failed(e.to_string())
            }
        }
    }
}
