use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use super::types::{RawDocument, SearchOptions, SearchRequest, SearchResponse};
use crate::config::{self, ApiKey};
use crate::error::{Service, UpstreamError};

const API_BASE: &str = "https://api.firecrawl.dev/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Web search with scraped page content.
/// Implemented by `FirecrawlClient` for production; mock implementations used in tests.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(
        &self,
        key: &ApiKey,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<RawDocument>, UpstreamError>;
}

/// Firecrawl search client. The API key is supplied per call because callers
/// may bring their own.
#[derive(Clone)]
pub struct FirecrawlClient {
    http: Client,
    base_url: String,
}

impl FirecrawlClient {
    pub fn from_env(http: Client) -> Self {
        Self {
            http,
            base_url: config::env_or("FIRECRAWL_API_URL", API_BASE),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(http: Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.to_string(),
        }
    }
}

#[async_trait]
impl SearchProvider for FirecrawlClient {
    async fn search(
        &self,
        key: &ApiKey,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<RawDocument>, UpstreamError> {
        let url = format!("{}/search", self.base_url.trim_end_matches('/'));

        let response = self
            .http
            .post(&url)
            .bearer_auth(key.expose())
            .header("User-Agent", crate::USER_AGENT)
            .json(&SearchRequest::new(query, options))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(UpstreamError::network(Service::Search))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<SearchResponse>(&text)
                .ok()
                .and_then(|body| body.error)
                .unwrap_or_else(|| {
                    let end = text.floor_char_boundary(200);
                    format!("HTTP {status}: {}", &text[..end])
                });
            warn!(status = %status, "Firecrawl search failed");
            return Err(UpstreamError::Api {
                service: Service::Search,
                code: status.as_u16(),
                message,
            });
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(UpstreamError::network(Service::Search))?;

        if body.success == Some(false) {
            let message = body.error.unwrap_or_else(|| "search unsuccessful".to_string());
            warn!(error = %message, "Firecrawl reported failure in 200 response");
            return Err(UpstreamError::protocol(Service::Search, message));
        }

        let documents = body.data.unwrap_or_default();
        debug!(results = documents.len(), "firecrawl search complete");
        Ok(documents)
    }
}
