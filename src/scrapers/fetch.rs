//! HTTP page fetcher.

use crate::error::PipelineError;
use crate::retry::RetryPolicy;
use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use std::time::Duration;
use tracing::{info, instrument};
use url::Url;

/// Per-request timeout for page fetches and API calls.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Downloads article pages with a browser-like header set.
#[derive(Debug, Clone)]
pub struct PageFetcher {
    client: Client,
    retry: RetryPolicy,
}

impl PageFetcher {
    pub fn new(retry: RetryPolicy) -> Result<Self, PipelineError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("vi-VN,vi;q=0.9,en-US;q=0.8,en;q=0.7"),
        );

        let client = Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PipelineError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, retry })
    }

    /// Fetch the page body as text.
    ///
    /// Non-2xx statuses count as failures and are retried like transport
    /// errors. The body is decoded using the response charset, UTF-8 when
    /// none is declared.
    #[instrument(level = "info", skip_all, fields(%url))]
    pub async fn fetch(&self, url: &Url) -> Result<String, PipelineError> {
        let client = &self.client;
        let body = self
            .retry
            .run("fetch_page", move |_| async move {
                client
                    .get(url.clone())
                    .send()
                    .await?
                    .error_for_status()?
                    .text()
                    .await
            })
            .await
            .map_err(|source| PipelineError::Network {
                url: url.to_string(),
                attempts: self.retry.max_attempts,
                source,
            })?;

        info!(bytes = body.len(), "Fetched page");
        Ok(body)
    }
}
