use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::{ensure_success, MatchQuery, SearchApi, SearchResponse};
use crate::error::Result;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Minimal Elasticsearch `_search` client.
#[derive(Debug, Clone)]
pub struct ElasticsearchClient {
    http: Client,
    base_url: String,
}

impl ElasticsearchClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self::with_http_client(http, base_url))
    }

    pub fn with_http_client(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl SearchApi for ElasticsearchClient {
    async fn search(&self, index: &str, query: &MatchQuery) -> Result<SearchResponse> {
        let url = format!("{}/{}/_search", self.base_url, index);
        log::debug!("Searching {url} for {}={}", query.field, query.value);

        let response = self.http.post(&url).json(&query.to_body()).send().await?;
        let response = ensure_success("search", response).await?;
        let body = response.json::<SearchResponse>().await?;

        log::info!("Got {} hits from index {index}", body.total());
        Ok(body)
    }
}
