use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::category::Category;
use super::query::{SearchMode, SearchQuery};
use crate::external::tmdb::ProviderError;
use crate::external::ProviderClient;

pub type ItemId = u64;

/// One result entry. The aggregator only interprets `id` and `popularity`;
/// category-specific display fields ride along untouched in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchItem {
    pub id: ItemId,
    #[serde(default, alias = "name")]
    pub title: Option<String>,
    #[serde(default)]
    pub popularity: f64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// One page of provider results for a single category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    #[serde(rename = "results")]
    pub items: Vec<SearchItem>,
    pub page: u32,
    pub total_pages: u32,
    pub total_results: u32,
}

/// Category fetch error taxonomy. `Aborted` is a silent-cancel signal and is
/// never surfaced to the user; everything else ends up in the aggregate error.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("request aborted")]
    Aborted,
    #[error("search request failed: {status}")]
    Status { status: reqwest::StatusCode },
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("provider error: {0}")]
    Provider(String),
}

impl SearchError {
    pub fn is_abort(&self) -> bool {
        matches!(self, SearchError::Aborted)
    }
}

impl From<ProviderError> for SearchError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Status(status) => SearchError::Status { status },
            ProviderError::Network(e) => SearchError::Network(e),
            other => SearchError::Provider(other.to_string()),
        }
    }
}

/// Performs one paginated request for one category. Implementations must
/// observe the cancellation token and resolve promptly once it fires.
#[async_trait]
pub trait CategoryFetcher: Send + Sync {
    async fn fetch_page(
        &self,
        category: Category,
        query: &SearchQuery,
        page: u32,
        cancel: &CancellationToken,
    ) -> Result<PageResult, SearchError>;
}

/// Fetcher backed by the local search proxy endpoint
/// (`GET {base_url}/api/tmdb/search/{category}`).
#[derive(Clone)]
pub struct HttpCategoryFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCategoryFetcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl CategoryFetcher for HttpCategoryFetcher {
    async fn fetch_page(
        &self,
        category: Category,
        query: &SearchQuery,
        page: u32,
        cancel: &CancellationToken,
    ) -> Result<PageResult, SearchError> {
        let mode = query.effective_mode(category);
        let url = format!("{}/api/tmdb/search/{}", self.base_url, category.as_str());

        let mut params: Vec<(&str, String)> = vec![
            ("page", page.to_string()),
            ("searchMode", mode.as_str().to_string()),
        ];
        // the discover endpoint rejects a free-text term, so it is dropped
        if mode == SearchMode::Search {
            params.push(("query", query.term.clone()));
        }
        for (key, value) in query.filters.iter() {
            params.push((key, value.to_string()));
        }

        let request = self.client.get(&url).query(&params).send();
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(SearchError::Aborted),
            response = request => response?,
        };

        if !response.status().is_success() {
            return Err(SearchError::Status {
                status: response.status(),
            });
        }

        let body = tokio::select! {
            _ = cancel.cancelled() => return Err(SearchError::Aborted),
            body = response.json::<PageResult>() => body?,
        };
        Ok(body)
    }
}

/// In-process fetcher over the provider client, used by the server-side
/// aggregate endpoint so searches skip the HTTP loopback.
#[derive(Clone)]
pub struct ProviderFetcher {
    provider: ProviderClient,
}

impl ProviderFetcher {
    pub fn new(provider: ProviderClient) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl CategoryFetcher for ProviderFetcher {
    async fn fetch_page(
        &self,
        category: Category,
        query: &SearchQuery,
        page: u32,
        cancel: &CancellationToken,
    ) -> Result<PageResult, SearchError> {
        let mode = query.effective_mode(category);
        let request = self
            .provider
            .fetch_page(category, mode, &query.term, &query.filters, page);
        let provider_page = tokio::select! {
            _ = cancel.cancelled() => return Err(SearchError::Aborted),
            result = request => result.map_err(SearchError::from)?,
        };

        let mut items = Vec::with_capacity(provider_page.results.len());
        for value in provider_page.results {
            match serde_json::from_value::<SearchItem>(value) {
                Ok(item) => items.push(item),
                Err(e) => {
                    tracing::warn!(category = %category, error = %e, "skipping malformed result entry")
                }
            }
        }
        Ok(PageResult {
            items,
            page: provider_page.page,
            total_pages: provider_page.total_pages,
            total_results: provider_page.total_results,
        })
    }
}
