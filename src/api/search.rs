use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use super::error::{ApiError, ApiResult};
use super::response::success;
use super::AppState;
use crate::external::ProviderPage;
use crate::search::{
    parse_query, Category, CategoryFilter, Filters, ProviderFetcher, SearchItem, SearchMode,
    SearchStore,
};
use crate::search::query::keys;

/// Maximum page-1 + load-more rounds one aggregate request may issue.
const MAX_AGGREGATE_PAGES: u32 = 5;

/// GET /api/tmdb/search/:category — the local search proxy consumed by the
/// category fetcher. Query parameters are the flattened filter mapping plus
/// `page`, `searchMode` and (search mode) `query`; the provider page is
/// returned unwrapped.
pub async fn search_category(
    Path(category): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<AppState>,
) -> ApiResult<Json<ProviderPage>> {
    let Some(category) = Category::from_wire(&category) else {
        return Err(ApiError::BadRequest(format!(
            "unknown search category '{}'",
            category
        )));
    };

    let page = params
        .get("page")
        .map(|p| {
            p.parse::<u32>().map_err(|_| {
                ApiError::BadRequest(format!("invalid page '{}'", p))
            })
        })
        .transpose()?
        .unwrap_or(1)
        .max(1);

    let mode = match params.get("searchMode") {
        Some(raw) => SearchMode::from_param(raw)
            .ok_or_else(|| ApiError::BadRequest(format!("unknown searchMode '{}'", raw)))?,
        None => SearchMode::Search,
    };

    let term = params.get("query").cloned().unwrap_or_default();
    let mut filters = Filters::default();
    for (key, value) in &params {
        if keys::is_provider_filter(key) {
            filters.insert(key.as_str(), value.as_str());
        }
    }

    if mode == SearchMode::Discover && !category.supports_discover() {
        return Err(ApiError::BadRequest(format!(
            "discover mode is not supported for {}",
            category
        )));
    }
    if mode == SearchMode::Search && term.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "search mode requires a non-empty query".to_string(),
        ));
    }

    let result = state
        .provider
        .fetch_page(category, mode, &term, &filters, page)
        .await?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct AggregateSearchParams {
    pub q: Option<String>,
    pub category: Option<String>,
    pub pages: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct AggregateSearchResponse {
    pub results: Vec<SearchItem>,
    pub total: usize,
    pub has_more: bool,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub query: String,
    pub took_ms: u64,
}

/// GET /api/search — parses the raw query and drives a request-scoped
/// aggregator against the provider, returning the merged, popularity-ordered
/// view.
pub async fn aggregate_search(
    Query(params): Query<AggregateSearchParams>,
    State(state): State<AppState>,
) -> ApiResult<impl IntoResponse> {
    let start_time = Instant::now();
    let raw = params.q.unwrap_or_default();
    let filter = match params.category.as_deref() {
        None => CategoryFilter::Both,
        Some(raw_filter) => CategoryFilter::from_param(raw_filter).ok_or_else(|| {
            ApiError::BadRequest(format!("unknown category filter '{}'", raw_filter))
        })?,
    };

    if raw.trim().is_empty() {
        return Ok(success(AggregateSearchResponse {
            results: Vec::new(),
            total: 0,
            has_more: false,
            warnings: Vec::new(),
            error: None,
            query: raw,
            took_ms: start_time.elapsed().as_millis() as u64,
        }));
    }

    let store = SearchStore::new(Arc::new(ProviderFetcher::new(state.provider.clone())));
    store.set_category_filter(filter).await;
    store.set_query(parse_query(&raw)).await;

    let pages = params.pages.unwrap_or(1).clamp(1, MAX_AGGREGATE_PAGES);
    for _ in 1..pages {
        store.load_more().await;
    }

    let results = store.results();
    Ok(success(AggregateSearchResponse {
        results: results.as_ref().clone(),
        total: store.unfiltered_results_count(),
        has_more: store.has_more(),
        warnings: store.warnings(),
        error: store.last_error(),
        query: raw,
        took_ms: start_time.elapsed().as_millis() as u64,
    }))
}
