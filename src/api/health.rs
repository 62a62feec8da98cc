use axum::{extract::State, response::IntoResponse};
use serde_json::json;

use super::error::ApiResult;
use super::response::{success, success_message};
use super::AppState;

/// Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let tmdb_status = if state.provider.is_available() {
        "available"
    } else {
        "not_configured"
    };

    Ok(success(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "tmdb_api": tmdb_status
    })))
}

/// System statistics.
pub async fn get_stats(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let cache_stats = state.provider.cache.stats();

    Ok(success(json!({
        "provider_cache": {
            "entries": cache_stats.entries,
            "hits": cache_stats.hits,
            "misses": cache_stats.misses
        },
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

/// Drops all cached provider pages.
pub async fn clear_cache(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    state.provider.cache.clear();
    tracing::info!("Provider cache cleared");
    Ok(success_message("Provider cache cleared"))
}
