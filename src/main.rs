use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;

use media_search_backend::api::{self, AppState};
use media_search_backend::external::ProviderClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize metadata provider client
    let provider = ProviderClient::new();
    if !provider.is_available() {
        tracing::warn!("TMDB_API_KEY not set; search endpoints will answer 502");
    }

    // Build our application with routes
    let app = Router::new()
        .route("/", get(|| async { "Media Search Backend API v1.0" }))
        // Health and stats
        .route("/api/health", get(api::health::health_check))
        .route("/api/stats", get(api::health::get_stats))
        .route("/api/cache/clear", post(api::health::clear_cache))
        // Search
        .route("/api/tmdb/search/:category", get(api::search::search_category))
        .route("/api/search", get(api::search::aggregate_search))
        .layer(CorsLayer::permissive())
        .with_state(AppState { provider });

    // Run the server - host/port from environment
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse()
        .unwrap_or(3000);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    tracing::info!("🚀 Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
