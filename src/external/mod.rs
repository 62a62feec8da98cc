pub mod cache;
pub mod tmdb;

pub use cache::{CacheStats, ProviderCache};
pub use tmdb::{ProviderError, ProviderPage, TmdbClient};

use crate::search::category::Category;
use crate::search::query::{Filters, SearchMode};

/// Keyed metadata-provider client plus its response cache. The TMDB client is
/// optional: without `TMDB_API_KEY` every fetch fails with `NotConfigured`.
#[derive(Clone)]
pub struct ProviderClient {
    tmdb: Option<TmdbClient>,
    pub cache: ProviderCache,
}

impl ProviderClient {
    pub fn new() -> Self {
        let tmdb = std::env::var("TMDB_API_KEY").ok().map(TmdbClient::new);
        Self {
            tmdb,
            cache: ProviderCache::new(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.tmdb.is_some()
    }

    /// Fetches one result page for a category, consulting the cache first.
    pub async fn fetch_page(
        &self,
        category: Category,
        mode: SearchMode,
        term: &str,
        filters: &Filters,
        page: u32,
    ) -> Result<ProviderPage, ProviderError> {
        let Some(client) = &self.tmdb else {
            return Err(ProviderError::NotConfigured);
        };

        let key = ProviderCache::page_key(category, mode, term, filters, page);
        if let Some(cached) = self.cache.get(&key).await {
            tracing::debug!(category = %category, page, "provider cache hit");
            return Ok(cached);
        }

        let result = match mode {
            SearchMode::Search => client.search(category, term, page).await?,
            SearchMode::Discover => client.discover(category, filters, page).await?,
        };
        self.cache.insert(key, result.clone()).await;
        Ok(result)
    }
}

impl Default for ProviderClient {
    fn default() -> Self {
        Self::new()
    }
}
