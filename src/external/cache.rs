use moka::future::Cache;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::tmdb::ProviderPage;
use crate::search::category::Category;
use crate::search::query::{Filters, SearchMode};

const CACHE_CAPACITY: u64 = 1024;
const CACHE_TTL: Duration = Duration::from_secs(10 * 60);

/// Short-lived cache of provider result pages, keyed by the full request
/// shape (category, mode, page, term, flattened filters).
#[derive(Clone)]
pub struct ProviderCache {
    pages: Cache<String, ProviderPage>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: u64,
    pub hits: u64,
    pub misses: u64,
}

impl ProviderCache {
    pub fn new() -> Self {
        Self {
            pages: Cache::builder()
                .max_capacity(CACHE_CAPACITY)
                .time_to_live(CACHE_TTL)
                .build(),
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn page_key(
        category: Category,
        mode: SearchMode,
        term: &str,
        filters: &Filters,
        page: u32,
    ) -> String {
        let mut key = format!("{}:{}:{}:{}", category, mode.as_str(), page, term);
        for (filter_key, value) in filters.iter() {
            key.push('|');
            key.push_str(filter_key);
            key.push('=');
            key.push_str(value);
        }
        key
    }

    pub async fn get(&self, key: &str) -> Option<ProviderPage> {
        match self.pages.get(key).await {
            Some(page) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(page)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub async fn insert(&self, key: String, page: ProviderPage) {
        self.pages.insert(key, page).await;
    }

    pub fn clear(&self) {
        self.pages.invalidate_all();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.pages.entry_count(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for ProviderCache {
    fn default() -> Self {
        Self::new()
    }
}
