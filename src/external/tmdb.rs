use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::search::category::Category;
use crate::search::query::{keys, Filters};

/// TMDB API client.
#[derive(Clone)]
pub struct TmdbClient {
    client: Client,
    api_key: String,
    base_url: String,
}

/// Provider access failure.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider not configured: TMDB_API_KEY is missing")]
    NotConfigured,
    #[error("TMDB API error: {0}")]
    Status(reqwest::StatusCode),
    #[error("TMDB request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("discover mode is not supported for {0}")]
    UnsupportedMode(Category),
}

/// One raw provider result page. Result entries are passed through untouched;
/// only the pagination envelope is interpreted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderPage {
    pub page: u32,
    pub results: Vec<serde_json::Value>,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub total_results: u32,
}

impl TmdbClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: "https://api.themoviedb.org/3".to_string(),
        }
    }

    /// Free-text search for any category.
    pub async fn search(
        &self,
        category: Category,
        term: &str,
        page: u32,
    ) -> Result<ProviderPage, ProviderError> {
        let url = format!("{}/search/{}", self.base_url, category.as_str());

        let response = self
            .client
            .get(&url)
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("query", term),
                ("page", &page.to_string()),
                ("include_adult", "false"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProviderError::Status(response.status()));
        }
        Ok(response.json().await?)
    }

    /// Filter-driven browse. Only movie and tv have a discover endpoint.
    pub async fn discover(
        &self,
        category: Category,
        filters: &Filters,
        page: u32,
    ) -> Result<ProviderPage, ProviderError> {
        if !category.supports_discover() {
            return Err(ProviderError::UnsupportedMode(category));
        }
        let url = format!("{}/discover/{}", self.base_url, category.as_str());

        let mut params: Vec<(String, String)> = vec![
            ("api_key".to_string(), self.api_key.clone()),
            ("page".to_string(), page.to_string()),
            ("include_adult".to_string(), "false".to_string()),
        ];
        for (key, value) in filters.iter() {
            params.push((
                translate_filter_key(category, key).to_string(),
                translate_filter_value(category, key, value),
            ));
        }

        let response = self.client.get(&url).query(&params).send().await?;
        if !response.status().is_success() {
            return Err(ProviderError::Status(response.status()));
        }
        Ok(response.json().await?)
    }
}

/// The parser emits movie-shaped discover keys; the tv endpoint names its
/// date fields differently.
fn translate_filter_key(category: Category, key: &str) -> &str {
    if category != Category::Tv {
        return key;
    }
    match key {
        keys::RELEASE_FROM => "first_air_date.gte",
        keys::RELEASE_TO => "first_air_date.lte",
        _ => key,
    }
}

/// Same renaming for the date-based sort values on tv.
fn translate_filter_value(category: Category, key: &str, value: &str) -> String {
    if category == Category::Tv && key == keys::SORT_BY {
        return value.replace("primary_release_date", "first_air_date");
    }
    value.to_string()
}
