use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::category::Category;

/// Provider filter keys emitted by the query parser. These are the discover
/// parameter names the metadata provider expects for movies; the TV client
/// translates the date keys on the way out.
pub mod keys {
    pub const RELEASE_FROM: &str = "primary_release_date.gte";
    pub const RELEASE_TO: &str = "primary_release_date.lte";
    pub const GENRES: &str = "with_genres";
    pub const LANGUAGE: &str = "with_original_language";
    pub const CERTIFICATION: &str = "certification";
    pub const CERTIFICATION_COUNTRY: &str = "certification_country";
    pub const RUNTIME_MIN: &str = "with_runtime.gte";
    pub const RUNTIME_MAX: &str = "with_runtime.lte";
    pub const VOTE_AVERAGE_MIN: &str = "vote_average.gte";
    pub const VOTE_COUNT_MIN: &str = "vote_count.gte";
    pub const SORT_BY: &str = "sort_by";

    pub const ALL: [&str; 11] = [
        RELEASE_FROM,
        RELEASE_TO,
        GENRES,
        LANGUAGE,
        CERTIFICATION,
        CERTIFICATION_COUNTRY,
        RUNTIME_MIN,
        RUNTIME_MAX,
        VOTE_AVERAGE_MIN,
        VOTE_COUNT_MIN,
        SORT_BY,
    ];

    pub fn is_provider_filter(key: &str) -> bool {
        ALL.contains(&key)
    }
}

/// Provider query mode: free-text lookup or filter-driven browse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Search,
    Discover,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Search => "search",
            SearchMode::Discover => "discover",
        }
    }

    pub fn from_param(s: &str) -> Option<SearchMode> {
        match s {
            "search" => Some(SearchMode::Search),
            "discover" => Some(SearchMode::Discover),
            _ => None,
        }
    }
}

/// Ordered mapping of provider filter keys to scalar values. Ordering keeps
/// the flattened request parameters and cache keys deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filters(BTreeMap<String, String>);

impl Filters {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Immutable structured query: raw input, normalized free-text term, provider
/// filter mapping and the parser's resolved mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub raw: String,
    pub term: String,
    pub filters: Filters,
    pub mode: SearchMode,
}

impl SearchQuery {
    pub fn has_filters(&self) -> bool {
        !self.filters.is_empty()
    }

    /// Equality as seen by `set_query`'s no-op rule: same term, same filter
    /// values. The raw input is deliberately not compared.
    pub fn same_as(&self, other: &SearchQuery) -> bool {
        self.term == other.term && self.filters == other.filters
    }

    /// Whether a request for `category` may be issued at all. Person and
    /// company only support text search and are skipped without a term;
    /// movie and tv need either a term or at least one filter.
    pub fn applicable(&self, category: Category) -> bool {
        match category {
            Category::Person | Category::Company => !self.term.is_empty(),
            Category::Movie | Category::Tv => !self.term.is_empty() || self.has_filters(),
        }
    }

    /// The mode actually sent for `category`. Filters force discover for
    /// movie/tv; person/company always go through text search.
    pub fn effective_mode(&self, category: Category) -> SearchMode {
        if !category.supports_discover() {
            return SearchMode::Search;
        }
        if self.has_filters() {
            SearchMode::Discover
        } else {
            SearchMode::Search
        }
    }
}

/// Parser output: the structured query plus human-readable warnings about
/// tokens that were dropped or adjusted. The aggregator trusts this as-is.
#[derive(Debug, Clone)]
pub struct ParsedQuery {
    pub query: SearchQuery,
    pub warnings: Vec<String>,
}

/// Parses a raw free-text query into a `SearchQuery`.
///
/// Recognized `key:value` tokens: `year:`, `from:`, `to:`, `genre:`, `lang:`,
/// `cert:`, `sort:`, plus the range forms `runtime>`, `runtime<`, `vote>` and
/// `votes>`. Everything else stays part of the free-text term, so titles
/// containing colons pass through unchanged.
pub fn parse_query(raw: &str) -> ParsedQuery {
    let mut filters = Filters::default();
    let mut warnings = Vec::new();
    let mut term_parts: Vec<&str> = Vec::new();

    for token in raw.split_whitespace() {
        if apply_range_token(token, &mut filters, &mut warnings) {
            continue;
        }
        if let Some((key, value)) = token.split_once(':') {
            if !value.is_empty() && apply_filter_token(key, value, &mut filters, &mut warnings) {
                continue;
            }
        }
        term_parts.push(token);
    }

    let term = term_parts.join(" ");
    let mode = if filters.is_empty() {
        SearchMode::Search
    } else {
        SearchMode::Discover
    };

    ParsedQuery {
        query: SearchQuery {
            raw: raw.to_string(),
            term,
            filters,
            mode,
        },
        warnings,
    }
}

/// Handles `runtime>90`, `runtime<150`, `vote>7.5` and `votes>100`.
fn apply_range_token(token: &str, filters: &mut Filters, warnings: &mut Vec<String>) -> bool {
    let (key, prefix) = if let Some(rest) = token.strip_prefix("runtime>") {
        (keys::RUNTIME_MIN, rest)
    } else if let Some(rest) = token.strip_prefix("runtime<") {
        (keys::RUNTIME_MAX, rest)
    } else if let Some(rest) = token.strip_prefix("votes>") {
        (keys::VOTE_COUNT_MIN, rest)
    } else if let Some(rest) = token.strip_prefix("vote>") {
        return match rest.parse::<f32>() {
            Ok(min) if (0.0..=10.0).contains(&min) => {
                filters.insert(keys::VOTE_AVERAGE_MIN, format!("{}", min));
                true
            }
            _ => {
                warnings.push(format!("ignored vote filter '{}': expected a rating between 0 and 10", token));
                true
            }
        };
    } else {
        return false;
    };

    match prefix.parse::<u32>() {
        Ok(value) => filters.insert(key, value.to_string()),
        Err(_) => warnings.push(format!("ignored filter '{}': expected a whole number", token)),
    }
    true
}

fn apply_filter_token(
    key: &str,
    value: &str,
    filters: &mut Filters,
    warnings: &mut Vec<String>,
) -> bool {
    match key {
        "year" => {
            match parse_year(value) {
                Some(year) => {
                    filters.insert(keys::RELEASE_FROM, format!("{}-01-01", year));
                    filters.insert(keys::RELEASE_TO, format!("{}-12-31", year));
                }
                None => warnings.push(format!("ignored invalid year '{}'", value)),
            }
            true
        }
        "from" => {
            match parse_date_bound(value, false) {
                Some(date) => filters.insert(keys::RELEASE_FROM, date),
                None => warnings.push(format!("ignored invalid date 'from:{}'", value)),
            }
            true
        }
        "to" => {
            match parse_date_bound(value, true) {
                Some(date) => filters.insert(keys::RELEASE_TO, date),
                None => warnings.push(format!("ignored invalid date 'to:{}'", value)),
            }
            true
        }
        "genre" => {
            if value.split(',').all(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_digit())) {
                filters.insert(keys::GENRES, value);
            } else {
                warnings.push(format!(
                    "ignored genre filter '{}': expected numeric provider genre ids",
                    value
                ));
            }
            true
        }
        "lang" => {
            if value.len() == 2 && value.chars().all(|c| c.is_ascii_alphabetic()) {
                filters.insert(keys::LANGUAGE, value.to_ascii_lowercase());
            } else {
                warnings.push(format!("ignored language filter '{}': expected a two-letter code", value));
            }
            true
        }
        "cert" => {
            filters.insert(keys::CERTIFICATION, value.to_ascii_uppercase());
            filters.insert(keys::CERTIFICATION_COUNTRY, "US");
            warnings.push("certification filter applies to US releases only".to_string());
            true
        }
        "sort" => {
            match value {
                "popularity" => filters.insert(keys::SORT_BY, "popularity.desc"),
                "rating" => filters.insert(keys::SORT_BY, "vote_average.desc"),
                "newest" => filters.insert(keys::SORT_BY, "primary_release_date.desc"),
                "oldest" => filters.insert(keys::SORT_BY, "primary_release_date.asc"),
                other => warnings.push(format!(
                    "ignored sort '{}': expected popularity, rating, newest or oldest",
                    other
                )),
            }
            true
        }
        _ => false,
    }
}

fn parse_year(value: &str) -> Option<i32> {
    let year: i32 = value.parse().ok()?;
    (1874..=2200).contains(&year).then_some(year)
}

/// Accepts `YYYY` (expanded to the year boundary) or a full `YYYY-MM-DD`.
fn parse_date_bound(value: &str, upper: bool) -> Option<String> {
    if let Some(year) = parse_year(value) {
        return Some(if upper {
            format!("{}-12-31", year)
        } else {
            format!("{}-01-01", year)
        });
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .map(|date| date.format("%Y-%m-%d").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_query() {
        let parsed = parse_query("the batman");
        assert_eq!(parsed.query.term, "the batman");
        assert!(parsed.query.filters.is_empty());
        assert_eq!(parsed.query.mode, SearchMode::Search);
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn test_colon_in_title_is_not_a_filter() {
        let parsed = parse_query("mission: impossible");
        assert_eq!(parsed.query.term, "mission: impossible");
        assert!(parsed.query.filters.is_empty());
    }

    #[test]
    fn test_year_expands_to_date_range() {
        let parsed = parse_query("heist year:2020");
        assert_eq!(parsed.query.term, "heist");
        assert_eq!(parsed.query.filters.get(keys::RELEASE_FROM), Some("2020-01-01"));
        assert_eq!(parsed.query.filters.get(keys::RELEASE_TO), Some("2020-12-31"));
        assert_eq!(parsed.query.mode, SearchMode::Discover);
    }

    #[test]
    fn test_invalid_year_warns() {
        let parsed = parse_query("year:soon");
        assert!(parsed.query.filters.is_empty());
        assert_eq!(parsed.warnings.len(), 1);
    }

    #[test]
    fn test_certification_warns_about_us_scope() {
        let parsed = parse_query("cert:pg-13");
        assert_eq!(parsed.query.filters.get(keys::CERTIFICATION), Some("PG-13"));
        assert_eq!(parsed.query.filters.get(keys::CERTIFICATION_COUNTRY), Some("US"));
        assert!(parsed.warnings[0].contains("US releases"));
    }

    #[test]
    fn test_range_tokens() {
        let parsed = parse_query("runtime>90 runtime<150 vote>7.5 votes>200");
        let filters = &parsed.query.filters;
        assert_eq!(filters.get(keys::RUNTIME_MIN), Some("90"));
        assert_eq!(filters.get(keys::RUNTIME_MAX), Some("150"));
        assert_eq!(filters.get(keys::VOTE_AVERAGE_MIN), Some("7.5"));
        assert_eq!(filters.get(keys::VOTE_COUNT_MIN), Some("200"));
    }

    #[test]
    fn test_genre_requires_numeric_ids() {
        let parsed = parse_query("genre:28,12");
        assert_eq!(parsed.query.filters.get(keys::GENRES), Some("28,12"));

        let rejected = parse_query("genre:action");
        assert!(rejected.query.filters.is_empty());
        assert_eq!(rejected.warnings.len(), 1);
    }

    #[test]
    fn test_same_as_ignores_raw() {
        let a = parse_query("batman  year:2020").query;
        let b = parse_query("batman year:2020").query;
        assert!(a.same_as(&b));

        let c = parse_query("batman year:2021").query;
        assert!(!a.same_as(&c));
    }

    #[test]
    fn test_person_gating() {
        let filters_only = parse_query("year:2020").query;
        assert!(!filters_only.applicable(Category::Person));
        assert!(!filters_only.applicable(Category::Company));
        assert!(filters_only.applicable(Category::Movie));

        let with_term = parse_query("nolan year:2020").query;
        assert!(with_term.applicable(Category::Person));
    }

    #[test]
    fn test_effective_mode() {
        let query = parse_query("batman year:2020").query;
        assert_eq!(query.effective_mode(Category::Movie), SearchMode::Discover);
        assert_eq!(query.effective_mode(Category::Tv), SearchMode::Discover);
        // person/company force text search even with filters set
        assert_eq!(query.effective_mode(Category::Person), SearchMode::Search);
        assert_eq!(query.effective_mode(Category::Company), SearchMode::Search);

        let plain = parse_query("batman").query;
        assert_eq!(plain.effective_mode(Category::Movie), SearchMode::Search);
    }
}
