pub mod category;
pub mod fetcher;
pub mod query;
pub mod store;

pub use category::{Category, CategoryFilter};
pub use fetcher::{
    CategoryFetcher, HttpCategoryFetcher, ItemId, PageResult, ProviderFetcher, SearchError,
    SearchItem,
};
pub use query::{parse_query, Filters, ParsedQuery, SearchMode, SearchQuery};
pub use store::SearchStore;
