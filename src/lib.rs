// Media search backend library
//
// Core functionality:
// - incremental multi-category search aggregation (search::SearchStore)
// - metadata-provider integration and response caching (external)
// - API routes: search proxy, aggregate search, health (api)

pub mod api;
pub mod external;
pub mod search;
