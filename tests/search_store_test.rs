// SearchStore integration tests
//
// Drives the aggregator through a scripted in-memory fetcher: per-category
// pages, scripted failures, and fetches that only resolve once superseded.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use media_search_backend::search::{
    parse_query, Category, CategoryFetcher, CategoryFilter, PageResult, SearchError, SearchItem,
    SearchQuery, SearchStore,
};

/// Id given to items produced by a superseded fetch; must never show up.
const STALE_ID: u64 = 999;

enum Scripted {
    Page {
        items: Vec<(u64, f64)>,
        total_pages: u32,
        total_results: u32,
    },
    Fail,
    /// Parks until the batch token fires, then resolves as aborted,
    /// imitating an in-flight request observing a cancellation.
    ParkThenAbort,
}

#[derive(Default)]
struct MockFetcher {
    scripted: HashMap<(Category, u32), Scripted>,
    /// Fetches for these terms park until their token fires, then resolve
    /// successfully, imitating a slow response arriving after supersession.
    stale_success_terms: Vec<String>,
    calls: Mutex<Vec<(Category, String, u32)>>,
}

impl MockFetcher {
    fn new() -> Self {
        Self::default()
    }

    fn page(
        mut self,
        category: Category,
        page: u32,
        items: &[(u64, f64)],
        total_pages: u32,
        total_results: u32,
    ) -> Self {
        self.scripted.insert(
            (category, page),
            Scripted::Page {
                items: items.to_vec(),
                total_pages,
                total_results,
            },
        );
        self
    }

    fn fail(mut self, category: Category, page: u32) -> Self {
        self.scripted.insert((category, page), Scripted::Fail);
        self
    }

    fn stale_success(mut self, term: &str) -> Self {
        self.stale_success_terms.push(term.to_string());
        self
    }

    fn park_then_abort(mut self, category: Category, page: u32) -> Self {
        self.scripted.insert((category, page), Scripted::ParkThenAbort);
        self
    }

    fn calls(&self) -> Vec<(Category, String, u32)> {
        self.calls.lock().unwrap().clone()
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

fn make_page(items: &[(u64, f64)], page: u32, total_pages: u32, total_results: u32) -> PageResult {
    PageResult {
        items: items
            .iter()
            .map(|&(id, popularity)| SearchItem {
                id,
                title: Some(format!("item-{}", id)),
                popularity,
                extra: serde_json::Map::new(),
            })
            .collect(),
        page,
        total_pages,
        total_results,
    }
}

#[async_trait]
impl CategoryFetcher for MockFetcher {
    async fn fetch_page(
        &self,
        category: Category,
        query: &SearchQuery,
        page: u32,
        cancel: &CancellationToken,
    ) -> Result<PageResult, SearchError> {
        self.calls
            .lock()
            .unwrap()
            .push((category, query.term.clone(), page));

        if self.stale_success_terms.contains(&query.term) {
            cancel.cancelled().await;
            return Ok(make_page(&[(STALE_ID, 99.0)], page, 1, 1));
        }
        if cancel.is_cancelled() {
            return Err(SearchError::Aborted);
        }
        match self.scripted.get(&(category, page)) {
            Some(Scripted::Page {
                items,
                total_pages,
                total_results,
            }) => Ok(make_page(items, page, *total_pages, *total_results)),
            Some(Scripted::Fail) => Err(SearchError::Provider("scripted failure".to_string())),
            Some(Scripted::ParkThenAbort) => {
                cancel.cancelled().await;
                Err(SearchError::Aborted)
            }
            None => Ok(make_page(&[], page, 0, 0)),
        }
    }
}

fn result_ids(store: &SearchStore) -> Vec<u64> {
    store.results().iter().map(|item| item.id).collect()
}

#[tokio::test]
async fn same_page_twice_never_duplicates_ids() {
    let fetcher = Arc::new(
        MockFetcher::new()
            .page(Category::Movie, 1, &[(1, 3.0), (2, 2.0), (3, 1.0)], 2, 5)
            // page 2 re-delivers id 3 alongside a new item
            .page(Category::Movie, 2, &[(3, 1.0), (4, 0.5)], 2, 5),
    );
    let store = SearchStore::new(fetcher.clone());
    store
        .set_category_filter(CategoryFilter::One(Category::Movie))
        .await;
    store.set_query(parse_query("heat")).await;
    store.load_more().await;

    assert_eq!(result_ids(&store), vec![1, 2, 3, 4]);
    assert_eq!(store.category_len(Category::Movie), 4);
}

#[tokio::test]
async fn superseded_batch_results_are_never_applied() {
    let fetcher = Arc::new(
        MockFetcher::new()
            .stale_success("first")
            .page(Category::Movie, 1, &[(1, 2.0), (2, 1.0)], 1, 2),
    );
    let store = Arc::new(SearchStore::new(fetcher.clone()));

    let slow_search = {
        let store = store.clone();
        tokio::spawn(async move {
            store.set_query(parse_query("first")).await;
        })
    };
    // give batch A time to issue its fetches before superseding it
    tokio::time::sleep(Duration::from_millis(20)).await;
    store.set_query(parse_query("second")).await;
    // batch A's fetches have now resolved successfully with stale items
    slow_search.await.unwrap();

    let ids = result_ids(&store);
    assert_eq!(ids, vec![1, 2]);
    assert!(!ids.contains(&STALE_ID));
    assert!(!store.is_loading());
}

#[tokio::test]
async fn merged_view_is_stable_on_popularity_ties() {
    let fetcher = Arc::new(
        MockFetcher::new()
            .page(Category::Movie, 1, &[(1, 5.0), (2, 5.0)], 1, 2)
            .page(Category::Tv, 1, &[(3, 5.0)], 1, 1),
    );
    let store = SearchStore::new(fetcher);
    store.set_query(parse_query("heat")).await;

    // equal popularity keeps concatenation order: movie bucket before tv
    assert_eq!(result_ids(&store), vec![1, 2, 3]);
}

#[tokio::test]
async fn filter_only_query_skips_person_and_company() {
    let fetcher = Arc::new(
        MockFetcher::new()
            .page(Category::Movie, 1, &[(1, 1.0)], 1, 1)
            .page(Category::Tv, 1, &[(2, 1.0)], 1, 1),
    );
    let store = SearchStore::new(fetcher.clone());
    store.set_query(parse_query("year:2020")).await;

    let calls = fetcher.calls();
    assert!(!calls.is_empty());
    assert!(calls
        .iter()
        .all(|(category, _, _)| matches!(category, Category::Movie | Category::Tv)));
    for category in [Category::Person, Category::Company] {
        assert_eq!(store.category_total(category), 0);
        assert!(!store.category_has_more(category));
        assert_eq!(store.category_len(category), 0);
    }
}

#[tokio::test]
async fn identical_requery_issues_no_requests() {
    let fetcher = Arc::new(MockFetcher::new().page(Category::Movie, 1, &[(1, 1.0)], 1, 1));
    let store = SearchStore::new(fetcher.clone());

    store.set_query(parse_query("batman  year:2020")).await;
    let after_first = fetcher.call_count();
    assert!(after_first > 0);

    // different instance, same term and filter values
    store.set_query(parse_query("batman year:2020")).await;
    assert_eq!(fetcher.call_count(), after_first);
}

#[tokio::test]
async fn failed_load_more_retries_the_same_page() {
    let fetcher = Arc::new(
        MockFetcher::new()
            .page(Category::Movie, 1, &[(1, 2.0), (2, 1.0)], 3, 30)
            .page(Category::Movie, 2, &[(3, 0.5)], 3, 30)
            .fail(Category::Movie, 3),
    );
    let store = SearchStore::new(fetcher.clone());
    store
        .set_category_filter(CategoryFilter::One(Category::Movie))
        .await;
    store.set_query(parse_query("batman")).await;

    store.load_more().await;
    assert_eq!(store.category_page(Category::Movie), 2);
    let before = result_ids(&store);

    store.load_more().await;
    // the undelivered page never advanced the counter, so a retry
    // re-requests page 3
    assert_eq!(store.category_page(Category::Movie), 2);
    assert_eq!(result_ids(&store), before);
    assert!(store.category_has_more(Category::Movie));
    assert!(store.last_error().unwrap().contains("scripted failure"));
}

#[tokio::test]
async fn cancelled_load_more_retries_the_same_page() {
    let fetcher = Arc::new(
        MockFetcher::new()
            .page(Category::Movie, 1, &[(1, 2.0), (2, 1.0)], 4, 40)
            // page 2 hangs until the batch is cancelled
            .park_then_abort(Category::Movie, 2),
    );
    let store = Arc::new(SearchStore::new(fetcher.clone()));
    store
        .set_category_filter(CategoryFilter::One(Category::Movie))
        .await;
    store.set_query(parse_query("batman")).await;
    assert_eq!(store.category_page(Category::Movie), 1);

    let pending = {
        let store = store.clone();
        tokio::spawn(async move {
            store.load_more().await;
        })
    };
    // let the page-2 fetch go out before cancelling it
    tokio::time::sleep(Duration::from_millis(20)).await;
    store.cancel();
    pending.await.unwrap();

    // page 2 was requested but never delivered: the counter still names
    // page 1, so the next load_more re-requests page 2
    assert!(fetcher
        .calls()
        .iter()
        .any(|&(category, _, page)| category == Category::Movie && page == 2));
    assert_eq!(store.category_page(Category::Movie), 1);
    assert_eq!(result_ids(&store), vec![1, 2]);
    assert!(store.category_has_more(Category::Movie));
    // an explicit cancel is not an error
    assert!(store.last_error().is_none());
    assert!(!store.is_loading());
}

#[tokio::test]
async fn filter_switch_during_load_more_keeps_the_page_counter() {
    let fetcher = Arc::new(
        MockFetcher::new()
            .page(Category::Tv, 1, &[(10, 2.0), (11, 1.0)], 3, 30)
            .park_then_abort(Category::Tv, 2)
            .page(Category::Movie, 1, &[(20, 5.0)], 1, 1),
    );
    let store = Arc::new(SearchStore::new(fetcher.clone()));
    store
        .set_category_filter(CategoryFilter::One(Category::Tv))
        .await;
    store.set_query(parse_query("batman")).await;

    let pending = {
        let store = store.clone();
        tokio::spawn(async move {
            store.load_more().await;
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    // supersede the in-flight tv page 2 with a view switch
    store
        .set_category_filter(CategoryFilter::One(Category::Movie))
        .await;
    pending.await.unwrap();

    // the superseded fetch touched nothing: tv keeps its delivered page
    // and will re-request page 2 when it comes back into view
    assert_eq!(store.category_page(Category::Tv), 1);
    assert_eq!(store.category_len(Category::Tv), 2);
    assert!(store.category_has_more(Category::Tv));
    assert_eq!(result_ids(&store), vec![20]);
    assert!(!store.is_loading());
}

#[tokio::test]
async fn one_failing_category_does_not_abort_the_others() {
    let fetcher = Arc::new(
        MockFetcher::new()
            .fail(Category::Movie, 1)
            .page(Category::Tv, 1, &[(7, 1.0)], 1, 1),
    );
    let store = SearchStore::new(fetcher);
    store.set_query(parse_query("batman")).await;

    assert_eq!(result_ids(&store), vec![7]);
    assert!(store.last_error().is_some());
    assert!(!store.is_loading());
}

#[tokio::test]
async fn batman_scenario_merges_eight_results() {
    let fetcher = Arc::new(
        MockFetcher::new()
            .page(
                Category::Movie,
                1,
                &[(1, 10.0), (2, 8.0), (3, 6.0), (4, 4.0), (5, 2.0)],
                3,
                41,
            )
            .page(Category::Tv, 1, &[(6, 9.0), (7, 3.0)], 1, 2)
            .page(Category::Person, 1, &[(8, 7.0)], 1, 1)
            .page(Category::Company, 1, &[], 0, 0),
    );
    let store = SearchStore::new(fetcher);
    store.set_query(parse_query("batman")).await;

    assert_eq!(store.unfiltered_results_count(), 8);
    // movie still has pages 2 and 3
    assert!(store.has_more());
    assert_eq!(result_ids(&store), vec![1, 6, 2, 8, 3, 4, 7, 5]);
}

#[tokio::test]
async fn switching_filters_only_fetches_unloaded_categories() {
    let fetcher = Arc::new(MockFetcher::new().page(Category::Tv, 1, &[(10, 2.0), (11, 1.0)], 1, 2));
    let store = SearchStore::new(fetcher.clone());

    store
        .set_category_filter(CategoryFilter::One(Category::Tv))
        .await;
    store.set_query(parse_query("batman")).await;
    assert_eq!(fetcher.call_count(), 1);
    assert_eq!(store.category_len(Category::Tv), 2);

    // re-selecting tv fires nothing: it already has results, and the unloaded
    // categories are out of view
    store
        .set_category_filter(CategoryFilter::One(Category::Tv))
        .await;
    assert_eq!(fetcher.call_count(), 1);

    // widening to "both" fetches only the three unloaded categories
    store.set_category_filter(CategoryFilter::Both).await;
    let calls = fetcher.calls();
    assert_eq!(calls.len(), 4);
    assert_eq!(
        calls
            .iter()
            .filter(|(category, _, _)| *category == Category::Tv)
            .count(),
        1
    );
}

#[tokio::test]
async fn load_more_is_a_noop_without_query_or_more_pages() {
    let fetcher = Arc::new(MockFetcher::new().page(Category::Movie, 1, &[(1, 1.0)], 1, 1));
    let store = SearchStore::new(fetcher.clone());

    // no active query
    store.load_more().await;
    assert_eq!(fetcher.call_count(), 0);

    store.set_query(parse_query("heat")).await;
    let after_search = fetcher.call_count();

    // every category is on its last page
    store.load_more().await;
    assert_eq!(fetcher.call_count(), after_search);
}

#[tokio::test]
async fn clear_resets_all_state() {
    let fetcher = Arc::new(MockFetcher::new().page(Category::Movie, 1, &[(1, 1.0)], 2, 10));
    let store = SearchStore::new(fetcher);
    store.set_query(parse_query("batman cert:PG-13")).await;
    assert!(!store.warnings().is_empty());
    assert!(store.unfiltered_results_count() > 0);

    store.clear();
    assert_eq!(store.unfiltered_results_count(), 0);
    assert!(store.results().is_empty());
    assert!(store.active_query().is_none());
    assert!(store.warnings().is_empty());
    assert!(store.last_error().is_none());
    assert!(!store.has_more());
    assert!(!store.is_loading());
}

#[tokio::test]
async fn cancel_is_safe_when_idle() {
    let fetcher = Arc::new(MockFetcher::new().page(Category::Movie, 1, &[(1, 1.0)], 1, 1));
    let store = SearchStore::new(fetcher);

    store.cancel();
    // a fresh batch after an idle cancel still runs normally
    store.set_query(parse_query("heat")).await;
    assert_eq!(store.unfiltered_results_count(), 1);
}

#[tokio::test]
async fn parser_warnings_are_surfaced() {
    let fetcher = Arc::new(MockFetcher::new());
    let store = SearchStore::new(fetcher);
    store.set_query(parse_query("batman cert:PG-13")).await;

    let warnings = store.warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("US releases"));
}
