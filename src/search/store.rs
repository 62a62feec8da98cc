use futures::future::join_all;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use super::category::{Category, CategoryFilter};
use super::fetcher::{CategoryFetcher, ItemId, PageResult, SearchError, SearchItem};
use super::query::{ParsedQuery, SearchQuery};

/// Pagination and result state for one category.
///
/// Items stay in arrival order and are deduplicated by id, first seen wins.
/// The revision counter advances on every structural change and keys the
/// lazily recomputed merged view.
#[derive(Debug)]
struct CategoryState {
    items: Vec<SearchItem>,
    seen: HashSet<ItemId>,
    page: u32,
    total_results: u32,
    has_more: bool,
    revision: u64,
}

impl Default for CategoryState {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            seen: HashSet::new(),
            page: 1,
            total_results: 0,
            has_more: false,
            revision: 0,
        }
    }
}

impl CategoryState {
    /// Clears results while keeping the revision counter monotonic, so a
    /// cached merge never mistakes a reset bucket for an unchanged one.
    fn reset(&mut self) {
        self.items.clear();
        self.seen.clear();
        self.page = 1;
        self.total_results = 0;
        self.has_more = false;
        self.revision += 1;
    }

    /// Commits a delivered page. The page counter only ever advances here,
    /// so a fetch that fails or aborts leaves the bucket re-requesting the
    /// same page on the next `load_more`.
    fn append_page(&mut self, page: PageResult) {
        self.page = page.page;
        self.total_results = page.total_results;
        self.has_more = page.page < page.total_pages;
        for item in page.items {
            if self.seen.insert(item.id) {
                self.items.push(item);
            }
        }
        self.revision += 1;
    }
}

/// Cached cross-category projection, keyed on the view filter and the
/// per-category revision counters of its inputs.
struct MergedView {
    filter: CategoryFilter,
    revisions: [u64; 4],
    items: Arc<Vec<SearchItem>>,
}

struct AggregateState {
    categories: [CategoryState; 4],
    query: Option<SearchQuery>,
    filter: CategoryFilter,
    loading: bool,
    error: Option<String>,
    warnings: Vec<String>,
    generation: u64,
    cancel: CancellationToken,
    merged: Option<MergedView>,
}

impl Default for AggregateState {
    fn default() -> Self {
        Self {
            categories: Default::default(),
            query: None,
            filter: CategoryFilter::Both,
            loading: false,
            error: None,
            warnings: Vec::new(),
            generation: 0,
            cancel: CancellationToken::new(),
            merged: None,
        }
    }
}

impl AggregateState {
    fn category(&self, category: Category) -> &CategoryState {
        &self.categories[category.index()]
    }

    fn category_mut(&mut self, category: Category) -> &mut CategoryState {
        &mut self.categories[category.index()]
    }

    fn revisions(&self) -> [u64; 4] {
        [
            self.categories[0].revision,
            self.categories[1].revision,
            self.categories[2].revision,
            self.categories[3].revision,
        ]
    }

    /// Computes the externally consumed result list for the current view:
    /// concatenation in fixed category order, stably sorted by descending
    /// popularity for the merged view, arrival order for a single category.
    fn project(&self) -> Vec<SearchItem> {
        match self.filter {
            CategoryFilter::One(category) => self.category(category).items.clone(),
            CategoryFilter::Both => {
                let total: usize = Category::ALL
                    .iter()
                    .map(|c| self.category(*c).items.len())
                    .sum();
                let mut all = Vec::with_capacity(total);
                for category in Category::ALL {
                    all.extend_from_slice(&self.category(category).items);
                }
                // Vec::sort_by is stable: equal popularity keeps concat order
                all.sort_by(|a, b| b.popularity.total_cmp(&a.popularity));
                all
            }
        }
    }
}

/// One fan-out batch: the generation and token that tagged it at issue time,
/// the query snapshot it runs against, and one (category, page) request each.
struct BatchPlan {
    generation: u64,
    cancel: CancellationToken,
    query: SearchQuery,
    requests: Vec<(Category, u32)>,
}

/// Incremental multi-category search aggregator.
///
/// Owns per-category pagination/result state, the active query and view
/// filter, and the generation counter + cancellation token pair that
/// invalidates superseded in-flight batches. All fetches of a batch are
/// issued in parallel; a batch result is applied only if its generation is
/// still current and its token has not been cancelled, checked immediately
/// before the state mutation. The internal mutex is never held across an
/// await.
pub struct SearchStore {
    fetcher: Arc<dyn CategoryFetcher>,
    state: Mutex<AggregateState>,
}

impl SearchStore {
    pub fn new(fetcher: Arc<dyn CategoryFetcher>) -> Self {
        Self {
            fetcher,
            state: Mutex::new(AggregateState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AggregateState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Supersedes any in-flight batch and marks a new one as current.
    fn begin_batch(state: &mut AggregateState) -> (u64, CancellationToken) {
        state.cancel.cancel();
        state.cancel = CancellationToken::new();
        state.generation += 1;
        state.loading = true;
        state.error = None;
        (state.generation, state.cancel.clone())
    }

    /// Replaces the active query. A query with an unchanged term and
    /// unchanged filter values is a no-op; otherwise all category buckets are
    /// reset and a fresh search runs.
    pub async fn set_query(&self, parsed: ParsedQuery) {
        {
            let mut state = self.lock();
            if let Some(active) = &state.query {
                if active.same_as(&parsed.query) {
                    return;
                }
            }
            state.cancel.cancel();
            for category in Category::ALL {
                state.category_mut(category).reset();
            }
            state.query = Some(parsed.query);
            state.warnings = parsed.warnings;
            state.error = None;
        }
        self.run_search().await;
    }

    /// Issues page-1 fetches in parallel for every category that is in view
    /// and applicable to the active query. Non-applicable person/company
    /// buckets are cleared instead of requested.
    pub async fn run_search(&self) {
        let plan = {
            let mut state = self.lock();
            let Some(query) = state.query.clone() else {
                return;
            };
            let filter = state.filter;
            let mut targets = Vec::new();
            for category in Category::ALL {
                if !filter.includes(category) {
                    continue;
                }
                if query.applicable(category) {
                    targets.push(category);
                } else {
                    state.category_mut(category).reset();
                }
            }
            if targets.is_empty() {
                return;
            }
            let (generation, cancel) = Self::begin_batch(&mut state);
            let mut requests = Vec::with_capacity(targets.len());
            for category in targets {
                state.category_mut(category).reset();
                requests.push((category, 1));
            }
            BatchPlan {
                generation,
                cancel,
                query,
                requests,
            }
        };
        self.execute(plan).await;
    }

    /// Switches the active view. Only categories in the new view that have
    /// zero results loaded are fetched; already-loaded categories keep their
    /// state untouched.
    pub async fn set_category_filter(&self, filter: CategoryFilter) {
        let plan = {
            let mut state = self.lock();
            state.filter = filter;
            let Some(query) = state.query.clone() else {
                return;
            };
            let needed: Vec<Category> = Category::ALL
                .into_iter()
                .filter(|&c| {
                    filter.includes(c)
                        && query.applicable(c)
                        && state.category(c).items.is_empty()
                })
                .collect();
            if needed.is_empty() {
                return;
            }
            let (generation, cancel) = Self::begin_batch(&mut state);
            let mut requests = Vec::with_capacity(needed.len());
            for category in needed {
                state.category_mut(category).reset();
                requests.push((category, 1));
            }
            BatchPlan {
                generation,
                cancel,
                query,
                requests,
            }
        };
        self.execute(plan).await;
    }

    /// Fetches the next page for every in-view category that has more. No-op
    /// while a batch is in flight, without an active query, or when nothing
    /// in view has more pages. The requested page number is committed only
    /// when the page is delivered, so a fetch that fails or aborts leaves
    /// the counter re-requesting the same page on the next call.
    pub async fn load_more(&self) {
        let plan = {
            let mut state = self.lock();
            if state.loading {
                return;
            }
            let Some(query) = state.query.clone() else {
                return;
            };
            let filter = state.filter;
            let requests: Vec<(Category, u32)> = Category::ALL
                .into_iter()
                .filter(|&c| {
                    filter.includes(c) && query.applicable(c) && state.category(c).has_more
                })
                .map(|c| (c, state.category(c).page + 1))
                .collect();
            if requests.is_empty() {
                return;
            }
            let (generation, cancel) = Self::begin_batch(&mut state);
            BatchPlan {
                generation,
                cancel,
                query,
                requests,
            }
        };
        self.execute(plan).await;
    }

    /// Aborts any in-flight batch. Safe to call at any time, including idle.
    pub fn cancel(&self) {
        self.lock().cancel.cancel();
    }

    /// Cancels in-flight work and resets everything to initial values.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.cancel.cancel();
        state.cancel = CancellationToken::new();
        state.generation += 1;
        state.query = None;
        state.filter = CategoryFilter::Both;
        state.loading = false;
        state.error = None;
        state.warnings.clear();
        state.merged = None;
        for category in Category::ALL {
            state.category_mut(category).reset();
        }
    }

    /// Fan-out, fan-in: runs all requests of a batch in parallel and applies
    /// each outcome under the staleness check.
    async fn execute(&self, plan: BatchPlan) {
        let query = &plan.query;
        let cancel = &plan.cancel;
        let outcomes = join_all(plan.requests.iter().map(|&(category, page)| async move {
            let outcome = self.fetcher.fetch_page(category, query, page, cancel).await;
            (category, outcome)
        }))
        .await;

        let mut state = self.lock();
        for (category, outcome) in outcomes {
            Self::apply(&mut state, &plan, category, outcome);
        }
        if state.generation == plan.generation {
            state.loading = false;
        }
    }

    /// Applies one fetch outcome. Results tagged with a stale generation or a
    /// cancelled token never touch state, regardless of how they resolved.
    fn apply(
        state: &mut AggregateState,
        plan: &BatchPlan,
        category: Category,
        outcome: Result<PageResult, SearchError>,
    ) {
        let current = state.generation == plan.generation && !plan.cancel.is_cancelled();
        match outcome {
            Ok(page) => {
                if current {
                    state.category_mut(category).append_page(page);
                }
            }
            // silent cancel: an undelivered page leaves the bucket untouched
            Err(err) if err.is_abort() => {}
            Err(err) => {
                tracing::error!(
                    category = %category,
                    query = %plan.query.term,
                    error = %err,
                    "category fetch failed"
                );
                if current && state.error.is_none() {
                    state.error = Some(err.to_string());
                }
            }
        }
    }

    /// Current results for the active view. Recomputed lazily: the cached
    /// projection is reused as long as the view filter and every underlying
    /// revision counter are unchanged.
    pub fn results(&self) -> Arc<Vec<SearchItem>> {
        let mut state = self.lock();
        let filter = state.filter;
        let revisions = state.revisions();
        if let Some(merged) = &state.merged {
            if merged.filter == filter && merged.revisions == revisions {
                return merged.items.clone();
            }
        }
        let items = Arc::new(state.project());
        state.merged = Some(MergedView {
            filter,
            revisions,
            items: items.clone(),
        });
        items
    }

    /// Total loaded items across all four buckets, ignoring the view filter.
    pub fn unfiltered_results_count(&self) -> usize {
        let state = self.lock();
        Category::ALL
            .iter()
            .map(|c| state.category(*c).items.len())
            .sum()
    }

    /// Whether any in-view category has more pages to load.
    pub fn has_more(&self) -> bool {
        let state = self.lock();
        Category::ALL
            .iter()
            .any(|&c| state.filter.includes(c) && state.category(c).has_more)
    }

    pub fn is_loading(&self) -> bool {
        self.lock().loading
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.lock().warnings.clone()
    }

    pub fn category_filter(&self) -> CategoryFilter {
        self.lock().filter
    }

    pub fn active_query(&self) -> Option<SearchQuery> {
        self.lock().query.clone()
    }

    pub fn category_page(&self, category: Category) -> u32 {
        self.lock().category(category).page
    }

    pub fn category_total(&self, category: Category) -> u32 {
        self.lock().category(category).total_results
    }

    pub fn category_has_more(&self, category: Category) -> bool {
        self.lock().category(category).has_more
    }

    pub fn category_len(&self, category: Category) -> usize {
        self.lock().category(category).items.len()
    }
}
