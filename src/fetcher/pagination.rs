//! Paginated identifier collection
//!
//! Walks a listing page by page, unions the identifiers of every page into
//! an insertion-ordered set and stops at the first of:
//! - a request that failed after all retries (partial results are kept)
//! - the caller's limit (the set is truncated to exactly the limit)
//! - a page that added no new identifier
//! - a page without a successor
//! - the `max_pages` safety bound
//!
//! Authentication failures are the only errors that escape.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::auth::{AuthError, TokenManager};
use crate::config::DEFAULT_MAX_PAGES;
use crate::fetcher::http::HttpExecutor;
use crate::fetcher::listing::{ListingClient, ListingKind};
use crate::fetcher::request::RequestSpec;
use crate::fetcher::FetcherResult;
use crate::identifier::ContentId;
use crate::metrics::{record_collection, record_page_fetched};

/// Insertion-ordered set of unique identifiers
#[derive(Debug, Clone, Default)]
pub struct IdentifierSet {
    order: Vec<ContentId>,
    seen: HashSet<ContentId>,
}

impl IdentifierSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one identifier, returning whether it was new
    pub fn insert(&mut self, id: ContentId) -> bool {
        if self.seen.insert(id) {
            self.order.push(id);
            true
        } else {
            false
        }
    }

    /// Add identifiers, returning how many were new
    pub fn extend<I: IntoIterator<Item = ContentId>>(&mut self, ids: I) -> usize {
        ids.into_iter().filter(|id| self.insert(*id)).count()
    }

    /// Keep the first `len` identifiers in discovery order
    pub fn truncate(&mut self, len: usize) {
        if len >= self.order.len() {
            return;
        }
        for id in self.order.drain(len..) {
            self.seen.remove(&id);
        }
    }

    /// Whether `id` was collected
    pub fn contains(&self, id: &ContentId) -> bool {
        self.seen.contains(id)
    }

    /// Number of identifiers
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Identifiers in discovery order
    pub fn as_slice(&self) -> &[ContentId] {
        &self.order
    }

    /// Consume into identifiers in discovery order
    pub fn into_vec(self) -> Vec<ContentId> {
        self.order
    }
}

/// Pointer to a page of a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor {
    /// Page URL
    pub url: String,
    /// Query parameters sent with the URL
    pub params: Vec<(String, String)>,
    /// Zero-based number of the page within the walk
    pub page: u64,
}

impl PageCursor {
    /// Cursor of the first page at `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            params: Vec::new(),
            page: 0,
        }
    }

    /// Set a query parameter, replacing an existing one of the same name
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self.params.iter_mut().find(|(n, _)| *n == name) {
            Some(param) => param.1 = value,
            None => self.params.push((name, value)),
        }
        self
    }

    /// Value of a query parameter
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Cursor of a next page reached through an absolute URL
    ///
    /// The URL is expected to carry its own query, so parameters are dropped.
    pub fn follow(&self, next_url: impl Into<String>) -> Self {
        Self {
            url: next_url.into(),
            params: Vec::new(),
            page: self.page + 1,
        }
    }

    /// Cursor of the next page at the same URL and parameters
    pub fn advance(&self) -> Self {
        Self {
            url: self.url.clone(),
            params: self.params.clone(),
            page: self.page + 1,
        }
    }

    /// GET request for this page
    pub fn to_request(&self) -> RequestSpec {
        RequestSpec::get(self.url.as_str()).params(self.params.iter().cloned())
    }
}

/// Why a collection stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// The limit was reached and the set truncated to it
    LimitReached,
    /// A page added no new identifier
    Exhausted,
    /// A page had no successor
    NoNextPage,
    /// A page request failed after all retries
    RequestFailed,
    /// The page safety bound was hit
    MaxPages,
}

/// Result of one collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectReport {
    /// Unique identifiers in discovery order
    pub ids: Vec<ContentId>,
    /// Pages fetched successfully
    pub pages_fetched: usize,
    /// Why the walk ended
    pub stop_reason: StopReason,
}

/// Walks listings and collects their identifiers
#[derive(Debug, Clone)]
pub struct PaginatedCollector {
    executor: Arc<HttpExecutor>,
    tokens: Option<Arc<TokenManager>>,
    max_pages: usize,
}

impl PaginatedCollector {
    /// Collector issuing unauthenticated requests through `executor`
    pub fn new(executor: Arc<HttpExecutor>) -> Self {
        Self {
            executor,
            tokens: None,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    /// Attach headers from `tokens` to every page request
    pub fn with_token_manager(mut self, tokens: Arc<TokenManager>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Override the page safety bound
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    /// Walk pages from `start`
    ///
    /// # Arguments
    /// * `start` - Cursor of the first page
    /// * `extract_ids` - Identifiers found on a page
    /// * `get_next` - Cursor of the following page, `None` at the end
    /// * `limit` - Exact number of identifiers wanted, `None` for all
    ///
    /// # Errors
    /// Only authentication failures; request failures end the walk with
    /// [`StopReason::RequestFailed`] and the identifiers gathered so far
    pub async fn collect<E, N>(
        &self,
        start: PageCursor,
        extract_ids: E,
        get_next: N,
        limit: Option<usize>,
    ) -> Result<CollectReport, AuthError>
    where
        E: FnMut(&Value) -> Vec<ContentId>,
        N: FnMut(&Value, &PageCursor) -> Option<PageCursor>,
    {
        let span = info_span!("collect", url = %start.url, limit = ?limit);
        self.walk(start, extract_ids, get_next, limit)
            .instrument(span)
            .await
    }

    async fn walk<E, N>(
        &self,
        start: PageCursor,
        mut extract_ids: E,
        mut get_next: N,
        limit: Option<usize>,
    ) -> Result<CollectReport, AuthError>
    where
        E: FnMut(&Value) -> Vec<ContentId>,
        N: FnMut(&Value, &PageCursor) -> Option<PageCursor>,
    {
        if limit == Some(0) {
            return Ok(CollectReport {
                ids: Vec::new(),
                pages_fetched: 0,
                stop_reason: StopReason::LimitReached,
            });
        }

        let mut ids = IdentifierSet::new();
        let mut cursor = start;
        let mut pages_fetched = 0;

        let stop_reason = loop {
            if pages_fetched >= self.max_pages {
                warn!(max_pages = self.max_pages, "Page safety bound reached");
                break StopReason::MaxPages;
            }

            let mut request = cursor.to_request();
            if let Some(tokens) = &self.tokens {
                request = request.headers(tokens.auth_headers().await?);
            }

            let page: Value = match self.executor.execute_json(&request).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(
                        url = %cursor.url,
                        page = cursor.page,
                        collected = ids.len(),
                        error = %e,
                        "Page request failed, keeping partial results"
                    );
                    break StopReason::RequestFailed;
                }
            };
            pages_fetched += 1;

            let added = ids.extend(extract_ids(&page));
            record_page_fetched(added);
            debug!(
                page = cursor.page,
                added = added,
                total = ids.len(),
                "Listing page collected"
            );

            if let Some(limit) = limit {
                if ids.len() >= limit {
                    ids.truncate(limit);
                    break StopReason::LimitReached;
                }
            }

            if added == 0 {
                break StopReason::Exhausted;
            }

            match get_next(&page, &cursor) {
                Some(next) => cursor = next,
                None => break StopReason::NoNextPage,
            }
        };

        if let Some(limit) = limit {
            if ids.len() < limit {
                info!(
                    requested = limit,
                    collected = ids.len(),
                    reason = ?stop_reason,
                    "Listing ended before the requested number of identifiers"
                );
            }
        }
        info!(
            collected = ids.len(),
            pages = pages_fetched,
            reason = ?stop_reason,
            "Collection finished"
        );
        record_collection(ids.len());

        Ok(CollectReport {
            ids: ids.into_vec(),
            pages_fetched,
            stop_reason,
        })
    }

    /// Walk one listing driven by `client`
    ///
    /// # Errors
    /// [`FetcherError::UnsupportedListing`](crate::fetcher::FetcherError::UnsupportedListing)
    /// if the client cannot walk `kind`, or
    /// [`FetcherError::Auth`](crate::fetcher::FetcherError::Auth)
    pub async fn collect_listing(
        &self,
        client: &dyn ListingClient,
        kind: &ListingKind,
        limit: Option<usize>,
    ) -> FetcherResult<CollectReport> {
        let start = client.start(kind)?;
        info!(listing = %kind, "Collecting listing");

        let report = self
            .collect(
                start,
                |page| client.extract_ids(kind, page),
                |page, cursor| client.next_cursor(page, cursor),
                limit,
            )
            .await?;
        Ok(report)
    }

    /// Walk several listings concurrently and merge their identifiers
    ///
    /// Listings run up to `concurrency` at a time. Their reports are merged
    /// one by one in `kinds` order, so the kept identifiers are deterministic
    /// when the merged set exceeds `limit`.
    ///
    /// # Errors
    /// The first unsupported-listing or authentication error
    pub async fn collect_many(
        &self,
        client: &dyn ListingClient,
        kinds: &[ListingKind],
        limit: Option<usize>,
        concurrency: usize,
    ) -> FetcherResult<CollectReport> {
        let mut merged = IdentifierSet::new();
        let mut pages_fetched = 0;
        let mut any_failed = false;

        let mut reports = stream::iter(kinds)
            .map(|kind| self.collect_listing(client, kind, limit))
            .buffered(concurrency.max(1));

        while let Some(report) = reports.next().await {
            let report = report?;
            pages_fetched += report.pages_fetched;
            any_failed |= report.stop_reason == StopReason::RequestFailed;
            let added = merged.extend(report.ids);
            debug!(added = added, total = merged.len(), "Listing merged");
        }

        let stop_reason = match limit {
            Some(limit) if merged.len() >= limit => {
                merged.truncate(limit);
                StopReason::LimitReached
            }
            _ if any_failed => StopReason::RequestFailed,
            _ => StopReason::Exhausted,
        };

        info!(
            listings = kinds.len(),
            collected = merged.len(),
            pages = pages_fetched,
            "Multi-listing collection finished"
        );

        Ok(CollectReport {
            ids: merged.into_vec(),
            pages_fetched,
            stop_reason,
        })
    }
}
