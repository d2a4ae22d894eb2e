//! # Artwork Crawler Library
//!
//! Crawls paginated content listings, resolves identifiers into downloadable
//! works and fetches every page of every work concurrently, tolerating
//! partial failures along the way.
//!
//! ## Features
//!
//! - **Resilient requests**: bounded retries with a fixed delay, per-request
//!   timeout and proxy
//! - **Token lifecycle**: password or refresh-token login, refresh ahead of
//!   expiry, one refresh in flight at a time
//! - **Paginated collection**: deduplicated identifiers, exact limits,
//!   partial results on mid-crawl failures
//! - **Balanced downloads**: multi-page works spread across a worker pool
//!   longest-first, idempotent re-runs, live progress and ETA
//!
//! ## Quick Start
//!
//! ```no_run
//! use artwork_crawler::config::CrawlerConfig;
//! use artwork_crawler::fetcher::http::HttpExecutor;
//! use artwork_crawler::fetcher::pagination::{PageCursor, PaginatedCollector};
//! use artwork_crawler::identifier::ContentId;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CrawlerConfig::default();
//! let executor = Arc::new(HttpExecutor::new(config.request.clone())?);
//! let collector = PaginatedCollector::new(executor);
//!
//! let report = collector
//!     .collect(
//!         PageCursor::new("https://example.com/api/search").with_param("q", "landscape"),
//!         |page| {
//!             page["ids"]
//!                 .as_array()
//!                 .map(|ids| ids.iter().filter_map(ContentId::from_json).collect())
//!                 .unwrap_or_default()
//!         },
//!         |page, cursor| {
//!             page["next"]
//!                 .as_str()
//!                 .map(|next| cursor.follow(next))
//!         },
//!         Some(100),
//!     )
//!     .await?;
//!
//! println!("collected {} identifiers", report.ids.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`fetcher`] - Request executor, listing clients and paginated collection
//! - [`auth`] - Credential lifecycle management
//! - [`resolver`] - Identifier to work-item resolution
//! - [`downloader`] - Work balancing, concurrent execution, progress
//! - [`output`] - Destination writers and path templates
//! - [`crawler`] - End-to-end pipeline wiring the pieces together
//! - [`config`] - Explicit configuration passed to every component

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Credential lifecycle management
pub mod auth;

/// Configuration structs and defaults
pub mod config;

/// End-to-end crawl pipeline
pub mod crawler;

/// Download scheduling and execution
pub mod downloader;

/// Request execution, listings and pagination
pub mod fetcher;

/// Content identifier parsing and validation
pub mod identifier;

/// Tracing subscriber setup
pub mod logging;

/// Observability metrics
pub mod metrics;

/// Destination writers
pub mod output;

/// Identifier resolution
pub mod resolver;

// Re-export commonly used types
pub use identifier::ContentId;

/// One fetchable file belonging to a [`WorkItem`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubPart {
    /// Zero-based position inside the work (page number)
    pub index: usize,
    /// Absolute URL of the file
    pub url: String,
    /// Extra request headers required by the host (e.g. referer)
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    /// File name suggested by the remote service
    pub file_name: String,
}

impl SubPart {
    /// Create a sub-part without extra headers
    pub fn new(index: usize, url: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            index,
            url: url.into(),
            headers: Vec::new(),
            file_name: file_name.into(),
        }
    }

    /// Attach a request header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Extension of the suggested file name, if any
    pub fn extension(&self) -> Option<&str> {
        Path::new(&self.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
    }
}

/// A downloadable work: one or more pages plus descriptive metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Identifier the work was resolved from
    pub id: ContentId,
    /// Title
    pub title: String,
    /// Author display name
    pub author: String,
    /// Author identifier, when the service exposes one
    #[serde(default)]
    pub author_id: Option<String>,
    /// Tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Number of bookmarks/favourites
    #[serde(default)]
    pub bookmark_count: u64,
    /// Number of views
    #[serde(default)]
    pub view_count: u64,
    /// Fetchable pages, in order
    pub parts: Vec<SubPart>,
}

impl WorkItem {
    /// Create a work item with no metadata beyond title and author
    pub fn new(
        id: ContentId,
        title: impl Into<String>,
        author: impl Into<String>,
        parts: Vec<SubPart>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            author: author.into(),
            author_id: None,
            tags: Vec::new(),
            bookmark_count: 0,
            view_count: 0,
            parts,
        }
    }

    /// Scheduling cost: the number of pages
    pub fn cost(&self) -> usize {
        self.parts.len()
    }

    /// Validate structural integrity
    ///
    /// A work must have at least one page and its pages must be numbered
    /// `0..n` in order.
    pub fn validate(&self) -> Result<(), String> {
        if self.parts.is_empty() {
            return Err(format!("work {} has no pages", self.id));
        }

        for (position, part) in self.parts.iter().enumerate() {
            if part.index != position {
                return Err(format!(
                    "work {} page at position {} has index {}",
                    self.id, position, part.index
                ));
            }
            if part.url.is_empty() {
                return Err(format!("work {} page {} has no URL", self.id, part.index));
            }
        }

        Ok(())
    }
}

/// Ordered collection of resolved works
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentCollection {
    items: Vec<WorkItem>,
}

impl ContentCollection {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a work
    pub fn push(&mut self, item: WorkItem) {
        self.items.push(item);
    }

    /// Keep only the works matching `predicate`, returning a new collection
    ///
    /// ```
    /// use artwork_crawler::{ContentCollection, ContentId, SubPart, WorkItem};
    ///
    /// let page = |name: &str| vec![SubPart::new(0, "https://img.example/p", name)];
    /// let mut popular = WorkItem::new(ContentId::new(1), "a", "x", page("1.png"));
    /// popular.bookmark_count = 5_000;
    /// let obscure = WorkItem::new(ContentId::new(2), "b", "y", page("2.png"));
    ///
    /// let all: ContentCollection = vec![popular, obscure].into_iter().collect();
    /// let filtered = all.filter(|w| w.bookmark_count >= 1_000);
    /// assert_eq!(filtered.len(), 1);
    /// assert_eq!(all.len(), 2);
    /// ```
    pub fn filter<P>(&self, mut predicate: P) -> ContentCollection
    where
        P: FnMut(&WorkItem) -> bool,
    {
        self.items
            .iter()
            .filter(|&item| predicate(item))
            .cloned()
            .collect()
    }

    /// Number of works
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the collection is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total number of pages across all works
    pub fn total_parts(&self) -> usize {
        self.items.iter().map(WorkItem::cost).sum()
    }

    /// Iterate over the works
    pub fn iter(&self) -> std::slice::Iter<'_, WorkItem> {
        self.items.iter()
    }

    /// Consume the collection into its works
    pub fn into_vec(self) -> Vec<WorkItem> {
        self.items
    }
}

impl FromIterator<WorkItem> for ContentCollection {
    fn from_iter<I: IntoIterator<Item = WorkItem>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for ContentCollection {
    type Item = WorkItem;
    type IntoIter = std::vec::IntoIter<WorkItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a ContentCollection {
    type Item = &'a WorkItem;
    type IntoIter = std::slice::Iter<'a, WorkItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
