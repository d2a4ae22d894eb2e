//! End-to-end crawl pipeline
//!
//! collect identifiers -> resolve -> filter -> download
//!
//! Each stage isolates its own failures; only configuration, authentication
//! and scheduler-level errors stop the pipeline.

use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::auth::{AuthError, AuthState, TokenManager};
use crate::config::{ConfigError, CrawlerConfig};
use crate::downloader::{DownloadError, DownloadScheduler, HttpItemExecutor, ProgressSink, Totals};
use crate::fetcher::http::HttpExecutor;
use crate::fetcher::pagination::{CollectReport, PaginatedCollector};
use crate::fetcher::{FetcherError, ListingClient, ListingKind};
use crate::identifier::ContentId;
use crate::output::DestinationWriter;
use crate::resolver::{resolve_all, ContentResolver, HttpResolver, RecordParser};
use crate::WorkItem;

/// Pipeline errors
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    /// Configuration rejected
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Request or listing failure that stopped the pipeline
    #[error("fetcher error: {0}")]
    Fetcher(FetcherError),

    /// Authentication failure
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Scheduler failure
    #[error("download error: {0}")]
    Download(DownloadError),
}

impl From<FetcherError> for CrawlError {
    fn from(err: FetcherError) -> Self {
        match err {
            FetcherError::Auth(e) => Self::Auth(e),
            other => Self::Fetcher(other),
        }
    }
}

impl From<DownloadError> for CrawlError {
    fn from(err: DownloadError) -> Self {
        match err {
            DownloadError::Auth(e) => Self::Auth(e),
            other => Self::Download(other),
        }
    }
}

/// Summary of one pipeline run
#[derive(Debug, Clone)]
pub struct CrawlReport {
    /// Identifier collection result
    pub collected: CollectReport,
    /// Works resolved successfully
    pub resolved: usize,
    /// Identifiers the service no longer knows
    pub not_found: Vec<ContentId>,
    /// Identifiers whose resolution failed
    pub resolve_failures: Vec<(ContentId, String)>,
    /// Resolved works rejected by the filter
    pub filtered_out: usize,
    /// Download totals
    pub totals: Totals,
}

/// Wires collector, resolver and scheduler together
pub struct Crawler {
    config: CrawlerConfig,
    executor: Arc<HttpExecutor>,
    tokens: Option<Arc<TokenManager>>,
    listing: Arc<dyn ListingClient>,
    destination: Arc<dyn DestinationWriter>,
    scheduler: DownloadScheduler,
    authenticate_downloads: bool,
}

impl Crawler {
    /// Build a crawler
    ///
    /// A token manager is created only when `config.auth.token_url` is set.
    ///
    /// # Errors
    /// [`CrawlError::Config`] for invalid settings, [`CrawlError::Fetcher`]
    /// if the HTTP client cannot be built
    pub fn new(
        config: CrawlerConfig,
        listing: Arc<dyn ListingClient>,
        destination: Arc<dyn DestinationWriter>,
    ) -> Result<Self, CrawlError> {
        config.validate()?;

        let executor = Arc::new(HttpExecutor::new(config.request.clone())?);
        let tokens = (!config.auth.token_url.is_empty())
            .then(|| Arc::new(TokenManager::new(executor.clone(), config.auth.clone())));
        let scheduler = DownloadScheduler::new(config.scheduler.clone());

        Ok(Self {
            config,
            executor,
            tokens,
            listing,
            destination,
            scheduler,
            authenticate_downloads: false,
        })
    }

    /// Report download progress to `sink`
    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.scheduler = self.scheduler.with_progress_sink(sink);
        self
    }

    /// Send auth headers with file downloads too, not only API requests
    pub fn with_authenticated_downloads(mut self, enabled: bool) -> Self {
        self.authenticate_downloads = enabled;
        self
    }

    /// Shared request executor
    pub fn executor(&self) -> &Arc<HttpExecutor> {
        &self.executor
    }

    /// Token manager, if authentication is configured
    pub fn token_manager(&self) -> Option<&Arc<TokenManager>> {
        self.tokens.as_ref()
    }

    /// Log in with username and password
    ///
    /// # Errors
    /// [`AuthError::NotAuthenticated`] if no token endpoint is configured,
    /// otherwise whatever the exchange returns
    pub async fn login(&self, username: &str, password: &str) -> Result<(), AuthError> {
        self.require_tokens()?.login(username, password).await
    }

    /// Log in with a stored refresh token
    ///
    /// # Errors
    /// As [`login`](Self::login)
    pub async fn login_with_refresh_token(&self, refresh_token: &str) -> Result<(), AuthError> {
        self.require_tokens()?
            .login_with_refresh_token(refresh_token)
            .await
    }

    /// Drop the session credential
    pub async fn logout(&self) {
        if let Some(tokens) = &self.tokens {
            tokens.logout().await;
        }
    }

    /// Collector for the current session
    ///
    /// Page requests carry auth headers once a login succeeded.
    pub async fn collector(&self) -> PaginatedCollector {
        let collector = PaginatedCollector::new(self.executor.clone())
            .with_max_pages(self.config.collector.max_pages);
        match self.session().await {
            Some(tokens) => collector.with_token_manager(tokens),
            None => collector,
        }
    }

    /// Resolver fetching JSON records from `url_template` (`{id}` placeholder)
    ///
    /// Record requests carry auth headers once a login succeeded.
    pub async fn http_resolver(
        &self,
        url_template: impl Into<String>,
        parse: RecordParser,
    ) -> HttpResolver {
        let resolver = HttpResolver::new(self.executor.clone(), url_template, parse);
        match self.session().await {
            Some(tokens) => resolver.with_token_manager(tokens),
            None => resolver,
        }
    }

    /// Run the whole pipeline over `kinds`
    ///
    /// # Errors
    /// See [`crawl_filtered`](Self::crawl_filtered)
    pub async fn crawl(
        &self,
        resolver: &dyn ContentResolver,
        kinds: &[ListingKind],
        limit: Option<usize>,
    ) -> Result<CrawlReport, CrawlError> {
        self.crawl_filtered(resolver, kinds, limit, |_| true).await
    }

    /// Run the whole pipeline, downloading only works accepted by `predicate`
    ///
    /// `limit` bounds the collected identifiers, before filtering.
    ///
    /// # Errors
    /// - [`CrawlError::Fetcher`] if a listing kind is not supported
    /// - [`CrawlError::Auth`] on any authentication failure
    /// - [`CrawlError::Download`] if the scheduler rejects an item, a
    ///   worker crashes or the totals do not add up
    #[instrument(skip(self, resolver, predicate), fields(listings = kinds.len()))]
    pub async fn crawl_filtered<P>(
        &self,
        resolver: &dyn ContentResolver,
        kinds: &[ListingKind],
        limit: Option<usize>,
        predicate: P,
    ) -> Result<CrawlReport, CrawlError>
    where
        P: FnMut(&WorkItem) -> bool,
    {
        let collected = self
            .collector()
            .await
            .collect_many(
                self.listing.as_ref(),
                kinds,
                limit,
                self.config.collector.listing_concurrency,
            )
            .await?;

        let resolution = resolve_all(
            resolver,
            &collected.ids,
            self.config.collector.resolve_concurrency,
        )
        .await?;

        let resolved = resolution.items.len();
        let selected = resolution.items.filter(predicate);
        let filtered_out = resolved - selected.len();

        info!(
            collected = collected.ids.len(),
            resolved = resolved,
            selected = selected.len(),
            parts = selected.total_parts(),
            "Starting downloads"
        );

        let mut item_executor =
            HttpItemExecutor::new(self.executor.clone(), self.destination.clone());
        if self.authenticate_downloads {
            if let Some(tokens) = self.session().await {
                item_executor = item_executor.with_token_manager(tokens);
            }
        }

        let totals = self.scheduler.run(selected, Arc::new(item_executor)).await?;
        info!(summary = %totals.summary(), "Crawl finished");

        Ok(CrawlReport {
            collected,
            resolved,
            not_found: resolution.not_found,
            resolve_failures: resolution.failed,
            filtered_out,
            totals,
        })
    }

    fn require_tokens(&self) -> Result<&Arc<TokenManager>, AuthError> {
        self.tokens.as_ref().ok_or(AuthError::NotAuthenticated)
    }

    async fn session(&self) -> Option<Arc<TokenManager>> {
        let tokens = self.tokens.as_ref()?;
        match tokens.state().await {
            AuthState::Unauthenticated => None,
            AuthState::Authenticated | AuthState::Refreshing => Some(tokens.clone()),
        }
    }
}

impl std::fmt::Debug for Crawler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crawler")
            .field("config", &self.config)
            .field("auth_configured", &self.tokens.is_some())
            .field("authenticate_downloads", &self.authenticate_downloads)
            .finish_non_exhaustive()
    }
}

/// Parser for records shaped like `{"title", "author", "pages": [url, ...]}`
///
/// Covers simple services and tests; real services supply their own
/// [`RecordParser`].
pub fn simple_record_parser() -> RecordParser {
    Arc::new(|id: ContentId, record: &Value| {
        let title = record["title"].as_str().unwrap_or_default();
        let author = record["author"].as_str().unwrap_or_default();
        let pages = record["pages"]
            .as_array()
            .ok_or_else(|| format!("record {id} has no pages array"))?;

        let parts = pages
            .iter()
            .enumerate()
            .map(|(index, url)| {
                let url = url
                    .as_str()
                    .ok_or_else(|| format!("page {index} of {id} is not a URL"))?;
                let file_name = url.rsplit('/').next().unwrap_or(url).to_string();
                Ok(crate::SubPart::new(index, url, file_name))
            })
            .collect::<Result<Vec<_>, String>>()?;

        let mut item = WorkItem::new(id, title, author, parts);
        item.bookmark_count = record["bookmarks"].as_u64().unwrap_or(0);
        Ok(item)
    })
}
