//! Per-item executors
//!
//! An [`ItemExecutor`] turns one work item into an ordered stream of
//! sub-part outcomes (page 0, 1, 2, ...). The scheduler decides which items
//! run where; the executor decides how a single page is obtained.

use futures::stream::{self, Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::auth::{AuthError, TokenManager};
use crate::downloader::job::DownloadOutcome;
use crate::downloader::DownloadError;
use crate::fetcher::http::HttpExecutor;
use crate::fetcher::FetcherError;
use crate::fetcher::request::RequestSpec;
use crate::output::DestinationWriter;
use crate::{SubPart, WorkItem};

/// One sub-part outcome, or the authentication failure that ends the item
pub type ItemResult = Result<DownloadOutcome, AuthError>;

/// Ordered outcomes of one work item
pub type OutcomeStream<'a> = Pin<Box<dyn Stream<Item = ItemResult> + Send + 'a>>;

/// Downloads the sub-parts of one work item
pub trait ItemExecutor: Send + Sync {
    /// Outcomes for every sub-part of `item`, in sub-part order
    ///
    /// Should yield exactly one outcome per sub-part. The scheduler records
    /// missing outcomes as failed and drops surplus ones. An `Err` stops the
    /// whole run with [`DownloadError::Auth`].
    fn execute<'a>(&'a self, item: &'a WorkItem) -> OutcomeStream<'a>;
}

/// Fetches sub-parts over HTTP and stores them in a destination
///
/// A sub-part already present in the destination is skipped without a
/// request. A fetch or write failure fails only that sub-part; an
/// authentication failure ends the item with an `Err`.
pub struct HttpItemExecutor {
    executor: Arc<HttpExecutor>,
    destination: Arc<dyn DestinationWriter>,
    tokens: Option<Arc<TokenManager>>,
}

impl HttpItemExecutor {
    /// Executor fetching through `executor` into `destination`
    pub fn new(executor: Arc<HttpExecutor>, destination: Arc<dyn DestinationWriter>) -> Self {
        Self {
            executor,
            destination,
            tokens: None,
        }
    }

    /// Send auth headers from `tokens` with every fetch
    pub fn with_token_manager(mut self, tokens: Arc<TokenManager>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    async fn fetch_part(&self, item: &WorkItem, part: &SubPart) -> ItemResult {
        let descriptor = self.destination.describe(item, part);

        if self.destination.exists(item, part).await {
            debug!(item_id = %item.id, part = part.index, "Sub-part already present");
            return Ok(DownloadOutcome::skipped(item.id, part.index, descriptor));
        }

        match self.store_part(item, part).await {
            Ok(()) => Ok(DownloadOutcome::ok(item.id, part.index, descriptor)),
            Err(DownloadError::Auth(e)) => {
                warn!(item_id = %item.id, part = part.index, error = %e, "Authentication lost");
                Err(e)
            }
            Err(e) => {
                warn!(item_id = %item.id, part = part.index, error = %e, "Sub-part failed");
                Ok(DownloadOutcome::failed(item.id, part.index, descriptor, e.to_string()))
            }
        }
    }

    async fn store_part(&self, item: &WorkItem, part: &SubPart) -> Result<(), DownloadError> {
        let failed = |reason: String| DownloadError::DownloadFailed {
            item_id: item.id,
            part_index: part.index,
            reason,
        };

        let mut request = RequestSpec::get(part.url.as_str()).headers(part.headers.iter().cloned());
        if let Some(tokens) = &self.tokens {
            request = request.headers(tokens.auth_headers().await?);
        }

        let bytes = self
            .executor
            .execute_bytes(&request)
            .await
            .map_err(|e| match e {
                FetcherError::Auth(e) => DownloadError::Auth(e),
                other => failed(other.to_string()),
            })?;

        self.destination
            .write(item, part, bytes)
            .await
            .map_err(|e| failed(e.to_string()))
    }
}

impl ItemExecutor for HttpItemExecutor {
    fn execute<'a>(&'a self, item: &'a WorkItem) -> OutcomeStream<'a> {
        Box::pin(stream::iter(item.parts.iter()).then(move |part| self.fetch_part(item, part)))
    }
}

impl std::fmt::Debug for HttpItemExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpItemExecutor")
            .field("executor", &self.executor)
            .field("authenticated", &self.tokens.is_some())
            .finish_non_exhaustive()
    }
}
