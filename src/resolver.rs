//! Identifier resolution
//!
//! Turns collected identifiers into [`WorkItem`]s. Resolution failures are
//! isolated per identifier; authentication failures abort the batch because
//! every following request would fail the same way.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::auth::{AuthError, TokenManager};
use crate::fetcher::http::HttpExecutor;
use crate::fetcher::request::RequestSpec;
use crate::fetcher::FetcherError;
use crate::identifier::ContentId;
use crate::{ContentCollection, WorkItem};

/// Resolution errors
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    /// The service does not know the identifier (deleted or private)
    #[error("content {0} not found")]
    NotFound(ContentId),

    /// Fetching or interpreting the record failed
    #[error("failed to resolve {id}: {reason}")]
    ResolutionFailed {
        /// Identifier being resolved
        id: ContentId,
        /// What went wrong
        reason: String,
    },

    /// Authentication failed while resolving
    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Resolves identifiers into work items
#[async_trait]
pub trait ContentResolver: Send + Sync {
    /// Resolve one identifier
    async fn resolve(&self, id: ContentId) -> Result<WorkItem, ResolutionError>;
}

/// Outcome of resolving a batch of identifiers
#[derive(Debug, Clone, Default)]
pub struct ResolveReport {
    /// Resolved works, in identifier order
    pub items: ContentCollection,
    /// Identifiers the service does not know
    pub not_found: Vec<ContentId>,
    /// Identifiers that failed for another reason
    pub failed: Vec<(ContentId, String)>,
}

/// Resolve `ids` with up to `concurrency` requests in flight
///
/// # Errors
/// The first [`AuthError`]; every other failure is recorded in the report
pub async fn resolve_all(
    resolver: &dyn ContentResolver,
    ids: &[ContentId],
    concurrency: usize,
) -> Result<ResolveReport, AuthError> {
    let mut report = ResolveReport::default();

    let mut results = stream::iter(ids.iter().copied())
        .map(|id| async move { (id, resolver.resolve(id).await) })
        .buffered(concurrency.max(1));

    while let Some((id, result)) = results.next().await {
        match result {
            Ok(item) => report.items.push(item),
            Err(ResolutionError::NotFound(_)) => {
                debug!(id = %id, "Content not found, skipping");
                report.not_found.push(id);
            }
            Err(ResolutionError::ResolutionFailed { reason, .. }) => {
                warn!(id = %id, reason = %reason, "Resolution failed");
                report.failed.push((id, reason));
            }
            Err(ResolutionError::Auth(e)) => return Err(e),
        }
    }

    info!(
        requested = ids.len(),
        resolved = report.items.len(),
        not_found = report.not_found.len(),
        failed = report.failed.len(),
        "Resolution finished"
    );
    Ok(report)
}

/// Builds a work item from the JSON record of an identifier
pub type RecordParser = Arc<dyn Fn(ContentId, &Value) -> Result<WorkItem, String> + Send + Sync>;

/// Resolver fetching one JSON record per identifier
///
/// The record URL comes from a template with an `{id}` placeholder; the
/// record is turned into a [`WorkItem`] by a caller-supplied parser, which
/// keeps service field names out of the crate.
pub struct HttpResolver {
    executor: Arc<HttpExecutor>,
    tokens: Option<Arc<TokenManager>>,
    url_template: String,
    headers: Vec<(String, String)>,
    parse: RecordParser,
}

impl HttpResolver {
    /// Resolver for records at `url_template`
    pub fn new(
        executor: Arc<HttpExecutor>,
        url_template: impl Into<String>,
        parse: RecordParser,
    ) -> Self {
        Self {
            executor,
            tokens: None,
            url_template: url_template.into(),
            headers: Vec::new(),
            parse,
        }
    }

    /// Authenticate record requests through `tokens`
    pub fn with_token_manager(mut self, tokens: Arc<TokenManager>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Send an extra header with every record request
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Record URL of `id`
    pub fn url_for(&self, id: ContentId) -> String {
        self.url_template.replace("{id}", &id.to_string())
    }
}

#[async_trait]
impl ContentResolver for HttpResolver {
    async fn resolve(&self, id: ContentId) -> Result<WorkItem, ResolutionError> {
        let mut request = RequestSpec::get(self.url_for(id)).headers(self.headers.iter().cloned());
        if let Some(tokens) = &self.tokens {
            request = request.headers(tokens.auth_headers().await?);
        }

        let record: Value = match self.executor.execute_json(&request).await {
            Ok(record) => record,
            Err(e) if e.status() == Some(404) => return Err(ResolutionError::NotFound(id)),
            Err(FetcherError::Auth(e)) => return Err(ResolutionError::Auth(e)),
            Err(e) => {
                return Err(ResolutionError::ResolutionFailed {
                    id,
                    reason: e.to_string(),
                })
            }
        };

        let item = (self.parse)(id, &record)
            .map_err(|reason| ResolutionError::ResolutionFailed { id, reason })?;
        item.validate()
            .map_err(|reason| ResolutionError::ResolutionFailed { id, reason })?;
        Ok(item)
    }
}

impl std::fmt::Debug for HttpResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResolver")
            .field("url_template", &self.url_template)
            .field("authenticated", &self.tokens.is_some())
            .finish_non_exhaustive()
    }
}
