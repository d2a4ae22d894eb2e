//! Request execution, listing clients and paginated collection

use crate::auth::AuthError;

pub mod http;
pub mod listing;
pub mod pagination;
pub mod request;
pub mod retry_formatter;

pub use listing::{
    EndpointTemplate, IdSource, JsonListingClient, ListingClient, ListingKind, ListingLayout,
    PagingStyle,
};

/// Fetcher errors
#[derive(Debug, thiserror::Error)]
pub enum FetcherError {
    /// Every attempt of a request failed
    ///
    /// Carries the request identity and the last attempt's classification,
    /// never the response body.
    #[error("{method} {url} failed after {attempts} attempts: {reason}")]
    RequestFailed {
        /// HTTP method
        method: String,
        /// Target URL
        url: String,
        /// Query parameters of the request
        params: Vec<(String, String)>,
        /// Attempts made
        attempts: u32,
        /// Classification of the last attempt
        reason: String,
        /// Status of the last attempt, if it produced one
        last_status: Option<u16>,
    },

    /// HTTP client could not be built
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),

    /// Response parse error
    #[error("parse error: {0}")]
    ParseError(String),

    /// Network error outside the retried attempt (e.g. body stream broke)
    #[error("network error: {0}")]
    NetworkError(String),

    /// Listing kind not described by the client's layout
    #[error("unsupported listing: {0}")]
    UnsupportedListing(String),

    /// Rate limiter failure
    #[error("rate limit error: {0}")]
    RateLimit(String),

    /// Authentication failure while preparing a request
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl FetcherError {
    /// HTTP status of the last attempt, for [`FetcherError::RequestFailed`]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RequestFailed { last_status, .. } => *last_status,
            _ => None,
        }
    }
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetcherError>;

/// Create a listing client from a service layout
///
/// # Arguments
/// * `layout` - Endpoint templates, identifier pointers and paging style
///
/// # Returns
/// Boxed ListingClient implementation
///
/// # Errors
/// Returns [`FetcherError::UnsupportedListing`] if the layout describes no
/// listing, or [`FetcherError::ParseError`] if one of its JSON pointers is
/// malformed
pub fn create_listing_client(layout: ListingLayout) -> FetcherResult<Box<dyn ListingClient>> {
    layout.validate()?;
    Ok(Box::new(JsonListingClient::new(layout)))
}
