//! Listing clients
//!
//! A listing is any paginated endpoint that yields content identifiers:
//! keyword search, rankings, a user's works, a user's bookmarks. The
//! [`ListingClient`] trait tells the paginated collector where a listing
//! starts, how to pull identifiers out of a page and how to reach the next
//! page. [`JsonListingClient`] implements it for JSON services described by
//! a [`ListingLayout`], which holds every service-specific name.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::fetcher::pagination::PageCursor;
use crate::fetcher::{FetcherError, FetcherResult};
use crate::identifier::ContentId;

/// Which listing to walk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ListingKind {
    /// Keyword search
    Search {
        /// Search terms
        keyword: String,
    },
    /// Ranking for a mode (daily, weekly, ...) and optional date
    Ranking {
        /// Ranking mode
        mode: String,
        /// Ranking date, service format
        #[serde(default)]
        date: Option<String>,
    },
    /// Works published by a user
    UserWorks {
        /// Author identifier
        user_id: String,
    },
    /// Works bookmarked by a user
    Bookmarks {
        /// Owner identifier
        user_id: String,
    },
}

impl ListingKind {
    /// Short lowercase name
    pub fn label(&self) -> &'static str {
        match self {
            Self::Search { .. } => "search",
            Self::Ranking { .. } => "ranking",
            Self::UserWorks { .. } => "user_works",
            Self::Bookmarks { .. } => "bookmarks",
        }
    }

    /// Value substituted for `name` in endpoint templates
    fn placeholder(&self, name: &str) -> Option<&str> {
        match (self, name) {
            (Self::Search { keyword }, "keyword") => Some(keyword.as_str()),
            (Self::Ranking { mode, .. }, "mode") => Some(mode.as_str()),
            (Self::Ranking { date, .. }, "date") => Some(date.as_deref().unwrap_or("")),
            (Self::UserWorks { user_id }, "user_id") | (Self::Bookmarks { user_id }, "user_id") => {
                Some(user_id.as_str())
            }
            _ => None,
        }
    }
}

impl fmt::Display for ListingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Search { keyword } => write!(f, "search '{keyword}'"),
            Self::Ranking { mode, date: Some(date) } => write!(f, "ranking {mode} ({date})"),
            Self::Ranking { mode, date: None } => write!(f, "ranking {mode}"),
            Self::UserWorks { user_id } => write!(f, "works of user {user_id}"),
            Self::Bookmarks { user_id } => write!(f, "bookmarks of user {user_id}"),
        }
    }
}

/// Drives one listing for the paginated collector
pub trait ListingClient: Send + Sync {
    /// Cursor of the first page
    ///
    /// # Errors
    /// Returns [`FetcherError::UnsupportedListing`] if the client cannot walk
    /// this kind of listing
    fn start(&self, kind: &ListingKind) -> FetcherResult<PageCursor>;

    /// Identifiers found on a fetched page, in page order
    fn extract_ids(&self, kind: &ListingKind, page: &Value) -> Vec<ContentId>;

    /// Cursor of the page after `page`, `None` at the end
    fn next_cursor(&self, page: &Value, cursor: &PageCursor) -> Option<PageCursor>;
}

/// Where identifiers live inside a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IdSource {
    /// A JSON array; elements are identifiers, or objects holding one in
    /// `id_field`
    ArrayField {
        /// JSON pointer to the array (`""` is the page root)
        pointer: String,
        /// Field of each element holding the identifier
        #[serde(default)]
        id_field: Option<String>,
    },
    /// A JSON object whose keys are identifiers (in key order)
    ObjectKeys {
        /// JSON pointer to the object
        pointer: String,
    },
}

impl IdSource {
    fn pointer(&self) -> &str {
        match self {
            Self::ArrayField { pointer, .. } | Self::ObjectKeys { pointer } => pointer,
        }
    }

    /// Pull identifiers out of `page`; unparsable entries are skipped
    pub fn extract(&self, page: &Value) -> Vec<ContentId> {
        match self {
            Self::ArrayField { pointer, id_field } => page
                .pointer(pointer)
                .and_then(Value::as_array)
                .map(|entries| {
                    entries
                        .iter()
                        .filter_map(|entry| match id_field {
                            Some(field) => entry.get(field).and_then(ContentId::from_json),
                            None => ContentId::from_json(entry),
                        })
                        .collect()
                })
                .unwrap_or_default(),
            Self::ObjectKeys { pointer } => page
                .pointer(pointer)
                .and_then(Value::as_object)
                .map(|entries| {
                    entries
                        .keys()
                        .filter_map(|key| ContentId::parse(key).ok())
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

/// How a listing advances
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PagingStyle {
    /// The page links to the next one
    NextUrl {
        /// JSON pointer to the next URL; null, missing or empty ends the listing
        pointer: String,
    },
    /// Pages are numbered through a query parameter
    PageIndex {
        /// Query parameter carrying the page number
        param: String,
        /// Number of the first page
        #[serde(default = "default_first_page")]
        first: u64,
        /// JSON pointer to a boolean that is `false` on the last page
        #[serde(default)]
        has_more: Option<String>,
    },
}

fn default_first_page() -> u64 {
    1
}

/// URL and query template of one listing endpoint
///
/// `{keyword}`, `{mode}`, `{date}` and `{user_id}` are substituted in both
/// the URL and the parameter values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointTemplate {
    /// URL template
    pub url: String,
    /// Query parameter templates
    #[serde(default)]
    pub params: Vec<(String, String)>,
    /// Identifier location in this endpoint's pages
    pub ids: IdSource,
}

impl EndpointTemplate {
    /// Template without parameters
    pub fn new(url: impl Into<String>, ids: IdSource) -> Self {
        Self {
            url: url.into(),
            params: Vec::new(),
            ids,
        }
    }

    /// Add a parameter template
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }
}

/// Service-specific description consumed by [`JsonListingClient`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingLayout {
    /// Keyword search endpoint
    #[serde(default)]
    pub search: Option<EndpointTemplate>,
    /// Ranking endpoint
    #[serde(default)]
    pub ranking: Option<EndpointTemplate>,
    /// User works endpoint
    #[serde(default)]
    pub user_works: Option<EndpointTemplate>,
    /// Bookmarks endpoint
    #[serde(default)]
    pub bookmarks: Option<EndpointTemplate>,
    /// How every listing of this service advances
    pub paging: PagingStyle,
}

impl ListingLayout {
    /// Layout with no endpoints yet
    pub fn new(paging: PagingStyle) -> Self {
        Self {
            search: None,
            ranking: None,
            user_works: None,
            bookmarks: None,
            paging,
        }
    }

    /// Set the search endpoint
    pub fn with_search(mut self, endpoint: EndpointTemplate) -> Self {
        self.search = Some(endpoint);
        self
    }

    /// Set the ranking endpoint
    pub fn with_ranking(mut self, endpoint: EndpointTemplate) -> Self {
        self.ranking = Some(endpoint);
        self
    }

    /// Set the user works endpoint
    pub fn with_user_works(mut self, endpoint: EndpointTemplate) -> Self {
        self.user_works = Some(endpoint);
        self
    }

    /// Set the bookmarks endpoint
    pub fn with_bookmarks(mut self, endpoint: EndpointTemplate) -> Self {
        self.bookmarks = Some(endpoint);
        self
    }

    /// Endpoint serving `kind`
    pub fn endpoint(&self, kind: &ListingKind) -> Option<&EndpointTemplate> {
        match kind {
            ListingKind::Search { .. } => self.search.as_ref(),
            ListingKind::Ranking { .. } => self.ranking.as_ref(),
            ListingKind::UserWorks { .. } => self.user_works.as_ref(),
            ListingKind::Bookmarks { .. } => self.bookmarks.as_ref(),
        }
    }

    /// Check the layout is usable
    pub fn validate(&self) -> FetcherResult<()> {
        let endpoints: Vec<&EndpointTemplate> = [
            &self.search,
            &self.ranking,
            &self.user_works,
            &self.bookmarks,
        ]
        .into_iter()
        .flatten()
        .collect();

        if endpoints.is_empty() {
            return Err(FetcherError::UnsupportedListing(
                "layout describes no listing endpoint".to_string(),
            ));
        }

        let mut pointers: Vec<&str> = endpoints.iter().map(|e| e.ids.pointer()).collect();
        match &self.paging {
            PagingStyle::NextUrl { pointer } => pointers.push(pointer),
            PagingStyle::PageIndex { param, has_more, .. } => {
                if param.is_empty() {
                    return Err(FetcherError::ParseError(
                        "page index parameter name is empty".to_string(),
                    ));
                }
                if let Some(pointer) = has_more {
                    pointers.push(pointer);
                }
            }
        }

        for pointer in pointers {
            if !pointer.is_empty() && !pointer.starts_with('/') {
                return Err(FetcherError::ParseError(format!(
                    "JSON pointer '{pointer}' must be empty or start with '/'"
                )));
            }
        }

        Ok(())
    }
}

/// [`ListingClient`] for JSON services described by a [`ListingLayout`]
#[derive(Debug, Clone)]
pub struct JsonListingClient {
    layout: ListingLayout,
}

impl JsonListingClient {
    /// Client over `layout`
    pub fn new(layout: ListingLayout) -> Self {
        Self { layout }
    }

    /// Layout in use
    pub fn layout(&self) -> &ListingLayout {
        &self.layout
    }
}

impl ListingClient for JsonListingClient {
    fn start(&self, kind: &ListingKind) -> FetcherResult<PageCursor> {
        let endpoint = self
            .layout
            .endpoint(kind)
            .ok_or_else(|| FetcherError::UnsupportedListing(kind.label().to_string()))?;

        let url = render(&endpoint.url, kind, true);
        let mut cursor = PageCursor::new(url);
        for (name, value) in &endpoint.params {
            cursor = cursor.with_param(name.as_str(), render(value, kind, false));
        }

        if let PagingStyle::PageIndex { param, first, .. } = &self.layout.paging {
            cursor = cursor.with_param(param.as_str(), first.to_string());
        }

        Ok(cursor)
    }

    fn extract_ids(&self, kind: &ListingKind, page: &Value) -> Vec<ContentId> {
        self.layout
            .endpoint(kind)
            .map(|endpoint| endpoint.ids.extract(page))
            .unwrap_or_default()
    }

    fn next_cursor(&self, page: &Value, cursor: &PageCursor) -> Option<PageCursor> {
        match &self.layout.paging {
            PagingStyle::NextUrl { pointer } => page
                .pointer(pointer)
                .and_then(Value::as_str)
                .filter(|next| !next.is_empty())
                .map(|next| cursor.follow(next)),
            PagingStyle::PageIndex {
                param,
                first,
                has_more,
            } => {
                if let Some(pointer) = has_more {
                    if page.pointer(pointer).and_then(Value::as_bool) == Some(false) {
                        return None;
                    }
                }
                let next = cursor.advance();
                let number = first + next.page;
                Some(next.with_param(param.as_str(), number.to_string()))
            }
        }
    }
}

/// Substitute listing placeholders; URL substitutions are percent-encoded
fn render(template: &str, kind: &ListingKind, encode: bool) -> String {
    let mut out = template.to_string();
    for name in ["keyword", "mode", "date", "user_id"] {
        let token = format!("{{{name}}}");
        if !out.contains(&token) {
            continue;
        }
        let value = kind.placeholder(name).unwrap_or("");
        let value = if encode {
            urlencoding::encode(value).into_owned()
        } else {
            value.to_string()
        };
        out = out.replace(&token, &value);
    }
    out
}
