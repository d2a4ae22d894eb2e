//! Crawler configuration
//!
//! Every component receives its settings explicitly at construction time.
//! The structs deserialize with `serde` so an embedding application can load
//! them from whatever format it prefers; missing fields fall back to the
//! defaults below.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Attempts per logical request before giving up
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Fixed pause between attempts of the same request
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Overall timeout of a single attempt
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Time allowed to establish the TCP/TLS connection
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Tokens are refreshed this long before their nominal expiry
pub const DEFAULT_TOKEN_SAFETY_MARGIN: Duration = Duration::from_secs(30);

/// A worker is only spawned if it gets at least this many items
pub const DEFAULT_MIN_ITEMS_PER_WORKER: usize = 2;

/// Upper bound on pages walked by one collection, guards against listings
/// that never stop returning fresh identifiers
pub const DEFAULT_MAX_PAGES: usize = 10_000;

/// Identifiers resolved in parallel by the crawler pipeline
pub const DEFAULT_RESOLVE_CONCURRENCY: usize = 4;

/// Listings collected in parallel by multi-listing collection
pub const DEFAULT_LISTING_CONCURRENCY: usize = 2;

/// Default user agent sent with every request
pub const DEFAULT_USER_AGENT: &str = concat!("artwork-crawler/", env!("CARGO_PKG_VERSION"));

/// Complete configuration of one crawler instance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// HTTP request behaviour
    pub request: RequestConfig,
    /// Credential exchange
    pub auth: AuthConfig,
    /// Identifier collection
    pub collector: CollectorConfig,
    /// Download scheduling
    pub scheduler: SchedulerConfig,
}

impl CrawlerConfig {
    /// Check all sections for values the components cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.request.validate()?;
        self.auth.validate()?;
        self.collector.validate()?;
        self.scheduler.validate()?;
        Ok(())
    }
}

/// Settings of the request executor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Attempts per request (at least 1)
    pub max_retries: u32,
    /// Pause between attempts
    pub retry_delay: Duration,
    /// Per-attempt timeout
    pub timeout: Duration,
    /// Connection establishment timeout
    pub connect_timeout: Duration,
    /// Default proxy URL applied to every request without its own proxy
    pub proxy: Option<String>,
    /// Pause after every successful request (rate limit courtesy)
    pub request_delay: Option<Duration>,
    /// Cap on attempts started per time window
    pub rate_window: Option<RateWindow>,
    /// User agent header
    pub user_agent: String,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            proxy: None,
            request_delay: None,
            rate_window: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl RequestConfig {
    /// Validate request settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid(
                "request.max_retries must be at least 1".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "request.timeout must be greater than zero".to_string(),
            ));
        }
        if let Some(proxy) = &self.proxy {
            if proxy.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "request.proxy must not be blank".to_string(),
                ));
            }
        }
        if let Some(window) = &self.rate_window {
            if window.max_requests == 0 || window.window.is_zero() {
                return Err(ConfigError::Invalid(
                    "request.rate_window needs at least 1 request per non-zero window"
                        .to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Request start budget per time window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateWindow {
    /// Attempts allowed to start within one window
    pub max_requests: usize,
    /// Window length
    pub window: Duration,
}

/// Settings of the token manager
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// OAuth token endpoint used for password and refresh grants
    pub token_url: String,
    /// OAuth client id, sent when present
    pub client_id: Option<String>,
    /// OAuth client secret, sent when present
    pub client_secret: Option<String>,
    /// Additional form fields sent with every grant
    pub extra_params: Vec<(String, String)>,
    /// Refresh this long before expiry
    pub safety_margin: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_url: String::new(),
            client_id: None,
            client_secret: None,
            extra_params: Vec::new(),
            safety_margin: DEFAULT_TOKEN_SAFETY_MARGIN,
        }
    }
}

impl AuthConfig {
    /// Validate auth settings
    ///
    /// An empty `token_url` is allowed: it means the crawler runs
    /// unauthenticated and no token manager will be built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.token_url.is_empty()
            && !(self.token_url.starts_with("http://") || self.token_url.starts_with("https://"))
        {
            return Err(ConfigError::Invalid(format!(
                "auth.token_url must be an http(s) URL, got '{}'",
                self.token_url
            )));
        }
        Ok(())
    }
}

/// Settings of the paginated collector
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Safety bound on pages per collection
    pub max_pages: usize,
    /// Listings collected concurrently by multi-listing collection
    pub listing_concurrency: usize,
    /// Identifiers resolved concurrently
    pub resolve_concurrency: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
            listing_concurrency: DEFAULT_LISTING_CONCURRENCY,
            resolve_concurrency: DEFAULT_RESOLVE_CONCURRENCY,
        }
    }
}

impl CollectorConfig {
    /// Validate collector settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_pages == 0 {
            return Err(ConfigError::Invalid(
                "collector.max_pages must be at least 1".to_string(),
            ));
        }
        if self.listing_concurrency == 0 || self.resolve_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "collector concurrency values must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings of the download scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Worker count override; `None` uses the available parallelism
    pub worker_count: Option<usize>,
    /// Minimum items per worker before the worker count is reduced
    pub min_items_per_worker: usize,
    /// Sub-workers per worker; values above 1 enable two-level scheduling
    pub sub_workers: usize,
    /// Minimum interval between progress updates
    pub progress_interval: Duration,
    /// Minimum percentage advance that forces a progress update
    pub progress_step: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: None,
            min_items_per_worker: DEFAULT_MIN_ITEMS_PER_WORKER,
            sub_workers: 1,
            progress_interval: Duration::from_secs(5),
            progress_step: 1.0,
        }
    }
}

impl SchedulerConfig {
    /// Validate scheduler settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == Some(0) {
            return Err(ConfigError::Invalid(
                "scheduler.worker_count must be at least 1 when set".to_string(),
            ));
        }
        if self.min_items_per_worker == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.min_items_per_worker must be at least 1".to_string(),
            ));
        }
        if self.sub_workers == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.sub_workers must be at least 1".to_string(),
            ));
        }
        if !(self.progress_step > 0.0 && self.progress_step <= 100.0) {
            return Err(ConfigError::Invalid(
                "scheduler.progress_step must be within (0, 100]".to_string(),
            ));
        }
        Ok(())
    }

    /// Parallelism available to the scheduler before item-count reductions
    pub fn parallelism(&self) -> usize {
        self.worker_count.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A setting holds an unusable value
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
