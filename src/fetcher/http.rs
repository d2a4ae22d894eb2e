//! Resilient HTTP request executor
//!
//! Issues one logical request as up to `max_retries` attempts:
//! - each attempt is classified as timeout, transport error, HTTP >= 400 or
//!   success
//! - every non-success is followed by the fixed `retry_delay`, except after
//!   the last attempt
//! - the body of a failed response is never read
//! - successful responses are returned untouched

use bytes::Bytes;
use reqwest::{Client, Proxy, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RequestConfig;
use crate::downloader::rate_limit::RateLimiter;
use crate::fetcher::request::{RequestBody, RequestSpec};
use crate::fetcher::retry_formatter::{AttemptFailure, RetryContext};
use crate::fetcher::{FetcherError, FetcherResult};
use crate::metrics::{record_retry, HttpRequestMetrics};

/// Executes [`RequestSpec`]s with bounded retries
pub struct HttpExecutor {
    config: RequestConfig,
    client: Client,
    proxied: Mutex<HashMap<String, Client>>,
    rate_limiter: RateLimiter,
}

impl HttpExecutor {
    /// Create an executor from request settings
    ///
    /// # Errors
    /// Returns [`FetcherError::ClientBuild`] if the configured proxy is not a
    /// valid URL or the TLS backend cannot be initialised
    pub fn new(config: RequestConfig) -> FetcherResult<Self> {
        let client = build_client(&config, config.proxy.as_deref())?;
        let rate_limiter = match config.rate_window {
            Some(window) => RateLimiter::request_based(window.max_requests, window.window),
            None => RateLimiter::unlimited(),
        }
        .with_success_delay(config.request_delay);

        Ok(Self {
            config,
            client,
            proxied: Mutex::new(HashMap::new()),
            rate_limiter,
        })
    }

    /// Request settings in effect
    pub fn config(&self) -> &RequestConfig {
        &self.config
    }

    /// Client routed through `proxy`, built on first use and cached
    fn client_for(&self, proxy: Option<&str>) -> FetcherResult<Client> {
        let proxy = match proxy {
            None => return Ok(self.client.clone()),
            Some(p) if Some(p) == self.config.proxy.as_deref() => return Ok(self.client.clone()),
            Some(p) => p,
        };

        let mut cache = self
            .proxied
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(client) = cache.get(proxy) {
            return Ok(client.clone());
        }

        debug!(proxy = %proxy, "Building HTTP client for proxy");
        let client = build_client(&self.config, Some(proxy))?;
        cache.insert(proxy.to_string(), client.clone());
        Ok(client)
    }

    /// Execute a request, retrying non-success attempts
    ///
    /// # Returns
    /// The first response with status < 400, unread
    ///
    /// # Errors
    /// - [`FetcherError::RequestFailed`] after `max_retries` failed attempts
    /// - [`FetcherError::ClientBuild`] if the request proxy is invalid
    /// - [`FetcherError::RateLimit`] if the rate limiter was shut down
    pub async fn execute(&self, spec: &RequestSpec) -> FetcherResult<Response> {
        let max_attempts = spec.max_retries.unwrap_or(self.config.max_retries).max(1);
        let timeout = spec.timeout.unwrap_or(self.config.timeout);
        let delay = self.config.retry_delay;
        let client = self.client_for(spec.proxy.as_deref())?;

        let mut last_failure = AttemptFailure::Transport;
        let mut last_reason = String::new();

        for attempt in 1..=max_attempts {
            self.rate_limiter
                .acquire()
                .await
                .map_err(|e| FetcherError::RateLimit(e.to_string()))?;

            let metrics = HttpRequestMetrics::start(&spec.url, attempt);

            let (failure, reason) = match build_request(&client, spec, timeout).send().await {
                Ok(response) => {
                    let status = response.status();
                    metrics.record_complete(status.as_u16());
                    match AttemptFailure::from_status(status) {
                        None => {
                            if attempt > 1 {
                                let ctx = RetryContext::new(
                                    attempt,
                                    max_attempts,
                                    last_failure,
                                    delay,
                                    spec.method.as_str(),
                                    spec.url.as_str(),
                                );
                                debug!("{}", ctx.format_success());
                            }
                            self.rate_limiter.after_success().await;
                            return Ok(response);
                        }
                        // Dropping the response discards the body unread
                        Some(failure) => (failure, failure.description()),
                    }
                }
                Err(e) => {
                    let failure = AttemptFailure::from_reqwest(&e);
                    metrics.record_transport_error(failure.label());
                    (failure, format!("{}: {}", failure.description(), e))
                }
            };

            last_failure = failure;
            last_reason = reason;

            if attempt < max_attempts {
                let ctx = RetryContext::new(
                    attempt,
                    max_attempts,
                    failure,
                    delay,
                    spec.method.as_str(),
                    spec.url.as_str(),
                );
                warn!(
                    url = %spec.url,
                    attempt = attempt,
                    correlation_id = %metrics.correlation_id(),
                    "{}",
                    ctx.format_retry()
                );
                record_retry(delay, attempt);
                tokio::time::sleep(delay).await;
            }
        }

        let ctx = RetryContext::new(
            max_attempts,
            max_attempts,
            last_failure,
            Duration::ZERO,
            spec.method.as_str(),
            spec.url.as_str(),
        );
        warn!("{}", ctx.format_failure());

        Err(FetcherError::RequestFailed {
            method: spec.method.to_string(),
            url: spec.url.clone(),
            params: spec.params.clone(),
            attempts: max_attempts,
            reason: last_reason,
            last_status: last_failure.status(),
        })
    }

    /// Execute a request and decode its body as JSON
    ///
    /// # Errors
    /// Everything [`execute`](Self::execute) returns, plus
    /// [`FetcherError::ParseError`] for an undecodable body
    pub async fn execute_json<T>(&self, spec: &RequestSpec) -> FetcherResult<T>
    where
        T: DeserializeOwned,
    {
        let body = self.execute_bytes(spec).await?;
        serde_json::from_slice(&body).map_err(|e| {
            FetcherError::ParseError(format!("invalid JSON from {}: {}", spec.url, e))
        })
    }

    /// Execute a request and read its whole body
    ///
    /// # Errors
    /// Everything [`execute`](Self::execute) returns, plus
    /// [`FetcherError::NetworkError`] if the body stream breaks
    pub async fn execute_bytes(&self, spec: &RequestSpec) -> FetcherResult<Bytes> {
        let response = self.execute(spec).await?;
        response.bytes().await.map_err(|e| {
            FetcherError::NetworkError(format!("failed to read body from {}: {}", spec.url, e))
        })
    }
}

impl std::fmt::Debug for HttpExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpExecutor")
            .field("config", &self.config)
            .field("rate_limiter", &self.rate_limiter)
            .finish_non_exhaustive()
    }
}

fn build_client(config: &RequestConfig, proxy: Option<&str>) -> FetcherResult<Client> {
    let mut builder = Client::builder()
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .user_agent(config.user_agent.as_str());

    if let Some(proxy) = proxy {
        let proxy = Proxy::all(proxy)
            .map_err(|e| FetcherError::ClientBuild(format!("invalid proxy '{}': {}", proxy, e)))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| FetcherError::ClientBuild(e.to_string()))
}

fn build_request(client: &Client, spec: &RequestSpec, timeout: Duration) -> RequestBuilder {
    let mut builder = client
        .request(spec.method.clone(), spec.url.as_str())
        .timeout(timeout);

    if !spec.params.is_empty() {
        builder = builder.query(&spec.params);
    }
    for (name, value) in &spec.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    match &spec.body {
        Some(RequestBody::Form(fields)) => builder = builder.form(fields),
        Some(RequestBody::Json(value)) => builder = builder.json(value),
        None => {}
    }

    builder
}
