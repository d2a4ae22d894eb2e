//! Observability metrics for the crawler
//!
//! Counters and histograms covering request attempts, retries, token
//! refreshes, pagination and per-page download outcomes.
//!
//! ## Architecture
//!
//! - Uses the `metrics` facade, so recording is a no-op until a recorder is
//!   installed
//! - [`init_metrics`] installs the Prometheus exporter with its scrape
//!   endpoint; it is idempotent

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::downloader::job::OutcomeStatus;

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

static CORRELATION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Initialize metrics system with Prometheus exporter
///
/// Call once at application startup. Later calls are ignored.
///
/// # Arguments
/// * `addr` - Socket address of the scrape endpoint (e.g., "0.0.0.0:9090")
pub fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        METRICS_INITIALIZED.store(false, Ordering::SeqCst);
        return Err(MetricsError::Install(e.to_string()));
    }

    describe_counter!(
        "http_requests_total",
        Unit::Count,
        "Total number of HTTP request attempts"
    );
    describe_histogram!(
        "http_request_duration_seconds",
        Unit::Seconds,
        "HTTP attempt duration in seconds"
    );
    describe_counter!(
        "http_retries_total",
        Unit::Count,
        "Total number of retried attempts"
    );
    describe_counter!(
        "token_refreshes_total",
        Unit::Count,
        "Credential exchanges by grant and result"
    );
    describe_counter!(
        "pages_fetched_total",
        Unit::Count,
        "Listing pages fetched by the paginated collector"
    );
    describe_gauge!(
        "identifiers_collected",
        Unit::Count,
        "Identifiers returned by the most recent collection"
    );
    describe_counter!(
        "download_parts_total",
        Unit::Count,
        "Downloaded sub-parts by outcome"
    );

    Ok(())
}

/// Whether [`init_metrics`] has installed the exporter
pub fn is_initialized() -> bool {
    METRICS_INITIALIZED.load(Ordering::SeqCst)
}

fn generate_correlation_id() -> String {
    let id = CORRELATION_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("req-{id:08}")
}

/// Timing and labels of one HTTP attempt
pub struct HttpRequestMetrics {
    host: String,
    start_time: Instant,
    correlation_id: String,
    attempt: u32,
}

impl HttpRequestMetrics {
    /// Start recording an attempt against `url`
    pub fn start(url: &str, attempt: u32) -> Self {
        let host = reqwest::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "unknown".to_string());
        let correlation_id = generate_correlation_id();

        debug!(
            correlation_id = %correlation_id,
            host = %host,
            attempt = attempt,
            "Starting HTTP attempt"
        );

        Self {
            host,
            start_time: Instant::now(),
            correlation_id,
            attempt,
        }
    }

    /// Record an attempt that produced an HTTP status
    pub fn record_complete(&self, status_code: u16) {
        let duration = self.start_time.elapsed();

        counter!(
            "http_requests_total",
            "host" => self.host.clone(),
            "status" => status_code.to_string(),
        )
        .increment(1);

        histogram!(
            "http_request_duration_seconds",
            "host" => self.host.clone(),
        )
        .record(duration.as_secs_f64());

        debug!(
            correlation_id = %self.correlation_id,
            host = %self.host,
            status = status_code,
            attempt = self.attempt,
            duration_ms = duration.as_millis(),
            "HTTP attempt completed"
        );
    }

    /// Record an attempt that failed before a status arrived
    pub fn record_transport_error(&self, kind: &'static str) {
        let duration = self.start_time.elapsed();

        counter!(
            "http_requests_total",
            "host" => self.host.clone(),
            "status" => kind,
        )
        .increment(1);

        histogram!(
            "http_request_duration_seconds",
            "host" => self.host.clone(),
        )
        .record(duration.as_secs_f64());

        warn!(
            correlation_id = %self.correlation_id,
            host = %self.host,
            attempt = self.attempt,
            duration_ms = duration.as_millis(),
            kind = kind,
            "HTTP attempt failed at transport level"
        );
    }

    /// Correlation ID of this attempt
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

/// Record a retry and the delay before it
pub fn record_retry(delay: Duration, attempt: u32) {
    counter!("http_retries_total").increment(1);

    debug!(
        attempt = attempt,
        delay_ms = delay.as_millis(),
        "Retry recorded"
    );
}

/// Record a credential exchange
pub fn record_token_exchange(grant: &'static str, success: bool) {
    counter!(
        "token_refreshes_total",
        "grant" => grant,
        "result" => if success { "ok" } else { "failed" },
    )
    .increment(1);
}

/// Record one fetched listing page
pub fn record_page_fetched(new_identifiers: usize) {
    counter!("pages_fetched_total").increment(1);
    debug!(new_identifiers = new_identifiers, "Listing page recorded");
}

/// Record the size of a finished collection
pub fn record_collection(identifiers: usize) {
    gauge!("identifiers_collected").set(identifiers as f64);
}

/// Record one sub-part outcome
pub fn record_part_outcome(status: OutcomeStatus) {
    counter!("download_parts_total", "status" => status.label()).increment(1);
}

/// Metrics setup errors
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Exporter could not be installed (port in use, recorder already set)
    #[error("failed to install Prometheus exporter: {0}")]
    Install(String),
}
