//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_DIRECTIVE: &str = "artwork_crawler=info";

/// Install the global tracing subscriber
///
/// `RUST_LOG` overrides `default_directive`. Setting `LOG_FORMAT=json`
/// switches to JSON lines.
///
/// # Errors
/// Returns [`LoggingError::AlreadyInitialized`] if another global
/// subscriber is already installed
pub fn init_tracing(default_directive: &str) -> Result<(), LoggingError> {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let result = if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };

    result.map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))
}

/// Logging setup errors
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// A global subscriber was installed earlier
    #[error("tracing subscriber already initialized: {0}")]
    AlreadyInitialized(String),
}
