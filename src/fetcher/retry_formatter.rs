//! Attempt classification and retry message formatting.
//!
//! Every attempt of the request executor ends in exactly one of four
//! classes: transport timeout, transport/connection error, HTTP status
//! >= 400, or success. The non-success classes are modelled by
//! [`AttemptFailure`]; [`RetryContext`] turns them into consistent log lines.

use reqwest::{Error as ReqwestError, StatusCode};
use std::time::Duration;

/// Why an attempt did not succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptFailure {
    /// No complete response within the timeout
    Timeout,
    /// Connection refused, DNS failure, TLS error, reset mid-request
    Transport,
    /// Response arrived with status >= 400
    Status(u16),
}

impl AttemptFailure {
    /// Classify a transport-level reqwest error
    pub fn from_reqwest(err: &ReqwestError) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport
        }
    }

    /// Classify a response status; `None` means success
    pub fn from_status(status: StatusCode) -> Option<Self> {
        if status.as_u16() >= 400 {
            Some(Self::Status(status.as_u16()))
        } else {
            None
        }
    }

    /// HTTP status, when the failure carried one
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status(code) => Some(*code),
            _ => None,
        }
    }

    /// Short metric label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Transport => "transport_error",
            Self::Status(_) => "http_error",
        }
    }

    /// User-friendly description used inside log messages
    pub fn description(&self) -> String {
        match self {
            Self::Timeout => "request timed out".to_string(),
            Self::Transport => "connection failed".to_string(),
            Self::Status(code) => {
                let reason = match code {
                    400 => "bad request",
                    401 | 403 => "not authorized",
                    404 => "not found",
                    429 => "rate limit exceeded",
                    500 => "internal server error",
                    502 => "bad gateway",
                    503 => "service unavailable",
                    504 => "gateway timeout",
                    c if *c >= 500 => "server error",
                    _ => "client error",
                };
                format!("HTTP {code} {reason}")
            }
        }
    }

    /// Suggested remediation shown after the final attempt
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::Timeout => "Check network latency or raise the request timeout",
            Self::Transport => "Verify connectivity, DNS resolution and proxy settings",
            Self::Status(401) | Self::Status(403) => "Log in again or check account permissions",
            Self::Status(404) => "The resource may have been deleted or made private",
            Self::Status(429) => "Raise the request delay to stay under the rate limit",
            Self::Status(code) if *code >= 500 => {
                "The service may be having issues, try again later"
            }
            Self::Status(_) => "Review the request parameters",
        }
    }
}

/// Context for formatting retry messages
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Current attempt number (1-based)
    pub attempt: u32,
    /// Attempt budget
    pub max_attempts: u32,
    /// What went wrong on this attempt
    pub failure: AttemptFailure,
    /// Pause until the next attempt
    pub delay: Duration,
    /// HTTP method
    pub method: String,
    /// Target URL
    pub url: String,
}

impl RetryContext {
    /// Build a context for one failed attempt
    pub fn new(
        attempt: u32,
        max_attempts: u32,
        failure: AttemptFailure,
        delay: Duration,
        method: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            attempt,
            max_attempts,
            failure,
            delay,
            method: method.into(),
            url: url.into(),
        }
    }

    /// Message logged before sleeping for the next attempt
    pub fn format_retry(&self) -> String {
        format!(
            "Retrying (attempt {}/{}) after {} - waiting {:.1} seconds... ({} {})",
            self.attempt + 1,
            self.max_attempts,
            self.failure.description(),
            self.delay.as_secs_f64(),
            self.method,
            self.url
        )
    }

    /// Message logged when a retried request finally succeeds
    pub fn format_success(&self) -> String {
        format!(
            "Attempt {}/{} succeeded ({} {})",
            self.attempt, self.max_attempts, self.method, self.url
        )
    }

    /// Multi-line summary logged after the last attempt failed
    pub fn format_failure(&self) -> String {
        [
            format!(
                "[FAILED] {} {} failed after {} attempts",
                self.method, self.url, self.max_attempts
            ),
            format!("  Last error: {}", self.failure.description()),
            format!("  Suggestion: {}", self.failure.suggestion()),
        ]
        .join("\n")
    }
}
