//! Request pacing
//!
//! Two independent throttles, both optional:
//! - a request window: at most `max_requests` attempts start per `window`
//! - a fixed courtesy delay after every successful request

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;

/// Rate limiter shared by every request of one executor
#[derive(Clone, Debug, Default)]
pub struct RateLimiter {
    window: Option<RequestWindow>,
    success_delay: Option<Duration>,
}

#[derive(Clone, Debug)]
struct RequestWindow {
    semaphore: Arc<Semaphore>,
    duration: Duration,
}

impl RateLimiter {
    /// Limiter that never waits
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Limit attempts to `max_requests` per `window`
    ///
    /// # Arguments
    /// * `max_requests` - Maximum request starts per window
    /// * `window` - Time window for the limit
    pub fn request_based(max_requests: usize, window: Duration) -> Self {
        Self {
            window: Some(RequestWindow {
                semaphore: Arc::new(Semaphore::new(max_requests)),
                duration: window,
            }),
            success_delay: None,
        }
    }

    /// Pause for `delay` after every successful request
    pub fn with_success_delay(mut self, delay: Option<Duration>) -> Self {
        self.success_delay = delay.filter(|d| !d.is_zero());
        self
    }

    /// Whether a request window is configured
    pub fn is_windowed(&self) -> bool {
        self.window.is_some()
    }

    /// Configured delay after successful requests
    pub fn success_delay(&self) -> Option<Duration> {
        self.success_delay
    }

    /// Wait until a new attempt may start
    ///
    /// The permit is held for the window duration on a background task, so a
    /// window of N permits admits at most N starts per window.
    pub async fn acquire(&self) -> Result<(), RateLimitError> {
        let Some(window) = &self.window else {
            return Ok(());
        };

        let permit = window
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| RateLimitError::AcquireError(e.to_string()))?;

        let duration = window.duration;
        tokio::spawn(async move {
            sleep(duration).await;
            drop(permit);
        });

        Ok(())
    }

    /// Apply the courtesy delay after a successful request
    pub async fn after_success(&self) {
        if let Some(delay) = self.success_delay {
            sleep(delay).await;
        }
    }
}

/// Rate limiter errors
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// Failed to acquire permits
    #[error("failed to acquire rate limit permit: {0}")]
    AcquireError(String),
}
