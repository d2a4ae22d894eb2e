//! Download scheduling and execution
//!
//! # Overview
//!
//! 1. **Balancing**: [`balance`] deals work items into chunks by cost
//! 2. **Execution**: [`executor::DownloadScheduler`] runs the chunks on a
//!    worker pool and aggregates outcomes into [`job::Totals`]
//! 3. **Per-item work**: an [`item::ItemExecutor`] yields one outcome per
//!    sub-part; [`item::HttpItemExecutor`] fetches and stores them
//! 4. **Progress**: [`progress::ProgressSink`] receives percentage and ETA
//! 5. **Pacing**: [`rate_limit::RateLimiter`] throttles request starts
//!
//! # Error Handling
//!
//! Network and filesystem failures of a sub-part never abort a run; they are
//! counted as FAILED and listed in [`job::Totals::failures`]. Malformed
//! input, crashed workers and authentication failures produce a
//! [`DownloadError`].

pub mod balance;
pub mod executor;
pub mod item;
pub mod job;
pub mod progress;
pub mod rate_limit;

pub use executor::{DownloadScheduler, SchedulePlan};
pub use item::{HttpItemExecutor, ItemExecutor, ItemResult, OutcomeStream};
pub use job::{DownloadOutcome, FailedPart, OutcomeStatus, Totals};
pub use progress::{IndicatifProgressSink, NoopProgressSink, ProgressSink, TracingProgressSink};
pub use rate_limit::{RateLimitError, RateLimiter};

use crate::auth::AuthError;
use crate::identifier::ContentId;

/// Download errors
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// One sub-part's fetch or write failed
    ///
    /// Recorded as a FAILED outcome for that sub-part; the run continues.
    #[error("{item_id} page {part_index} failed: {reason}")]
    DownloadFailed {
        /// Owning work item
        item_id: ContentId,
        /// Sub-part position
        part_index: usize,
        /// Underlying fetch or write error
        reason: String,
    },

    /// Authentication broke mid-run; remaining workers were stopped
    #[error("authentication failed during download: {0}")]
    Auth(#[from] AuthError),

    /// Outcome count disagrees with the scheduled sub-part count
    #[error("{recorded} outcomes recorded for {scheduled} scheduled parts")]
    InconsistentTotals {
        /// Outcomes the aggregator counted
        recorded: usize,
        /// Sub-parts that were scheduled
        scheduled: usize,
    },

    /// One or more worker tasks crashed
    #[error("{} download worker(s) failed: {}", .errors.len(), .errors.join("; "))]
    WorkerFailed {
        /// Join error of every crashed worker
        errors: Vec<String>,
        /// Totals of the outcomes that did arrive
        totals: Box<Totals>,
    },

    /// A work item is malformed
    #[error("invalid work item {id}: {reason}")]
    InvalidItem {
        /// Offending item
        id: ContentId,
        /// What is wrong with it
        reason: String,
    },
}
