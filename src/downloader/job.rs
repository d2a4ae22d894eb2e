//! Download outcomes and run totals

use crate::identifier::ContentId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Result class of one attempted sub-part
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutcomeStatus {
    /// Fetched and written
    Ok,
    /// Destination already held the sub-part, nothing fetched
    Skipped,
    /// Fetch or write failed
    Failed,
}

impl OutcomeStatus {
    /// Lowercase label used in logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ok => "OK",
            Self::Skipped => "SKIPPED",
            Self::Failed => "FAILED",
        })
    }
}

/// Outcome of one sub-part of one work item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadOutcome {
    /// Result class
    pub status: OutcomeStatus,
    /// Work the sub-part belongs to
    pub item_id: ContentId,
    /// Sub-part position inside the work
    pub part_index: usize,
    /// Human-readable description (destination path or URL)
    pub descriptor: String,
    /// Failure reason, set only for [`OutcomeStatus::Failed`]
    pub error: Option<String>,
}

impl DownloadOutcome {
    /// Successful fetch
    pub fn ok(item_id: ContentId, part_index: usize, descriptor: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Ok,
            item_id,
            part_index,
            descriptor: descriptor.into(),
            error: None,
        }
    }

    /// Sub-part already present
    pub fn skipped(item_id: ContentId, part_index: usize, descriptor: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Skipped,
            item_id,
            part_index,
            descriptor: descriptor.into(),
            error: None,
        }
    }

    /// Failed fetch or write
    pub fn failed(
        item_id: ContentId,
        part_index: usize,
        descriptor: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            status: OutcomeStatus::Failed,
            item_id,
            part_index,
            descriptor: descriptor.into(),
            error: Some(error.into()),
        }
    }
}

/// A failed sub-part kept for manual retry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedPart {
    /// Work identifier
    pub item_id: ContentId,
    /// Sub-part position
    pub part_index: usize,
    /// Destination path or URL
    pub descriptor: String,
    /// Failure reason
    pub error: String,
}

/// Aggregated counters of one scheduler run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    /// Sub-parts fetched and written
    pub ok: usize,
    /// Sub-parts already present
    pub skipped: usize,
    /// Sub-parts that failed
    pub failed: usize,
    /// Sub-parts across all scheduled items
    pub total_parts: usize,
    /// Items handed to an executor
    pub items_visited: usize,
    /// Wall-clock duration of the run
    pub elapsed: Duration,
    /// Every failed sub-part, in completion order
    pub failures: Vec<FailedPart>,
}

impl Totals {
    /// Empty totals for a run over `total_parts` sub-parts
    pub fn new(total_parts: usize) -> Self {
        Self {
            total_parts,
            ..Default::default()
        }
    }

    /// Count one outcome
    pub fn record(&mut self, outcome: &DownloadOutcome) {
        match outcome.status {
            OutcomeStatus::Ok => self.ok += 1,
            OutcomeStatus::Skipped => self.skipped += 1,
            OutcomeStatus::Failed => {
                self.failed += 1;
                self.failures.push(FailedPart {
                    item_id: outcome.item_id,
                    part_index: outcome.part_index,
                    descriptor: outcome.descriptor.clone(),
                    error: outcome
                        .error
                        .clone()
                        .unwrap_or_else(|| "unknown error".to_string()),
                });
            }
        }
    }

    /// Sub-parts with a recorded outcome
    pub fn attempted(&self) -> usize {
        self.ok + self.skipped + self.failed
    }

    /// Whether every scheduled sub-part has exactly one outcome
    pub fn is_consistent(&self) -> bool {
        self.attempted() == self.total_parts
    }

    /// Whether nothing failed
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// One-line run summary
    pub fn summary(&self) -> String {
        format!(
            "{} ok, {} skipped, {} failed of {} parts across {} items in {:.1}s",
            self.ok,
            self.skipped,
            self.failed,
            self.total_parts,
            self.items_visited,
            self.elapsed.as_secs_f64()
        )
    }
}
