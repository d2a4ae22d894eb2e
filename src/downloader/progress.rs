//! Progress tracking for download runs.
//!
//! The scheduler's aggregator owns a [`ProgressState`] and feeds it one
//! completed sub-part at a time. The state decides when an update is worth
//! emitting (percentage step or time interval), estimates the remaining time
//! from a smoothed per-percent duration, and formats the line handed to a
//! [`ProgressSink`].

use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::downloader::job::Totals;

const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_PERCENTAGE_STEP: f64 = 1.0;
const DEFAULT_SMOOTHING: f64 = 0.3;

/// Receives progress updates and the final totals of a run
pub trait ProgressSink: Send + Sync {
    /// Progress after `current` of `total` sub-parts
    fn update(&self, current: usize, total: usize, message: &str);

    /// Run finished
    fn finish(&self, totals: &Totals);
}

/// Emits progress as `tracing` log lines
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn update(&self, current: usize, total: usize, message: &str) {
        info!(current = current, total = total, "{}", message);
    }

    fn finish(&self, totals: &Totals) {
        info!("[DONE] {}", totals.summary());
        for failure in &totals.failures {
            warn!(
                item_id = %failure.item_id,
                part = failure.part_index,
                descriptor = %failure.descriptor,
                "[FAILED] {}",
                failure.error
            );
        }
    }
}

/// Draws a terminal progress bar
pub struct IndicatifProgressSink {
    bar: ProgressBar,
}

impl std::fmt::Debug for IndicatifProgressSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndicatifProgressSink")
            .field("position", &self.bar.position())
            .field("length", &self.bar.length())
            .finish()
    }
}

impl IndicatifProgressSink {
    /// Bar sized on the first update
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] \
                     {pos}/{len} ({percent}%) {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Self { bar }
    }

    /// Wrap an existing bar, e.g. one inside a `MultiProgress`
    pub fn with_bar(bar: ProgressBar) -> Self {
        Self { bar }
    }
}

impl Default for IndicatifProgressSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for IndicatifProgressSink {
    fn update(&self, current: usize, total: usize, message: &str) {
        self.bar.set_length(total as u64);
        self.bar.set_position(current as u64);
        self.bar.set_message(message.to_string());
    }

    fn finish(&self, totals: &Totals) {
        self.bar.set_position(totals.attempted() as u64);
        self.bar.finish_with_message(totals.summary());
    }
}

/// Discards progress
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {
    fn update(&self, _current: usize, _total: usize, _message: &str) {}

    fn finish(&self, _totals: &Totals) {}
}

/// Remaining-time estimate from an exponential moving average of the time
/// spent per completed percent
#[derive(Debug, Clone)]
pub struct EtaEstimator {
    smoothing: f64,
    last_percentage: f64,
    last_instant: Instant,
    seconds_per_percent: Option<f64>,
}

impl EtaEstimator {
    /// Estimator starting at 0% at `start`
    ///
    /// `smoothing` is the weight of the newest sample, clamped to (0, 1].
    pub fn new(start: Instant, smoothing: f64) -> Self {
        Self {
            smoothing: smoothing.clamp(f64::EPSILON, 1.0),
            last_percentage: 0.0,
            last_instant: start,
            seconds_per_percent: None,
        }
    }

    /// Feed the percentage reached at `now`
    pub fn observe(&mut self, percentage: f64, now: Instant) {
        let advanced = percentage - self.last_percentage;
        if advanced <= 0.0 {
            return;
        }

        let sample = now.saturating_duration_since(self.last_instant).as_secs_f64() / advanced;
        self.seconds_per_percent = Some(match self.seconds_per_percent {
            None => sample,
            Some(previous) => self.smoothing * sample + (1.0 - self.smoothing) * previous,
        });
        self.last_percentage = percentage;
        self.last_instant = now;
    }

    /// Smoothed seconds per percent, once a sample exists
    pub fn seconds_per_percent(&self) -> Option<f64> {
        self.seconds_per_percent
    }

    /// Estimated time to 100% from `percentage`
    pub fn remaining(&self, percentage: f64) -> Option<Duration> {
        let per_percent = self.seconds_per_percent?;
        let left = (100.0 - percentage).max(0.0);
        Some(Duration::from_secs_f64(per_percent * left))
    }
}

/// Progress of one scheduler run
#[derive(Debug, Clone)]
pub struct ProgressState {
    /// Sub-parts with an outcome
    pub parts_done: usize,
    /// Sub-parts scheduled
    pub total_parts: usize,
    /// Timestamp when the run started
    pub start_time: Instant,
    /// Last time progress was reported
    pub last_update: Instant,
    /// Minimum interval between progress updates
    pub update_interval: Duration,
    /// Minimum percentage delta that forces an update
    pub min_percentage_step: f64,
    /// Last reported completion percentage (0-100)
    pub last_reported_percentage: f64,
    /// Work item most recently started
    pub current_item: Option<String>,
    eta: EtaEstimator,
}

impl ProgressState {
    /// State for a run over `total_parts` sub-parts with default cadence
    pub fn new(total_parts: usize) -> Self {
        let now = Instant::now();
        Self {
            parts_done: 0,
            total_parts,
            start_time: now,
            last_update: now,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            min_percentage_step: DEFAULT_PERCENTAGE_STEP,
            last_reported_percentage: 0.0,
            current_item: None,
            eta: EtaEstimator::new(now, DEFAULT_SMOOTHING),
        }
    }

    /// Override update cadence
    pub fn with_cadence(mut self, update_interval: Duration, min_percentage_step: f64) -> Self {
        self.update_interval = update_interval;
        self.min_percentage_step = min_percentage_step;
        self
    }

    /// Count `completed` more sub-parts
    pub fn advance(&mut self, completed: usize) {
        self.parts_done = self.parts_done.saturating_add(completed).min(self.total_parts);
        let percentage = self.percentage();
        self.eta.observe(percentage, Instant::now());
    }

    /// Set the label of the item being worked on
    pub fn set_current_item<S: Into<String>>(&mut self, item: Option<S>) {
        self.current_item = item.map(Into::into);
    }

    /// Completion percentage (0-100); an empty run is complete
    pub fn percentage(&self) -> f64 {
        if self.total_parts == 0 {
            return 100.0;
        }
        (self.parts_done as f64 / self.total_parts as f64) * 100.0
    }

    /// Whether every scheduled sub-part has an outcome
    pub fn is_complete(&self) -> bool {
        self.parts_done >= self.total_parts
    }

    /// Whether an update should be emitted based on percentage, time or completion
    pub fn should_emit_update(&self) -> bool {
        if self.parts_done == 0 {
            return false;
        }
        if self.is_complete() {
            return true;
        }
        if self.percentage() - self.last_reported_percentage >= self.min_percentage_step {
            return true;
        }
        self.last_update.elapsed() >= self.update_interval
    }

    /// Call after emitting an update to reset the timer and cached percentage
    pub fn mark_emitted(&mut self) {
        self.last_update = Instant::now();
        self.last_reported_percentage = self.percentage();
    }

    /// Smoothed estimate of the remaining time
    pub fn estimate_remaining(&self) -> Option<Duration> {
        if self.is_complete() {
            return None;
        }
        self.eta.remaining(self.percentage())
    }

    /// Human-readable progress line
    pub fn format_progress(&self) -> String {
        let mut parts = vec![format!(
            "[PROGRESS] {}/{} parts - {:.1}% complete",
            self.parts_done,
            self.total_parts,
            self.percentage()
        )];

        if let Some(item) = &self.current_item {
            parts.push(format!("({item})"));
        }

        if let Some(remaining) = self.estimate_remaining() {
            parts.push(format!("- ~{} remaining", format_duration(remaining)));
        }

        parts.join(" ")
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{:.1}h", secs as f64 / 3600.0)
    }
}
