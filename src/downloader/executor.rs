//! Download scheduler
//!
//! Runs a collection of work items on a bounded pool of worker tasks:
//! 1. the worker count is derived from the configured parallelism and the
//!    item count
//! 2. items are dealt into balanced chunks (see [`balance`](super::balance)),
//!    optionally split again for sub-workers
//! 3. every worker walks its chunk, streaming per-sub-part outcomes over a
//!    channel to a single aggregator
//! 4. the aggregator owns the [`Totals`], the progress state and the
//!    caller's outcome callback
//!
//! A panicking worker does not stop its siblings; the run finishes and the
//! panic surfaces as [`DownloadError::WorkerFailed`]. An authentication
//! failure does: every worker is aborted and the run returns
//! [`DownloadError::Auth`].

use futures::future::join_all;
use futures_util::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::SchedulerConfig;
use crate::downloader::balance::{chunk_cost, partition, partition_two_level, plan_worker_count};
use crate::downloader::item::ItemExecutor;
use crate::downloader::job::{DownloadOutcome, Totals};
use crate::downloader::progress::{ProgressSink, ProgressState, TracingProgressSink};
use crate::auth::AuthError;
use crate::downloader::DownloadError;
use crate::identifier::ContentId;
use crate::metrics::record_part_outcome;
use crate::WorkItem;

/// Messages from workers to the aggregator
#[derive(Debug)]
enum WorkerEvent {
    ItemStarted { item_id: ContentId, title: String },
    Outcome(DownloadOutcome),
    AuthFailed(AuthError),
}

/// How a run would be laid out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulePlan {
    /// Worker tasks spawned
    pub workers: usize,
    /// Sub-workers per worker
    pub sub_workers: usize,
    /// Sub-part count assigned to each worker
    pub chunk_costs: Vec<usize>,
    /// Sub-parts across all items
    pub total_parts: usize,
}

/// Runs work items on a balanced worker pool
pub struct DownloadScheduler {
    config: SchedulerConfig,
    progress: Arc<dyn ProgressSink>,
}

impl DownloadScheduler {
    /// Scheduler reporting progress through `tracing`
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            progress: Arc::new(TracingProgressSink),
        }
    }

    /// Report progress to `sink` instead
    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    /// Scheduler settings
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Compute the worker layout for `items` without running anything
    pub fn plan(&self, items: &[WorkItem]) -> SchedulePlan {
        let workers = plan_worker_count(
            self.config.parallelism(),
            items.len(),
            self.config.min_items_per_worker,
        );
        let costs: Vec<usize> = items.iter().map(WorkItem::cost).collect();
        let total_parts = costs.iter().sum();
        let chunk_costs = partition(costs, workers)
            .iter()
            .map(|chunk| chunk_cost(chunk))
            .collect();

        SchedulePlan {
            workers,
            sub_workers: self.config.sub_workers.max(1),
            chunk_costs,
            total_parts,
        }
    }

    /// Download every sub-part of `items`
    ///
    /// # Errors
    /// - [`DownloadError::InvalidItem`] before anything runs if an item is
    ///   malformed
    /// - [`DownloadError::WorkerFailed`] if a worker task panicked; the
    ///   remaining workers still finish and their totals are attached
    /// - [`DownloadError::Auth`] if an executor lost authentication; the
    ///   other workers are aborted
    /// - [`DownloadError::InconsistentTotals`] if the outcome count does not
    ///   match the scheduled sub-parts
    pub async fn run<I, E>(&self, items: I, executor: Arc<E>) -> Result<Totals, DownloadError>
    where
        I: IntoIterator<Item = WorkItem>,
        E: ItemExecutor + ?Sized + 'static,
    {
        self.run_with(items, executor, |_| {}).await
    }

    /// Like [`run`](Self::run), calling `on_outcome` for every outcome as it
    /// arrives
    pub async fn run_with<I, E, F>(
        &self,
        items: I,
        executor: Arc<E>,
        mut on_outcome: F,
    ) -> Result<Totals, DownloadError>
    where
        I: IntoIterator<Item = WorkItem>,
        E: ItemExecutor + ?Sized + 'static,
        F: FnMut(&DownloadOutcome),
    {
        let started = Instant::now();
        let items = prepare_items(items)?;
        let plan = self.plan(&items);

        info!(
            items = items.len(),
            parts = plan.total_parts,
            workers = plan.workers,
            sub_workers = plan.sub_workers,
            chunk_costs = ?plan.chunk_costs,
            "Starting download run"
        );

        let mut totals = Totals::new(plan.total_parts);
        if items.is_empty() {
            self.progress.finish(&totals);
            return Ok(totals);
        }

        let (events, mut inbox) = unbounded_channel();
        let mut workers = JoinSet::new();

        for (index, sub_chunks) in partition_two_level(items, plan.workers, plan.sub_workers)
            .into_iter()
            .enumerate()
        {
            let span = info_span!("worker", index = index);
            workers.spawn(
                run_worker(sub_chunks, Arc::clone(&executor), events.clone()).instrument(span),
            );
        }
        drop(events);

        let mut progress = ProgressState::new(plan.total_parts)
            .with_cadence(self.config.progress_interval, self.config.progress_step);
        let mut auth_failure = None;

        while let Some(event) = inbox.recv().await {
            match event {
                WorkerEvent::ItemStarted { item_id, title } => {
                    totals.items_visited += 1;
                    progress.set_current_item(Some(format!("{title} ({item_id})")));
                }
                WorkerEvent::Outcome(outcome) => {
                    debug!(
                        item_id = %outcome.item_id,
                        part = outcome.part_index,
                        status = %outcome.status,
                        "Sub-part finished"
                    );
                    record_part_outcome(outcome.status);
                    totals.record(&outcome);
                    on_outcome(&outcome);

                    progress.advance(1);
                    if progress.should_emit_update() {
                        self.progress.update(
                            progress.parts_done,
                            plan.total_parts,
                            &progress.format_progress(),
                        );
                        progress.mark_emitted();
                    }
                }
                WorkerEvent::AuthFailed(e) => {
                    if auth_failure.is_none() {
                        error!(error = %e, "Authentication failed, stopping workers");
                        workers.abort_all();
                        auth_failure = Some(e);
                    }
                }
            }
        }

        let mut failures = Vec::new();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    error!(error = %e, "Download worker failed");
                    failures.push(e.to_string());
                }
                Ok(()) => {}
            }
        }

        totals.elapsed = started.elapsed();
        self.progress.finish(&totals);

        if let Some(e) = auth_failure {
            return Err(DownloadError::Auth(e));
        }

        if !failures.is_empty() {
            return Err(DownloadError::WorkerFailed {
                errors: failures,
                totals: Box::new(totals),
            });
        }

        if !totals.is_consistent() {
            return Err(DownloadError::InconsistentTotals {
                recorded: totals.attempted(),
                scheduled: totals.total_parts,
            });
        }

        info!("Download run finished: {}", totals.summary());
        Ok(totals)
    }
}

impl std::fmt::Debug for DownloadScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadScheduler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Validate items and drop repeated identifiers
fn prepare_items<I>(items: I) -> Result<Vec<WorkItem>, DownloadError>
where
    I: IntoIterator<Item = WorkItem>,
{
    let mut seen = HashSet::new();
    let mut prepared = Vec::new();

    for item in items {
        item.validate().map_err(|reason| DownloadError::InvalidItem {
            id: item.id,
            reason,
        })?;
        if !seen.insert(item.id) {
            warn!(item_id = %item.id, "Duplicate work item ignored");
            continue;
        }
        prepared.push(item);
    }

    Ok(prepared)
}

async fn run_worker<E>(
    sub_chunks: Vec<Vec<WorkItem>>,
    executor: Arc<E>,
    events: UnboundedSender<WorkerEvent>,
) where
    E: ItemExecutor + ?Sized,
{
    let runs = sub_chunks
        .into_iter()
        .map(|chunk| run_chunk(chunk, executor.as_ref(), &events));
    join_all(runs).await;
}

async fn run_chunk<E>(chunk: Vec<WorkItem>, executor: &E, events: &UnboundedSender<WorkerEvent>)
where
    E: ItemExecutor + ?Sized,
{
    for item in &chunk {
        // The aggregator outlives every worker, so sends only fail after a
        // panic in the aggregator itself
        let _ = events.send(WorkerEvent::ItemStarted {
            item_id: item.id,
            title: item.title.clone(),
        });

        let mut reported = vec![false; item.parts.len()];
        let mut outcomes = executor.execute(item);

        while let Some(next) = outcomes.next().await {
            let outcome = match next {
                Ok(outcome) => outcome,
                Err(e) => {
                    let _ = events.send(WorkerEvent::AuthFailed(e));
                    return;
                }
            };
            let index = outcome.part_index;
            if outcome.item_id != item.id || index >= reported.len() || reported[index] {
                warn!(
                    item_id = %item.id,
                    reported_item = %outcome.item_id,
                    part = index,
                    "Dropping unexpected outcome"
                );
                continue;
            }
            reported[index] = true;
            let _ = events.send(WorkerEvent::Outcome(outcome));
        }
        drop(outcomes);

        for (index, done) in reported.iter().enumerate() {
            if !done {
                warn!(item_id = %item.id, part = index, "Executor reported no outcome");
                let _ = events.send(WorkerEvent::Outcome(DownloadOutcome::failed(
                    item.id,
                    index,
                    item.parts[index].url.clone(),
                    "no outcome reported",
                )));
            }
        }
    }
}
