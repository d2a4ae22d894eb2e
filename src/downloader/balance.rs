//! Work balancing
//!
//! Work items differ wildly in cost (a work can have one page or two
//! hundred). Items are dealt longest-first, each to the currently
//! least-loaded chunk with ties going to the lowest index. With equal costs
//! this degenerates to plain round-robin dealing; with skewed costs the
//! expensive items end up alone while cheap ones fill the other chunks.

use std::cmp::Reverse;

use crate::WorkItem;

/// Anything with a scheduling cost
pub trait Weighted {
    /// Relative cost, e.g. number of sub-parts
    fn cost(&self) -> usize;
}

impl Weighted for WorkItem {
    fn cost(&self) -> usize {
        WorkItem::cost(self)
    }
}

impl Weighted for usize {
    fn cost(&self) -> usize {
        *self
    }
}

/// Number of workers for `item_count` items
///
/// Starts from `min(parallelism, item_count)` and drops workers while a
/// worker would receive fewer than `min_items_per_worker` items on average.
/// Never below one worker for a non-empty run.
pub fn plan_worker_count(
    parallelism: usize,
    item_count: usize,
    min_items_per_worker: usize,
) -> usize {
    if item_count == 0 {
        return 0;
    }

    let mut workers = parallelism.max(1).min(item_count);
    while workers > 1 && item_count.div_ceil(workers) < min_items_per_worker {
        workers -= 1;
    }
    workers
}

/// Split `items` into at most `chunks` balanced chunks
///
/// No chunk is empty: fewer items than chunks yields one chunk per item.
/// Within a chunk, items keep the descending-cost order they were dealt in.
pub fn partition<T: Weighted>(items: Vec<T>, chunks: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }

    let count = chunks.max(1).min(items.len());
    let mut sorted = items;
    sorted.sort_by_key(|item| Reverse(item.cost()));

    let mut buckets: Vec<Vec<T>> = (0..count).map(|_| Vec::new()).collect();
    let mut loads = vec![0usize; count];

    for item in sorted {
        let target = (0..count)
            .min_by_key(|&index| (loads[index], index))
            .unwrap_or(0);
        // Zero-cost items still count so they spread like the rest
        loads[target] += item.cost().max(1);
        buckets[target].push(item);
    }

    buckets
}

/// Two-level split: `workers` chunks, each split again into up to
/// `sub_workers` sub-chunks
pub fn partition_two_level<T: Weighted>(
    items: Vec<T>,
    workers: usize,
    sub_workers: usize,
) -> Vec<Vec<Vec<T>>> {
    partition(items, workers)
        .into_iter()
        .map(|chunk| partition(chunk, sub_workers))
        .collect()
}

/// Total cost of a chunk
pub fn chunk_cost<T: Weighted>(chunk: &[T]) -> usize {
    chunk.iter().map(Weighted::cost).sum()
}
