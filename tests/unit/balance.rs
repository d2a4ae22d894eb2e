//! Unit tests for work balancing

use artwork_crawler::downloader::balance::{
    chunk_cost, partition, partition_two_level, plan_worker_count,
};
use artwork_crawler::{ContentId, SubPart, WorkItem};

fn item(id: u64, pages: usize) -> WorkItem {
    let parts = (0..pages)
        .map(|n| SubPart::new(n, format!("https://img.example/{id}_{n}"), format!("{id}_{n}.png")))
        .collect();
    WorkItem::new(ContentId::new(id), "t", "a", parts)
}

#[test]
fn test_single_heavy_item_gets_its_own_chunk() {
    let items = vec![item(1, 1), item(2, 1), item(3, 1), item(4, 1), item(5, 50)];
    let chunks = partition(items, 4);

    assert_eq!(chunks.len(), 4);
    let heavy = chunks
        .iter()
        .find(|chunk| chunk.iter().any(|w| w.id == ContentId::new(5)))
        .unwrap();
    assert_eq!(heavy.len(), 1);
    assert_eq!(chunk_cost(heavy), 50);

    let total: usize = chunks.iter().map(|c| chunk_cost(c)).sum();
    assert_eq!(total, 54);
}

#[test]
fn test_equal_costs_are_dealt_round_robin() {
    let chunks = partition(vec![3usize; 10], 3);
    let sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![4, 3, 3]);
}

#[test]
fn test_every_item_lands_exactly_once() {
    let items: Vec<WorkItem> = (1..=37).map(|id| item(id, (id as usize % 7) + 1)).collect();
    let chunks = partition(items, 5);

    let mut ids: Vec<u64> = chunks.iter().flatten().map(|w| w.id.get()).collect();
    ids.sort_unstable();
    assert_eq!(ids, (1..=37).collect::<Vec<_>>());
    assert!(chunks.iter().all(|chunk| !chunk.is_empty()));
}

#[test]
fn test_skewed_costs_balance_load() {
    let costs = vec![40usize, 30, 20, 10, 10, 10, 10, 10];
    let chunks = partition(costs, 3);
    let loads: Vec<usize> = chunks.iter().map(|c| chunk_cost(c)).collect();

    let max = *loads.iter().max().unwrap();
    let min = *loads.iter().min().unwrap();
    assert!(max - min <= 10, "loads too uneven: {loads:?}");
}

#[test]
fn test_two_level_split() {
    let nested = partition_two_level(vec![1usize; 12], 2, 3);
    assert_eq!(nested.len(), 2);
    for chunk in &nested {
        assert_eq!(chunk.len(), 3);
        assert_eq!(chunk.iter().map(Vec::len).sum::<usize>(), 6);
    }
}

#[test]
fn test_worker_count_respects_minimum_items() {
    assert_eq!(plan_worker_count(8, 243, 2), 8);
    assert_eq!(plan_worker_count(8, 7, 2), 6);
    assert_eq!(plan_worker_count(8, 7, 10), 1);
}
