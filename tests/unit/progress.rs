//! Unit tests for progress tracking

use std::time::{Duration, Instant};

use artwork_crawler::downloader::progress::{EtaEstimator, ProgressState};

#[test]
fn test_progress_line() {
    let mut state = ProgressState::new(8);
    state.set_current_item(Some("work 42"));
    state.advance(2);

    let line = state.format_progress();
    assert!(line.starts_with("[PROGRESS] 2/8 parts - 25.0% complete (work 42)"), "{line}");
}

#[test]
fn test_update_cadence() {
    let mut state = ProgressState::new(200).with_cadence(Duration::from_secs(3600), 5.0);
    assert!(!state.should_emit_update());

    state.advance(4);
    assert!(!state.should_emit_update());

    state.advance(6);
    assert!(state.should_emit_update());
    state.mark_emitted();
    assert!(!state.should_emit_update());

    state.advance(190);
    assert!(state.is_complete());
    assert!(state.should_emit_update());
    assert!(state.estimate_remaining().is_none());
}

#[test]
fn test_advance_is_capped() {
    let mut state = ProgressState::new(3);
    state.advance(10);
    assert_eq!(state.parts_done, 3);
    assert_eq!(state.percentage(), 100.0);
}

#[test]
fn test_empty_run_is_complete() {
    let state = ProgressState::new(0);
    assert!(state.is_complete());
    assert_eq!(state.percentage(), 100.0);
}

#[test]
fn test_eta_smoothing() {
    let start = Instant::now();
    let mut eta = EtaEstimator::new(start, 0.5);
    assert!(eta.remaining(0.0).is_none());

    eta.observe(10.0, start + Duration::from_secs(10));
    let first = eta.seconds_per_percent().unwrap();
    assert!((first - 1.0).abs() < 1e-9);

    eta.observe(20.0, start + Duration::from_secs(40));
    let smoothed = eta.seconds_per_percent().unwrap();
    assert!(smoothed > 1.0 && smoothed < 3.0, "{smoothed}");

    let remaining = eta.remaining(20.0).unwrap();
    assert!((remaining.as_secs_f64() - smoothed * 80.0).abs() < 1e-6);
}
