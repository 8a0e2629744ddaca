use crate::common::*;
use voltwarp_core::event::{HistoryQueue, TimeQueue};
use voltwarp_core::*;

#[test]
fn test_time_queue_pops_earliest_then_fifo() {
    let mut q = TimeQueue::new();
    q.push(Instant(30), "late");
    q.push(Instant(10), "first");
    q.push(Instant(10), "second");
    q.push(Instant(20), "middle");

    assert_eq!(q.peek_time(), Some(Instant(10)));
    let order: Vec<&str> = std::iter::from_fn(|| q.pop()).collect();
    assert_eq!(order, vec!["first", "second", "middle", "late"]);
    assert!(q.is_empty());
}

#[test]
fn test_extract_returns_matches_in_order() {
    let mut q = TimeQueue::new();
    for ts in [50, 10, 40, 20, 30] {
        q.push(Instant(ts), ts);
    }

    let late = q.extract(|ts| *ts > 25);

    assert_eq!(late, vec![30, 40, 50]);
    assert_eq!(q.len(), 2);
    assert_eq!(q.pop(), Some(10));
}

#[test]
fn test_remove_one_takes_a_single_copy() {
    let mut q = TimeQueue::new();
    let a = fast(100, 1_000.0);
    q.push(a.ts, a);
    q.push(a.ts, a);
    q.push(Instant(200), fast(200, 1_000.0));

    assert!(q.remove_one(&a));
    assert_eq!(q.len(), 2);
    assert!(q.remove_one(&a));
    assert!(!q.remove_one(&a));
    assert_eq!(q.len(), 1);
}

#[test]
fn test_history_is_newest_first() {
    let mut history = HistoryQueue::new();
    history.push(HistoryEntry::Arrival(fast(100, 1_000.0)));
    history.push(HistoryEntry::BalkRecord { ts: Instant(900), arrival: fast(200, 1_000.0) });
    history.push(HistoryEntry::Arrival(slow(500, 1_000.0)));

    assert_eq!(history.newest_ts(), Some(Instant(900)));
    let order: Vec<Instant> = std::iter::from_fn(|| history.pop_newest()).map(|e| e.ts()).collect();
    assert_eq!(order, vec![Instant(900), Instant(500), Instant(100)]);
}

#[test]
fn test_history_lookup_and_collection() {
    let mut history = HistoryQueue::new();
    let old = fast(100, 1_000.0);
    let recent = fast(700, 1_000.0);
    history.push(HistoryEntry::Arrival(old));
    history.push(HistoryEntry::Arrival(recent));
    history.push(HistoryEntry::BalkRecord { ts: Instant(800), arrival: slow(300, 1_000.0) });

    // Balk records are not charges.
    assert!(!history.contains_arrival(&slow(300, 1_000.0)));
    assert!(history.contains_arrival(&recent));

    assert_eq!(history.discard_before(Instant(700)), 1);
    assert!(!history.contains_arrival(&old));
    assert!(history.remove_arrival(&recent));
    assert!(!history.remove_arrival(&recent));
    assert_eq!(history.len(), 1);
}

#[test]
fn test_history_finds_departure_by_full_identity() {
    let mut history = HistoryQueue::new();
    let small = fast(100, 1_000.0);
    let large = fast(100, 2_000.0);
    for arrival in [small, large] {
        history.push(HistoryEntry::Departure(Departure {
            ts: Instant(900),
            original_arrival_ts: arrival.ts,
            service_start_ts: arrival.ts,
            charge_type: arrival.charge_type,
            charge_wh: arrival.charge_desired_wh,
            outcome: ChargeOutcome::Full,
        }));
    }

    let removed = history.remove_departure_for(&large).unwrap();

    assert!(removed.is_for(&large));
    assert_eq!(removed.sojourn_secs(), 800);
    assert!(history.remove_departure_for(&large).is_none());
    assert!(history.remove_departure_for(&small).is_some());
    assert!(history.is_empty());
}

#[test]
fn test_undo_takes_back_counters_and_sojourn() {
    let mut stats = StationStats::new("Depot").unwrap();
    stats.record_departure(ChargeType::Fast, ChargeOutcome::Full, 600);
    stats.record_departure(ChargeType::Fast, ChargeOutcome::Full, 1_200);
    stats.record_balk(ChargeType::Slow);

    stats.undo_departure(ChargeType::Fast, ChargeOutcome::Full, 1_200).unwrap();
    stats.undo_balk(ChargeType::Slow).unwrap();

    assert_eq!(stats.full_fast_charges, 1);
    assert_eq!(stats.slow_balks, 0);
    assert_eq!(stats.sojourn_percentile(100.0), Some(600));
    assert!(matches!(
        stats.undo_departure(ChargeType::Slow, ChargeOutcome::Full, 600),
        Err(SimError::Invariant { .. })
    ));
    assert!(matches!(stats.undo_balk(ChargeType::Fast), Err(SimError::Invariant { .. })));
}

#[test]
fn test_gmt_only_moves_forward() {
    let time = GlobalTime::new(Instant(1_000), 500);
    assert_eq!(time.gmt(), Instant(1_000));
    assert_eq!(time.end(), Instant(1_500));

    assert_eq!(time.advance_gmt(Instant(1_200)), Instant(1_200));
    assert_eq!(time.advance_gmt(Instant(1_100)), Instant(1_200));
    assert_eq!(time.gmt(), Instant(1_200));
}

#[test]
fn test_instant_formatting() {
    assert_eq!(Instant::from_hms(8, 5, 9).to_string(), "d0+08:05:09");
    assert_eq!((Instant::from_hms(23, 0, 0) + 7_200).to_string(), "d1+01:00:00");
    assert_eq!(Instant(u64::MAX) + 1, Instant(u64::MAX));
    assert_eq!(Instant(10).saturating_sub(Instant(20)), 0);
}

#[test]
fn test_report_without_charges() {
    let stats = StationStats::new("Idle").unwrap();

    assert_eq!(stats.average_kwh_per_charge(), 0.0);
    assert_eq!(stats.sojourn_percentile(50.0), None);
    let report = stats.render_report();
    assert!(report.starts_with("At this station, there were:"));
    assert!(report.contains("0 total charging events"));
    assert!(report.contains("no completed visits"));
}

#[test]
fn test_report_counts_and_writes() {
    let mut stats = StationStats::new("Depot").unwrap();
    stats.record_departure(ChargeType::Fast, ChargeOutcome::Full, 1_800);
    stats.record_departure(ChargeType::Slow, ChargeOutcome::Full, 3_600);
    stats.record_balk(ChargeType::Fast);
    stats.energy_given_wh = 30_000.0;

    assert_eq!(stats.total_charges(), 2);
    assert_eq!(stats.average_kwh_per_charge(), 15.0);
    let report = stats.render_report();
    assert!(report.contains("1 fast charges that received all desired energy"));
    assert!(report.contains("1 fast charges that got impatient"));
    assert!(report.contains("30 kWh distributed"));

    let dir = tempfile::tempdir().unwrap();
    let path = stats.write_report(dir.path()).unwrap();
    assert_eq!(path, dir.path().join("Depot.txt"));
    assert_eq!(std::fs::read_to_string(path).unwrap(), report);
}
