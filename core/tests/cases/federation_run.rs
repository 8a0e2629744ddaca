use crate::common::*;
use voltwarp_core::*;

fn fleet(chargers: &[(&str, u32)], arrival_rate: u32) -> Vec<StationConfig> {
    chargers
        .iter()
        .enumerate()
        .map(|(idx, (name, fast))| StationConfig {
            arrival_rate,
            seed: Some(idx as u64),
            ..station_config(name, *fast, 0, 50_000.0)
        })
        .collect()
}

/// Every station gave out exactly the energy of the charges it counted.
fn assert_energy_balanced(outcome: &RunOutcome, wh_per_charge: f64) {
    for stats in &outcome.stations {
        assert_eq!(
            stats.energy_given_wh,
            stats.total_charges() as f64 * wh_per_charge,
            "{} after {} backtracks",
            stats.station,
            stats.backtracks
        );
    }
}

#[test]
fn test_three_stations_terminate_and_report() {
    let stations: Vec<StationConfig> = ["A", "B", "C"]
        .iter()
        .enumerate()
        .map(|(idx, name)| StationConfig {
            name: name.to_string(),
            arrival_rate: 40,
            seed: Some(idx as u64),
            ..StationConfig::default()
        })
        .collect();
    let time = GlobalTime::new(Instant::from_hms(8, 0, 0), 3_600);
    let federation = Federation::new(stations, time);

    let outcome = federation.run().expect("run should finish");

    assert_eq!(outcome.stations.len(), 3);
    assert!(outcome.monitor.final_gmt >= Instant::from_hms(9, 0, 0));
    let balked: u64 = outcome.stations.iter().map(StationStats::total_balks).sum();
    // With more than one station every fresh balk has somewhere to go, and
    // every balk a rollback took back was followed by a retread.
    let monitor = &outcome.monitor;
    assert_eq!(balked, monitor.forwarded - monitor.retreads_routed - monitor.dropped);
    for stats in &outcome.stations {
        // Rollback refunds never take more than was given.
        assert!(stats.energy_given_wh > -1e-6, "{}", stats.station);
        if stats.total_charges() == 0 {
            assert!(stats.energy_given_wh.abs() < 1e-6, "{}", stats.station);
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let written = outcome.write_reports(dir.path(), federation.time()).unwrap();
    assert_eq!(written.len(), 5);
    for file in ["A.txt", "B.txt", "C.txt", "simulatorReport.txt", "summary.json"] {
        assert!(dir.path().join(file).is_file(), "missing {file}");
    }
    let overall = std::fs::read_to_string(dir.path().join("simulatorReport.txt")).unwrap();
    assert!(overall.starts_with("The Simulation took "));

    let json = std::fs::read_to_string(dir.path().join("summary.json")).unwrap();
    let summary: RunSummary = serde_json::from_str(&json).unwrap();
    assert_eq!(summary.stations.len(), 3);
    assert_eq!(summary.end, Instant::from_hms(9, 0, 0));
}

#[test]
fn test_uncontended_stations_charge_everyone() {
    let time = GlobalTime::new(Instant::ZERO, 86_400);
    let federation =
        Federation::new(fleet(&[("A", 3), ("B", 3)], 3), time).with_demand(fixed_demand(20.0));

    let outcome = federation.run().expect("run should finish");

    let full: u64 = outcome.stations.iter().map(|s| s.full_fast_charges).sum();
    assert_eq!(full, 6);
    assert_eq!(outcome.energy_given_wh(), 120_000.0);
    assert_eq!(outcome.monitor.forwarded, 0);
    assert!(outcome.stations.iter().all(|s| s.total_balks() == 0));
    assert_energy_balanced(&outcome, 20_000.0);
}

#[test]
fn test_balks_are_served_by_the_other_station() {
    // A has one charger for three simultaneous vehicles; B has plenty.
    let time = GlobalTime::new(Instant::ZERO, 86_400);
    let federation =
        Federation::new(fleet(&[("A", 1), ("B", 5)], 3), time).with_demand(fixed_demand(20.0));

    let outcome = federation.run().expect("run should finish");

    let a = &outcome.stations[0];
    let b = &outcome.stations[1];
    assert_eq!(a.station, "A");
    assert_eq!(a.full_fast_charges, 1);
    assert_eq!(a.fast_balks, 2);
    assert_eq!(b.full_fast_charges, 5);
    assert_eq!(b.total_balks(), 0);
    assert_eq!(b.backtracks, 2);
    assert_eq!(outcome.monitor.forwarded, 2);
    assert_eq!(outcome.energy_given_wh(), 120_000.0);
    assert_energy_balanced(&outcome, 20_000.0);
}

#[test]
fn test_three_station_rollbacks_keep_energy_balanced() {
    // A and B each turn one vehicle away; only C has chargers to spare, so
    // forwards may pass through a full station before landing there.
    let time = GlobalTime::new(Instant::ZERO, 86_400);
    let federation = Federation::new(fleet(&[("A", 1), ("B", 1), ("C", 4)], 2), time)
        .with_demand(fixed_demand(20.0));

    let outcome = federation.run().expect("run should finish");

    assert_energy_balanced(&outcome, 20_000.0);
    let charges: u64 = outcome.stations.iter().map(StationStats::total_charges).sum();
    assert!((4..=6).contains(&charges), "{charges} charges");
    assert!(outcome.monitor.forwarded >= 2);
    let backtracks: u64 = outcome.stations.iter().map(|s| s.backtracks).sum();
    assert!(backtracks >= 2);
    assert_eq!(outcome.energy_given_wh(), charges as f64 * 20_000.0);
}

#[test]
fn test_empty_federation_is_rejected() {
    let federation = Federation::new(Vec::new(), GlobalTime::new(Instant::ZERO, 3_600));

    assert!(matches!(federation.run(), Err(SimError::ConfigMalformed { .. })));
}
