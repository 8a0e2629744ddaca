//! Wires stations and the monitor together and runs each on its own thread.

use crate::config::{RunConfig, StationConfig};
use crate::demand::{DemandModel, FittedDemand};
use crate::error::SimError;
use crate::monitor::{Monitor, MonitorSummary};
use crate::station::Station;
use crate::stats::{StationStats, StationSummary};
use crate::time::{GlobalTime, Instant};
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant as WallInstant};

pub type DemandFactory =
    Box<dyn Fn(&StationConfig) -> Result<Box<dyn DemandModel>, SimError> + Send + Sync>;

pub struct Federation {
    stations: Vec<StationConfig>,
    time: Arc<GlobalTime>,
    demand: DemandFactory,
}

/// Everything a finished run produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub wall_time: Duration,
    pub monitor: MonitorSummary,
    pub stations: Vec<StationStats>,
}

/// JSON form of a finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub wall_time_ns: u128,
    pub start: Instant,
    pub end: Instant,
    pub monitor: MonitorSummary,
    pub stations: Vec<StationSummary>,
}

impl Federation {
    pub fn new(stations: Vec<StationConfig>, time: GlobalTime) -> Self {
        Self {
            stations,
            time: Arc::new(time),
            demand: Box::new(
                |_: &StationConfig| -> Result<Box<dyn DemandModel>, SimError> {
                    Ok(Box::new(FittedDemand::new()?))
                },
            ),
        }
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(config.stations.clone(), config.master.global_time())
    }

    /// Replaces the demand model every station is built with.
    pub fn with_demand(mut self, factory: DemandFactory) -> Self {
        self.demand = factory;
        self
    }

    pub fn time(&self) -> &GlobalTime {
        &self.time
    }

    /// Runs the whole federation to completion. Any station or monitor
    /// failure fails the run; interrupted stations contribute no stats.
    pub fn run(&self) -> Result<RunOutcome, SimError> {
        if self.stations.is_empty() {
            return Err(SimError::ConfigMalformed {
                path: PathBuf::new(),
                detail: "no stations configured".to_string(),
            });
        }
        let started = WallInstant::now();
        let (to_monitor, monitor_inbox) = crossbeam_channel::unbounded();
        let mut monitor = Monitor::new(Arc::clone(&self.time), monitor_inbox);

        let mut built = Vec::with_capacity(self.stations.len());
        for cfg in &self.stations {
            let (tx, rx) = crossbeam_channel::unbounded();
            monitor.register(&cfg.name, tx);
            let station = Station::new(cfg, Arc::clone(&self.time), rx, to_monitor.clone())?
                .with_demand((self.demand)(cfg)?);
            built.push(station);
        }
        // Only stations keep the monitor's inbound channel alive.
        let fault_tx = to_monitor;

        let monitor_handle = thread::Builder::new()
            .name("monitor".to_string())
            .spawn(move || monitor.run())?;

        let mut handles: Vec<(String, JoinHandle<Result<StationStats, SimError>>)> = Vec::new();
        for station in built {
            let name = station.name().to_string();
            let fault = fault_tx.clone();
            let thread_name = name.clone();
            let handle = thread::Builder::new().name(name.clone()).spawn(move || {
                panic::catch_unwind(AssertUnwindSafe(|| station.run())).unwrap_or_else(|payload| {
                    let detail = panic_detail(&payload);
                    let _ = fault.send(crate::message::Message::Fault {
                        station: thread_name.clone(),
                        detail: detail.clone(),
                    });
                    Err(SimError::Invariant { station: thread_name, detail })
                })
            })?;
            handles.push((name, handle));
        }
        drop(fault_tx);

        let mut first_error = None;
        let mut stats = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            match handle.join() {
                Ok(Ok(s)) => stats.push(s),
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(payload) => {
                    first_error.get_or_insert(SimError::Invariant {
                        station: name,
                        detail: panic_detail(&payload),
                    });
                }
            }
        }
        let monitor = match monitor_handle.join() {
            Ok(result) => result,
            Err(payload) => Err(SimError::Invariant {
                station: "monitor".to_string(),
                detail: panic_detail(&payload),
            }),
        };

        let monitor = match (monitor, first_error) {
            (Err(e), _) => return Err(e),
            (Ok(_), Some(e)) => return Err(e),
            (Ok(m), None) => m,
        };
        let wall_time = started.elapsed();
        log::info!(
            "run finished in {:.3}s across {} stations",
            wall_time.as_secs_f64(),
            stats.len()
        );
        Ok(RunOutcome { wall_time, monitor, stations: stats })
    }
}

impl RunOutcome {
    pub fn summary(&self, time: &GlobalTime) -> RunSummary {
        RunSummary {
            wall_time_ns: self.wall_time.as_nanos(),
            start: time.start(),
            end: time.end(),
            monitor: self.monitor.clone(),
            stations: self.stations.iter().map(StationStats::summary).collect(),
        }
    }

    pub fn energy_given_wh(&self) -> f64 {
        self.stations.iter().map(|s| s.energy_given_wh).sum()
    }

    /// Writes one report per station, `simulatorReport.txt` and `summary.json`
    /// into `dir`, creating it if needed. Returns the written paths.
    pub fn write_reports(&self, dir: &Path, time: &GlobalTime) -> Result<Vec<PathBuf>, SimError> {
        std::fs::create_dir_all(dir)?;
        let mut written = Vec::with_capacity(self.stations.len() + 2);
        for stats in &self.stations {
            written.push(stats.write_report(dir)?);
        }

        let nanos = self.wall_time.as_nanos();
        let overall = dir.join("simulatorReport.txt");
        std::fs::write(
            &overall,
            format!(
                "The Simulation took {} nanoseconds or {} seconds",
                nanos,
                self.wall_time.as_secs_f64()
            ),
        )?;
        written.push(overall);

        let summary_path = dir.join("summary.json");
        let json = serde_json::to_string_pretty(&self.summary(time)).map_err(std::io::Error::other)?;
        std::fs::write(&summary_path, json)?;
        written.push(summary_path);
        Ok(written)
    }
}

fn panic_detail(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
