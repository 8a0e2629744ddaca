use crate::error::SimError;
use crate::event::{ChargeOutcome, ChargeType};
use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Per-station counters, updated synchronously by the station's loop.
#[derive(Debug, Clone)]
pub struct StationStats {
    pub station: String,
    pub full_fast_charges: u64,
    pub full_slow_charges: u64,
    pub partial_fast_charges: u64,
    pub partial_slow_charges: u64,
    pub no_fast_charges: u64,
    pub no_slow_charges: u64,
    pub fast_balks: u64,
    pub slow_balks: u64,
    pub backtracks: u64,
    /// Wh delivered by committed charges. Rollback subtracts what it unwinds.
    pub energy_given_wh: f64,
    sojourn_secs: Histogram<u64>,
}

impl StationStats {
    pub fn new(station: &str) -> Result<Self, SimError> {
        // Auto-resizing, so recording never rejects a sample.
        let sojourn_secs = Histogram::new(3).map_err(|e| SimError::Invariant {
            station: station.to_string(),
            detail: format!("sojourn histogram: {e:?}"),
        })?;
        Ok(Self {
            station: station.to_string(),
            full_fast_charges: 0,
            full_slow_charges: 0,
            partial_fast_charges: 0,
            partial_slow_charges: 0,
            no_fast_charges: 0,
            no_slow_charges: 0,
            fast_balks: 0,
            slow_balks: 0,
            backtracks: 0,
            energy_given_wh: 0.0,
            sojourn_secs,
        })
    }

    pub fn record_departure(&mut self, charge_type: ChargeType, outcome: ChargeOutcome, sojourn_secs: u64) {
        let counter = match (outcome, charge_type) {
            (ChargeOutcome::Full, ChargeType::Fast) => &mut self.full_fast_charges,
            (ChargeOutcome::Full, ChargeType::Slow) => &mut self.full_slow_charges,
            (ChargeOutcome::Partial, ChargeType::Fast) => &mut self.partial_fast_charges,
            (ChargeOutcome::Partial, ChargeType::Slow) => &mut self.partial_slow_charges,
            (ChargeOutcome::None, ChargeType::Fast) => &mut self.no_fast_charges,
            (ChargeOutcome::None, ChargeType::Slow) => &mut self.no_slow_charges,
        };
        *counter += 1;
        self.sojourn_secs.saturating_record(sojourn_secs);
    }

    /// Takes back a departure that a rollback has returned to the event
    /// queue.
    pub fn undo_departure(
        &mut self,
        charge_type: ChargeType,
        outcome: ChargeOutcome,
        sojourn_secs: u64,
    ) -> Result<(), SimError> {
        let counter = match (outcome, charge_type) {
            (ChargeOutcome::Full, ChargeType::Fast) => &mut self.full_fast_charges,
            (ChargeOutcome::Full, ChargeType::Slow) => &mut self.full_slow_charges,
            (ChargeOutcome::Partial, ChargeType::Fast) => &mut self.partial_fast_charges,
            (ChargeOutcome::Partial, ChargeType::Slow) => &mut self.partial_slow_charges,
            (ChargeOutcome::None, ChargeType::Fast) => &mut self.no_fast_charges,
            (ChargeOutcome::None, ChargeType::Slow) => &mut self.no_slow_charges,
        };
        *counter = counter.checked_sub(1).ok_or_else(|| SimError::Invariant {
            station: self.station.clone(),
            detail: format!("undoing a {outcome:?} {} charge that was never counted", charge_type.label()),
        })?;

        let mut single = Histogram::<u64>::new_from(&self.sojourn_secs);
        single.saturating_record(sojourn_secs);
        self.sojourn_secs.subtract(&single).map_err(|e| SimError::Invariant {
            station: self.station.clone(),
            detail: format!("sojourn histogram: {e:?}"),
        })
    }

    pub fn undo_balk(&mut self, charge_type: ChargeType) -> Result<(), SimError> {
        let counter = match charge_type {
            ChargeType::Fast => &mut self.fast_balks,
            ChargeType::Slow => &mut self.slow_balks,
        };
        *counter = counter.checked_sub(1).ok_or_else(|| SimError::Invariant {
            station: self.station.clone(),
            detail: format!("undoing a {} balk that was never counted", charge_type.label()),
        })?;
        Ok(())
    }

    pub fn record_balk(&mut self, charge_type: ChargeType) {
        match charge_type {
            ChargeType::Fast => self.fast_balks += 1,
            ChargeType::Slow => self.slow_balks += 1,
        }
    }

    pub fn total_charges(&self) -> u64 {
        self.full_fast_charges
            + self.full_slow_charges
            + self.partial_fast_charges
            + self.partial_slow_charges
    }

    pub fn total_balks(&self) -> u64 {
        self.fast_balks + self.slow_balks
    }

    pub fn energy_given_kwh(&self) -> f64 {
        self.energy_given_wh / 1000.0
    }

    pub fn average_kwh_per_charge(&self) -> f64 {
        match self.total_charges() {
            0 => 0.0,
            n => self.energy_given_kwh() / n as f64,
        }
    }

    pub fn sojourn_percentile(&self, percentile: f64) -> Option<u64> {
        if self.sojourn_secs.len() == 0 {
            return None;
        }
        Some(self.sojourn_secs.value_at_percentile(percentile))
    }

    pub fn render_report(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "At this station, there were:");
        let _ = writeln!(out, "{} fast charges that received all desired energy", self.full_fast_charges);
        let _ = writeln!(out, "{} slow charges that received all desired energy", self.full_slow_charges);
        let _ = writeln!(out, "{} total charging events", self.total_charges());
        let _ = writeln!(out, "{} fast charges that got impatient", self.fast_balks);
        let _ = writeln!(out, "{} slow charges that got impatient", self.slow_balks);
        let _ = writeln!(out, "{} times backtracked", self.backtracks);
        let _ = writeln!(out);
        let _ = writeln!(out, "{} kWh distributed", self.energy_given_kwh());
        let _ = writeln!(out, "{} average kWh distributed per car", self.average_kwh_per_charge());
        match (self.sojourn_percentile(50.0), self.sojourn_percentile(99.0)) {
            (Some(p50), Some(p99)) => {
                let _ = writeln!(out, "{p50} / {p99} seconds at the station (p50 / p99)");
            }
            _ => {
                let _ = writeln!(out, "no completed visits");
            }
        }
        out
    }

    /// Writes `<dir>/<station>.txt` and returns its path.
    pub fn write_report(&self, dir: &Path) -> std::io::Result<PathBuf> {
        let path = dir.join(format!("{}.txt", self.station));
        std::fs::write(&path, self.render_report())?;
        Ok(path)
    }

    pub fn summary(&self) -> StationSummary {
        StationSummary {
            station: self.station.clone(),
            full_fast_charges: self.full_fast_charges,
            full_slow_charges: self.full_slow_charges,
            partial_fast_charges: self.partial_fast_charges,
            partial_slow_charges: self.partial_slow_charges,
            no_fast_charges: self.no_fast_charges,
            no_slow_charges: self.no_slow_charges,
            fast_balks: self.fast_balks,
            slow_balks: self.slow_balks,
            backtracks: self.backtracks,
            energy_given_wh: self.energy_given_wh,
            sojourn_p50_secs: self.sojourn_percentile(50.0),
            sojourn_p99_secs: self.sojourn_percentile(99.0),
        }
    }
}

/// Serializable snapshot of [`StationStats`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationSummary {
    pub station: String,
    pub full_fast_charges: u64,
    pub full_slow_charges: u64,
    pub partial_fast_charges: u64,
    pub partial_slow_charges: u64,
    pub no_fast_charges: u64,
    pub no_slow_charges: u64,
    pub fast_balks: u64,
    pub slow_balks: u64,
    pub backtracks: u64,
    pub energy_given_wh: f64,
    pub sojourn_p50_secs: Option<u64>,
    pub sojourn_p99_secs: Option<u64>,
}
