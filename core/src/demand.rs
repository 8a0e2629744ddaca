//! Demand models: when vehicles show up and how much energy they want.

use crate::error::SimError;
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Beta, Distribution, Gamma};

/// Shape and scale of the energy demand fit, in kWh.
pub const ENERGY_GAMMA_SHAPE: f64 = 2.312_759_812_949_007_5;
pub const ENERGY_GAMMA_SCALE: f64 = 3.870_663_519_530_382;
/// Alpha and beta of the time-of-day fit, as a fraction of a day.
pub const TIME_OF_DAY_BETA_ALPHA: f64 = 4.614_972_052_581_306;
pub const TIME_OF_DAY_BETA_BETA: f64 = 3.805_085_312_822_052;

/// Sampling oracle used by `Generate` expansion. Stations own their model and
/// pass in their own seeded RNG, so runs are reproducible per seed.
pub trait DemandModel: Send {
    /// Raw time-of-day sample in `[0, 1]`, before the arrival-window stretch.
    fn time_of_day(&mut self, rng: &mut StdRng) -> f64;
    /// Energy wanted by one vehicle, in kWh.
    fn energy_kwh(&mut self, rng: &mut StdRng) -> f64;
    /// Probability that a vehicle asks for a fast charger.
    fn fast_share(&self) -> f64 {
        crate::FAST_CHARGE_SHARE
    }
}

/// Beta time-of-day and Gamma energy fitted to public charging-session data.
#[derive(Debug, Clone)]
pub struct FittedDemand {
    time_of_day: Beta<f64>,
    energy: Gamma<f64>,
}

impl FittedDemand {
    pub fn new() -> Result<Self, SimError> {
        Self::with_params(
            TIME_OF_DAY_BETA_ALPHA,
            TIME_OF_DAY_BETA_BETA,
            ENERGY_GAMMA_SHAPE,
            ENERGY_GAMMA_SCALE,
        )
    }

    pub fn with_params(alpha: f64, beta: f64, shape: f64, scale: f64) -> Result<Self, SimError> {
        let time_of_day = Beta::new(alpha, beta).map_err(|e| SimError::Distribution {
            detail: format!("beta({alpha}, {beta}): {e}"),
        })?;
        let energy = Gamma::new(shape, scale).map_err(|e| SimError::Distribution {
            detail: format!("gamma({shape}, {scale}): {e}"),
        })?;
        Ok(Self { time_of_day, energy })
    }
}

impl DemandModel for FittedDemand {
    fn time_of_day(&mut self, rng: &mut StdRng) -> f64 {
        self.time_of_day.sample(rng)
    }

    fn energy_kwh(&mut self, rng: &mut StdRng) -> f64 {
        self.energy.sample(rng)
    }
}

/// Every vehicle arrives at the same offset with the same demand. Handy for
/// tests and for calibrating charger counts.
#[derive(Debug, Clone, Copy)]
pub struct FixedDemand {
    pub time_of_day: f64,
    pub energy_kwh: f64,
    pub fast_share: f64,
}

impl DemandModel for FixedDemand {
    fn time_of_day(&mut self, _rng: &mut StdRng) -> f64 {
        self.time_of_day
    }

    fn energy_kwh(&mut self, _rng: &mut StdRng) -> f64 {
        self.energy_kwh
    }

    fn fast_share(&self) -> f64 {
        self.fast_share
    }
}

/// Stretches a raw time-of-day sample over the arrival window and clamps it
/// into the day.
pub fn arrival_offset_secs(raw_fraction: f64) -> u64 {
    let stretched = (-0.042 + raw_fraction * 1.110).clamp(0.0, 1.0);
    (stretched * crate::time::SECONDS_PER_DAY as f64) as u64
}

pub fn pick_charge_type(rng: &mut StdRng, fast_share: f64) -> crate::event::ChargeType {
    if rng.gen::<f64>() < fast_share {
        crate::event::ChargeType::Fast
    } else {
        crate::event::ChargeType::Slow
    }
}
