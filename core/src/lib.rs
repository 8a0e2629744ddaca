pub mod config;
pub mod demand;
pub mod error;
pub mod event;
pub mod federation;
pub mod message;
pub mod monitor;
pub mod station;
pub mod stats;
pub mod time;

pub use config::{MasterConfig, RunConfig, StationConfig};
pub use demand::{DemandModel, FittedDemand, FixedDemand};
pub use error::SimError;
pub use event::{Arrival, ChargeOutcome, ChargeType, Departure, Event, HistoryEntry};
pub use federation::{Federation, RunOutcome, RunSummary};
pub use message::Message;
pub use monitor::{Monitor, MonitorSummary};
pub use station::Station;
pub use stats::{StationStats, StationSummary};
pub use time::{GlobalTime, Instant};

/// Seconds a vehicle waits for a fast charger before balking.
pub const FAST_PATIENCE_SECS: u64 = 600;
/// Seconds a vehicle waits for a slow charger before balking.
pub const SLOW_PATIENCE_SECS: u64 = 1_800;
/// Share of generated vehicles that want a fast charge.
pub const FAST_CHARGE_SHARE: f64 = 0.67;
