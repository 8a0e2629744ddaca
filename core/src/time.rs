use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;
use std::sync::atomic::{AtomicU64, Ordering};

pub const SECONDS_PER_DAY: u64 = 86_400;

/// A simulated point in time, in whole seconds since midnight of simulated day 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Instant(pub u64);

impl Instant {
    pub const ZERO: Instant = Instant(0);

    pub fn from_hms(hours: u64, minutes: u64, seconds: u64) -> Self {
        Instant(hours * 3600 + minutes * 60 + seconds)
    }

    pub fn as_secs(self) -> u64 {
        self.0
    }

    pub fn saturating_sub(self, earlier: Instant) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl Add<u64> for Instant {
    type Output = Instant;

    fn add(self, secs: u64) -> Instant {
        Instant(self.0.saturating_add(secs))
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let day = self.0 / SECONDS_PER_DAY;
        let rem = self.0 % SECONDS_PER_DAY;
        write!(
            f,
            "d{}+{:02}:{:02}:{:02}",
            day,
            rem / 3600,
            (rem % 3600) / 60,
            rem % 60
        )
    }
}

/// Simulation epoch shared by every logical process.
///
/// `start` and `end` never change after construction. `gmt` is the global
/// minimum time: written by the monitor only, read by stations when they
/// garbage-collect history. It only ever moves forward.
#[derive(Debug)]
pub struct GlobalTime {
    start: Instant,
    end: Instant,
    gmt: AtomicU64,
}

impl GlobalTime {
    pub fn new(start: Instant, runtime_secs: u64) -> Self {
        Self {
            start,
            end: start + runtime_secs,
            gmt: AtomicU64::new(start.0),
        }
    }

    pub fn start(&self) -> Instant {
        self.start
    }

    pub fn end(&self) -> Instant {
        self.end
    }

    pub fn gmt(&self) -> Instant {
        Instant(self.gmt.load(Ordering::Acquire))
    }

    /// Publishes a new GMT candidate. Lower candidates are ignored; returns the
    /// value in effect afterwards.
    pub fn advance_gmt(&self, candidate: Instant) -> Instant {
        let prev = self.gmt.fetch_max(candidate.0, Ordering::AcqRel);
        Instant(prev.max(candidate.0))
    }
}
