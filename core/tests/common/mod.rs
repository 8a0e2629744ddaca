#![allow(dead_code)]

use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use voltwarp_core::*;

/// Drives a single station by hand. The test plays the monitor: it feeds
/// `deliver`/`step` and reads what the station sent.
pub struct StationHarness {
    pub station: Station,
    pub to_station: Sender<Message>,
    pub from_station: Receiver<Message>,
    pub time: Arc<GlobalTime>,
}

impl StationHarness {
    pub fn new(config: StationConfig, runtime: u64) -> Self {
        let time = Arc::new(GlobalTime::new(Instant::ZERO, runtime));
        let (to_station, inbox) = crossbeam_channel::unbounded();
        let (outbox, from_station) = crossbeam_channel::unbounded();
        let station = Station::new(&config, Arc::clone(&time), inbox, outbox)
            .expect("station should build");
        Self { station, to_station, from_station, time }
    }

    pub fn inject(&mut self, arrival: Arrival) {
        self.station.schedule(Event::Arrival(arrival));
    }

    /// Steps until the event queue is empty. Returns the number of steps.
    pub fn drain(&mut self) -> usize {
        let mut steps = 0;
        while self.station.step().expect("step should succeed") {
            steps += 1;
        }
        steps
    }

    pub fn step_n(&mut self, n: usize) {
        for _ in 0..n {
            assert!(self.station.step().expect("step should succeed"));
        }
    }

    pub fn deliver_balk(&mut self, balk_ts: u64, arrival: Arrival, retread: bool) {
        self.station
            .deliver(Message::balk(Instant(balk_ts), "Remote", arrival, retread))
            .expect("deliver should succeed");
    }

    /// Everything the station has sent since the last call.
    pub fn sent(&self) -> Vec<Message> {
        self.from_station.try_iter().collect()
    }

    pub fn queued_arrivals(&self) -> Vec<Arrival> {
        self.station
            .events()
            .iter()
            .filter_map(|e| match e {
                Event::Arrival(a) => Some(*a),
                _ => None,
            })
            .collect()
    }

    pub fn queued_departures(&self) -> Vec<Departure> {
        self.station
            .events()
            .iter()
            .filter_map(|e| match e {
                Event::Departure(d) => Some(*d),
                _ => None,
            })
            .collect()
    }
}

pub fn station_config(name: &str, fast: u32, slow: u32, fast_rate: f64) -> StationConfig {
    StationConfig {
        name: name.to_string(),
        fast_chargers: fast,
        slow_chargers: slow,
        fast_charging_rate: fast_rate,
        slow_charging_rate: 7_200.0,
        arrival_rate: 0,
        seed: Some(1),
    }
}

pub fn fast(ts: u64, wh: f64) -> Arrival {
    Arrival::new(Instant(ts), ChargeType::Fast, wh)
}

pub fn slow(ts: u64, wh: f64) -> Arrival {
    Arrival::new(Instant(ts), ChargeType::Slow, wh)
}

pub fn balks(messages: &[Message]) -> Vec<(Instant, Arrival, bool)> {
    messages
        .iter()
        .filter_map(|m| match m {
            Message::Balk { ts, arrival, retread, .. } => Some((*ts, *arrival, *retread)),
            _ => None,
        })
        .collect()
}

pub fn timing(station: &str, ts: u64, consumed: u64, idle: bool) -> Message {
    Message::Timing {
        ts: Instant(ts),
        station: station.to_string(),
        consumed,
        idle,
    }
}

/// Federation where every vehicle arrives mid-day wanting `energy_kwh` on a
/// fast charger.
pub fn fixed_demand(energy_kwh: f64) -> federation::DemandFactory {
    Box::new(move |_: &StationConfig| -> Result<Box<dyn DemandModel>, SimError> {
        Ok(Box::new(FixedDemand {
            time_of_day: 0.5,
            energy_kwh,
            fast_share: 1.0,
        }))
    })
}
