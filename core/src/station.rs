//! A charging station as an optimistic logical process.
//!
//! The station runs its own event loop against a local clock. Balked vehicles
//! are handed to the monitor; vehicles forwarded from other stations may land
//! in this station's past, in which case it rolls back (`backtrack`) and
//! replays from the rewind point.

use crate::config::StationConfig;
use crate::demand::{arrival_offset_secs, pick_charge_type, DemandModel, FittedDemand};
use crate::error::SimError;
use crate::event::{
    Arrival, ChargeOutcome, ChargeType, Departure, Event, HistoryEntry, HistoryQueue, TimeQueue,
};
use crate::message::Message;
use crate::stats::StationStats;
use crate::time::{GlobalTime, Instant, SECONDS_PER_DAY};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;

/// One kind of charger: how many exist, how many are busy, and who is waiting.
#[derive(Debug, Clone)]
pub struct ChargerBank {
    pub chargers: u32,
    pub in_use: u32,
    /// Wh per hour.
    pub rate: f64,
    pub waiting: TimeQueue<Arrival>,
}

impl ChargerBank {
    fn new(chargers: u32, rate: f64) -> Self {
        Self { chargers, in_use: 0, rate, waiting: TimeQueue::new() }
    }

    fn is_full(&self) -> bool {
        self.in_use >= self.chargers
    }
}

pub struct Station {
    name: String,
    clock: Instant,
    time: Arc<GlobalTime>,
    events: TimeQueue<Event>,
    history: HistoryQueue,
    fast: ChargerBank,
    slow: ChargerBank,
    stats: StationStats,
    rng: StdRng,
    demand: Box<dyn DemandModel>,
    inbox: Receiver<Message>,
    outbox: Sender<Message>,
    consumed: u64,
    end_pending: bool,
}

impl Station {
    /// Builds a station with the fitted demand model and its first `Generate`
    /// queued at the simulation start.
    pub fn new(
        config: &StationConfig,
        time: Arc<GlobalTime>,
        inbox: Receiver<Message>,
        outbox: Sender<Message>,
    ) -> Result<Self, SimError> {
        let start = time.start();
        let mut station = Self {
            name: config.name.clone(),
            clock: start,
            time,
            events: TimeQueue::new(),
            history: HistoryQueue::new(),
            fast: ChargerBank::new(config.fast_chargers, config.fast_charging_rate),
            slow: ChargerBank::new(config.slow_chargers, config.slow_charging_rate),
            stats: StationStats::new(&config.name)?,
            rng: StdRng::seed_from_u64(config.seed.unwrap_or_default()),
            demand: Box::new(FittedDemand::new()?),
            inbox,
            outbox,
            consumed: 0,
            end_pending: false,
        };
        station.schedule(Event::Generate { ts: start, arrival_rate: config.arrival_rate });
        Ok(station)
    }

    pub fn with_demand(mut self, demand: Box<dyn DemandModel>) -> Self {
        self.demand = demand;
        self
    }

    pub fn schedule(&mut self, event: Event) {
        self.events.push(event.ts(), event);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn clock(&self) -> Instant {
        self.clock
    }

    pub fn stats(&self) -> &StationStats {
        &self.stats
    }

    pub fn bank(&self, charge_type: ChargeType) -> &ChargerBank {
        match charge_type {
            ChargeType::Fast => &self.fast,
            ChargeType::Slow => &self.slow,
        }
    }

    fn bank_mut(&mut self, charge_type: ChargeType) -> &mut ChargerBank {
        match charge_type {
            ChargeType::Fast => &mut self.fast,
            ChargeType::Slow => &mut self.slow,
        }
    }

    pub fn events(&self) -> &TimeQueue<Event> {
        &self.events
    }

    pub fn history(&self) -> &HistoryQueue {
        &self.history
    }

    /// Runs until the monitor says `End`, then hands back the final counters.
    /// Internal errors are reported to the monitor as `Fault` before returning.
    pub fn run(mut self) -> Result<StationStats, SimError> {
        log::debug!("{}: starting at {}", self.name, self.clock);
        match self.event_loop() {
            Ok(()) => {
                log::debug!(
                    "{}: finished, {} charges, {} balks, {} backtracks",
                    self.name,
                    self.stats.total_charges(),
                    self.stats.total_balks(),
                    self.stats.backtracks
                );
                Ok(self.stats)
            }
            Err(SimError::Interrupted { process }) => {
                log::warn!("{process}: interrupted, discarding partial stats");
                Err(SimError::Interrupted { process })
            }
            Err(e) => {
                log::error!("{}: {e}", self.name);
                let _ = self.outbox.send(Message::Fault {
                    station: self.name.clone(),
                    detail: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn event_loop(&mut self) -> Result<(), SimError> {
        loop {
            while self.step()? {}
            if self.end_pending {
                return Ok(());
            }
            if self.inbox.is_empty() {
                self.report(self.time.end(), true)?;
            }
            let msg = self.inbox.recv().map_err(|_| self.interrupted())?;
            self.consumed += 1;
            if let Message::End = msg {
                return Ok(());
            }
            self.deliver(msg)?;
        }
    }

    /// Processes the earliest event, takes at most one inbound message, and
    /// reports the clock. Returns `false` when the event queue is empty.
    pub fn step(&mut self) -> Result<bool, SimError> {
        let Some(event) = self.events.pop() else {
            return Ok(false);
        };
        self.dispatch(event)?;
        match self.inbox.try_recv() {
            Ok(msg) => {
                self.consumed += 1;
                self.deliver(msg)?;
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => return Err(self.interrupted()),
        }
        self.report(self.clock, false)?;
        Ok(true)
    }

    /// Applies one message from the monitor. `End` is only remembered; it
    /// takes effect once the event queue is empty.
    pub fn deliver(&mut self, msg: Message) -> Result<(), SimError> {
        match msg {
            Message::Balk { ts, arrival, retread, .. } => self.backtrack(ts, arrival, retread),
            Message::End => {
                self.end_pending = true;
                Ok(())
            }
            other => Err(SimError::Invariant {
                station: self.name.clone(),
                detail: format!("unexpected message from monitor: {other:?}"),
            }),
        }
    }

    fn dispatch(&mut self, event: Event) -> Result<(), SimError> {
        match event {
            Event::Generate { ts, arrival_rate } => {
                if ts < self.time.end() {
                    self.clock = ts;
                    self.generate(arrival_rate);
                }
                Ok(())
            }
            Event::Arrival(arrival) => {
                self.handle_arrival(arrival);
                Ok(())
            }
            Event::Departure(departure) => {
                self.handle_departure(&departure)?;
                self.stats.record_departure(
                    departure.charge_type,
                    departure.outcome,
                    departure.sojourn_secs(),
                );
                self.history.push(HistoryEntry::Departure(departure));
                Ok(())
            }
        }
    }

    fn generate(&mut self, arrival_rate: u32) {
        for _ in 0..arrival_rate {
            let offset = arrival_offset_secs(self.demand.time_of_day(&mut self.rng));
            let wh = self.demand.energy_kwh(&mut self.rng) * 1000.0;
            let charge_type = pick_charge_type(&mut self.rng, self.demand.fast_share());
            self.schedule(Event::Arrival(Arrival::new(self.clock + offset, charge_type, wh)));
        }
        self.schedule(Event::Generate {
            ts: self.clock + SECONDS_PER_DAY,
            arrival_rate,
        });
    }

    fn handle_arrival(&mut self, arrival: Arrival) {
        self.clock = arrival.ts;
        let end = self.time.end();
        let bank = self.bank_mut(arrival.charge_type);
        if bank.is_full() {
            bank.waiting.push(arrival.ts, arrival);
            return;
        }
        // Arrivals whose patience window runs past the horizon never start.
        if arrival.ts + arrival.charge_type.patience_secs() <= end {
            bank.in_use += 1;
            self.history.push(HistoryEntry::Arrival(arrival));
            self.start_charge(arrival);
        }
    }

    fn handle_departure(&mut self, departure: &Departure) -> Result<(), SimError> {
        self.clock = departure.ts;
        let charge_type = departure.charge_type;
        let patience = charge_type.patience_secs();

        while let Some(&head) = self.bank(charge_type).waiting.peek() {
            if head.ts + patience > self.clock {
                break;
            }
            self.bank_mut(charge_type).waiting.pop();
            self.outbox
                .send(Message::balk(self.clock, &self.name, head, false))
                .map_err(|_| self.interrupted())?;
            self.history.push(HistoryEntry::BalkRecord { ts: self.clock, arrival: head });
            self.stats.record_balk(charge_type);
            log::debug!("{}: {} balk of arrival at {}", self.name, charge_type.label(), head.ts);
        }

        let end = self.time.end();
        match self.bank_mut(charge_type).waiting.pop() {
            Some(next) if next.ts + patience <= end => {
                // The charger passes straight to the next vehicle.
                self.history.push(HistoryEntry::Arrival(next));
                self.start_charge(next);
            }
            _ => self.release(charge_type)?,
        }
        Ok(())
    }

    fn release(&mut self, charge_type: ChargeType) -> Result<(), SimError> {
        match self.bank(charge_type).in_use.checked_sub(1) {
            Some(in_use) => {
                self.bank_mut(charge_type).in_use = in_use;
                Ok(())
            }
            None => Err(self.invariant(format!(
                "{} charger released while none was in use",
                charge_type.label()
            ))),
        }
    }

    fn start_charge(&mut self, arrival: Arrival) {
        let rate = self.bank(arrival.charge_type).rate;
        let secs = (arrival.charge_desired_wh * 3600.0 / rate).floor() as u64;
        self.schedule(Event::Departure(Departure {
            ts: self.clock + secs,
            original_arrival_ts: arrival.ts,
            service_start_ts: self.clock,
            charge_type: arrival.charge_type,
            charge_wh: arrival.charge_desired_wh,
            outcome: ChargeOutcome::Full,
        }));
        self.stats.energy_given_wh += arrival.charge_desired_wh;
    }

    /// Rolls the station back so `arrival` (forwarded at `balk_ts`) can be
    /// replayed, or, for a retread, cancelled.
    fn backtrack(&mut self, balk_ts: Instant, arrival: Arrival, retread: bool) -> Result<(), SimError> {
        let rewind = arrival.ts;
        log::debug!(
            "{}: backtrack from {} to {} (retread: {retread})",
            self.name,
            self.clock,
            rewind
        );

        for charge_type in [ChargeType::Fast, ChargeType::Slow] {
            let late = self.bank_mut(charge_type).waiting.extract(|w| w.ts > rewind);
            for waiter in late {
                self.schedule(Event::Arrival(waiter));
            }
        }

        while self.history.newest_ts().is_some_and(|ts| ts > balk_ts) {
            match self.history.pop_newest() {
                Some(HistoryEntry::Arrival(undone)) => {
                    // Its departure is pending: either never reached, or put
                    // back just above since history unwinds newest first.
                    self.take_pending_departure(&undone);
                    self.stats.energy_given_wh -= undone.charge_desired_wh;
                    self.schedule(Event::Arrival(undone));
                }
                Some(HistoryEntry::Departure(done)) => {
                    self.stats
                        .undo_departure(done.charge_type, done.outcome, done.sojourn_secs())?;
                    self.schedule(Event::Departure(done));
                }
                Some(HistoryEntry::BalkRecord { ts, arrival: forwarded }) => {
                    self.outbox
                        .send(Message::balk(ts, &self.name, forwarded, true))
                        .map_err(|_| self.interrupted())?;
                    self.stats.undo_balk(forwarded.charge_type)?;
                    self.schedule(Event::Arrival(forwarded));
                }
                None => break,
            }
        }

        if retread {
            self.cancel(&arrival)?;
        } else {
            self.schedule(Event::Arrival(arrival));
        }

        self.rebuild_in_use()?;
        self.history.discard_before(self.time.gmt());
        self.clock = self.clock.min(rewind);
        self.stats.backtracks += 1;
        Ok(())
    }

    /// Drops one copy of `arrival` that another station has taken back. A copy
    /// that already claimed a charger gives back its energy together with its
    /// pending departure, or with its counted one if the charge has finished.
    fn cancel(&mut self, arrival: &Arrival) -> Result<(), SimError> {
        if self.events.remove_one(&Event::Arrival(*arrival))
            || self.bank_mut(arrival.charge_type).waiting.remove_one(arrival)
        {
            return Ok(());
        }
        if self.take_pending_departure(arrival).is_some() {
            self.stats.energy_given_wh -= arrival.charge_desired_wh;
            self.history.remove_arrival(arrival);
        } else if let Some(done) = self.history.remove_departure_for(arrival) {
            self.stats
                .undo_departure(done.charge_type, done.outcome, done.sojourn_secs())?;
            self.stats.energy_given_wh -= arrival.charge_desired_wh;
            self.history.remove_arrival(arrival);
        } else if self.history.contains_arrival(arrival) {
            return Err(self.invariant(format!(
                "arrival at {} holds a charger but has no departure",
                arrival.ts
            )));
        } else {
            log::debug!("{}: retread for {} found nothing to cancel", self.name, arrival.ts);
        }
        Ok(())
    }

    fn take_pending_departure(&mut self, arrival: &Arrival) -> Option<Departure> {
        let mut taken = None;
        self.events.retain(|e| match e {
            Event::Departure(d) if taken.is_none() && d.is_for(arrival) => {
                taken = Some(*d);
                false
            }
            _ => true,
        });
        taken
    }

    /// Occupancy is rebuilt from surviving departures. A departure whose
    /// service started after the new head of the queue belongs to a future
    /// that no longer exists: its energy is refunded and its vehicle arrives
    /// again. Waiters left behind free chargers arrive again too.
    fn rebuild_in_use(&mut self) -> Result<(), SimError> {
        loop {
            let Some(first_ts) = self.events.peek_time() else {
                self.fast.in_use = 0;
                self.slow.in_use = 0;
                if self.requeue_stranded_waiters() {
                    continue;
                }
                return Ok(());
            };

            let mut dropped = self.events.extract(
                |e| matches!(e, Event::Departure(d) if d.service_start_ts > first_ts),
            );
            let (fast, slow) = self.busy_chargers();
            for (charge_type, busy) in [(ChargeType::Fast, fast), (ChargeType::Slow, slow)] {
                if busy > self.bank(charge_type).chargers {
                    // A charger handed over at `first_ts` by a departure that
                    // is pending again.
                    dropped.extend(self.events.extract(|e| {
                        matches!(e, Event::Departure(d)
                            if d.charge_type == charge_type && d.service_start_ts == first_ts)
                    }));
                }
            }
            if !dropped.is_empty() {
                for event in dropped {
                    if let Event::Departure(d) = event {
                        self.undo_charge(&d);
                    }
                }
                continue;
            }

            if fast > self.fast.chargers || slow > self.slow.chargers {
                return Err(self.invariant(format!(
                    "rollback left {fast}/{slow} chargers busy out of {}/{}",
                    self.fast.chargers, self.slow.chargers
                )));
            }
            self.fast.in_use = fast;
            self.slow.in_use = slow;
            if !self.requeue_stranded_waiters() {
                return Ok(());
            }
        }
    }

    fn busy_chargers(&self) -> (u32, u32) {
        self.events.iter().fold((0, 0), |(fast, slow), e| match e {
            Event::Departure(d) if d.charge_type == ChargeType::Fast => (fast + 1, slow),
            Event::Departure(_) => (fast, slow + 1),
            _ => (fast, slow),
        })
    }

    fn undo_charge(&mut self, departure: &Departure) {
        let arrival = departure.arrival();
        self.stats.energy_given_wh -= arrival.charge_desired_wh;
        self.history.remove_arrival(&arrival);
        self.schedule(Event::Arrival(arrival));
    }

    /// Waiters only leave the queue on a departure, so with a charger free
    /// they are replayed as arrivals. Returns whether any moved.
    fn requeue_stranded_waiters(&mut self) -> bool {
        let mut moved = false;
        for charge_type in [ChargeType::Fast, ChargeType::Slow] {
            let bank = self.bank_mut(charge_type);
            if bank.is_full() || bank.waiting.is_empty() {
                continue;
            }
            for waiter in bank.waiting.extract(|_| true) {
                self.schedule(Event::Arrival(waiter));
            }
            moved = true;
        }
        moved
    }

    fn report(&self, ts: Instant, idle: bool) -> Result<(), SimError> {
        self.outbox
            .send(Message::Timing {
                ts,
                station: self.name.clone(),
                consumed: self.consumed,
                idle,
            })
            .map_err(|_| self.interrupted())
    }

    fn interrupted(&self) -> SimError {
        SimError::Interrupted { process: self.name.clone() }
    }

    fn invariant(&self, detail: String) -> SimError {
        SimError::Invariant { station: self.name.clone(), detail }
    }
}
