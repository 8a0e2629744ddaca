//! The coordinator: GMT bookkeeping, balk routing and termination.

use crate::error::SimError;
use crate::event::ArrivalKey;
use crate::message::Message;
use crate::time::{GlobalTime, Instant};
use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// What the monitor knows about one registered station.
struct StationLink {
    name: String,
    tx: Sender<Message>,
    last_reported: Instant,
    /// Messages sent to the station so far.
    sent: u64,
    /// Messages the station said it had consumed in its latest report.
    consumed: u64,
    idle: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorSummary {
    pub forwarded: u64,
    pub retreads_routed: u64,
    pub dropped: u64,
    pub timing_reports: u64,
    pub final_gmt: Instant,
}

pub struct Monitor {
    time: Arc<GlobalTime>,
    inbox: Receiver<Message>,
    stations: Vec<StationLink>,
    index: HashMap<String, usize>,
    /// Where each `(sender, arrival)` forward went and when it balked, so its
    /// anti-message can follow. Entries behind GMT are pruned.
    ledger: HashMap<(usize, ArrivalKey), (usize, Instant)>,
    next_rr_idx: usize,
    summary: MonitorSummary,
}

impl Monitor {
    pub fn new(time: Arc<GlobalTime>, inbox: Receiver<Message>) -> Self {
        Self {
            time,
            inbox,
            stations: Vec::new(),
            index: HashMap::new(),
            ledger: HashMap::new(),
            next_rr_idx: 0,
            summary: MonitorSummary::default(),
        }
    }

    /// Adds a station. Registration order drives round-robin routing.
    pub fn register(&mut self, name: &str, tx: Sender<Message>) {
        let start = self.time.start();
        self.index.insert(name.to_string(), self.stations.len());
        self.stations.push(StationLink {
            name: name.to_string(),
            tx,
            last_reported: start,
            sent: 0,
            consumed: 0,
            idle: false,
        });
    }

    pub fn summary(&self) -> &MonitorSummary {
        &self.summary
    }

    pub fn gmt(&self) -> Instant {
        self.time.gmt()
    }

    /// Forwards that a retread could still cancel.
    pub fn open_forwards(&self) -> usize {
        self.ledger.len()
    }

    /// Routes messages until every station is idle with nothing in flight,
    /// then broadcasts `End`.
    pub fn run(mut self) -> Result<MonitorSummary, SimError> {
        log::debug!("monitor: coordinating {} stations", self.stations.len());
        loop {
            let msg = self.inbox.recv().map_err(|_| SimError::Interrupted {
                process: "monitor".to_string(),
            })?;
            self.handle(msg)?;
            if self.is_quiescent() {
                self.broadcast_end();
                self.summary.final_gmt = self.time.gmt();
                log::info!(
                    "monitor: all stations idle at gmt {}, {} balks forwarded",
                    self.summary.final_gmt,
                    self.summary.forwarded
                );
                return Ok(self.summary);
            }
        }
    }

    pub fn handle(&mut self, msg: Message) -> Result<(), SimError> {
        match msg {
            Message::Timing { ts, station, consumed, idle } => {
                let idx = self.lookup(&station)?;
                let link = &mut self.stations[idx];
                link.last_reported = ts;
                link.consumed = consumed;
                link.idle = idle;
                self.summary.timing_reports += 1;
                self.publish_gmt();
                Ok(())
            }
            Message::Balk { ts, sender, arrival, retread: false } => {
                let from = self.lookup(&sender)?;
                let Some(dest) = self.select_destination(from) else {
                    log::warn!("monitor: no station to take balk from {sender}, dropping");
                    self.summary.dropped += 1;
                    return Ok(());
                };
                self.ledger.insert((from, arrival.key()), (dest, ts));
                self.forward(dest, Message::Balk { ts, sender, arrival, retread: false });
                self.summary.forwarded += 1;
                Ok(())
            }
            Message::Balk { ts, sender, arrival, retread: true } => {
                let from = self.lookup(&sender)?;
                match self.ledger.remove(&(from, arrival.key())) {
                    Some((dest, _)) => {
                        self.forward(dest, Message::Balk { ts, sender, arrival, retread: true });
                        self.summary.retreads_routed += 1;
                    }
                    None => {
                        log::warn!(
                            "monitor: retread from {sender} for arrival at {} was never forwarded, dropping",
                            arrival.ts
                        );
                        self.summary.dropped += 1;
                    }
                }
                Ok(())
            }
            Message::Fault { station, detail } => {
                log::error!("monitor: lost {station}: {detail}");
                self.broadcast_end();
                Err(SimError::StationLost { station, detail })
            }
            Message::End => Err(SimError::Invariant {
                station: "monitor".to_string(),
                detail: "received End from a station".to_string(),
            }),
        }
    }

    /// Round-robin over registration order, skipping the sender.
    fn select_destination(&mut self, sender: usize) -> Option<usize> {
        let n = self.stations.len();
        for i in 0..n {
            let idx = (self.next_rr_idx + i) % n;
            if idx != sender {
                self.next_rr_idx = (idx + 1) % n;
                return Some(idx);
            }
        }
        None
    }

    fn forward(&mut self, dest: usize, msg: Message) {
        let rewind = match &msg {
            Message::Balk { arrival, .. } => Some(arrival.ts),
            _ => None,
        };
        let link = &mut self.stations[dest];
        // The destination is about to rewind; keep it from counting as done.
        if let Some(rewind) = rewind {
            link.last_reported = link.last_reported.min(rewind);
        }
        link.idle = false;
        link.sent += 1;
        if link.tx.send(msg).is_err() {
            log::warn!("monitor: {} is gone, message lost", link.name);
        }
    }

    /// Publishes the minimum reported clock and forgets forwards behind it.
    /// Stations discard balk records older than GMT, so no retread can follow.
    fn publish_gmt(&mut self) {
        if let Some(min) = self.stations.iter().map(|s| s.last_reported).min() {
            let gmt = self.time.advance_gmt(min);
            self.ledger.retain(|_, (_, balk_ts)| *balk_ts >= gmt);
            log::trace!("monitor: gmt {gmt}, {} forwards open", self.ledger.len());
        }
    }

    /// Every station has reported idle after consuming everything sent to it,
    /// and nothing is waiting in any channel.
    pub fn is_quiescent(&self) -> bool {
        let end = self.time.end();
        self.inbox.is_empty()
            && self.stations.iter().all(|s| {
                s.idle && s.last_reported >= end && s.consumed == s.sent && s.tx.is_empty()
            })
    }

    fn broadcast_end(&mut self) {
        for link in &mut self.stations {
            link.sent += 1;
            if link.tx.send(Message::End).is_err() {
                log::debug!("monitor: {} already exited", link.name);
            }
        }
    }

    fn lookup(&self, station: &str) -> Result<usize, SimError> {
        self.index.get(station).copied().ok_or_else(|| SimError::Invariant {
            station: "monitor".to_string(),
            detail: format!("message from unregistered station '{station}'"),
        })
    }
}
