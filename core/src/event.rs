use crate::time::Instant;
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChargeType {
    Fast,
    Slow,
}

impl ChargeType {
    /// Longest a vehicle will sit in the wait queue before balking, in seconds.
    pub fn patience_secs(self) -> u64 {
        match self {
            ChargeType::Fast => crate::FAST_PATIENCE_SECS,
            ChargeType::Slow => crate::SLOW_PATIENCE_SECS,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ChargeType::Fast => "fast",
            ChargeType::Slow => "slow",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChargeOutcome {
    Full,
    Partial,
    None,
}

/// A vehicle showing up at a station.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Arrival {
    pub ts: Instant,
    pub charge_type: ChargeType,
    pub charge_desired_wh: f64,
}

impl Arrival {
    pub fn new(ts: Instant, charge_type: ChargeType, charge_desired_wh: f64) -> Self {
        Self { ts, charge_type, charge_desired_wh }
    }

    pub fn key(&self) -> ArrivalKey {
        ArrivalKey {
            ts: self.ts,
            charge_type: self.charge_type,
            wh_bits: self.charge_desired_wh.to_bits(),
        }
    }
}

/// Hashable identity of an [`Arrival`], used by the monitor's forwarding ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArrivalKey {
    pub ts: Instant,
    pub charge_type: ChargeType,
    wh_bits: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Departure {
    pub ts: Instant,
    pub original_arrival_ts: Instant,
    pub service_start_ts: Instant,
    pub charge_type: ChargeType,
    /// Energy the vehicle asked for, carried so rollback can refund it.
    pub charge_wh: f64,
    pub outcome: ChargeOutcome,
}

impl Departure {
    /// The arrival this charge belongs to.
    pub fn arrival(&self) -> Arrival {
        Arrival::new(self.original_arrival_ts, self.charge_type, self.charge_wh)
    }

    pub fn is_for(&self, arrival: &Arrival) -> bool {
        self.arrival() == *arrival
    }

    pub fn sojourn_secs(&self) -> u64 {
        self.ts.saturating_sub(self.original_arrival_ts)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Event {
    /// Spawns one day's worth of arrivals and the next `Generate`.
    Generate { ts: Instant, arrival_rate: u32 },
    Arrival(Arrival),
    Departure(Departure),
}

impl Event {
    pub fn ts(&self) -> Instant {
        match self {
            Event::Generate { ts, .. } => *ts,
            Event::Arrival(a) => a.ts,
            Event::Departure(d) => d.ts,
        }
    }
}

/// What the history queue remembers for rollback.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum HistoryEntry {
    /// An arrival that claimed a charger.
    Arrival(Arrival),
    /// A charge that finished and was counted.
    Departure(Departure),
    /// `arrival` left the wait queue at `ts` without charging.
    BalkRecord { ts: Instant, arrival: Arrival },
}

impl HistoryEntry {
    pub fn ts(&self) -> Instant {
        match self {
            HistoryEntry::Arrival(a) => a.ts,
            HistoryEntry::Departure(d) => d.ts,
            HistoryEntry::BalkRecord { ts, .. } => *ts,
        }
    }
}

/// Heap slot ordered by `(time, seq)`. `seq` is the insertion counter of the
/// owning queue, so equal timestamps keep a stable, deterministic order.
#[derive(Debug, Clone)]
pub struct Scheduled<T> {
    pub time: Instant,
    pub seq: u64,
    pub item: T,
}

impl<T> PartialEq for Scheduled<T> {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}
impl<T> Eq for Scheduled<T> {}
impl<T> PartialOrd for Scheduled<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl<T> Ord for Scheduled<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time.cmp(&other.time).then(self.seq.cmp(&other.seq))
    }
}

/// Earliest-first priority queue. Backs both the future event queue and the
/// fast/slow wait queues.
#[derive(Debug, Clone)]
pub struct TimeQueue<T> {
    heap: BinaryHeap<Reverse<Scheduled<T>>>,
    next_seq: u64,
}

impl<T> Default for TimeQueue<T> {
    fn default() -> Self {
        Self { heap: BinaryHeap::new(), next_seq: 0 }
    }
}

impl<T> TimeQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, time: Instant, item: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Scheduled { time, seq, item }));
    }

    pub fn pop(&mut self) -> Option<T> {
        self.heap.pop().map(|Reverse(s)| s.item)
    }

    pub fn peek(&self) -> Option<&T> {
        self.heap.peek().map(|Reverse(s)| &s.item)
    }

    pub fn peek_time(&self) -> Option<Instant> {
        self.heap.peek().map(|Reverse(s)| s.time)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) {
        self.heap.retain(|Reverse(s)| keep(&s.item));
    }

    /// Removes and returns every item `take` selects, earliest first.
    pub fn extract(&mut self, mut take: impl FnMut(&T) -> bool) -> Vec<T> {
        let mut taken: Vec<Scheduled<T>> = Vec::new();
        let kept: BinaryHeap<Reverse<Scheduled<T>>> = std::mem::take(&mut self.heap)
            .into_iter()
            .filter_map(|Reverse(s)| {
                if take(&s.item) {
                    taken.push(s);
                    None
                } else {
                    Some(Reverse(s))
                }
            })
            .collect();
        self.heap = kept;
        taken.sort();
        taken.into_iter().map(|s| s.item).collect()
    }

    /// Unordered view of the queued items.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.heap.iter().map(|Reverse(s)| &s.item)
    }
}

impl<T: PartialEq> TimeQueue<T> {
    /// Removes a single item equal to `target`. Returns whether one was found.
    pub fn remove_one(&mut self, target: &T) -> bool {
        let mut found = false;
        self.heap.retain(|Reverse(s)| {
            if !found && s.item == *target {
                found = true;
                false
            } else {
                true
            }
        });
        found
    }
}

/// Newest-first log of committed arrivals, finished charges and balks.
#[derive(Debug, Clone, Default)]
pub struct HistoryQueue {
    heap: BinaryHeap<Scheduled<HistoryEntry>>,
    next_seq: u64,
}

impl HistoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Scheduled { time: entry.ts(), seq, item: entry });
    }

    pub fn newest_ts(&self) -> Option<Instant> {
        self.heap.peek().map(|s| s.time)
    }

    pub fn pop_newest(&mut self) -> Option<HistoryEntry> {
        self.heap.pop().map(|s| s.item)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn contains_arrival(&self, arrival: &Arrival) -> bool {
        self.heap
            .iter()
            .any(|s| s.item == HistoryEntry::Arrival(*arrival))
    }

    /// Removes a single committed copy of `arrival`.
    pub fn remove_arrival(&mut self, arrival: &Arrival) -> bool {
        let target = HistoryEntry::Arrival(*arrival);
        self.remove_first(|entry| *entry == target).is_some()
    }

    /// Removes the record of a finished charge for `arrival`, if one is kept.
    pub fn remove_departure_for(&mut self, arrival: &Arrival) -> Option<Departure> {
        match self.remove_first(|entry| matches!(entry, HistoryEntry::Departure(d) if d.is_for(arrival))) {
            Some(HistoryEntry::Departure(d)) => Some(d),
            _ => None,
        }
    }

    fn remove_first(&mut self, mut matches: impl FnMut(&HistoryEntry) -> bool) -> Option<HistoryEntry> {
        let mut removed = None;
        self.heap.retain(|s| {
            if removed.is_none() && matches(&s.item) {
                removed = Some(s.item);
                false
            } else {
                true
            }
        });
        removed
    }

    /// Drops every entry older than `horizon`. Returns how many were dropped.
    pub fn discard_before(&mut self, horizon: Instant) -> usize {
        let before = self.heap.len();
        self.heap.retain(|s| s.time >= horizon);
        before - self.heap.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.heap.iter().map(|s| &s.item)
    }
}
