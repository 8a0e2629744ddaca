use crate::event::Arrival;
use crate::time::Instant;
use serde::{Deserialize, Serialize};

/// Traffic between stations and the monitor. Everything is carried by value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// A station's local clock after its latest step.
    ///
    /// `consumed` counts the monitor messages the station has taken off its
    /// inbound channel so far. `idle` marks the quiescence report sent with
    /// `ts == end` when the event queue has run dry.
    Timing {
        ts: Instant,
        station: String,
        consumed: u64,
        idle: bool,
    },
    /// A balked arrival. With `retread` set this is an anti-message: the
    /// receiver must cancel the copy it was forwarded earlier.
    Balk {
        ts: Instant,
        sender: String,
        arrival: Arrival,
        retread: bool,
    },
    /// Stop signal from the monitor.
    End,
    /// A station hit an internal error and is about to exit.
    Fault { station: String, detail: String },
}

impl Message {
    pub fn balk(ts: Instant, sender: &str, arrival: Arrival, retread: bool) -> Self {
        Message::Balk { ts, sender: sender.to_string(), arrival, retread }
    }
}
