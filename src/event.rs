//! Abstract trace events
//!
//! Every trace format is reduced to a time-ordered stream of [`Event`]s
//! before it reaches the analyzer.

use serde::{Deserialize, Serialize};

/// Kind of a decoded event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// CPU entered an idle state of the given depth
    IdleEnter(usize),
    /// CPU left its idle state
    IdleExit,
    /// CPU frequency changed (Hz)
    FreqChange(u64),
    /// An interrupt was handled; `id` is `None` for inter-processor interrupts
    Wakeup {
        /// Interrupt number
        id: Option<i32>,
        /// Interrupt name
        name: String,
    },
}

/// A decoded event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic timestamp (s)
    pub timestamp: f64,
    /// CPU the event happened on
    pub cpu: u32,
    /// What happened
    pub kind: EventKind,
}

impl Event {
    /// Create an event
    pub fn new(timestamp: f64, cpu: u32, kind: EventKind) -> Self {
        Self {
            timestamp,
            cpu,
            kind,
        }
    }

    /// Idle entry at `depth`
    pub fn idle_enter(timestamp: f64, cpu: u32, depth: usize) -> Self {
        Self::new(timestamp, cpu, EventKind::IdleEnter(depth))
    }

    /// Idle exit
    pub fn idle_exit(timestamp: f64, cpu: u32) -> Self {
        Self::new(timestamp, cpu, EventKind::IdleExit)
    }

    /// Frequency change to `freq` Hz
    pub fn freq_change(timestamp: f64, cpu: u32, freq: u64) -> Self {
        Self::new(timestamp, cpu, EventKind::FreqChange(freq))
    }

    /// Hardware interrupt
    pub fn irq(timestamp: f64, cpu: u32, id: i32, name: impl Into<String>) -> Self {
        Self::new(
            timestamp,
            cpu,
            EventKind::Wakeup {
                id: Some(id),
                name: name.into(),
            },
        )
    }

    /// Inter-processor interrupt
    pub fn ipi(timestamp: f64, cpu: u32, name: impl Into<String>) -> Self {
        Self::new(
            timestamp,
            cpu,
            EventKind::Wakeup {
                id: None,
                name: name.into(),
            },
        )
    }

    /// Check if the event is an idle entry or exit
    pub fn is_idle(&self) -> bool {
        matches!(self.kind, EventKind::IdleEnter(_) | EventKind::IdleExit)
    }
}
