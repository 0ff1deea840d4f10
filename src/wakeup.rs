//! Wake-up attribution
//!
//! Every interrupt that wakes a CPU is counted per CPU, together with how
//! often it ended an idle interval that was too short or too long.

use crate::cstate::{CStateTrack, Residency};
use serde::{Deserialize, Serialize};

/// Per-interrupt wake-up counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WakeupIrq {
    /// Interrupt number, `None` for inter-processor interrupts
    pub id: Option<i32>,
    /// Interrupt name
    pub name: String,
    /// Times this interrupt woke the CPU
    pub count: u64,
    /// Times it ended a too-short idle interval
    pub early_triggers: u64,
    /// Times it ended a too-long idle interval
    pub late_triggers: u64,
}

impl WakeupIrq {
    fn new(id: Option<i32>, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            count: 0,
            early_triggers: 0,
            late_triggers: 0,
        }
    }

    /// Check if this is an inter-processor interrupt
    pub fn is_ipi(&self) -> bool {
        self.id.is_none()
    }
}

/// Wake-up sources seen on one CPU, in order of first appearance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WakeupTable {
    irqs: Vec<WakeupIrq>,
}

impl WakeupTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded interrupts
    pub fn irqs(&self) -> &[WakeupIrq] {
        &self.irqs
    }

    /// Check if nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.irqs.is_empty()
    }

    /// Total number of attributed wake-ups
    pub fn total(&self) -> u64 {
        self.irqs.iter().map(|irq| irq.count).sum()
    }

    /// Look up an entry by interrupt id and name
    pub fn get(&self, id: Option<i32>, name: &str) -> Option<&WakeupIrq> {
        self.irqs.iter().find(|irq| irq.id == id && irq.name == name)
    }

    fn entry(&mut self, id: Option<i32>, name: &str) -> usize {
        match self.irqs.iter().position(|irq| irq.id == id && irq.name == name) {
            Some(index) => index,
            None => {
                self.irqs.push(WakeupIrq::new(id, name));
                self.irqs.len() - 1
            }
        }
    }
}

/// Attribute a wake-up interrupt to the interval `cstates` last closed.
///
/// At most one interrupt is attributed per closed interval; later ones
/// before the next idle entry are ignored and `false` is returned.
pub fn store_irq(
    table: &mut WakeupTable,
    cstates: &mut CStateTrack,
    id: Option<i32>,
    name: &str,
) -> bool {
    if cstates.wakeup_claimed() {
        return false;
    }

    let index = table.entry(id, name);
    let irq = &mut table.irqs[index];
    irq.count += 1;
    match cstates.last_residency() {
        Residency::TooShort => irq.early_triggers += 1,
        Residency::TooLong => irq.late_triggers += 1,
        Residency::AsExpected => {}
    }

    cstates.claim_wakeup(index)
}
