//! Composite state of cores and clusters
//!
//! A group's state is a pure function of its members' states and is
//! recomputed on every member change.

use crate::topology::Cpu;
use serde::{Deserialize, Serialize};

/// Which running member frequency represents a group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FreqExtremum {
    /// Lowest frequency among running members
    #[default]
    Min,
    /// Highest frequency among running members
    Max,
}

/// Extremum used unless configured otherwise.
///
/// Groups have always been reported at the lowest running member frequency
/// although the highest one was most likely meant. Reports built on the
/// existing numbers depend on it, so `Max` is opt-in.
pub const DEFAULT_COMPOSITE_FREQ: FreqExtremum = FreqExtremum::Min;

/// Composite C-state depth: the minimum current depth of the members.
///
/// A running member (`None`) orders below every depth, so the group is
/// running as soon as one member is.
pub fn composite_depth<'a, I>(cpus: I) -> Option<usize>
where
    I: IntoIterator<Item = &'a Cpu>,
{
    cpus.into_iter()
        .map(|cpu| cpu.cstates().current())
        .min()
        .flatten()
}

/// Composite frequency (Hz) over running members with a known frequency.
///
/// Returns 0 when no member qualifies.
pub fn composite_freq<'a, I>(cpus: I, extremum: FreqExtremum) -> u64
where
    I: IntoIterator<Item = &'a Cpu>,
{
    let running = cpus
        .into_iter()
        .filter(|cpu| !cpu.is_idle())
        .filter_map(|cpu| cpu.pstates().current_freq());

    let freq = match extremum {
        FreqExtremum::Min => running.min(),
        FreqExtremum::Max => running.max(),
    };
    freq.unwrap_or(0)
}
