//! C-state (idle state) tracking
//!
//! One [`CStateTrack`] exists per CPU, per core and per cluster. CPU tracks
//! are fed directly by idle enter/exit events; core and cluster tracks are
//! fed with the composite depth of their members (see [`crate::composite`]).
//!
//! Each closed interval is folded into the statistics of its depth and
//! classified against the target residency of that depth:
//!
//! - shorter than the target residency: [`Residency::TooShort`] (early wake-up)
//! - at least the target residency of the next deeper state that was ever
//!   used on this entity: [`Residency::TooLong`] (late wake-up)
//! - anything else: [`Residency::AsExpected`]

use crate::stats::{DurationStats, USEC_PER_SEC};
use serde::{Deserialize, Serialize};

/// Number of C-state depths tracked per entity
pub const MAX_CSTATES: usize = 16;

/// Classification of the most recently closed idle interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Residency {
    /// Residency between this state's and the next state's target
    #[default]
    AsExpected,
    /// Woke up before the target residency was reached
    TooShort,
    /// Stayed long enough that a deeper state would have paid off
    TooLong,
}

/// Static description of one C-state depth
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CStateInfo {
    /// State name (e.g., "WFI", "C1", "C6")
    pub name: String,
    /// Target residency in microseconds, if known
    pub target_residency: Option<u32>,
}

/// Statistics for one C-state depth
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CState {
    /// Display name, `None` when the depth is not supported
    pub name: Option<String>,
    /// Target residency in microseconds, if known
    pub target_residency: Option<u32>,
    /// Closed interval statistics (us)
    pub stats: DurationStats,
    /// Intervals shorter than the target residency
    pub early_wakeups: u64,
    /// Intervals long enough for the next deeper state
    pub late_wakeups: u64,
    /// Intervals between this state's and the next state's target
    #[serde(default)]
    pub as_expected: u64,
}

impl CState {
    /// Create a state slot from its static description
    pub fn from_info(info: &CStateInfo) -> Self {
        Self {
            name: Some(info.name.clone()),
            target_residency: info.target_residency,
            ..Self::default()
        }
    }

    /// Check if the depth exists on this entity
    pub fn is_supported(&self) -> bool {
        self.name.is_some()
    }
}

/// An interval closed by a C-state transition
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosedInterval {
    /// Depth that was left
    pub depth: usize,
    /// Start timestamp (s)
    pub begin: f64,
    /// End timestamp (s)
    pub end: f64,
    /// Duration (us)
    pub duration: f64,
    /// Classification, `None` when the interval was discarded as non-positive
    pub residency: Option<Residency>,
}

impl ClosedInterval {
    /// Check if the interval was dropped from the statistics
    pub fn is_discarded(&self) -> bool {
        self.residency.is_none()
    }
}

/// Per-entity C-state statistics and state machine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CStateTrack {
    /// Slots indexed by depth
    states: Vec<CState>,
    /// Currently open depth, `None` while running
    current: Option<usize>,
    /// Deepest depth ever opened
    highest: Option<usize>,
    /// Begin timestamp of the open interval (s)
    begin: f64,
    /// Classification of the last closed interval
    last_residency: Residency,
    /// Wake-up entry already attributed to the last closed interval
    #[serde(skip)]
    wakeup: Option<usize>,
}

impl Default for CStateTrack {
    fn default() -> Self {
        Self::new()
    }
}

impl CStateTrack {
    /// Create a track where no depth is supported yet
    pub fn new() -> Self {
        Self {
            states: vec![CState::default(); MAX_CSTATES],
            current: None,
            highest: None,
            begin: 0.0,
            last_residency: Residency::AsExpected,
            wakeup: None,
        }
    }

    /// Create a track from per-depth descriptions
    ///
    /// Depths missing from `infos` (or set to `None`) are unsupported.
    pub fn with_states(infos: &[Option<CStateInfo>]) -> Self {
        let mut track = Self::new();
        for (slot, info) in track.states.iter_mut().zip(infos) {
            if let Some(info) = info {
                *slot = CState::from_info(info);
            }
        }
        track
    }

    /// Create an empty track copying names and target residencies from `other`
    pub fn from_template(other: &CStateTrack) -> Self {
        let mut track = Self::new();
        for (slot, src) in track.states.iter_mut().zip(&other.states) {
            slot.name = src.name.clone();
            slot.target_residency = src.target_residency;
        }
        track
    }

    /// All depth slots, supported or not
    pub fn states(&self) -> &[CState] {
        &self.states
    }

    /// Slot for a depth
    pub fn state(&self, depth: usize) -> Option<&CState> {
        self.states.get(depth)
    }

    /// Currently open depth
    pub fn current(&self) -> Option<usize> {
        self.current
    }

    /// Deepest depth ever opened
    pub fn highest(&self) -> Option<usize> {
        self.highest
    }

    /// Begin timestamp of the open interval, if any
    pub fn open_since(&self) -> Option<f64> {
        self.current.map(|_| self.begin)
    }

    /// Classification of the last closed interval
    pub fn last_residency(&self) -> Residency {
        self.last_residency
    }

    /// Check if the entity is idle
    pub fn is_idle(&self) -> bool {
        self.current.is_some()
    }

    /// Check if `depth` can be tracked
    pub fn supports_depth(depth: usize) -> bool {
        depth < MAX_CSTATES
    }

    /// Apply a transition to `new_depth` (`None` = running) at `time`
    ///
    /// Re-entering the current depth is not a transition. Otherwise the open
    /// interval, if any, is closed first and returned.
    pub fn record(&mut self, time: f64, new_depth: Option<usize>) -> Option<ClosedInterval> {
        if new_depth == self.current {
            return None;
        }

        let closed = if self.current.is_some() {
            self.close(time)
        } else {
            None
        };

        if let Some(depth) = new_depth {
            self.open(time, depth);
        }

        closed
    }

    /// Close the open interval with zero length, discarding it
    pub fn abandon(&mut self) -> Option<ClosedInterval> {
        if self.current.is_none() {
            return None;
        }
        let begin = self.begin;
        self.close(begin)
    }

    fn open(&mut self, time: f64, depth: usize) {
        if depth >= self.states.len() {
            debug_assert!(false, "depth {} out of range", depth);
            return;
        }
        self.current = Some(depth);
        self.begin = time;
        self.wakeup = None;
        self.highest = self.highest.max(Some(depth));
    }

    fn close(&mut self, time: f64) -> Option<ClosedInterval> {
        let depth = self.current.take()?;
        let duration = (time - self.begin) * USEC_PER_SEC;

        let mut closed = ClosedInterval {
            depth,
            begin: self.begin,
            end: time,
            duration,
            residency: None,
        };

        if duration <= 0.0 {
            // a wake-up ending this interval must not inherit an older classification
            self.last_residency = Residency::AsExpected;
            return Some(closed);
        }

        let residency = self.classify(depth, duration);
        let state = &mut self.states[depth];
        match residency {
            Residency::TooShort => state.early_wakeups += 1,
            Residency::TooLong => state.late_wakeups += 1,
            Residency::AsExpected => state.as_expected += 1,
        }
        state.stats.record(duration);

        self.last_residency = residency;
        closed.residency = Some(residency);
        Some(closed)
    }

    fn classify(&self, depth: usize, duration: f64) -> Residency {
        if let Some(target) = self.states[depth].target_residency {
            if duration < f64::from(target) {
                return Residency::TooShort;
            }
        }

        let next = depth + 1;
        if Some(next) <= self.highest {
            if let Some(target) = self.states.get(next).and_then(|s| s.target_residency) {
                if target > 0 && duration >= f64::from(target) {
                    return Residency::TooLong;
                }
            }
        }

        Residency::AsExpected
    }

    /// Mark a wake-up entry as attributed to the last closed interval.
    ///
    /// Returns `false` if an entry was already attributed since the last
    /// idle entry.
    pub(crate) fn claim_wakeup(&mut self, entry: usize) -> bool {
        if self.wakeup.is_some() {
            return false;
        }
        self.wakeup = Some(entry);
        true
    }

    /// Check if a wake-up was already attributed since the last idle entry
    pub(crate) fn wakeup_claimed(&self) -> bool {
        self.wakeup.is_some()
    }
}
