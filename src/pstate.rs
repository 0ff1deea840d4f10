//! P-state (frequency) tracking
//!
//! A [`PStateTrack`] holds one slot per observed frequency, sorted by
//! ascending frequency. Slots are allocated lazily the first time a
//! frequency is seen and are never removed. The track alternates between
//! "running at the selected slot" (a dwell is open) and "idle" (no dwell).

use crate::error::Result;
use crate::stats::{DurationStats, USEC_PER_SEC};
use serde::{Deserialize, Serialize};

/// Statistics for one frequency slot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PState {
    /// Frequency in Hz
    pub freq: u64,
    /// Dwell statistics (us)
    pub stats: DurationStats,
}

impl PState {
    /// Create an empty slot
    pub fn new(freq: u64) -> Self {
        Self {
            freq,
            stats: DurationStats::new(),
        }
    }
}

/// Per-entity P-state statistics and state machine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PStateTrack {
    /// Slots sorted by ascending frequency
    states: Vec<PState>,
    /// Selected slot, `None` while unknown
    current: Option<usize>,
    /// Entity is idle, no dwell is open
    idle: bool,
    /// Start of the open dwell (s)
    dwell_start: f64,
}

impl PStateTrack {
    /// Create an empty track
    pub fn new() -> Self {
        Self::default()
    }

    /// Frequency slots in ascending order
    pub fn states(&self) -> &[PState] {
        &self.states
    }

    /// Index of the selected slot
    pub fn current(&self) -> Option<usize> {
        self.current
    }

    /// Frequency of the selected slot
    pub fn current_freq(&self) -> Option<u64> {
        self.current.map(|i| self.states[i].freq)
    }

    /// Check if the entity is idle
    pub fn is_idle(&self) -> bool {
        self.idle
    }

    /// Check if no frequency was ever observed
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Start of the open dwell, if one is open
    pub fn dwell_start(&self) -> Option<f64> {
        match self.current {
            Some(_) if !self.idle => Some(self.dwell_start),
            _ => None,
        }
    }

    /// Find the slot holding `freq`
    pub fn find(&self, freq: u64) -> Option<usize> {
        self.states.binary_search_by(|p| p.freq.cmp(&freq)).ok()
    }

    /// Find the slot holding `freq`, allocating a zeroed one if needed
    ///
    /// Inserting in the middle shifts the identity of every following slot;
    /// the selected slot index follows the shift.
    pub fn slot_for(&mut self, freq: u64) -> Result<usize> {
        match self.states.binary_search_by(|p| p.freq.cmp(&freq)) {
            Ok(index) => Ok(index),
            Err(index) => {
                self.states.try_reserve(1)?;
                self.states.insert(index, PState::new(freq));
                if let Some(current) = self.current.as_mut() {
                    if *current >= index {
                        *current += 1;
                    }
                }
                Ok(index)
            }
        }
    }

    /// Apply a raw CPU frequency change
    ///
    /// While idle only the selected slot moves; the dwell opens on idle exit.
    pub fn change_freq(&mut self, time: f64, freq: u64) -> Result<()> {
        let next = self.slot_for(freq)?;

        if self.idle {
            self.current = Some(next);
            return Ok(());
        }

        self.switch_to(time, next);
        Ok(())
    }

    /// Apply a composite group frequency
    ///
    /// A frequency of 0 means no member is running at a known frequency:
    /// the open dwell is closed and the selection becomes unknown.
    pub fn record_group_freq(&mut self, time: f64, freq: u64) -> Result<()> {
        if freq == 0 {
            if self.current.is_some() {
                self.close_dwell(time);
                self.current = None;
            }
            return Ok(());
        }

        let next = self.slot_for(freq)?;
        self.switch_to(time, next);
        Ok(())
    }

    /// The entity entered an idle state
    pub fn enter_idle(&mut self, time: f64) {
        if !self.idle && self.current.is_some() {
            self.close_dwell(time);
        }
        self.idle = true;
    }

    /// The entity left its idle state
    pub fn exit_idle(&mut self, time: f64) {
        if !self.idle {
            return;
        }
        self.idle = false;
        if self.current.is_some() {
            self.dwell_start = time;
        }
    }

    fn switch_to(&mut self, time: f64, next: usize) {
        match self.current {
            Some(current) if current == next => return,
            Some(_) => self.close_dwell(time),
            None => {}
        }
        self.current = Some(next);
        self.dwell_start = time;
    }

    fn close_dwell(&mut self, time: f64) {
        let Some(current) = self.current else {
            return;
        };
        let elapsed = (time - self.dwell_start) * USEC_PER_SEC;
        // duplicate timestamps produce empty dwells
        if elapsed > 0.0 {
            self.states[current].stats.record(elapsed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GHZ: u64 = 1_000_000_000;

    fn is_sorted(track: &PStateTrack) -> bool {
        track.states().windows(2).all(|w| w[0].freq < w[1].freq)
    }

    #[test]
    fn test_same_frequency_is_noop() {
        let mut ps = PStateTrack::new();
        ps.change_freq(1.0, 1_200_000_000).unwrap();
        ps.change_freq(2.0, 1_200_000_000).unwrap();

        assert_eq!(ps.states().len(), 1);
        assert_eq!(ps.states()[0].stats.count, 0);
        assert_eq!(ps.dwell_start(), Some(1.0));

        ps.change_freq(3.0, 2 * GHZ).unwrap();
        let slot = &ps.states()[ps.find(1_200_000_000).unwrap()];
        assert_eq!(slot.stats.count, 1);
        assert!((slot.stats.total - 2_000_000.0).abs() < 1e-3);
    }

    #[test]
    fn test_slots_stay_sorted() {
        let mut ps = PStateTrack::new();
        let mut t = 0.0;
        for f in [3 * GHZ, GHZ, 2 * GHZ, 4 * GHZ, GHZ / 2, 2 * GHZ] {
            ps.change_freq(t, f).unwrap();
            assert!(is_sorted(&ps));
            t += 0.1;
        }
        assert_eq!(ps.states().len(), 5);
    }

    #[test]
    fn test_insert_keeps_current_selection() {
        let mut ps = PStateTrack::new();
        ps.change_freq(0.0, 2 * GHZ).unwrap();
        assert_eq!(ps.current_freq(), Some(2 * GHZ));

        // lower frequency inserted before the selected slot
        ps.slot_for(GHZ).unwrap();
        assert_eq!(ps.current(), Some(1));
        assert_eq!(ps.current_freq(), Some(2 * GHZ));

        ps.change_freq(1.0, GHZ).unwrap();
        assert_eq!(ps.states()[1].stats.count, 1);
    }

    #[test]
    fn test_idle_closes_and_reopens_dwell() {
        let mut ps = PStateTrack::new();
        ps.change_freq(0.0, GHZ).unwrap();
        ps.enter_idle(1.0);
        assert!(ps.is_idle());
        assert_eq!(ps.states()[0].stats.count, 1);
        assert_eq!(ps.dwell_start(), None);

        ps.exit_idle(5.0);
        assert_eq!(ps.dwell_start(), Some(5.0));
        ps.change_freq(6.0, 2 * GHZ).unwrap();

        let stats = ps.states()[0].stats;
        assert_eq!(stats.count, 2);
        assert!((stats.total - 2_000_000.0).abs() < 1e-3);
    }

    #[test]
    fn test_change_while_idle_defers_dwell() {
        let mut ps = PStateTrack::new();
        ps.change_freq(0.0, GHZ).unwrap();
        ps.enter_idle(1.0);
        ps.change_freq(2.0, 2 * GHZ).unwrap();
        assert_eq!(ps.current_freq(), Some(2 * GHZ));
        assert_eq!(ps.states()[1].stats.count, 0);

        ps.exit_idle(3.0);
        ps.change_freq(4.0, GHZ).unwrap();
        assert_eq!(ps.states()[1].stats.count, 1);
        assert!((ps.states()[1].stats.total - 1_000_000.0).abs() < 1e-3);
    }

    #[test]
    fn test_duplicate_timestamp_not_counted() {
        let mut ps = PStateTrack::new();
        ps.change_freq(1.0, GHZ).unwrap();
        ps.change_freq(1.0, 2 * GHZ).unwrap();
        assert_eq!(ps.states()[0].stats.count, 0);
        assert_eq!(ps.current_freq(), Some(2 * GHZ));
    }

    #[test]
    fn test_group_zero_frequency_closes_dwell() {
        let mut ps = PStateTrack::new();
        ps.record_group_freq(0.0, GHZ).unwrap();
        ps.record_group_freq(0.5, GHZ).unwrap();
        ps.record_group_freq(1.0, 0).unwrap();
        assert_eq!(ps.current(), None);
        assert_eq!(ps.states()[0].stats.count, 1);

        ps.record_group_freq(2.0, 0).unwrap();
        assert_eq!(ps.states()[0].stats.count, 1);
    }
}
