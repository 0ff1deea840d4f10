//! Interval sets and their intersection
//!
//! Sets live in an [`IntervalArena`] and are addressed by [`IntervalSetId`]
//! handles. Combining sets never touches its inputs: the result is always
//! stored under a fresh handle.

use crate::error::{IdleError, Result};
use crate::stats::USEC_PER_SEC;
use serde::{Deserialize, Serialize};

/// A closed time interval (s)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    /// Start (s)
    pub begin: f64,
    /// End (s)
    pub end: f64,
}

impl Interval {
    /// Create an interval
    pub fn new(begin: f64, end: f64) -> Self {
        Self { begin, end }
    }

    /// Length in microseconds
    pub fn duration(&self) -> f64 {
        (self.end - self.begin) * USEC_PER_SEC
    }
}

/// Handle to a set stored in an [`IntervalArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IntervalSetId(usize);

/// Non-empty intervals ordered by start time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntervalSet {
    intervals: Vec<Interval>,
}

impl IntervalSet {
    /// Intervals in start order
    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    /// Number of intervals
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    /// Check if the set holds no interval
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Summed length (us)
    pub fn total(&self) -> f64 {
        self.intervals.iter().map(Interval::duration).sum()
    }

    fn insert(&mut self, interval: Interval) {
        // appends are the common case, events arrive in order
        match self.intervals.last() {
            Some(last) if last.begin > interval.begin => {
                let pos = self
                    .intervals
                    .partition_point(|i| i.begin <= interval.begin);
                self.intervals.insert(pos, interval);
            }
            _ => self.intervals.push(interval),
        }
    }
}

/// Owned storage for interval sets
#[derive(Debug, Clone, Default)]
pub struct IntervalArena {
    sets: Vec<IntervalSet>,
}

impl IntervalArena {
    /// Create an empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sets
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// Check if no set was allocated
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Allocate an empty set
    pub fn alloc(&mut self) -> Result<IntervalSetId> {
        self.store(IntervalSet::default())
    }

    /// Get a set by handle
    pub fn get(&self, id: IntervalSetId) -> Option<&IntervalSet> {
        self.sets.get(id.0)
    }

    /// Add an interval to a set; empty and negative intervals are ignored
    pub fn push(&mut self, id: IntervalSetId, interval: Interval) -> Result<()> {
        let set = self
            .sets
            .get_mut(id.0)
            .ok_or_else(|| IdleError::Other(format!("unknown interval set {}", id.0)))?;
        if interval.end > interval.begin {
            set.intervals.try_reserve(1)?;
            set.insert(interval);
        }
        Ok(())
    }

    /// Intersect two sets into a new one
    pub fn intersect(&mut self, a: IntervalSetId, b: IntervalSetId) -> Result<IntervalSetId> {
        let lhs = self
            .get(a)
            .ok_or_else(|| IdleError::Other(format!("unknown interval set {}", a.0)))?;
        let rhs = self
            .get(b)
            .ok_or_else(|| IdleError::Other(format!("unknown interval set {}", b.0)))?;

        let mut out = IntervalSet::default();
        let (x, y) = (lhs.intervals(), rhs.intervals());
        let (mut i, mut j) = (0, 0);
        while i < x.len() && j < y.len() {
            let begin = x[i].begin.max(y[j].begin);
            let end = x[i].end.min(y[j].end);
            if end > begin {
                out.intervals.try_reserve(1)?;
                out.intervals.push(Interval::new(begin, end));
            }
            if x[i].end < y[j].end {
                i += 1;
            } else {
                j += 1;
            }
        }

        self.store(out)
    }

    /// Drop every set allocated after the first `len`
    ///
    /// Handles to dropped sets become invalid.
    pub fn truncate(&mut self, len: usize) {
        self.sets.truncate(len);
    }

    fn store(&mut self, set: IntervalSet) -> Result<IntervalSetId> {
        self.sets.try_reserve(1)?;
        self.sets.push(set);
        Ok(IntervalSetId(self.sets.len() - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(arena: &mut IntervalArena, spans: &[(f64, f64)]) -> IntervalSetId {
        let id = arena.alloc().unwrap();
        for &(b, e) in spans {
            arena.push(id, Interval::new(b, e)).unwrap();
        }
        id
    }

    #[test]
    fn test_intersection() {
        let mut arena = IntervalArena::new();
        let a = set(&mut arena, &[(0.0, 1.0), (2.0, 4.0)]);
        let b = set(&mut arena, &[(0.5, 2.5), (3.0, 3.5)]);
        let c = arena.intersect(a, b).unwrap();

        let got = arena.get(c).unwrap().intervals().to_vec();
        assert_eq!(
            got,
            vec![
                Interval::new(0.5, 1.0),
                Interval::new(2.0, 2.5),
                Interval::new(3.0, 3.5)
            ]
        );
        assert!((arena.get(c).unwrap().total() - 1_500_000.0).abs() < 1e-3);
    }

    #[test]
    fn test_intersect_returns_new_handle() {
        let mut arena = IntervalArena::new();
        let a = set(&mut arena, &[(0.0, 1.0)]);
        let b = arena.intersect(a, a).unwrap();
        assert_ne!(a, b);
        assert_eq!(arena.len(), 2);

        arena.push(b, Interval::new(5.0, 6.0)).unwrap();
        assert_eq!(arena.get(a).unwrap().len(), 1);
        assert_eq!(arena.get(b).unwrap().len(), 2);
    }

    #[test]
    fn test_disjoint_is_empty() {
        let mut arena = IntervalArena::new();
        let a = set(&mut arena, &[(0.0, 1.0)]);
        let b = set(&mut arena, &[(1.0, 2.0)]);
        let c = arena.intersect(a, b).unwrap();
        assert!(arena.get(c).unwrap().is_empty());
    }

    #[test]
    fn test_out_of_order_push_stays_sorted() {
        let mut arena = IntervalArena::new();
        let a = set(&mut arena, &[(2.0, 3.0), (0.0, 1.0), (1.0, 1.0)]);
        let begins: Vec<f64> = arena.get(a).unwrap().intervals().iter().map(|i| i.begin).collect();
        assert_eq!(begins, vec![0.0, 2.0]);
    }

    #[test]
    fn test_truncate_releases_later_sets() {
        let mut arena = IntervalArena::new();
        let a = set(&mut arena, &[(0.0, 1.0)]);
        let mark = arena.len();
        let b = arena.intersect(a, a).unwrap();

        arena.truncate(mark);
        assert_eq!(arena.len(), 1);
        assert!(arena.get(b).is_none());
        assert_eq!(arena.get(a).unwrap().len(), 1);
    }
}
