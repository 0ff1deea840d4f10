//! Running duration statistics shared by C-state, P-state and interval tables

use serde::{Deserialize, Serialize};

/// Microseconds per second; trace timestamps are seconds, durations are microseconds
pub const USEC_PER_SEC: f64 = 1_000_000.0;

/// Aggregate of closed intervals
///
/// Only the aggregate is retained once an interval is closed. The average
/// is a running mean, so the order of samples matters only through
/// floating-point rounding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DurationStats {
    /// Number of closed intervals
    pub count: u64,
    /// Shortest interval (us), 0 when empty
    pub min: f64,
    /// Longest interval (us)
    pub max: f64,
    /// Running average (us)
    pub avg: f64,
    /// Cumulative time (us)
    pub total: f64,
}

impl DurationStats {
    /// Create empty statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one closed interval into the aggregate
    pub fn record(&mut self, duration: f64) {
        if self.count == 0 {
            self.min = duration;
            self.max = duration;
        } else {
            self.min = self.min.min(duration);
            self.max = self.max.max(duration);
        }
        self.avg += (duration - self.avg) / (self.count + 1) as f64;
        self.total += duration;
        self.count += 1;
    }

    /// Check if no interval was ever recorded
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_average() {
        let mut stats = DurationStats::new();
        for d in [100.0, 300.0, 200.0] {
            stats.record(d);
        }
        assert_eq!(stats.count, 3);
        assert_eq!(stats.min, 100.0);
        assert_eq!(stats.max, 300.0);
        assert!((stats.avg - 200.0).abs() < 1e-9);
        assert!((stats.total - 600.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_min_is_zero() {
        let stats = DurationStats::new();
        assert!(stats.is_empty());
        assert_eq!(stats.min, 0.0);
    }
}
