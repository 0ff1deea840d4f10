//! Side by side comparison against a baseline trace
//!
//! Every row of the default report is followed by a delta row holding the
//! difference with the baseline. Deltas are left blank where both runs
//! agree.

use super::default::{
    cstate_line, group_header, pstate_line, rule, wakeup_line, CSTATE_WIDTH, PSTATE_WIDTH,
    WAKEUP_WIDTH,
};
use super::{CStateRow, GroupLevel, PStateRow, ReportOps};
use crate::analysis::Analysis;
use crate::cstate::CState;
use crate::error::{IdleError, Result};
use crate::pstate::PState;
use crate::stats::DurationStats;
use crate::wakeup::WakeupIrq;
use std::io::Write;

/// Comparison report, needs a baseline
#[derive(Debug, Clone, Copy, Default)]
pub struct ComparisonReport;

impl ComparisonReport {
    /// Create the report
    pub fn new() -> Self {
        Self
    }
}

/// Signed duration delta scaled like [`super::factored_time`]
fn time_delta(us: f64) -> String {
    let magnitude = us.abs();
    if us == 0.0 {
        String::new()
    } else if magnitude < 1000.0 {
        format!("{:+.0}us", us)
    } else if magnitude < 1_000_000.0 {
        format!("{:+.1}ms", us / 1000.0)
    } else if magnitude < 100_000_000_000.0 {
        format!("{:+.1}s", us / 1_000_000.0)
    } else {
        String::new()
    }
}

fn count_delta(out: &mut dyn Write, delta: i64) -> Result<()> {
    if delta == 0 {
        write!(out, " {:5} |", "")?;
    } else {
        write!(out, " {:+5} |", delta)?;
    }
    Ok(())
}

fn signed(current: u64, baseline: u64) -> i64 {
    i64::try_from(current)
        .unwrap_or(i64::MAX)
        .saturating_sub(i64::try_from(baseline).unwrap_or(i64::MAX))
}

fn stats_delta(out: &mut dyn Write, current: &DurationStats, baseline: &DurationStats) -> Result<()> {
    write!(out, "|          |")?;
    for (c, b) in [
        (current.min, baseline.min),
        (current.max, baseline.max),
        (current.avg, baseline.avg),
        (current.total, baseline.total),
    ] {
        write!(out, " {:>8} |", time_delta(c - b))?;
    }
    Ok(())
}

impl ReportOps for ComparisonReport {
    fn name(&self) -> &'static str {
        "comparison"
    }

    fn check(&self, analysis: &Analysis) -> Result<()> {
        if analysis.baseline().is_none() {
            return Err(IdleError::Config(
                "comparison report requires a baseline trace".to_string(),
            ));
        }
        Ok(())
    }

    fn cstate_table_header(&mut self, out: &mut dyn Write) -> Result<()> {
        rule(out, CSTATE_WIDTH)?;
        writeln!(
            out,
            "| C-state  |   min    |   max    |   avg    |   total  | hits  |  over | under |"
        )?;
        Ok(())
    }

    fn cstate_table_footer(&mut self, out: &mut dyn Write) -> Result<()> {
        rule(out, CSTATE_WIDTH)?;
        writeln!(out)?;
        Ok(())
    }

    fn cstate_cpu_header(&mut self, out: &mut dyn Write, label: &str, level: GroupLevel) -> Result<()> {
        group_header(out, label, level, CSTATE_WIDTH)
    }

    fn cstate_single_state(&mut self, out: &mut dyn Write, row: &CStateRow<'_>) -> Result<()> {
        let empty = CState::default();
        let current = row.current.unwrap_or(&empty);
        cstate_line(out, &row.name, current)?;

        let Some(base) = row.baseline else {
            return Ok(());
        };
        stats_delta(out, &current.stats, &base.stats)?;
        count_delta(out, signed(current.stats.count, base.stats.count))?;
        count_delta(out, signed(current.early_wakeups, base.early_wakeups))?;
        count_delta(out, signed(current.late_wakeups, base.late_wakeups))?;
        writeln!(out)?;
        Ok(())
    }

    fn pstate_table_header(&mut self, out: &mut dyn Write) -> Result<()> {
        rule(out, PSTATE_WIDTH)?;
        writeln!(
            out,
            "| P-state  |   min    |   max    |   avg    |   total  | hits  |"
        )?;
        Ok(())
    }

    fn pstate_table_footer(&mut self, out: &mut dyn Write) -> Result<()> {
        rule(out, PSTATE_WIDTH)?;
        writeln!(out)?;
        Ok(())
    }

    fn pstate_cpu_header(&mut self, out: &mut dyn Write, label: &str, level: GroupLevel) -> Result<()> {
        group_header(out, label, level, PSTATE_WIDTH)
    }

    fn pstate_single_state(&mut self, out: &mut dyn Write, row: &PStateRow<'_>) -> Result<()> {
        let empty = PState::new(row.freq);
        let current = row.current.unwrap_or(&empty);
        pstate_line(out, row.freq, current)?;

        let Some(base) = row.baseline else {
            return Ok(());
        };
        stats_delta(out, &current.stats, &base.stats)?;
        count_delta(out, signed(current.stats.count, base.stats.count))?;
        writeln!(out)?;
        Ok(())
    }

    fn wakeup_table_header(&mut self, out: &mut dyn Write) -> Result<()> {
        rule(out, WAKEUP_WIDTH)?;
        writeln!(out, "| IRQ |       Name      |  Count  |  early  |  late   |")?;
        Ok(())
    }

    fn wakeup_table_footer(&mut self, out: &mut dyn Write) -> Result<()> {
        rule(out, WAKEUP_WIDTH)?;
        writeln!(out)?;
        Ok(())
    }

    fn wakeup_cpu_header(&mut self, out: &mut dyn Write, label: &str, level: GroupLevel) -> Result<()> {
        group_header(out, label, level, WAKEUP_WIDTH)
    }

    fn wakeup_single_state(&mut self, out: &mut dyn Write, irq: &WakeupIrq) -> Result<()> {
        wakeup_line(out, irq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyze;
    use crate::config::{AnalysisConfig, ReportConfig};
    use crate::event::Event;
    use crate::report::render;
    use crate::topology::{StateDescriptor, TopologyDescription, TopologyLayout};

    fn run(idle: f64) -> Analysis {
        let states = vec![StateDescriptor {
            cpu: 0,
            depth: 0,
            name: "WFI".into(),
            target_residency: Some(1),
        }];
        let desc = TopologyDescription::new(TopologyLayout::flat(1), states);
        let events = vec![Event::idle_enter(1.0, 0, 0), Event::idle_exit(1.0 + idle, 0)];
        analyze(&desc, events, &AnalysisConfig::default()).unwrap()
    }

    #[test]
    fn test_time_delta_scaling() {
        assert_eq!(time_delta(0.0), "");
        assert_eq!(time_delta(-250.0), "-250us");
        assert_eq!(time_delta(1500.0), "+1.5ms");
        assert_eq!(time_delta(2_500_000.0), "+2.5s");
        assert_eq!(time_delta(1e12), "");
    }

    #[test]
    fn test_requires_baseline() {
        let analysis = run(0.25);
        let mut out = Vec::new();
        let result = render(
            &analysis,
            &mut ComparisonReport::new(),
            &ReportConfig::default(),
            &mut out,
        );
        assert!(matches!(result, Err(IdleError::Config(_))));
        assert!(out.is_empty());
    }

    #[test]
    fn test_delta_rows() {
        let mut analysis = run(0.25);
        analysis.attach_baseline(run(0.5)).unwrap();

        let mut out = Vec::new();
        render(
            &analysis,
            &mut ComparisonReport::new(),
            &ReportConfig::default(),
            &mut out,
        )
        .unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("|      WFI | 250.00ms | 250.00ms | 250.00ms | 250.00ms |     1 |     0 |     0 |"));
        assert!(text.contains("|          | -250.0ms | -250.0ms | -250.0ms | -250.0ms |       |       |       |"));
    }
}
