//! Boxed text tables

use super::{factored_freq, factored_time, CStateRow, GroupLevel, PStateRow, ReportOps};
use crate::cstate::CState;
use crate::error::Result;
use crate::pstate::PState;
use crate::wakeup::WakeupIrq;
use std::io::Write;

pub(crate) const CSTATE_WIDTH: usize = 80;
pub(crate) const PSTATE_WIDTH: usize = 64;
pub(crate) const WAKEUP_WIDTH: usize = 55;

pub(crate) fn rule(out: &mut dyn Write, width: usize) -> Result<()> {
    writeln!(out, "{}", "-".repeat(width))?;
    Ok(())
}

/// Boxed group label, indented by level
pub(crate) fn group_header(
    out: &mut dyn Write,
    label: &str,
    level: GroupLevel,
    width: usize,
) -> Result<()> {
    rule(out, width)?;
    match level {
        GroupLevel::Cluster => writeln!(out, "| {:<w$} |", label, w = width - 4)?,
        GroupLevel::Core => writeln!(out, "|      {:<w$} |", label, w = width - 9)?,
        GroupLevel::Cpu => writeln!(out, "|             {:<w$} |", label, w = width - 16)?,
    }
    rule(out, width)
}

pub(crate) fn cstate_line(out: &mut dyn Write, name: &str, c: &CState) -> Result<()> {
    writeln!(
        out,
        "| {:>8} | {:>8} | {:>8} | {:>8} | {:>8} | {:>5} | {:>5} | {:>5} |",
        name,
        factored_time(c.stats.min),
        factored_time(c.stats.max),
        factored_time(c.stats.avg),
        factored_time(c.stats.total),
        c.stats.count,
        c.early_wakeups,
        c.late_wakeups
    )?;
    Ok(())
}

pub(crate) fn pstate_line(out: &mut dyn Write, freq: u64, p: &PState) -> Result<()> {
    writeln!(
        out,
        "| {:>8} | {:>8} | {:>8} | {:>8} | {:>8} | {:>5} |",
        factored_freq(freq),
        factored_time(p.stats.min),
        factored_time(p.stats.max),
        factored_time(p.stats.avg),
        factored_time(p.stats.total),
        p.stats.count
    )?;
    Ok(())
}

pub(crate) fn wakeup_line(out: &mut dyn Write, irq: &WakeupIrq) -> Result<()> {
    let id = match irq.id {
        Some(id) => id.to_string(),
        None => "IPI".to_string(),
    };
    writeln!(
        out,
        "| {:<3} | {:<15.15} | {:>7} | {:>7} | {:>7} |",
        id, irq.name, irq.count, irq.early_triggers, irq.late_triggers
    )?;
    Ok(())
}

/// Human readable report, one boxed table per statistic
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultReport;

impl DefaultReport {
    /// Create the report
    pub fn new() -> Self {
        Self
    }
}

impl ReportOps for DefaultReport {
    fn name(&self) -> &'static str {
        "default"
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
        match row.current {
            Some(c) => cstate_line(out, &row.name, c),
            None => Ok(()),
        }
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
        match row.current {
            Some(p) => pstate_line(out, row.freq, p),
            None => Ok(()),
        }
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
