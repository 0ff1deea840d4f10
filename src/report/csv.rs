//! Comma separated tables for spreadsheets
//!
//! Durations are printed in microseconds and frequencies in kHz.

use super::{CStateRow, GroupLevel, PStateRow, ReportOps};
use crate::error::Result;
use crate::wakeup::WakeupIrq;
use std::io::Write;

/// CSV report
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvReport;

impl CsvReport {
    /// Create the report
    pub fn new() -> Self {
        Self
    }
}

fn group_label(out: &mut dyn Write, label: &str, level: GroupLevel) -> Result<()> {
    let indent = match level {
        GroupLevel::Cluster => "",
        GroupLevel::Core => ",",
        GroupLevel::Cpu => ",,",
    };
    writeln!(out, "{}{}", indent, label)?;
    Ok(())
}

fn table_footer(out: &mut dyn Write) -> Result<()> {
    write!(out, "\n\n")?;
    Ok(())
}

impl ReportOps for CsvReport {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn cstate_table_header(&mut self, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "C-State Table")?;
        writeln!(
            out,
            "cluster,core,cpu,C-state,min (us),max (us),avg (us),total (us),hits,over,under"
        )?;
        Ok(())
    }

    fn cstate_table_footer(&mut self, out: &mut dyn Write) -> Result<()> {
        table_footer(out)
    }

    fn cstate_cpu_header(&mut self, out: &mut dyn Write, label: &str, level: GroupLevel) -> Result<()> {
        group_label(out, label, level)
    }

    fn cstate_single_state(&mut self, out: &mut dyn Write, row: &CStateRow<'_>) -> Result<()> {
        let Some(c) = row.current else {
            return Ok(());
        };
        writeln!(
            out,
            ",,,{},{:.6},{:.6},{:.6},{:.6},{},{},{}",
            row.name,
            c.stats.min,
            c.stats.max,
            c.stats.avg,
            c.stats.total,
            c.stats.count,
            c.early_wakeups,
            c.late_wakeups
        )?;
        Ok(())
    }

    fn pstate_table_header(&mut self, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "P-State Table")?;
        writeln!(
            out,
            ",,,P-state (kHz),min (us),max (us),avg (us),total (us),hits"
        )?;
        Ok(())
    }

    fn pstate_table_footer(&mut self, out: &mut dyn Write) -> Result<()> {
        table_footer(out)
    }

    fn pstate_cpu_header(&mut self, out: &mut dyn Write, label: &str, level: GroupLevel) -> Result<()> {
        group_label(out, label, level)
    }

    fn pstate_single_state(&mut self, out: &mut dyn Write, row: &PStateRow<'_>) -> Result<()> {
        let Some(p) = row.current else {
            return Ok(());
        };
        writeln!(
            out,
            ",,,{},{:.6},{:.6},{:.6},{:.6},{}",
            row.freq / 1000,
            p.stats.min,
            p.stats.max,
            p.stats.avg,
            p.stats.total,
            p.stats.count
        )?;
        Ok(())
    }

    fn wakeup_table_header(&mut self, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "Wakeup Table")?;
        writeln!(out, "cluster,core,cpu,IRQ,Name,Count,early,late")?;
        Ok(())
    }

    fn wakeup_table_footer(&mut self, out: &mut dyn Write) -> Result<()> {
        table_footer(out)
    }

    fn wakeup_cpu_header(&mut self, out: &mut dyn Write, label: &str, level: GroupLevel) -> Result<()> {
        group_label(out, label, level)
    }

    fn wakeup_single_state(&mut self, out: &mut dyn Write, irq: &WakeupIrq) -> Result<()> {
        match irq.id {
            Some(id) => write!(out, ",,,{},", id)?,
            None => write!(out, ",,,IPI,")?,
        }
        writeln!(
            out,
            "{},{},{},{}",
            irq.name, irq.count, irq.early_triggers, irq.late_triggers
        )?;
        Ok(())
    }
}
