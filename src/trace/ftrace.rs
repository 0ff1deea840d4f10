//! Raw ftrace text output
//!
//! ```text
//! # tracer: nop
//! #
//! # entries-in-buffer/entries-written: 2/2   #P:4
//! #
//!           <idle>-0     [001] d..2   102.345678: cpu_idle: state=2 cpu_id=1
//!           <idle>-0     [001] d..2   102.500000: cpu_idle: state=4294967295 cpu_id=1
//! ```
//!
//! The file only tells the number of CPUs; the topology and the C-state
//! names are taken from the host.

use super::{parse_event_lines, TraceAdapter, TraceData};
use crate::error::{IdleError, Result};
use crate::sysfs::SysfsReader;
use std::io::BufRead;

/// Adapter for ftrace text output
#[derive(Debug, Clone, Default)]
pub struct FtraceAdapter {
    sysfs: SysfsReader,
}

impl FtraceAdapter {
    /// Adapter describing CPUs from the host sysfs
    pub fn new() -> Self {
        Self::default()
    }

    /// Adapter describing CPUs from another sysfs tree
    pub fn with_sysfs(sysfs: SysfsReader) -> Self {
        Self { sysfs }
    }
}

/// CPU count from a header line like "# entries-in-buffer/entries-written: 2/2   #P:4"
fn header_cpus(line: &str) -> Option<u32> {
    let pos = line.find("#P:")?;
    line[pos + 3..]
        .split(|c: char| !c.is_ascii_digit())
        .next()?
        .parse()
        .ok()
}

impl TraceAdapter for FtraceAdapter {
    fn name(&self) -> &'static str {
        "ftrace"
    }

    fn matches(&self, first_line: &str) -> bool {
        first_line.starts_with("# tracer")
    }

    fn parse(&self, input: &mut dyn BufRead) -> Result<TraceData> {
        let mut lines = input.lines();
        let mut nr_cpus = 0;
        let mut first_event = None;

        for line in lines.by_ref() {
            let line = line?;
            if !line.starts_with('#') {
                first_event = Some(line);
                break;
            }
            if let Some(n) = header_cpus(&line) {
                nr_cpus = n;
            }
        }

        if nr_cpus == 0 {
            return Err(IdleError::Parse(
                "Cannot load trace file (nrcpus == 0)".to_string(),
            ));
        }

        let description = self.sysfs.describe_or_flat(nr_cpus);
        let pending = first_event.map(Ok::<String, std::io::Error>);
        let (events, skipped) = parse_event_lines(pending.into_iter().chain(lines))?;

        Ok(TraceData {
            description,
            events,
            skipped,
        })
    }
}
