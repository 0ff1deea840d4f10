//! idlestat native trace files
//!
//! A header carrying the CPU count, the topology and the per-CPU C-state
//! table, followed by ftrace event lines:
//!
//! ```text
//! idlestat version = 0.1.0
//! cpus=2
//! clusterA:
//!         core0
//!                 cpu0
//!                 cpu1
//! cpuid 0:
//!         WFI
//!         1
//!         (null)
//!         -1
//!         ...
//! ```
//!
//! Each `cpuid` block holds one name/residency line pair per depth.
//! Single-CPU cores may be written as `\tcpuN` directly under the cluster.

use super::{parse_event_lines, TraceAdapter, TraceData};
use crate::cstate::MAX_CSTATES;
use crate::error::{IdleError, Result};
use crate::topology::{
    ClusterLayout, CoreLayout, StateDescriptor, TopologyDescription, TopologyLayout,
};
use std::io::{BufRead, Write};

const MAGIC: &str = "idlestat version";
const NULL_STATE: &str = "(null)";

/// Adapter for idlestat native traces
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeAdapter;

impl NativeAdapter {
    /// Create the adapter
    pub fn new() -> Self {
        Self
    }
}

fn parse_err(msg: impl Into<String>) -> IdleError {
    IdleError::Parse(msg.into())
}

fn next_line<I>(lines: &mut I) -> Result<Option<String>>
where
    I: Iterator<Item = std::io::Result<String>>,
{
    Ok(lines.next().transpose()?)
}

/// Apply one topology line; returns `false` when the line is not part of
/// the topology block
fn topology_line(layout: &mut TopologyLayout, line: &str) -> Result<bool> {
    if let Some(rest) = line.strip_prefix("cluster") {
        let letter = rest
            .chars()
            .next()
            .filter(|c| c.is_ascii_uppercase())
            .ok_or_else(|| parse_err(format!("bad cluster line: {}", line)))?;
        layout.clusters.push(ClusterLayout {
            id: u32::from(letter) - u32::from('A'),
            cores: Vec::new(),
        });
        return Ok(true);
    }

    let Some(cluster) = layout.clusters.last_mut() else {
        return Ok(false);
    };

    let number = |s: &str| -> Result<u32> {
        s.trim()
            .parse()
            .map_err(|_| parse_err(format!("bad topology line: {}", line)))
    };

    if let Some(cpu) = line.strip_prefix("\t\tcpu") {
        let core = cluster.cores.last_mut().ok_or_else(|| {
            IdleError::MalformedTopology(format!("cpu outside of a core: {}", line.trim()))
        })?;
        core.cpus.push(number(cpu)?);
    } else if let Some(core) = line.strip_prefix("\tcore") {
        cluster.cores.push(CoreLayout {
            id: number(core)?,
            multi_cpu: true,
            cpus: Vec::new(),
        });
    } else if let Some(cpu) = line.strip_prefix("\tcpu") {
        let id = number(cpu)?;
        cluster.cores.push(CoreLayout {
            id,
            multi_cpu: false,
            cpus: vec![id],
        });
    } else {
        return Ok(false);
    }
    Ok(true)
}

fn cpuid(line: &str) -> Option<u32> {
    line.strip_prefix("cpuid")?
        .trim()
        .trim_end_matches(':')
        .parse()
        .ok()
}

impl TraceAdapter for NativeAdapter {
    fn name(&self) -> &'static str {
        "idlestat"
    }

    fn matches(&self, first_line: &str) -> bool {
        first_line.starts_with(MAGIC)
    }

    fn parse(&self, input: &mut dyn BufRead) -> Result<TraceData> {
        let mut lines = input.lines();

        let version = next_line(&mut lines)?.unwrap_or_default();
        if !self.matches(&version) {
            return Err(IdleError::UnrecognizedTrace(version));
        }

        let nr_cpus: u32 = next_line(&mut lines)?
            .as_deref()
            .and_then(|l| l.trim().strip_prefix("cpus="))
            .and_then(|n| n.parse().ok())
            .filter(|&n| n > 0)
            .ok_or_else(|| parse_err("Cannot load trace file (nrcpus == 0)"))?;

        let mut layout = TopologyLayout::default();
        let mut line = next_line(&mut lines)?;
        while let Some(l) = line.as_deref() {
            if !topology_line(&mut layout, l)? {
                break;
            }
            line = next_line(&mut lines)?;
        }

        let mut states = Vec::new();
        while let Some(cpu) = line.as_deref().and_then(cpuid) {
            for depth in 0..MAX_CSTATES {
                let name = next_line(&mut lines)?
                    .ok_or_else(|| parse_err(format!("truncated C-state table of cpu{}", cpu)))?;
                let residency = next_line(&mut lines)?
                    .ok_or_else(|| parse_err(format!("truncated C-state table of cpu{}", cpu)))?;

                let name = name.trim();
                if name == NULL_STATE {
                    continue;
                }
                let residency: i64 = residency
                    .trim()
                    .parse()
                    .map_err(|_| parse_err(format!("bad residency for {} on cpu{}", name, cpu)))?;
                states.push(StateDescriptor {
                    cpu,
                    depth,
                    name: name.to_string(),
                    target_residency: u32::try_from(residency).ok(),
                });
            }
            line = next_line(&mut lines)?;
        }

        if layout.clusters.is_empty() {
            log::warn!("Trace has no topology; using a flat topology");
            layout = TopologyLayout::flat(nr_cpus);
        } else if layout.nr_cpus() != nr_cpus as usize {
            log::warn!(
                "Trace declares {} cpus but its topology holds {}",
                nr_cpus,
                layout.nr_cpus()
            );
        }

        let pending = line.map(Ok::<String, std::io::Error>);
        let (events, skipped) = parse_event_lines(pending.into_iter().chain(lines))?;

        Ok(TraceData {
            description: TopologyDescription::new(layout, states),
            events,
            skipped,
        })
    }
}

/// Write the header of a native trace for `desc`
pub fn write_header(out: &mut dyn Write, desc: &TopologyDescription) -> Result<()> {
    writeln!(out, "{} = {}", MAGIC, crate::VERSION)?;
    writeln!(out, "cpus={}", desc.layout.nr_cpus())?;

    for cluster in &desc.layout.clusters {
        match u8::try_from(cluster.id) {
            Ok(id) if id < 26 => writeln!(out, "cluster{}:", char::from(b'A' + id))?,
            _ => {
                return Err(IdleError::MalformedTopology(format!(
                    "cluster id {} cannot be written",
                    cluster.id
                )))
            }
        }
        for core in &cluster.cores {
            writeln!(out, "\tcore{}", core.id)?;
            for cpu in &core.cpus {
                writeln!(out, "\t\tcpu{}", cpu)?;
            }
        }
    }

    let mut cpus: Vec<u32> = desc.layout.cpu_ids().collect();
    cpus.sort_unstable();
    for cpu in cpus {
        writeln!(out, "cpuid {}:", cpu)?;
        for depth in 0..MAX_CSTATES {
            match desc.states.iter().find(|s| s.cpu == cpu && s.depth == depth) {
                Some(state) => {
                    let residency = state.target_residency.map_or(-1, i64::from);
                    writeln!(out, "\t{}\n\t{}", state.name, residency)?;
                }
                None => writeln!(out, "\t{}\n\t-1", NULL_STATE)?,
            }
        }
    }

    Ok(())
}
