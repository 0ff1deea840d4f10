//! Report rendering
//!
//! Reports walk the populated topology cluster by cluster, then through
//! each multi-CPU core, then each CPU, and receive one callback per
//! non-empty row. A group's label header is emitted right before its first
//! row, so groups with nothing to show are skipped entirely. When a
//! baseline is attached every row carries the matching baseline row too.
//!
//! Concrete formats implement [`ReportOps`] and are looked up by name in a
//! [`ReportRegistry`].

pub mod comparison;
pub mod csv;
pub mod default;

pub use comparison::ComparisonReport;
pub use csv::CsvReport;
pub use default::DefaultReport;

use crate::analysis::Analysis;
use crate::config::ReportConfig;
use crate::cstate::{CState, CStateTrack};
use crate::error::{IdleError, Result};
use crate::pstate::{PState, PStateTrack};
use crate::topology::{Cluster, Core, Cpu, Topology};
use crate::wakeup::WakeupIrq;
use std::collections::BTreeMap;
use std::io::Write;

/// One C-state row
#[derive(Debug, Clone)]
pub struct CStateRow<'a> {
    /// Depth
    pub depth: usize,
    /// Display name
    pub name: String,
    /// Statistics of this run, if the state was used
    pub current: Option<&'a CState>,
    /// Statistics of the baseline run, if attached and used
    pub baseline: Option<&'a CState>,
}

/// One P-state row
#[derive(Debug, Clone)]
pub struct PStateRow<'a> {
    /// Frequency (Hz)
    pub freq: u64,
    /// Statistics of this run, if the frequency was used
    pub current: Option<&'a PState>,
    /// Statistics of the baseline run, if attached and used
    pub baseline: Option<&'a PState>,
}

/// Kind of group a label header introduces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupLevel {
    /// A cluster
    Cluster,
    /// A core
    Core,
    /// A CPU
    Cpu,
}

/// Callbacks of one output format
///
/// Every callback writes to `out`. Formats that keep no state between rows
/// can ignore `&mut self`.
pub trait ReportOps {
    /// Registry name
    fn name(&self) -> &'static str;

    /// Refuse analyses the format cannot render
    fn check(&self, _analysis: &Analysis) -> Result<()> {
        Ok(())
    }

    /// Start of the C-state table
    fn cstate_table_header(&mut self, out: &mut dyn Write) -> Result<()>;
    /// End of the C-state table
    fn cstate_table_footer(&mut self, out: &mut dyn Write) -> Result<()>;
    /// Label of a group, before its first C-state row
    fn cstate_cpu_header(&mut self, out: &mut dyn Write, label: &str, level: GroupLevel) -> Result<()>;
    /// One C-state row
    fn cstate_single_state(&mut self, out: &mut dyn Write, row: &CStateRow<'_>) -> Result<()>;
    /// After the last C-state row of a group
    fn cstate_end_cpu(&mut self, _out: &mut dyn Write) -> Result<()> {
        Ok(())
    }

    /// Start of the P-state table
    fn pstate_table_header(&mut self, out: &mut dyn Write) -> Result<()>;
    /// End of the P-state table
    fn pstate_table_footer(&mut self, out: &mut dyn Write) -> Result<()>;
    /// Label of a group, before its first P-state row
    fn pstate_cpu_header(&mut self, out: &mut dyn Write, label: &str, level: GroupLevel) -> Result<()>;
    /// One P-state row
    fn pstate_single_state(&mut self, out: &mut dyn Write, row: &PStateRow<'_>) -> Result<()>;
    /// After the last P-state row of a group
    fn pstate_end_cpu(&mut self, _out: &mut dyn Write) -> Result<()> {
        Ok(())
    }

    /// Start of the wake-up table
    fn wakeup_table_header(&mut self, out: &mut dyn Write) -> Result<()>;
    /// End of the wake-up table
    fn wakeup_table_footer(&mut self, out: &mut dyn Write) -> Result<()>;
    /// Label of a CPU, before its first wake-up row
    fn wakeup_cpu_header(&mut self, out: &mut dyn Write, label: &str, level: GroupLevel) -> Result<()>;
    /// One wake-up source
    fn wakeup_single_state(&mut self, out: &mut dyn Write, irq: &WakeupIrq) -> Result<()>;
    /// After the last wake-up row of a CPU
    fn wakeup_end_cpu(&mut self, _out: &mut dyn Write) -> Result<()> {
        Ok(())
    }
}

/// Constructor stored in a [`ReportRegistry`]
pub type ReportFactory = fn() -> Box<dyn ReportOps>;

/// Runtime table of report formats
pub struct ReportRegistry {
    factories: BTreeMap<&'static str, ReportFactory>,
}

impl Default for ReportRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register("default", || Box::new(DefaultReport::new()));
        registry.register("csv", || Box::new(CsvReport::new()));
        registry.register("comparison", || Box::new(ComparisonReport::new()));
        registry
    }
}

impl ReportRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Add or replace a format
    pub fn register(&mut self, name: &'static str, factory: ReportFactory) {
        self.factories.insert(name, factory);
    }

    /// Registered format names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }

    /// Instantiate a format by name
    pub fn create(&self, name: &str) -> Result<Box<dyn ReportOps>> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| IdleError::UnknownReport(name.to_string()))
    }
}

/// Render the tables selected in `config`
pub fn render(
    analysis: &Analysis,
    ops: &mut dyn ReportOps,
    config: &ReportConfig,
    out: &mut dyn Write,
) -> Result<()> {
    ops.check(analysis)?;
    let topo = analysis.topology();
    let baseline = analysis.baseline();

    if config.idle {
        ops.cstate_table_header(out)?;
        dump_cstates(topo, baseline, ops, out)?;
        ops.cstate_table_footer(out)?;
    }

    if config.frequency {
        ops.pstate_table_header(out)?;
        dump_pstates(topo, baseline, ops, out)?;
        ops.pstate_table_footer(out)?;
    }

    if config.wakeup {
        ops.wakeup_table_header(out)?;
        dump_wakeups(topo, ops, out)?;
        ops.wakeup_table_footer(out)?;
    }

    out.flush()?;
    Ok(())
}

/// Write the populated topology, with every statistic, as JSON
pub fn dump_json(analysis: &Analysis, out: &mut dyn Write) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, analysis.topology())?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

/// Baseline counterpart of each level, matched by id
struct Counterparts<'a> {
    baseline: Option<&'a Topology>,
}

impl<'a> Counterparts<'a> {
    fn cluster(&self, cluster: &Cluster) -> Option<&'a Cluster> {
        self.baseline?
            .clusters()
            .iter()
            .find(|c| c.id() == cluster.id())
    }

    fn core(&self, cluster: &Cluster, core: &Core) -> Option<&'a Core> {
        self.cluster(cluster)?
            .cores()
            .iter()
            .find(|c| c.id() == core.id())
    }

    fn cpu(&self, cpu: &Cpu) -> Option<&'a Cpu> {
        self.baseline?.cpu(cpu.id())
    }
}

/// Walk every group in report order: cluster, multi-CPU cores, CPUs
fn walk<'a, F>(topo: &'a Topology, baseline: Option<&'a Topology>, mut visit: F) -> Result<()>
where
    F: FnMut(GroupLevel, String, Group<'a>) -> Result<()>,
{
    let base = Counterparts { baseline };

    for cluster in topo.clusters() {
        let bc = base.cluster(cluster);
        visit(
            GroupLevel::Cluster,
            cluster.label(),
            Group {
                cstates: cluster.cstates(),
                pstates: cluster.pstates(),
                base_cstates: bc.map(|c| c.cstates()),
                base_pstates: bc.map(|c| c.pstates()),
            },
        )?;

        for core in cluster.cores() {
            if core.is_multi_cpu() {
                let bk = base.core(cluster, core);
                visit(
                    GroupLevel::Core,
                    core.label(),
                    Group {
                        cstates: core.cstates(),
                        pstates: core.pstates(),
                        base_cstates: bk.map(|c| c.cstates()),
                        base_pstates: bk.map(|c| c.pstates()),
                    },
                )?;
            }

            for cpu in core.cpus() {
                let bp = base.cpu(cpu);
                visit(
                    GroupLevel::Cpu,
                    cpu.label(),
                    Group {
                        cstates: cpu.cstates(),
                        pstates: cpu.pstates(),
                        base_cstates: bp.map(|c| c.cstates()),
                        base_pstates: bp.map(|c| c.pstates()),
                    },
                )?;
            }
        }
    }

    Ok(())
}

struct Group<'a> {
    cstates: &'a CStateTrack,
    pstates: &'a PStateTrack,
    base_cstates: Option<&'a CStateTrack>,
    base_pstates: Option<&'a PStateTrack>,
}

/// Non-empty C-state rows of one group
pub fn cstate_rows<'a>(current: &'a CStateTrack, baseline: Option<&'a CStateTrack>) -> Vec<CStateRow<'a>> {
    let used = |s: &&CState| !s.stats.is_empty();

    (0..current.states().len())
        .filter_map(|depth| {
            let cur = current.state(depth).filter(used);
            let base = baseline.and_then(|b| b.state(depth)).filter(used);
            let state = cur.or(base)?;
            Some(CStateRow {
                depth,
                name: state.name.clone().unwrap_or_else(|| format!("C{}", depth)),
                current: cur,
                baseline: base,
            })
        })
        .collect()
}

/// Non-empty P-state rows of one group, by ascending frequency
pub fn pstate_rows<'a>(current: &'a PStateTrack, baseline: Option<&'a PStateTrack>) -> Vec<PStateRow<'a>> {
    let used = |p: &&PState| !p.stats.is_empty();

    let mut freqs: Vec<u64> = current.states().iter().map(|p| p.freq).collect();
    if let Some(b) = baseline {
        freqs.extend(b.states().iter().map(|p| p.freq));
        freqs.sort_unstable();
        freqs.dedup();
    }

    freqs
        .into_iter()
        .filter_map(|freq| {
            let cur = current.find(freq).map(|i| &current.states()[i]).filter(used);
            let base = baseline
                .and_then(|b| b.find(freq).map(|i| &b.states()[i]))
                .filter(used);
            cur.or(base)?;
            Some(PStateRow {
                freq,
                current: cur,
                baseline: base,
            })
        })
        .collect()
}

/// Emit the C-state rows of every group
pub fn dump_cstates(
    topo: &Topology,
    baseline: Option<&Topology>,
    ops: &mut dyn ReportOps,
    out: &mut dyn Write,
) -> Result<()> {
    walk(topo, baseline, |level, label, group| {
        let rows = cstate_rows(group.cstates, group.base_cstates);
        if rows.is_empty() {
            return Ok(());
        }
        ops.cstate_cpu_header(out, &label, level)?;
        for row in &rows {
            ops.cstate_single_state(out, row)?;
        }
        ops.cstate_end_cpu(out)
    })
}

/// Emit the P-state rows of every group
pub fn dump_pstates(
    topo: &Topology,
    baseline: Option<&Topology>,
    ops: &mut dyn ReportOps,
    out: &mut dyn Write,
) -> Result<()> {
    walk(topo, baseline, |level, label, group| {
        let rows = pstate_rows(group.pstates, group.base_pstates);
        if rows.is_empty() {
            return Ok(());
        }
        ops.pstate_cpu_header(out, &label, level)?;
        for row in &rows {
            ops.pstate_single_state(out, row)?;
        }
        ops.pstate_end_cpu(out)
    })
}

/// Emit the wake-up sources of every CPU
pub fn dump_wakeups(topo: &Topology, ops: &mut dyn ReportOps, out: &mut dyn Write) -> Result<()> {
    for cpu in topo.cpus() {
        let irqs = cpu.wakeups().irqs();
        if irqs.is_empty() {
            continue;
        }
        ops.wakeup_cpu_header(out, &cpu.label(), GroupLevel::Cpu)?;
        for irq in irqs {
            ops.wakeup_single_state(out, irq)?;
        }
        ops.wakeup_end_cpu(out)?;
    }
    Ok(())
}

/// Duration (us) scaled to us, ms or s
pub fn factored_time(us: f64) -> String {
    if us < 1000.0 {
        format!("{:.0}us", us)
    } else if us < 1_000_000.0 {
        format!("{:.2}ms", us / 1000.0)
    } else {
        format!("{:.2}s", us / 1_000_000.0)
    }
}

/// Frequency (Hz) scaled to kHz, MHz or GHz
pub fn factored_freq(hz: u64) -> String {
    let f = hz as f64;
    if hz < 1_000 {
        format!("{}Hz", hz)
    } else if hz < 1_000_000 {
        format!("{:.2}kHz", f / 1e3)
    } else if hz < 1_000_000_000 {
        format!("{:.2}MHz", f / 1e6)
    } else {
        format!("{:.2}GHz", f / 1e9)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyze;
    use crate::config::AnalysisConfig;
    use crate::event::Event;
    use crate::topology::{ClusterLayout, CoreLayout, StateDescriptor, TopologyDescription, TopologyLayout};

    /// Records the callback sequence
    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
    }

    impl ReportOps for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }
        fn cstate_table_header(&mut self, _: &mut dyn Write) -> Result<()> {
            Ok(())
        }
        fn cstate_table_footer(&mut self, _: &mut dyn Write) -> Result<()> {
            Ok(())
        }
        fn cstate_cpu_header(&mut self, _: &mut dyn Write, label: &str, _: GroupLevel) -> Result<()> {
            self.calls.push(label.to_string());
            Ok(())
        }
        fn cstate_single_state(&mut self, _: &mut dyn Write, row: &CStateRow<'_>) -> Result<()> {
            self.calls.push(format!("  {}", row.name));
            Ok(())
        }
        fn pstate_table_header(&mut self, _: &mut dyn Write) -> Result<()> {
            Ok(())
        }
        fn pstate_table_footer(&mut self, _: &mut dyn Write) -> Result<()> {
            Ok(())
        }
        fn pstate_cpu_header(&mut self, _: &mut dyn Write, label: &str, _: GroupLevel) -> Result<()> {
            self.calls.push(label.to_string());
            Ok(())
        }
        fn pstate_single_state(&mut self, _: &mut dyn Write, row: &PStateRow<'_>) -> Result<()> {
            self.calls.push(format!("  {}", row.freq));
            Ok(())
        }
        fn wakeup_table_header(&mut self, _: &mut dyn Write) -> Result<()> {
            Ok(())
        }
        fn wakeup_table_footer(&mut self, _: &mut dyn Write) -> Result<()> {
            Ok(())
        }
        fn wakeup_cpu_header(&mut self, _: &mut dyn Write, label: &str, _: GroupLevel) -> Result<()> {
            self.calls.push(label.to_string());
            Ok(())
        }
        fn wakeup_single_state(&mut self, _: &mut dyn Write, irq: &WakeupIrq) -> Result<()> {
            self.calls.push(format!("  {}", irq.name));
            Ok(())
        }
    }

    fn desc() -> TopologyDescription {
        let layout = TopologyLayout {
            clusters: vec![ClusterLayout {
                id: 0,
                cores: vec![
                    CoreLayout {
                        id: 0,
                        multi_cpu: true,
                        cpus: vec![0, 1],
                    },
                    CoreLayout {
                        id: 1,
                        multi_cpu: false,
                        cpus: vec![2],
                    },
                ],
            }],
        };
        let states = (0..3)
            .flat_map(|cpu| {
                [("WFI", 1), ("C1", 300)].into_iter().enumerate().map(move |(depth, (name, tr))| {
                    StateDescriptor {
                        cpu,
                        depth,
                        name: name.into(),
                        target_residency: Some(tr),
                    }
                })
            })
            .collect();
        TopologyDescription::new(layout, states)
    }

    fn events() -> Vec<Event> {
        vec![
            Event::idle_enter(0.0, 2, 0),
            Event::idle_enter(0.0, 0, 1),
            Event::idle_enter(0.1, 1, 0),
            Event::idle_exit(0.2, 1),
            Event::idle_exit(0.3, 0),
            Event::irq(0.3, 0, 30, "arch_timer"),
            Event::idle_exit(0.35, 2),
            Event::freq_change(0.4, 2, 1_000_000_000),
            Event::idle_enter(0.5, 2, 0),
        ]
    }

    #[test]
    fn test_cstate_traversal_order() {
        let analysis = analyze(&desc(), events(), &AnalysisConfig::default()).unwrap();
        let mut rec = Recorder::default();
        dump_cstates(analysis.topology(), None, &mut rec, &mut std::io::sink()).unwrap();

        // core1 holds a single cpu and gets no header of its own
        assert_eq!(
            rec.calls,
            vec!["clusterA", "  WFI", "core0", "  WFI", "cpu0", "  C1", "cpu1", "  WFI", "cpu2", "  WFI"]
        );
    }

    #[test]
    fn test_pstate_and_wakeup_traversal() {
        let analysis = analyze(&desc(), events(), &AnalysisConfig::default()).unwrap();
        let mut rec = Recorder::default();
        dump_pstates(analysis.topology(), None, &mut rec, &mut std::io::sink()).unwrap();
        assert_eq!(rec.calls, vec!["clusterA", "  1000000000", "cpu2", "  1000000000"]);

        let mut rec = Recorder::default();
        dump_wakeups(analysis.topology(), &mut rec, &mut std::io::sink()).unwrap();
        assert_eq!(rec.calls, vec!["cpu0", "  arch_timer"]);
    }

    #[test]
    fn test_rows_pair_with_baseline() {
        let current = analyze(&desc(), events(), &AnalysisConfig::default()).unwrap();
        let base_events = vec![Event::idle_enter(0.0, 2, 1), Event::idle_exit(1.0, 2)];
        let baseline = analyze(&desc(), base_events, &AnalysisConfig::default()).unwrap();

        let cpu = current.topology().cpu(2).unwrap();
        let base = baseline.topology().cpu(2).unwrap();
        let rows = cstate_rows(cpu.cstates(), Some(base.cstates()));
        assert_eq!(rows.len(), 2);
        assert!(rows[0].current.is_some());
        assert!(rows[0].baseline.is_none());
        assert_eq!(rows[1].name, "C1");
        assert!(rows[1].current.is_none());
        assert_eq!(rows[1].baseline.unwrap().stats.count, 1);
    }

    #[test]
    fn test_json_dump() {
        let analysis = analyze(&desc(), events(), &AnalysisConfig::default()).unwrap();
        let mut out = Vec::new();
        dump_json(&analysis, &mut out).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        let cluster = &value["clusters"][0];
        assert_eq!(cluster["id"], 0);
        assert_eq!(cluster["cores"].as_array().unwrap().len(), 2);
        assert_eq!(cluster["cores"][0]["cpus"][0]["id"], 0);
    }

    #[test]
    fn test_registry() {
        let registry = ReportRegistry::default();
        assert_eq!(registry.names(), vec!["comparison", "csv", "default"]);
        assert_eq!(registry.create("csv").unwrap().name(), "csv");
        assert!(matches!(registry.create("boxless"), Err(IdleError::UnknownReport(_))));
    }

    #[test]
    fn test_factored_values() {
        assert_eq!(factored_time(999.0), "999us");
        assert_eq!(factored_time(1500.0), "1.50ms");
        assert_eq!(factored_time(2_500_000.0), "2.50s");
        assert_eq!(factored_freq(800_000_000), "800.00MHz");
        assert_eq!(factored_freq(1_200_000_000), "1.20GHz");
    }
}
