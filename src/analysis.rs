//! Event replay
//!
//! The [`Analyzer`] replays a time-ordered event stream against a
//! [`Topology`]. Each event updates one CPU; the owning core and cluster
//! are then recomputed from their members and fed the result as if it were
//! a primitive event of their own.
//!
//! ```no_run
//! use idlescope::{analyze, AnalysisConfig, Event, TopologyDescription, TopologyLayout};
//!
//! # fn main() -> idlescope::Result<()> {
//! let desc = TopologyDescription::new(TopologyLayout::flat(2), vec![]);
//! let events = vec![Event::idle_enter(0.0, 0, 1), Event::idle_exit(0.5, 0)];
//! let analysis = analyze(&desc, events, &AnalysisConfig::default())?;
//! println!("{} events", analysis.summary().events);
//! # Ok(())
//! # }
//! ```

use crate::baseline::merge_pstates;
use crate::composite::{composite_depth, composite_freq, FreqExtremum};
use crate::config::{AnalysisConfig, Verbosity};
use crate::cstate::{CStateTrack, ClosedInterval};
use crate::error::{IdleError, Result};
use crate::event::{Event, EventKind};
use crate::intervals::{Interval, IntervalArena, IntervalSetId};
use crate::pstate::PStateTrack;
use crate::topology::{Cpu, CpuPath, Topology, TopologyDescription};
use crate::wakeup::store_irq;
use serde::Serialize;
use std::collections::BTreeMap;

/// What the replay saw
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AnalysisSummary {
    /// Timestamp of the first idle event (s)
    pub begin: Option<f64>,
    /// Timestamp of the last idle event (s)
    pub end: Option<f64>,
    /// Events applied
    pub events: u64,
    /// Events dropped as structurally invalid
    pub dropped: u64,
}

impl AnalysisSummary {
    /// Span covered by idle events (s)
    pub fn duration(&self) -> f64 {
        match (self.begin, self.end) {
            (Some(begin), Some(end)) => end - begin,
            _ => 0.0,
        }
    }
}

/// Retained CPU idle intervals, one set per (cpu, depth)
#[derive(Debug, Default)]
struct IntervalIndex {
    arena: IntervalArena,
    sets: BTreeMap<(u32, usize), IntervalSetId>,
}

impl IntervalIndex {
    fn record(&mut self, cpu: u32, closed: &ClosedInterval) -> Result<()> {
        let id = match self.sets.get(&(cpu, closed.depth)) {
            Some(&id) => id,
            None => {
                let id = self.arena.alloc()?;
                self.sets.insert((cpu, closed.depth), id);
                id
            }
        };
        self.arena.push(id, Interval::new(closed.begin, closed.end))
    }
}

/// Incremental replay engine
pub struct Analyzer {
    config: AnalysisConfig,
    topology: Topology,
    summary: AnalysisSummary,
    intervals: Option<IntervalIndex>,
}

impl Analyzer {
    /// Build the topology and empty statistics
    pub fn new(desc: &TopologyDescription, config: &AnalysisConfig) -> Result<Self> {
        let topology = Topology::build(desc)?;
        let intervals = config.retain_intervals.then(IntervalIndex::default);
        Ok(Self {
            config: config.clone(),
            topology,
            summary: AnalysisSummary::default(),
            intervals,
        })
    }

    /// Topology being populated
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Counters so far
    pub fn summary(&self) -> &AnalysisSummary {
        &self.summary
    }

    /// Apply one event
    ///
    /// Events for unknown CPUs or out-of-range depths are dropped with a
    /// warning. Any other error aborts the replay.
    pub fn process(&mut self, event: &Event) -> Result<()> {
        match self.apply(event) {
            Ok(()) => {
                self.summary.events += 1;
                if event.is_idle() {
                    self.summary.begin.get_or_insert(event.timestamp);
                    self.summary.end = Some(event.timestamp);
                }
                Ok(())
            }
            Err(err) if err.is_recoverable() => {
                log::warn!("Dropping event at {:.6}: {}", event.timestamp, err);
                self.summary.dropped += 1;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Apply every event of a stream, in order
    pub fn process_all<I>(&mut self, events: I) -> Result<()>
    where
        I: IntoIterator<Item = Event>,
    {
        for event in events {
            self.process(&event)?;
        }
        Ok(())
    }

    /// Close whatever is still open and hand over the statistics
    ///
    /// An idle state left open at the end of the stream is closed with a
    /// zero-length interval, which is discarded.
    pub fn finish(mut self) -> Analysis {
        let verbose = self.config.verbosity.is_verbose();

        for cluster in self.topology.clusters_mut() {
            for core in cluster.cores_mut() {
                for cpu in core.cpus_mut() {
                    let id = cpu.id();
                    if let Some(closed) = cpu.tracks_mut().0.abandon() {
                        if verbose {
                            log::debug!(
                                "cpu{}: closing dangling C-state {} opened at {:.6}",
                                id,
                                closed.depth,
                                closed.begin
                            );
                        }
                    }
                }
                core.group_tracks_mut().1.abandon();
            }
            cluster.group_tracks_mut().1.abandon();
        }

        if self.config.verbosity > Verbosity::Quiet {
            log::info!(
                "trace is {:.6} secs long with {} events",
                self.summary.duration(),
                self.summary.events
            );
        }

        Analysis {
            topology: self.topology,
            summary: self.summary,
            baseline: None,
            intervals: self.intervals,
        }
    }

    fn apply(&mut self, event: &Event) -> Result<()> {
        let path = self.topology.locate(event.cpu)?;
        let time = event.timestamp;

        match &event.kind {
            EventKind::IdleEnter(depth) => {
                if !CStateTrack::supports_depth(*depth) {
                    return Err(IdleError::UnknownDepth {
                        cpu: event.cpu,
                        depth: *depth,
                    });
                }
                self.cpu_cstate(event.cpu, time, Some(*depth))?;
            }
            EventKind::IdleExit => self.cpu_cstate(event.cpu, time, None)?,
            EventKind::FreqChange(freq) => {
                self.cpu_mut(event.cpu)?.pstates_mut().change_freq(time, *freq)?;
            }
            EventKind::Wakeup { id, name } => {
                let verbose = self.config.verbosity.is_verbose();
                let cpu = self.cpu_mut(event.cpu)?;
                let (cstates, _, wakeups) = cpu.tracks_mut();
                if !store_irq(wakeups, cstates, *id, name) && verbose {
                    log::debug!(
                        "cpu{}: {} at {:.6} not attributed, wake-up already counted",
                        event.cpu,
                        name,
                        time
                    );
                }
                return Ok(());
            }
        }

        self.refresh_groups(path, time)
    }

    fn cpu_mut(&mut self, id: u32) -> Result<&mut Cpu> {
        self.topology.cpu_mut(id).ok_or(IdleError::UnknownCpu(id))
    }

    fn cpu_cstate(&mut self, id: u32, time: f64, depth: Option<usize>) -> Result<()> {
        let verbose = self.config.verbosity.is_verbose();
        let cpu = self.cpu_mut(id)?;
        let (cstates, pstates, _) = cpu.tracks_mut();

        let closed = cstates.record(time, depth);
        match depth {
            Some(_) => pstates.enter_idle(time),
            None => pstates.exit_idle(time),
        }

        let Some(closed) = closed else {
            return Ok(());
        };
        if closed.is_discarded() {
            if verbose {
                log::debug!(
                    "cpu{}: discarding C-state {} interval of {:.3}us at {:.6}",
                    id,
                    closed.depth,
                    closed.duration,
                    closed.end
                );
            }
        } else if let Some(intervals) = self.intervals.as_mut() {
            intervals.record(id, &closed)?;
        }
        Ok(())
    }

    /// Recompute the composite state of the core, then of the cluster
    fn refresh_groups(&mut self, path: CpuPath, time: f64) -> Result<()> {
        let extremum = self.config.composite_frequency;
        let verbose = self.config.verbosity.is_verbose();
        let cluster = &mut self.topology.clusters_mut()[path.cluster];

        let core = &mut cluster.cores_mut()[path.core];
        let label = core.label();
        let (cpus, cstates, pstates) = core.group_tracks_mut();
        update_group(cpus.iter(), cstates, pstates, time, extremum, verbose, &label)?;

        let label = cluster.label();
        let (cores, cstates, pstates) = cluster.group_tracks_mut();
        let members = cores.iter().flat_map(|core| core.cpus().iter());
        update_group(members, cstates, pstates, time, extremum, verbose, &label)
    }
}

fn update_group<'a, I>(
    members: I,
    cstates: &mut CStateTrack,
    pstates: &mut PStateTrack,
    time: f64,
    extremum: FreqExtremum,
    verbose: bool,
    label: &str,
) -> Result<()>
where
    I: Iterator<Item = &'a Cpu> + Clone,
{
    let depth = composite_depth(members.clone());
    let freq = composite_freq(members, extremum);

    if let Some(closed) = cstates.record(time, depth) {
        if closed.is_discarded() && verbose {
            log::debug!(
                "{}: discarding C-state {} interval at {:.6}",
                label,
                closed.depth,
                closed.end
            );
        }
    }
    pstates.record_group_freq(time, freq)
}

/// Populated statistics of one replay
#[derive(Debug)]
pub struct Analysis {
    topology: Topology,
    summary: AnalysisSummary,
    baseline: Option<Topology>,
    intervals: Option<IntervalIndex>,
}

impl Analysis {
    /// Populated topology
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Stream summary
    pub fn summary(&self) -> &AnalysisSummary {
        &self.summary
    }

    /// Baseline topology, once attached
    pub fn baseline(&self) -> Option<&Topology> {
        self.baseline.as_ref()
    }

    /// Attach a baseline run for comparison
    ///
    /// Both trees get their P-state tables aligned (see
    /// [`crate::baseline::merge_pstates`]).
    pub fn attach_baseline(&mut self, baseline: Analysis) -> Result<()> {
        let mut baseline = baseline.topology;
        merge_pstates(&mut self.topology, &mut baseline)?;
        self.baseline = Some(baseline);
        Ok(())
    }

    /// Time (us) the given CPUs spent simultaneously at `depth`
    ///
    /// Requires `retain_intervals`.
    pub fn overlap(&mut self, cpus: &[u32], depth: usize) -> Result<f64> {
        let index = self
            .intervals
            .as_mut()
            .ok_or_else(|| IdleError::Config("interval retention is disabled".into()))?;

        // intermediate intersections are released before returning
        let mark = index.arena.len();
        let mut acc: Option<IntervalSetId> = None;
        for cpu in cpus {
            let Some(&set) = index.sets.get(&(*cpu, depth)) else {
                index.arena.truncate(mark);
                return Ok(0.0);
            };
            let next = match acc {
                Some(prev) => index.arena.intersect(prev, set),
                None => Ok(set),
            };
            match next {
                Ok(id) => acc = Some(id),
                Err(err) => {
                    index.arena.truncate(mark);
                    return Err(err);
                }
            }
        }

        let total = acc
            .and_then(|id| index.arena.get(id))
            .map(|set| set.total())
            .unwrap_or(0.0);
        index.arena.truncate(mark);
        Ok(total)
    }

    /// Give up the statistics tree
    pub fn into_topology(self) -> Topology {
        self.topology
    }
}

/// Replay a whole stream in one call
pub fn analyze<I>(desc: &TopologyDescription, events: I, config: &AnalysisConfig) -> Result<Analysis>
where
    I: IntoIterator<Item = Event>,
{
    let mut analyzer = Analyzer::new(desc, config)?;
    analyzer.process_all(events)?;
    Ok(analyzer.finish())
}
