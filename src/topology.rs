//! CPU topology model
//!
//! A [`Topology`] is an ownership tree of clusters, cores and CPUs:
//!
//! ```text
//! Topology
//!  └─ Cluster (id, C-state track, P-state track)
//!      └─ Core (id, multi-CPU flag, C-state track, P-state track)
//!          └─ Cpu (id, C-state track, P-state track, wake-up table)
//! ```
//!
//! CPU tracks are fed by trace events; core and cluster tracks hold the
//! composite state derived from their members. The tree is built once from
//! a [`TopologyDescription`] and only its statistics change afterwards.
//! CPU ids are resolved through an index built at construction time.

use crate::cstate::{CStateInfo, CStateTrack, MAX_CSTATES};
use crate::error::{IdleError, Result};
use crate::pstate::PStateTrack;
use crate::wakeup::WakeupTable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One (cluster, core, cpu) placement tuple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuPlacement {
    /// Cluster (physical package) id
    pub cluster: u32,
    /// Core id within the cluster
    pub core: u32,
    /// CPU id, unique in the whole topology
    pub cpu: u32,
    /// Core declared as sharing several logical CPUs
    #[serde(default)]
    pub multi_cpu: bool,
}

/// Core layout: ordered member CPU ids
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreLayout {
    /// Core id
    pub id: u32,
    /// Core declared as sharing several logical CPUs
    #[serde(default)]
    pub multi_cpu: bool,
    /// Member CPU ids
    pub cpus: Vec<u32>,
}

/// Cluster layout: ordered member cores
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterLayout {
    /// Cluster id
    pub id: u32,
    /// Member cores
    pub cores: Vec<CoreLayout>,
}

/// Containment hierarchy without statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyLayout {
    /// Clusters ordered by id
    pub clusters: Vec<ClusterLayout>,
}

impl TopologyLayout {
    /// Build a layout from placement tuples, ordering every level by id
    pub fn from_placements(placements: &[CpuPlacement]) -> Self {
        let mut tree: BTreeMap<u32, BTreeMap<u32, (bool, Vec<u32>)>> = BTreeMap::new();
        for p in placements {
            let core = tree
                .entry(p.cluster)
                .or_default()
                .entry(p.core)
                .or_insert_with(|| (false, Vec::new()));
            core.0 |= p.multi_cpu;
            if let Err(pos) = core.1.binary_search(&p.cpu) {
                core.1.insert(pos, p.cpu);
            }
        }

        let clusters = tree
            .into_iter()
            .map(|(id, cores)| ClusterLayout {
                id,
                cores: cores
                    .into_iter()
                    .map(|(id, (multi_cpu, cpus))| CoreLayout { id, multi_cpu, cpus })
                    .collect(),
            })
            .collect();

        Self { clusters }
    }

    /// One cluster, one core per CPU
    pub fn flat(nr_cpus: u32) -> Self {
        let cores = (0..nr_cpus)
            .map(|cpu| CoreLayout {
                id: cpu,
                multi_cpu: false,
                cpus: vec![cpu],
            })
            .collect();
        Self {
            clusters: vec![ClusterLayout { id: 0, cores }],
        }
    }

    /// All CPU ids in layout order
    pub fn cpu_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.clusters
            .iter()
            .flat_map(|cluster| cluster.cores.iter())
            .flat_map(|core| core.cpus.iter().copied())
    }

    /// Number of CPUs in the layout
    pub fn nr_cpus(&self) -> usize {
        self.cpu_ids().count()
    }
}

/// C-state description for one (cpu, depth)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDescriptor {
    /// CPU id
    pub cpu: u32,
    /// C-state depth
    pub depth: usize,
    /// State name
    pub name: String,
    /// Target residency (us), if known
    pub target_residency: Option<u32>,
}

/// Everything needed to build a [`Topology`] before any event is replayed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyDescription {
    /// Containment hierarchy
    pub layout: TopologyLayout,
    /// Per-CPU C-state names and target residencies
    pub states: Vec<StateDescriptor>,
}

impl TopologyDescription {
    /// Create a description from a layout and state table
    pub fn new(layout: TopologyLayout, states: Vec<StateDescriptor>) -> Self {
        Self { layout, states }
    }

    /// Create a description from placement tuples
    pub fn from_placements(placements: &[CpuPlacement], states: Vec<StateDescriptor>) -> Self {
        Self::new(TopologyLayout::from_placements(placements), states)
    }

    /// Per-depth descriptions of one CPU
    fn cstate_infos(&self, cpu: u32) -> Vec<Option<CStateInfo>> {
        let mut infos = vec![None; MAX_CSTATES];
        for desc in self.states.iter().filter(|s| s.cpu == cpu) {
            match infos.get_mut(desc.depth) {
                Some(slot) => {
                    *slot = Some(CStateInfo {
                        name: desc.name.clone(),
                        target_residency: desc.target_residency,
                    })
                }
                None => log::warn!(
                    "Ignoring C-state {} ({}) of cpu{}: depth out of range",
                    desc.depth,
                    desc.name,
                    cpu
                ),
            }
        }
        infos
    }
}

/// A logical CPU
#[derive(Debug, Clone, Serialize)]
pub struct Cpu {
    id: u32,
    cstates: CStateTrack,
    pstates: PStateTrack,
    wakeups: WakeupTable,
}

impl Cpu {
    fn new(id: u32, cstates: CStateTrack) -> Self {
        Self {
            id,
            cstates,
            pstates: PStateTrack::new(),
            wakeups: WakeupTable::new(),
        }
    }

    /// Get the ID of this CPU
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Display label ("cpu3")
    pub fn label(&self) -> String {
        format!("cpu{}", self.id)
    }

    /// C-state statistics
    pub fn cstates(&self) -> &CStateTrack {
        &self.cstates
    }

    /// P-state statistics
    pub fn pstates(&self) -> &PStateTrack {
        &self.pstates
    }

    /// Wake-up sources
    pub fn wakeups(&self) -> &WakeupTable {
        &self.wakeups
    }

    /// Is this CPU in an idle state?
    pub fn is_idle(&self) -> bool {
        self.cstates.is_idle()
    }

    pub(crate) fn tracks_mut(&mut self) -> (&mut CStateTrack, &mut PStateTrack, &mut WakeupTable) {
        (&mut self.cstates, &mut self.pstates, &mut self.wakeups)
    }

    pub(crate) fn pstates_mut(&mut self) -> &mut PStateTrack {
        &mut self.pstates
    }
}

/// A physical core grouping one or more CPUs
#[derive(Debug, Clone, Serialize)]
pub struct Core {
    id: u32,
    multi_cpu: bool,
    cpus: Vec<Cpu>,
    cstates: CStateTrack,
    pstates: PStateTrack,
}

impl Core {
    /// Get the ID of this core
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Display label ("core0")
    pub fn label(&self) -> String {
        format!("core{}", self.id)
    }

    /// Whether the core multiplexes more than one logical CPU
    pub fn is_multi_cpu(&self) -> bool {
        self.multi_cpu
    }

    /// Member CPUs in id order
    pub fn cpus(&self) -> &[Cpu] {
        &self.cpus
    }

    /// Composite C-state statistics
    pub fn cstates(&self) -> &CStateTrack {
        &self.cstates
    }

    /// Composite P-state statistics
    pub fn pstates(&self) -> &PStateTrack {
        &self.pstates
    }

    pub(crate) fn cpus_mut(&mut self) -> &mut [Cpu] {
        &mut self.cpus
    }

    pub(crate) fn pstates_mut(&mut self) -> &mut PStateTrack {
        &mut self.pstates
    }

    pub(crate) fn group_tracks_mut(&mut self) -> (&[Cpu], &mut CStateTrack, &mut PStateTrack) {
        (&self.cpus, &mut self.cstates, &mut self.pstates)
    }
}

/// A cluster (physical package) grouping cores
#[derive(Debug, Clone, Serialize)]
pub struct Cluster {
    id: u32,
    cores: Vec<Core>,
    cstates: CStateTrack,
    pstates: PStateTrack,
}

impl Cluster {
    /// Get the ID of this cluster
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Display label ("clusterA")
    pub fn label(&self) -> String {
        match u8::try_from(self.id) {
            Ok(id) if id < 26 => format!("cluster{}", char::from(b'A' + id)),
            _ => format!("cluster{}", self.id),
        }
    }

    /// Member cores in id order
    pub fn cores(&self) -> &[Core] {
        &self.cores
    }

    /// All member CPUs
    pub fn cpus(&self) -> impl Iterator<Item = &Cpu> + '_ {
        self.cores.iter().flat_map(|core| core.cpus.iter())
    }

    /// Composite C-state statistics
    pub fn cstates(&self) -> &CStateTrack {
        &self.cstates
    }

    /// Composite P-state statistics
    pub fn pstates(&self) -> &PStateTrack {
        &self.pstates
    }

    pub(crate) fn cores_mut(&mut self) -> &mut [Core] {
        &mut self.cores
    }

    pub(crate) fn pstates_mut(&mut self) -> &mut PStateTrack {
        &mut self.pstates
    }

    pub(crate) fn group_tracks_mut(&mut self) -> (&[Core], &mut CStateTrack, &mut PStateTrack) {
        (&self.cores, &mut self.cstates, &mut self.pstates)
    }
}

/// Position of a CPU in the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuPath {
    /// Cluster index
    pub cluster: usize,
    /// Core index within the cluster
    pub core: usize,
    /// CPU index within the core
    pub cpu: usize,
}

/// The populated cluster/core/CPU tree
#[derive(Debug, Clone, Serialize)]
pub struct Topology {
    clusters: Vec<Cluster>,
    #[serde(skip)]
    index: BTreeMap<u32, CpuPath>,
}

impl Topology {
    /// Build the tree and its empty statistics
    ///
    /// Fails with [`IdleError::MalformedTopology`] if a cluster or core has no
    /// members or a CPU id appears twice.
    pub fn build(desc: &TopologyDescription) -> Result<Self> {
        let mut clusters = Vec::with_capacity(desc.layout.clusters.len());
        let mut index = BTreeMap::new();

        for (ci, cl) in desc.layout.clusters.iter().enumerate() {
            if cl.cores.is_empty() {
                return Err(IdleError::MalformedTopology(format!(
                    "cluster {} has no cores",
                    cl.id
                )));
            }

            let mut cores = Vec::with_capacity(cl.cores.len());
            for (ki, co) in cl.cores.iter().enumerate() {
                if co.cpus.is_empty() {
                    return Err(IdleError::MalformedTopology(format!(
                        "core {} of cluster {} has no cpus",
                        co.id, cl.id
                    )));
                }

                let mut cpus = Vec::with_capacity(co.cpus.len());
                for (pi, &cpu_id) in co.cpus.iter().enumerate() {
                    let path = CpuPath {
                        cluster: ci,
                        core: ki,
                        cpu: pi,
                    };
                    if index.insert(cpu_id, path).is_some() {
                        return Err(IdleError::MalformedTopology(format!(
                            "duplicate cpu id {}",
                            cpu_id
                        )));
                    }
                    let cstates = CStateTrack::with_states(&desc.cstate_infos(cpu_id));
                    cpus.push(Cpu::new(cpu_id, cstates));
                }

                // composite states reuse the descriptions of the first member
                let cstates = CStateTrack::from_template(&cpus[0].cstates);
                cores.push(Core {
                    id: co.id,
                    multi_cpu: co.multi_cpu || cpus.len() > 1,
                    cpus,
                    cstates,
                    pstates: PStateTrack::new(),
                });
            }

            let cstates = CStateTrack::from_template(&cores[0].cstates);
            clusters.push(Cluster {
                id: cl.id,
                cores,
                cstates,
                pstates: PStateTrack::new(),
            });
        }

        Ok(Self { clusters, index })
    }

    /// Clusters in id order
    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    /// All cores
    pub fn cores(&self) -> impl Iterator<Item = &Core> + '_ {
        self.clusters.iter().flat_map(|cluster| cluster.cores.iter())
    }

    /// All CPUs in tree order
    pub fn cpus(&self) -> impl Iterator<Item = &Cpu> + '_ {
        self.clusters.iter().flat_map(|cluster| cluster.cpus())
    }

    /// Number of CPUs
    pub fn nr_cpus(&self) -> usize {
        self.index.len()
    }

    /// Resolve a CPU id to its position
    pub fn locate(&self, cpu: u32) -> Result<CpuPath> {
        self.index
            .get(&cpu)
            .copied()
            .ok_or(IdleError::UnknownCpu(cpu))
    }

    /// Get a CPU by id
    pub fn cpu(&self, id: u32) -> Option<&Cpu> {
        let path = self.index.get(&id)?;
        Some(&self.clusters[path.cluster].cores[path.core].cpus[path.cpu])
    }

    /// Get the core owning a CPU
    pub fn core_of(&self, cpu: u32) -> Option<&Core> {
        let path = self.index.get(&cpu)?;
        Some(&self.clusters[path.cluster].cores[path.core])
    }

    /// Get the cluster owning a CPU
    pub fn cluster_of(&self, cpu: u32) -> Option<&Cluster> {
        let path = self.index.get(&cpu)?;
        Some(&self.clusters[path.cluster])
    }

    pub(crate) fn cpu_mut(&mut self, id: u32) -> Option<&mut Cpu> {
        let path = *self.index.get(&id)?;
        Some(&mut self.clusters[path.cluster].cores[path.core].cpus[path.cpu])
    }

    pub(crate) fn clusters_mut(&mut self) -> &mut [Cluster] {
        &mut self.clusters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placement(cluster: u32, core: u32, cpu: u32) -> CpuPlacement {
        CpuPlacement {
            cluster,
            core,
            cpu,
            multi_cpu: false,
        }
    }

    fn states(cpus: u32) -> Vec<StateDescriptor> {
        (0..cpus)
            .flat_map(|cpu| {
                [("WFI", 1), ("C1", 500)].into_iter().enumerate().map(move |(depth, (name, tr))| {
                    StateDescriptor {
                        cpu,
                        depth,
                        name: name.to_string(),
                        target_residency: Some(tr),
                    }
                })
            })
            .collect()
    }

    #[test]
    fn test_build_from_placements() {
        let placements = [
            placement(1, 0, 2),
            placement(0, 1, 1),
            placement(0, 0, 0),
            placement(1, 0, 3),
        ];
        let desc = TopologyDescription::from_placements(&placements, states(4));
        let topo = Topology::build(&desc).unwrap();

        assert_eq!(topo.nr_cpus(), 4);
        assert_eq!(topo.clusters().len(), 2);
        assert_eq!(topo.clusters()[0].label(), "clusterA");
        assert_eq!(topo.clusters()[1].label(), "clusterB");
        assert_eq!(topo.clusters()[0].cores()[1].label(), "core1");
        assert!(!topo.clusters()[0].cores()[0].is_multi_cpu());
        assert!(topo.clusters()[1].cores()[0].is_multi_cpu());

        let ids: Vec<u32> = topo.cpus().map(|c| c.id()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert_eq!(topo.core_of(3).unwrap().cpus().len(), 2);
        assert_eq!(topo.cluster_of(1).unwrap().id(), 0);
    }

    #[test]
    fn test_group_states_copied_from_first_member() {
        let desc = TopologyDescription::from_placements(
            &[placement(0, 0, 0), placement(0, 0, 1)],
            states(2),
        );
        let topo = Topology::build(&desc).unwrap();
        let core = &topo.clusters()[0].cores()[0];
        assert_eq!(core.cstates().state(1).unwrap().name.as_deref(), Some("C1"));
        assert_eq!(
            topo.clusters()[0].cstates().state(1).unwrap().target_residency,
            Some(500)
        );
    }

    #[test]
    fn test_unknown_cpu() {
        let topo = Topology::build(&TopologyDescription::new(TopologyLayout::flat(2), vec![])).unwrap();
        assert!(matches!(topo.locate(7), Err(IdleError::UnknownCpu(7))));
        assert!(topo.cpu(7).is_none());
        assert_eq!(topo.locate(1).unwrap().core, 1);
    }

    #[test]
    fn test_empty_core_rejected() {
        let layout = TopologyLayout {
            clusters: vec![ClusterLayout {
                id: 0,
                cores: vec![CoreLayout {
                    id: 0,
                    multi_cpu: true,
                    cpus: vec![],
                }],
            }],
        };
        let err = Topology::build(&TopologyDescription::new(layout, vec![])).unwrap_err();
        assert!(matches!(err, IdleError::MalformedTopology(_)));
    }

    #[test]
    fn test_empty_cluster_rejected() {
        let layout = TopologyLayout {
            clusters: vec![ClusterLayout { id: 0, cores: vec![] }],
        };
        assert!(Topology::build(&TopologyDescription::new(layout, vec![])).is_err());
    }

    #[test]
    fn test_duplicate_cpu_rejected() {
        let layout = TopologyLayout {
            clusters: vec![ClusterLayout {
                id: 0,
                cores: vec![
                    CoreLayout {
                        id: 0,
                        multi_cpu: false,
                        cpus: vec![0],
                    },
                    CoreLayout {
                        id: 1,
                        multi_cpu: false,
                        cpus: vec![0],
                    },
                ],
            }],
        };
        assert!(matches!(
            Topology::build(&TopologyDescription::new(layout, vec![])),
            Err(IdleError::MalformedTopology(_))
        ));
    }

    #[test]
    fn test_flat_layout() {
        let layout = TopologyLayout::flat(3);
        assert_eq!(layout.nr_cpus(), 3);
        assert_eq!(layout.clusters[0].cores.len(), 3);
    }
}
