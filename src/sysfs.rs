//! Host CPU description from sysfs
//!
//! Reads the cluster/core/CPU placement and the cpuidle state table of the
//! running machine. Used by trace formats that do not carry their own
//! topology.

use crate::error::{IdleError, Result};
use crate::topology::{CpuPlacement, StateDescriptor, TopologyDescription, TopologyLayout};
use std::fs;
use std::path::{Path, PathBuf};

/// Default sysfs CPU directory
pub const SYSFS_CPU_ROOT: &str = "/sys/devices/system/cpu";

/// Reader over a sysfs-like CPU directory
#[derive(Debug, Clone)]
pub struct SysfsReader {
    root: PathBuf,
}

impl Default for SysfsReader {
    fn default() -> Self {
        Self::new()
    }
}

impl SysfsReader {
    /// Reader over the host sysfs
    pub fn new() -> Self {
        Self::with_root(SYSFS_CPU_ROOT)
    }

    /// Reader over another directory with the same layout
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory being read
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ids of online CPUs, ascending
    pub fn cpu_ids(&self) -> Result<Vec<u32>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(id) = name.strip_prefix("cpu").and_then(|s| s.parse::<u32>().ok()) else {
                continue;
            };

            // cpu0 usually has no "online" file
            let online = read_trimmed(&entry.path().join("online"))
                .map(|s| s == "1")
                .unwrap_or(true);
            if online {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    /// Placement of every online CPU
    pub fn placements(&self) -> Result<Vec<CpuPlacement>> {
        let ids = self.cpu_ids()?;
        let mut placements = Vec::with_capacity(ids.len());

        for cpu in ids {
            let topo = self.root.join(format!("cpu{}", cpu)).join("topology");
            // some platforms report -1 for the package id
            let cluster = read_trimmed(&topo.join("physical_package_id"))
                .and_then(|s| s.parse::<i64>().ok())
                .and_then(|id| u32::try_from(id).ok())
                .unwrap_or(0);
            let core = read_trimmed(&topo.join("core_id"))
                .and_then(|s| s.parse::<u32>().ok())
                .unwrap_or(cpu);

            placements.push(CpuPlacement {
                cluster,
                core,
                cpu,
                multi_cpu: false,
            });
        }

        Ok(placements)
    }

    /// cpuidle states of one CPU, by depth
    pub fn cstates(&self, cpu: u32) -> Result<Vec<StateDescriptor>> {
        let dir = self.root.join(format!("cpu{}", cpu)).join("cpuidle");
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut states = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(depth) = name.strip_prefix("state").and_then(|s| s.parse::<usize>().ok()) else {
                continue;
            };

            let state_dir = entry.path();
            states.push(StateDescriptor {
                cpu,
                depth,
                name: read_trimmed(&state_dir.join("name")).unwrap_or(name),
                target_residency: read_trimmed(&state_dir.join("residency"))
                    .and_then(|s| s.parse().ok()),
            });
        }
        states.sort_by_key(|s| s.depth);
        Ok(states)
    }

    /// Full description of the host
    pub fn describe(&self) -> Result<TopologyDescription> {
        let placements = self.placements()?;
        if placements.is_empty() {
            return Err(IdleError::MalformedTopology(format!(
                "no cpu found under {}",
                self.root.display()
            )));
        }

        let mut states = Vec::new();
        for p in &placements {
            states.extend(self.cstates(p.cpu)?);
        }
        Ok(TopologyDescription::from_placements(&placements, states))
    }

    /// Description of the host, or a flat layout of `nr_cpus` CPUs if the
    /// host cannot be read or does not match the trace
    pub fn describe_or_flat(&self, nr_cpus: u32) -> TopologyDescription {
        match self.describe() {
            Ok(desc) if desc.layout.nr_cpus() == nr_cpus as usize => desc,
            Ok(desc) => {
                log::warn!(
                    "Host has {} cpus, trace has {}; using a flat topology",
                    desc.layout.nr_cpus(),
                    nr_cpus
                );
                TopologyDescription::new(TopologyLayout::flat(nr_cpus), desc.states)
            }
            Err(e) => {
                log::warn!("Cannot read host topology ({}); using a flat topology", e);
                TopologyDescription::new(TopologyLayout::flat(nr_cpus), Vec::new())
            }
        }
    }
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path).map(|s| s.trim().to_string()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, contents: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn fake_host() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for (cpu, pkg, core) in [(0, 0, 0), (1, 0, 0), (2, 1, 0), (3, 1, 1)] {
            write(root, &format!("cpu{}/topology/physical_package_id", cpu), &format!("{}\n", pkg));
            write(root, &format!("cpu{}/topology/core_id", cpu), &format!("{}\n", core));
            write(root, &format!("cpu{}/cpuidle/state0/name", cpu), "WFI\n");
            write(root, &format!("cpu{}/cpuidle/state0/residency", cpu), "1\n");
            write(root, &format!("cpu{}/cpuidle/state1/name", cpu), "cpu-sleep\n");
            write(root, &format!("cpu{}/cpuidle/state1/residency", cpu), "500\n");
        }
        write(root, "cpu3/online", "0\n");
        fs::create_dir_all(root.join("cpufreq")).unwrap();
        dir
    }

    #[test]
    fn test_online_cpu_ids() {
        let host = fake_host();
        let reader = SysfsReader::with_root(host.path());
        assert_eq!(reader.cpu_ids().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_describe() {
        let host = fake_host();
        let desc = SysfsReader::with_root(host.path()).describe().unwrap();

        assert_eq!(desc.layout.clusters.len(), 2);
        assert_eq!(desc.layout.clusters[0].cores[0].cpus, vec![0, 1]);
        assert_eq!(desc.layout.clusters[1].cores[0].cpus, vec![2]);

        let c1 = desc.states.iter().find(|s| s.cpu == 2 && s.depth == 1).unwrap();
        assert_eq!(c1.name, "cpu-sleep");
        assert_eq!(c1.target_residency, Some(500));
    }

    #[test]
    fn test_flat_fallback() {
        let reader = SysfsReader::with_root("/nonexistent/idlescope/sysfs");
        let desc = reader.describe_or_flat(4);
        assert_eq!(desc.layout.nr_cpus(), 4);
        assert!(desc.states.is_empty());
    }

    #[test]
    fn test_cpu_count_mismatch_keeps_states() {
        let host = fake_host();
        let desc = SysfsReader::with_root(host.path()).describe_or_flat(8);
        assert_eq!(desc.layout.nr_cpus(), 8);
        assert!(!desc.states.is_empty());
    }
}
