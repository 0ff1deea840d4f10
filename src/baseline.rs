//! Baseline merge
//!
//! Before a run is compared against a baseline run, both P-state tables of
//! every entity are aligned so that they hold the same frequencies in the
//! same order. Reports can then walk the two tables slot by slot.

use crate::error::{IdleError, Result};
use crate::pstate::PStateTrack;
use crate::topology::Topology;

/// Align the P-state tables of two tracks
///
/// Walks both sorted tables in lock-step and inserts a zero-count slot into
/// whichever table misses the frequency at the current rank.
pub fn merge_tracks(current: &mut PStateTrack, baseline: &mut PStateTrack) -> Result<()> {
    let mut rank = 0;
    loop {
        let lhs = current.states().get(rank).map(|p| p.freq);
        let rhs = baseline.states().get(rank).map(|p| p.freq);

        match (lhs, rhs) {
            (None, None) => break,
            (Some(a), Some(b)) if a == b => {}
            (Some(a), Some(b)) if a < b => {
                baseline.slot_for(a)?;
            }
            (Some(a), None) => {
                baseline.slot_for(a)?;
            }
            (_, Some(b)) => {
                current.slot_for(b)?;
            }
        }
        rank += 1;
    }
    Ok(())
}

/// Align every P-state table of `current` with `baseline`
///
/// CPUs are matched by id, cores and clusters by their ids. Entities
/// present in only one tree are left alone.
pub fn merge_pstates(current: &mut Topology, baseline: &mut Topology) -> Result<()> {
    if current.nr_cpus() != baseline.nr_cpus() {
        return Err(IdleError::InconsistentBaseline(format!(
            "baseline has {} cpus, current run has {}",
            baseline.nr_cpus(),
            current.nr_cpus()
        )));
    }

    for cluster in current.clusters_mut() {
        let Some(base_cluster) = baseline
            .clusters_mut()
            .iter_mut()
            .find(|c| c.id() == cluster.id())
        else {
            continue;
        };
        merge_tracks(cluster.pstates_mut(), base_cluster.pstates_mut())?;

        for core in cluster.cores_mut() {
            let Some(base_core) = base_cluster
                .cores_mut()
                .iter_mut()
                .find(|c| c.id() == core.id())
            else {
                continue;
            };
            merge_tracks(core.pstates_mut(), base_core.pstates_mut())?;
        }
    }

    let ids: Vec<u32> = current.cpus().map(|cpu| cpu.id()).collect();
    for id in ids {
        if let (Some(cpu), Some(base)) = (current.cpu_mut(id), baseline.cpu_mut(id)) {
            merge_tracks(cpu.pstates_mut(), base.pstates_mut())?;
        }
    }

    Ok(())
}
