//! Statistical multiplexing: lazy path ownership with conflict detection.

use std::collections::BTreeSet;

use epr_models::{EprPair, QuantumModel};
use qrn_01_qubit_memory::{MemoryError, QuantumMemory};
use shared_types::{
    validate_path_instructions, NodeName, PathDirection, PathId, PathInstructions, ValidationError,
};
use sim_kernel::SimRng;
use tracing::debug;

use crate::fib::{Fib, FibEntry};
use crate::mux::{
    has_intersect, intersect_tmp_path_ids, ChannelPathsMap, EntangledDecision, MuxScheme,
    PathSelect,
};

/// Statistical multiplexing scheme.
///
/// Qubits are not pinned to paths; each pair carries the set of path ids it
/// could serve, and ownership is decided lazily when a swap is performed.
/// During a parallel swap wave, neighboring nodes may decide independently
/// and inconsistently; such conflicts are detected at merge time, discarded
/// and counted.
#[derive(Debug)]
pub struct MuxSchemeStatistical {
    channel_paths: ChannelPathsMap,
    path_select: PathSelect,
    /// If true, the path id chosen at one node during a parallel swap is
    /// instantly visible at other nodes. Physically unrealistic; implemented
    /// for comparison purposes only. The default decides independently and
    /// discards conflicting entanglements.
    pub coordinated_decisions: bool,
}

impl Default for MuxSchemeStatistical {
    fn default() -> Self {
        MuxSchemeStatistical {
            channel_paths: ChannelPathsMap::default(),
            path_select: PathSelect::Random,
            coordinated_decisions: false,
        }
    }
}

impl MuxSchemeStatistical {
    pub fn new(path_select: PathSelect, coordinated_decisions: bool) -> Self {
        MuxSchemeStatistical {
            channel_paths: ChannelPathsMap::default(),
            path_select,
            coordinated_decisions,
        }
    }

    /// Candidate path ids for a fresh elementary pair on `qchannel`; empty
    /// when every path on the channel has been uninstalled.
    fn possible_path_ids(&self, qchannel: &str) -> BTreeSet<PathId> {
        self.channel_paths.paths(qchannel).iter().copied().collect()
    }

    /// Rank comparison gate: whether own node may act on this pair. All
    /// candidate paths must agree on the sign of the rank difference; a
    /// disagreement means one route is a substring of another, unsupported.
    fn can_enter_purif<M: QuantumModel>(
        &self,
        pair: &EprPair<M>,
        neighbor: &NodeName,
        own: &str,
        fib: &Fib,
    ) -> bool {
        let tmp = pair.tmp_path_ids.as_ref().expect("pair without tmp_path_ids");
        let mut diffs = tmp.iter().map(|pid| {
            let entry = fib.get(*pid).expect("candidate path without FIB entry");
            let (_, own_rank) = entry.find_index_and_rank(own).expect("own node not on route");
            let (_, p_rank) = entry
                .find_index_and_rank(neighbor)
                .expect("neighbor not on route");
            own_rank as i64 - p_rank as i64
        });
        let first = diffs.next().expect("empty tmp_path_ids");
        assert!(diffs.all(|d| d == first), "overlapping sub-routes unsupported");
        first <= 0
    }
}

impl<M: QuantumModel> MuxScheme<M> for MuxSchemeStatistical {
    fn name(&self) -> &'static str {
        "statistical multiplexing"
    }

    fn validate_instructions(&self, ins: &PathInstructions) -> Result<(), ValidationError> {
        validate_path_instructions(ins)?;
        let mismatch = |reason: &str| ValidationError::SchemeMismatch {
            scheme: "statistical".into(),
            reason: reason.into(),
        };
        if ins.m_v.is_some() {
            return Err(mismatch("multiplexing vector not allowed"));
        }
        // swap sequence must be [1, 0, .., 0, 1]
        let (first, last) = (ins.swap[0], *ins.swap.last().unwrap());
        let interior_zero = ins.swap[1..ins.swap.len() - 1].iter().all(|&s| s == 0);
        if first != 1 || last != 1 || !interior_zero {
            return Err(mismatch("swap sequence must be [1, 0, .., 0, 1]"));
        }
        if ins.purif.values().any(|&rounds| rounds != 0) {
            return Err(mismatch("purification not supported"));
        }
        Ok(())
    }

    fn qubit_has_path_id(&self) -> bool {
        false
    }

    fn install_path_neighbor(
        &mut self,
        _ins: &PathInstructions,
        entry: &FibEntry,
        _direction: PathDirection,
        _neighbor: &NodeName,
        qchannel: &str,
        _memory: &mut QuantumMemory<M>,
    ) -> Result<(), MemoryError> {
        self.channel_paths.add(qchannel, entry.path_id);
        Ok(())
    }

    fn uninstall_path_neighbor(
        &mut self,
        entry: &FibEntry,
        _direction: PathDirection,
        _neighbor: &NodeName,
        qchannel: &str,
        _memory: &mut QuantumMemory<M>,
    ) {
        self.channel_paths.remove(qchannel, entry.path_id);
    }

    fn qubit_is_entangled(
        &mut self,
        addr: usize,
        memory: &mut QuantumMemory<M>,
        neighbor: &NodeName,
        fib: &Fib,
        _rng: &mut SimRng,
    ) -> EntangledDecision {
        assert!(memory.qubit(addr).path_id.is_none());
        let qchannel = memory
            .qubit(addr)
            .qchannel
            .clone()
            .expect("no qubit-qchannel assignment");
        let possible = self.possible_path_ids(&qchannel);
        if possible.is_empty() {
            debug!(
                "{}: release entangled qubit {addr} due to uninstalled path",
                memory.node()
            );
            return EntangledDecision::Release;
        }

        let own = memory.node().to_string();
        let pair = memory.pair_mut(addr).expect("entangled qubit without pair");
        match &pair.tmp_path_ids {
            None => pair.tmp_path_ids = Some(possible),
            Some(existing) if self.coordinated_decisions => {
                assert!(existing.is_subset(&possible));
            }
            Some(existing) => {
                // both ends share the same instructions, so both derive the
                // same candidate set
                assert_eq!(*existing, possible);
            }
        }
        debug!(
            "{}: qubit {addr} has tmp_path_ids {:?}",
            own, pair.tmp_path_ids
        );

        let pair = memory.pair(addr).unwrap();
        if self.can_enter_purif(pair, neighbor, &own, fib) {
            // purification is always zero rounds here, straight to eligible
            EntangledDecision::Eligible
        } else {
            EntangledDecision::Hold
        }
    }

    fn find_swap_candidate(
        &mut self,
        addr: usize,
        memory: &mut QuantumMemory<M>,
        fib: &Fib,
        _entry: Option<&FibEntry>,
        candidates: &[usize],
        rng: &mut SimRng,
    ) -> Option<(usize, PathId)> {
        let own_channel = memory
            .qubit(addr)
            .qchannel
            .clone()
            .expect("no qubit-qchannel assignment");
        let tmp0 = memory.pair(addr)?.tmp_path_ids.clone();

        // channels whose qubits may be used with this qubit
        let matched_channels: BTreeSet<String> = self
            .channel_paths
            .channels()
            .filter(|(name, paths)| {
                **name != own_channel && has_intersect(tmp0.as_ref(), paths.iter().copied())
            })
            .map(|(name, _)| name.clone())
            .collect();

        let found = candidates.iter().copied().find(|&other| {
            let qubit = memory.qubit(other);
            let Some(pair) = memory.pair(other) else {
                return false;
            };
            qubit
                .qchannel
                .as_ref()
                .is_some_and(|ch| matched_channels.contains(ch))
                && has_intersect(
                    tmp0.as_ref(),
                    pair.tmp_path_ids.iter().flatten().copied(),
                )
        })?;

        // select a path to guide the swap updates
        let overlap: Vec<PathId> = intersect_tmp_path_ids(
            memory.pair(addr).unwrap(),
            memory.pair(found).unwrap(),
        )
        .into_iter()
        .collect();
        let selected = self.path_select.select(fib, &overlap, rng);

        if self.coordinated_decisions {
            let chosen: BTreeSet<PathId> = BTreeSet::from([selected]);
            memory.pair_mut(addr).unwrap().tmp_path_ids = Some(chosen.clone());
            memory.pair_mut(found).unwrap().tmp_path_ids = Some(chosen);
        }
        Some((found, selected))
    }

    fn swapping_succeeded(
        &mut self,
        prev: &EprPair<M>,
        next: &EprPair<M>,
        new_pair: &mut EprPair<M>,
    ) {
        new_pair.tmp_path_ids = Some(intersect_tmp_path_ids(prev, next));
    }

    fn merge_has_conflict(&self, my_new: &EprPair<M>, su_path_id: PathId) -> bool {
        let tmp = my_new.tmp_path_ids.as_ref().expect("pair without tmp_path_ids");
        if !tmp.contains(&su_path_id) {
            assert!(!self.coordinated_decisions);
            debug!("conflicting parallel swap in statistical mux, discarding update");
            return true;
        }
        false
    }

    fn merge_succeeded(
        &mut self,
        merged: &mut EprPair<M>,
        new_pair: &EprPair<M>,
        other: &EprPair<M>,
    ) {
        merged.tmp_path_ids = Some(intersect_tmp_path_ids(new_pair, other));
    }
}
