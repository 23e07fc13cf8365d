//! Dynamic-EPR multiplexing: per-pair path selection at generation time.

use std::collections::BTreeSet;

use epr_models::{EprPair, QuantumModel};
use qrn_01_qubit_memory::{MemoryError, QuantumMemory};
use shared_types::{
    validate_path_instructions, NodeName, PathDirection, PathId, PathInstructions, ValidationError,
};
use sim_kernel::SimRng;
use tracing::debug;

use crate::fib::{Fib, FibEntry};
use crate::mux::{has_intersect, ChannelPathsMap, EntangledDecision, MuxScheme, PathSelect};

/// Dynamic EPR affectation multiplexing scheme.
///
/// Qubits are not pinned to paths, but each elementary pair is bound to one
/// path as soon as its first entangled notification is processed (whichever
/// end receives it earlier makes the choice; both ends derive the same
/// candidate list, so the later end adopts the recorded decision). Because
/// ownership is settled before swapping, conflicting parallel decisions are
/// impossible.
#[derive(Debug, Default)]
pub struct MuxSchemeDynamicEpr {
    channel_paths: ChannelPathsMap,
    path_select: PathSelect,
}

impl MuxSchemeDynamicEpr {
    pub fn new(path_select: PathSelect) -> Self {
        MuxSchemeDynamicEpr {
            channel_paths: ChannelPathsMap::default(),
            path_select,
        }
    }
}

impl<M: QuantumModel> MuxScheme<M> for MuxSchemeDynamicEpr {
    fn name(&self) -> &'static str {
        "dynamic EPR affectation"
    }

    fn validate_instructions(&self, ins: &PathInstructions) -> Result<(), ValidationError> {
        validate_path_instructions(ins)?;
        if ins.m_v.is_some() {
            return Err(ValidationError::SchemeMismatch {
                scheme: "dynamic-epr".into(),
                reason: "multiplexing vector not allowed".into(),
            });
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
        _neighbor: &NodeName,
        fib: &Fib,
        rng: &mut SimRng,
    ) -> EntangledDecision {
        assert!(memory.qubit(addr).path_id.is_none());
        let qchannel = memory
            .qubit(addr)
            .qchannel
            .clone()
            .expect("no qubit-qchannel assignment");
        let possible: Vec<PathId> = self.channel_paths.paths(&qchannel).to_vec();
        if possible.is_empty() {
            debug!(
                "{}: release entangled qubit {addr} due to uninstalled path",
                memory.node()
            );
            return EntangledDecision::Release;
        }

        let pair = memory.pair_mut(addr).expect("entangled qubit without pair");
        let path_id = match &pair.tmp_path_ids {
            None => {
                // the end that processes its notification first decides
                let selected = self.path_select.select(fib, &possible, rng);
                pair.tmp_path_ids = Some(BTreeSet::from([selected]));
                selected
            }
            Some(chosen) => {
                assert_eq!(chosen.len(), 1);
                *chosen.iter().next().unwrap()
            }
        };
        debug!(
            "{}: qubit {addr} has selected path_id {path_id}",
            memory.node()
        );
        EntangledDecision::Purify { path_id }
    }

    fn find_swap_candidate(
        &mut self,
        addr: usize,
        memory: &mut QuantumMemory<M>,
        _fib: &Fib,
        entry: Option<&FibEntry>,
        candidates: &[usize],
        _rng: &mut SimRng,
    ) -> Option<(usize, PathId)> {
        assert!(memory.qubit(addr).path_id.is_none());
        let entry = entry.expect("dynamic-epr swap without FIB entry");
        let found = candidates.iter().copied().find(|&other| {
            memory.pair(other).is_some_and(|pair| {
                has_intersect(pair.tmp_path_ids.as_ref(), [entry.path_id])
            })
        })?;
        Some((found, entry.path_id))
    }

    fn swapping_succeeded(
        &mut self,
        prev: &EprPair<M>,
        next: &EprPair<M>,
        new_pair: &mut EprPair<M>,
    ) {
        assert_eq!(prev.tmp_path_ids, next.tmp_path_ids);
        new_pair.tmp_path_ids = prev.tmp_path_ids.clone();
    }

    fn merge_has_conflict(&self, my_new: &EprPair<M>, su_path_id: PathId) -> bool {
        let tmp = my_new.tmp_path_ids.as_ref().expect("pair without tmp_path_ids");
        assert!(
            tmp.contains(&su_path_id),
            "unexpected conflicting parallel swap under dynamic-epr"
        );
        false
    }

    fn merge_succeeded(
        &mut self,
        merged: &mut EprPair<M>,
        new_pair: &EprPair<M>,
        other: &EprPair<M>,
    ) {
        assert_eq!(new_pair.tmp_path_ids, other.tmp_path_ids);
        merged.tmp_path_ids = new_pair.tmp_path_ids.clone();
    }
}
