//! Buffer-space multiplexing: static per-path qubit allocation.

use epr_models::{EprPair, QuantumModel};
use qrn_01_qubit_memory::{AllocateCount, MemoryError, QuantumMemory};
use shared_types::{
    validate_path_instructions, NodeName, PathDirection, PathId, PathInstructions, ValidationError,
};
use sim_kernel::SimRng;
use tracing::debug;

use crate::fib::{Fib, FibEntry};
use crate::mux::{EntangledDecision, MuxScheme};

/// Buffer-space multiplexing scheme.
///
/// Each path gets a fixed share of the qubits assigned to every channel it
/// crosses, taken from the FIB multiplexing vector. Qubits stay pinned to
/// their path for the lifetime of the installation, so swap decisions can
/// never conflict.
#[derive(Debug, Default)]
pub struct MuxSchemeBufferSpace;

impl<M: QuantumModel> MuxScheme<M> for MuxSchemeBufferSpace {
    fn name(&self) -> &'static str {
        "buffer-space multiplexing"
    }

    fn validate_instructions(&self, ins: &PathInstructions) -> Result<(), ValidationError> {
        validate_path_instructions(ins)?;
        if ins.m_v.is_none() {
            return Err(ValidationError::SchemeMismatch {
                scheme: "buffer-space".into(),
                reason: "multiplexing vector required".into(),
            });
        }
        Ok(())
    }

    fn qubit_has_path_id(&self) -> bool {
        true
    }

    fn install_path_neighbor(
        &mut self,
        ins: &PathInstructions,
        entry: &FibEntry,
        direction: PathDirection,
        _neighbor: &NodeName,
        qchannel: &str,
        memory: &mut QuantumMemory<M>,
    ) -> Result<(), MemoryError> {
        let m_v = ins.m_v.as_ref().expect("validated instructions carry m_v");
        // direction selects the link and the side of its (left, right) pair
        let (m_v_offset, ch_side) = match direction {
            PathDirection::Left => (-1, 1),
            PathDirection::Right => (0, 0),
        };
        let link = (entry.own_idx as isize + m_v_offset) as usize;
        let n_qubits = match ch_side {
            0 => m_v[link].0,
            _ => m_v[link].1,
        };

        let count = if n_qubits == 0 {
            // zero means use all qubits assigned to this channel
            AllocateCount::All
        } else {
            AllocateCount::N(n_qubits as usize)
        };
        let addrs = memory.allocate(qchannel, entry.path_id, direction, count)?;
        debug!(
            "{}: allocated {direction:?} qubits: {addrs:?}",
            memory.node()
        );
        Ok(())
    }

    fn uninstall_path_neighbor(
        &mut self,
        entry: &FibEntry,
        direction: PathDirection,
        _neighbor: &NodeName,
        qchannel: &str,
        memory: &mut QuantumMemory<M>,
    ) {
        let addrs = memory.find_all(Some(qchannel), |q, _| q.path_id == Some(entry.path_id));
        memory.deallocate(&addrs);
        debug!(
            "{}: deallocated {direction:?} qubits: {addrs:?}",
            memory.node()
        );
    }

    fn qubit_is_entangled(
        &mut self,
        addr: usize,
        memory: &mut QuantumMemory<M>,
        _neighbor: &NodeName,
        fib: &Fib,
        _rng: &mut SimRng,
    ) -> EntangledDecision {
        let Some(path_id) = memory.qubit(addr).path_id else {
            debug!(
                "{}: release entangled qubit {addr} due to uninstalled path",
                memory.node()
            );
            return EntangledDecision::Release;
        };
        assert!(fib.get(path_id).is_some(), "allocated qubit without FIB entry");
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
        let entry = entry.expect("buffer-space swap without FIB entry");
        let own_direction = memory.qubit(addr).path_direction;
        let found = candidates.iter().copied().find(|&other| {
            let qubit = memory.qubit(other);
            qubit.path_id == Some(entry.path_id) // on the same path
                && qubit.path_direction != own_direction // opposite direction
        })?;
        Some((found, entry.path_id))
    }

    fn swapping_succeeded(
        &mut self,
        prev: &EprPair<M>,
        next: &EprPair<M>,
        _new_pair: &mut EprPair<M>,
    ) {
        assert!(prev.tmp_path_ids.is_none());
        assert!(next.tmp_path_ids.is_none());
    }

    fn merge_has_conflict(&self, my_new: &EprPair<M>, _su_path_id: PathId) -> bool {
        assert!(my_new.tmp_path_ids.is_none());
        false
    }

    fn merge_succeeded(
        &mut self,
        _merged: &mut EprPair<M>,
        new_pair: &EprPair<M>,
        other: &EprPair<M>,
    ) {
        assert!(new_pair.tmp_path_ids.is_none());
        assert!(other.tmp_path_ids.is_none());
    }
}
