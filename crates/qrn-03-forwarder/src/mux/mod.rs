//! Path multiplexing schemes.
//!
//! A multiplexing scheme governs how qubits and pairs are allocated or
//! matched across the paths sharing a quantum channel. The closed set of
//! implementations is selected when the forwarder is constructed:
//!
//! - [`MuxSchemeBufferSpace`] — static per-path qubit allocation from the
//!   FIB multiplexing vector (the default),
//! - [`MuxSchemeStatistical`] — lazy path ownership decided at swap time,
//!   with conflict detection between parallel decisions,
//! - [`MuxSchemeDynamicEpr`] — per-pair path selection at generation time.

mod buffer_space;
mod dynamic_epr;
mod statistical;

use std::collections::{BTreeSet, HashMap};

use epr_models::{EprPair, QuantumModel};
use qrn_01_qubit_memory::{MemoryError, QuantumMemory};
use shared_types::{NodeName, PathDirection, PathId, PathInstructions, ValidationError};
use sim_kernel::SimRng;

use crate::fib::{Fib, FibEntry};

pub use buffer_space::MuxSchemeBufferSpace;
pub use dynamic_epr::MuxSchemeDynamicEpr;
pub use statistical::MuxSchemeStatistical;

/// What the forwarder should do with a newly entangled qubit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntangledDecision {
    /// No installed path wants the qubit; release it.
    Release,
    /// Keep the qubit entangled; a remote decision will advance it later.
    Hold,
    /// Enter the purification stage toward this path's FIB entry.
    Purify { path_id: PathId },
    /// Skip straight to eligibility (no FIB entry bound yet).
    Eligible,
}

/// Policy seam for path multiplexing.
pub trait MuxScheme<M: QuantumModel>: std::fmt::Debug + Send {
    fn name(&self) -> &'static str;

    /// Validate install_path instructions are compatible with this scheme.
    fn validate_instructions(&self, ins: &PathInstructions) -> Result<(), ValidationError>;

    /// Whether each memory qubit is pinned to a specific path id.
    fn qubit_has_path_id(&self) -> bool;

    /// Store neighbor information and allocate resources at path install.
    fn install_path_neighbor(
        &mut self,
        ins: &PathInstructions,
        entry: &FibEntry,
        direction: PathDirection,
        neighbor: &NodeName,
        qchannel: &str,
        memory: &mut QuantumMemory<M>,
    ) -> Result<(), MemoryError>;

    /// Erase neighbor information and deallocate resources.
    fn uninstall_path_neighbor(
        &mut self,
        entry: &FibEntry,
        direction: PathDirection,
        neighbor: &NodeName,
        qchannel: &str,
        memory: &mut QuantumMemory<M>,
    );

    /// Decide what happens to a qubit entering the entangled state.
    fn qubit_is_entangled(
        &mut self,
        addr: usize,
        memory: &mut QuantumMemory<M>,
        neighbor: &NodeName,
        fib: &Fib,
        rng: &mut SimRng,
    ) -> EntangledDecision;

    /// Find another eligible qubit to swap with.
    ///
    /// `candidates` are the addrs of eligible, cutoff-valid qubits other
    /// than `addr`; the scheme applies its own compatibility filtering and
    /// selection. Returns the chosen qubit and the path id whose FIB entry
    /// guides the swap signaling.
    fn find_swap_candidate(
        &mut self,
        addr: usize,
        memory: &mut QuantumMemory<M>,
        fib: &Fib,
        entry: Option<&FibEntry>,
        candidates: &[usize],
        rng: &mut SimRng,
    ) -> Option<(usize, PathId)>;

    /// Bookkeeping for a successful swap at the swapping node.
    fn swapping_succeeded(
        &mut self,
        prev: &EprPair<M>,
        next: &EprPair<M>,
        new_pair: &mut EprPair<M>,
    );

    /// Whether a parallel SWAP_UPDATE conflicts with the local decision.
    /// A conflict discards the update (counted by the forwarder).
    fn merge_has_conflict(&self, my_new: &EprPair<M>, su_path_id: PathId) -> bool;

    /// Bookkeeping for a successful parallel merge at the update recipient.
    fn merge_succeeded(
        &mut self,
        merged: &mut EprPair<M>,
        new_pair: &EprPair<M>,
        other: &EprPair<M>,
    );
}

/// Path selection strategy for the dynamic schemes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PathSelect {
    /// Uniform random choice among the candidates.
    #[default]
    Random,
    /// Weighted toward shorter routes (fewer swaps).
    SwapWeighted,
}

impl PathSelect {
    pub(crate) fn select(&self, fib: &Fib, path_ids: &[PathId], rng: &mut SimRng) -> PathId {
        assert!(!path_ids.is_empty());
        match self {
            PathSelect::Random => path_ids[rng.choice(path_ids.len())],
            PathSelect::SwapWeighted => {
                let weights: Vec<f64> = path_ids
                    .iter()
                    .map(|pid| {
                        let entry = fib.get(*pid).expect("path id without FIB entry");
                        1.0 / (1 + entry.swap.len()) as f64
                    })
                    .collect();
                path_ids[rng.weighted_choice(&weights)]
            }
        }
    }
}

/// Channel-to-paths relationship kept by the dynamic schemes.
#[derive(Debug, Default)]
pub(crate) struct ChannelPathsMap {
    map: HashMap<String, Vec<PathId>>,
}

impl ChannelPathsMap {
    pub fn add(&mut self, qchannel: &str, path_id: PathId) {
        self.map.entry(qchannel.to_string()).or_default().push(path_id);
    }

    pub fn remove(&mut self, qchannel: &str, path_id: PathId) {
        if let Some(paths) = self.map.get_mut(qchannel) {
            paths.retain(|p| *p != path_id);
            if paths.is_empty() {
                self.map.remove(qchannel);
            }
        }
    }

    pub fn paths(&self, qchannel: &str) -> &[PathId] {
        self.map.get(qchannel).map_or(&[], |v| v.as_slice())
    }

    pub fn channels(&self) -> impl Iterator<Item = (&String, &Vec<PathId>)> {
        self.map.iter()
    }
}

/// Whether at least one path id overlaps between a pair's candidate set and
/// another collection.
pub(crate) fn has_intersect(
    tmp: Option<&BTreeSet<PathId>>,
    other: impl IntoIterator<Item = PathId>,
) -> bool {
    match tmp {
        Some(set) => other.into_iter().any(|p| set.contains(&p)),
        None => false,
    }
}

/// Overlapping path ids between two candidate sets; empty overlap between
/// pairs chosen for the same swap is a protocol corruption.
pub(crate) fn intersect_tmp_path_ids<M: QuantumModel>(
    a: &EprPair<M>,
    b: &EprPair<M>,
) -> BTreeSet<PathId> {
    let sa = a.tmp_path_ids.as_ref().expect("pair without tmp_path_ids");
    let sb = b.tmp_path_ids.as_ref().expect("pair without tmp_path_ids");
    let out: BTreeSet<PathId> = sa.intersection(sb).copied().collect();
    assert!(
        !out.is_empty(),
        "cannot select path id from {sa:?} and {sb:?}"
    );
    out
}
