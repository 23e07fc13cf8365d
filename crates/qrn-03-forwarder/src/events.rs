//! Forwarder event payloads.

use shared_types::{NodeName, PathId};

/// Events scheduled by the forwarder for itself.
#[derive(Debug, Clone)]
pub enum FwEvent {
    /// An eligible qubit aged past its cutoff budget without being used.
    CutoffExpired {
        node: NodeName,
        addr: usize,
        /// Pair name the deadline was armed for; the event is a no-op when
        /// the slot no longer holds this pair.
        pair: String,
        path_id: PathId,
        /// −1 for the swap stage, ≥ 0 for a purification round.
        round: i32,
    },
}
