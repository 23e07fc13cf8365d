//! Link-layer event payloads.

use epr_models::EprPair;
use shared_types::{NodeName, PathId};

/// Events raised by or destined to the link layer.
#[derive(Debug, Clone)]
pub enum LinkEvent<M> {
    /// Successful entanglement in the link architecture: deliver `node`'s
    /// half of the pair at the notification time.
    ArchSuccess {
        node: NodeName,
        pair: EprPair<M>,
        /// How many attempts the skip-ahead sampling consumed.
        attempts: u64,
    },

    /// Request from the forwarder to start/stop generating pairs over a
    /// quantum channel.
    ManageActiveChannels {
        node: NodeName,
        neighbor: NodeName,
        qchannel: String,
        path_id: Option<PathId>,
        start: bool,
    },

    /// Notification to the forwarder about a newly entangled qubit.
    QubitEntangled {
        node: NodeName,
        neighbor: NodeName,
        addr: usize,
    },

    /// Notification from the forwarder that a qubit was released.
    QubitReleased { node: NodeName, addr: usize },
}
