//! The closed union of simulation event payloads.

use epr_models::EprPair;
use qrn_01_qubit_memory::QubitDecohered;
use qrn_02_link_layer::LinkEvent;
use qrn_03_forwarder::FwEvent;
use shared_types::{ClassicPacket, NodeName};

/// Every event that can be scheduled in a network simulation.
#[derive(Debug)]
pub enum NetEvent<M> {
    Link(LinkEvent<M>),
    Fw(FwEvent),
    Memory(QubitDecohered),
    /// Delivery of a classical packet at `node` (one hop).
    Classic {
        node: NodeName,
        packet: ClassicPacket<EprPair<M>>,
    },
    /// SYNC timing phase boundary.
    PhaseSignal,
}

impl<M> From<LinkEvent<M>> for NetEvent<M> {
    fn from(event: LinkEvent<M>) -> Self {
        NetEvent::Link(event)
    }
}

impl<M> From<FwEvent> for NetEvent<M> {
    fn from(event: FwEvent) -> Self {
        NetEvent::Fw(event)
    }
}

impl<M> From<QubitDecohered> for NetEvent<M> {
    fn from(event: QubitDecohered) -> Self {
        NetEvent::Memory(event)
    }
}
