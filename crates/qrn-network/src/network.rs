//! The network container and event dispatch.

use std::collections::HashMap;

use epr_models::{EprPair, QuantumModel};
use qrn_01_qubit_memory::{QuantumMemory, QubitDecohered};
use qrn_02_link_layer::{LinkEvent, LinkLayer, PeerMemory, QuantumChannel};
use qrn_03_forwarder::{Forwarder, FwEvent};
use qrn_04_routing_controller::{RouteQuery, RoutingController, RoutingError, RoutingPath, TopologyInfo};
use shared_types::{
    ClassicMessage, ClassicPacket, NodeName, Outbox, PathId, Timing, TimingMode, TimingPhase,
};
use sim_kernel::{EventHandler, Simulator};
use tracing::{debug, info};

use crate::channel::ClassicChannel;
use crate::event::NetEvent;
use crate::route::shortest_path;

/// One quantum node: memory, link layer and forwarder.
#[derive(Debug)]
pub struct QNode<M: QuantumModel> {
    pub name: NodeName,
    pub memory: QuantumMemory<M>,
    pub link: LinkLayer,
    pub fw: Forwarder<M>,
}

/// The quantum network: nodes, channels, controller and timing.
#[derive(Debug)]
pub struct Network<M: QuantumModel> {
    nodes: Vec<QNode<M>>,
    index: HashMap<NodeName, usize>,
    qchannels: Vec<QuantumChannel>,
    cchannels: Vec<ClassicChannel>,
    controller: Option<RoutingController>,
    timing: Timing,
}

impl<M: QuantumModel> Network<M> {
    pub fn new(timing: TimingMode) -> Self {
        Network {
            nodes: Vec::new(),
            index: HashMap::new(),
            qchannels: Vec::new(),
            cchannels: Vec::new(),
            controller: None,
            timing: Timing::new(timing),
        }
    }

    pub fn add_node(&mut self, node: QNode<M>) {
        assert!(
            !self.index.contains_key(&node.name),
            "duplicate node {}",
            node.name
        );
        self.index.insert(node.name.clone(), self.nodes.len());
        self.nodes.push(node);
    }

    pub fn add_qchannel(&mut self, channel: QuantumChannel) {
        self.qchannels.push(channel);
    }

    pub fn add_cchannel(&mut self, channel: ClassicChannel) {
        self.cchannels.push(channel);
    }

    /// Assign `capacity` memory qubits to the channel at each connected
    /// node (topology creation time).
    pub fn assign_memory_qubits(&mut self, qchannel: &str, capacity: usize) {
        let channel = self
            .qchannels
            .iter()
            .find(|ch| ch.name == qchannel)
            .unwrap_or_else(|| panic!("unknown qchannel {qchannel}"))
            .nodes
            .clone();
        for name in [&channel.0, &channel.1] {
            let idx = self.index[name];
            self.nodes[idx]
                .memory
                .assign(qchannel, capacity)
                .unwrap_or_else(|err| panic!("{name}: {err}"));
        }
    }

    /// Install the controller node and a classical star to every node.
    pub fn connect_controller(&mut self, name: impl Into<NodeName>, delay: f64) {
        let name = name.into();
        for node in &self.nodes {
            self.cchannels.push(ClassicChannel::new(
                format!("{name}-{}", node.name),
                name.clone(),
                node.name.clone(),
                delay,
            ));
        }
        self.controller = Some(RoutingController::new(name));
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn node(&self, name: &str) -> &QNode<M> {
        &self.nodes[self.index[name]]
    }

    pub fn node_mut(&mut self, name: &str) -> &mut QNode<M> {
        let idx = self.index[name];
        &mut self.nodes[idx]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &QNode<M>> {
        self.nodes.iter()
    }

    fn qchannel_between(&self, a: &str, b: &str) -> Option<&QuantumChannel> {
        self.qchannels.iter().find(|ch| ch.connects(a, b))
    }

    /// Schedule the first SYNC phase signal. A no-op under ASYNC timing.
    pub fn start(&mut self, sim: &mut Simulator<NetEvent<M>>) {
        if !self.timing.is_async() {
            sim.schedule(sim.tc(), NetEvent::PhaseSignal);
        }
        info!("network started with {} nodes", self.nodes.len());
    }

    /// Compute and install path(s) through the controller.
    pub fn install_path(
        &mut self,
        sim: &mut Simulator<NetEvent<M>>,
        rp: &mut RoutingPath,
    ) -> Result<Vec<PathId>, RoutingError> {
        let mut outbox = Outbox::new();
        let controller = self.controller.as_mut().expect("no controller connected");
        let view = RouterView {
            nodes: &self.nodes,
            index: &self.index,
            qchannels: &self.qchannels,
        };
        let ids = controller.install_path(rp, &view, &view, sim.accuracy(), &mut outbox)?;
        let from = controller.node().to_string();
        Self::flush(&self.cchannels, sim, &from, &mut outbox);
        Ok(ids)
    }

    /// Recompute and uninstall path(s) through the controller.
    pub fn uninstall_path(
        &mut self,
        sim: &mut Simulator<NetEvent<M>>,
        rp: &RoutingPath,
    ) -> Result<(), RoutingError> {
        let mut outbox = Outbox::new();
        let controller = self.controller.as_mut().expect("no controller connected");
        let view = RouterView {
            nodes: &self.nodes,
            index: &self.index,
            qchannels: &self.qchannels,
        };
        controller.uninstall_path(rp, &view, &view, sim.accuracy(), &mut outbox)?;
        let from = controller.node().to_string();
        Self::flush(&self.cchannels, sim, &from, &mut outbox);
        Ok(())
    }

    /// Turn every queued send into a delivery event after the channel delay.
    fn flush(
        cchannels: &[ClassicChannel],
        sim: &mut Simulator<NetEvent<M>>,
        from: &str,
        outbox: &mut Outbox<EprPair<M>>,
    ) {
        for outgoing in outbox.drain() {
            let channel = cchannels
                .iter()
                .find(|ch| ch.connects(from, &outgoing.next_hop))
                .unwrap_or_else(|| panic!("no cchannel between {from} and {}", outgoing.next_hop));
            let recv_time = sim.tc().add_sec(channel.delay);
            sim.schedule(
                recv_time,
                NetEvent::Classic {
                    node: outgoing.next_hop,
                    packet: outgoing.packet,
                },
            );
        }
    }

    fn dispatch_classic(
        &mut self,
        sim: &mut Simulator<NetEvent<M>>,
        node_name: NodeName,
        packet: ClassicPacket<EprPair<M>>,
    ) {
        if Some(node_name.as_str()) == self.controller.as_ref().map(|c| c.node()) {
            debug!("controller ignoring classical message from {}", packet.src);
            return;
        }

        let mut outbox = Outbox::new();
        let idx = self.index[&node_name];

        match packet.msg {
            ClassicMessage::InstallPath {
                path_id,
                ref instructions,
            } => {
                let this = &mut *self;
                let (nodes, qchannels) = (&mut this.nodes, &this.qchannels);
                let node = &mut nodes[idx];
                let own = node.name.clone();
                let channel_of = |neighbor: &str| {
                    qchannels
                        .iter()
                        .find(|ch| ch.connects(&own, neighbor))
                        .map(|ch| ch.name.clone())
                };
                node.fw
                    .handle_install_path(sim, &mut node.memory, path_id, instructions, &channel_of);
            }
            ClassicMessage::UninstallPath { path_id } => {
                let this = &mut *self;
                let (nodes, qchannels) = (&mut this.nodes, &this.qchannels);
                let node = &mut nodes[idx];
                let own = node.name.clone();
                let channel_of = |neighbor: &str| {
                    qchannels
                        .iter()
                        .find(|ch| ch.connects(&own, neighbor))
                        .map(|ch| ch.name.clone())
                };
                node.fw
                    .handle_uninstall_path(sim, &mut node.memory, path_id, &channel_of);
            }
            ClassicMessage::ReserveQubit { path_id, key } => {
                let qchannel = self
                    .qchannel_between(&node_name, &packet.src)
                    .unwrap_or_else(|| panic!("no qchannel between {node_name} and {}", packet.src))
                    .name
                    .clone();
                let node = &mut self.nodes[idx];
                node.link.handle_reserve_req(
                    &mut node.memory,
                    &mut outbox,
                    &packet.src,
                    &qchannel,
                    path_id,
                    key,
                );
            }
            ClassicMessage::ReserveQubitOk { key, .. } => {
                let peer_idx = self.index[&packet.src];
                let peer = PeerMemory {
                    decohere_rate: self.nodes[peer_idx].memory.decoherence_rate(),
                    t_cohere: self.nodes[peer_idx].memory.t_cohere(),
                };
                let this = &mut *self;
                let channel = this
                    .qchannels
                    .iter()
                    .find(|ch| ch.connects(&node_name, &packet.src))
                    .unwrap_or_else(|| panic!("no qchannel between {node_name} and {}", packet.src));
                let node = &mut this.nodes[idx];
                node.link.handle_reserve_ok(
                    sim,
                    &mut node.memory,
                    &this.timing,
                    channel,
                    peer,
                    &key,
                );
            }
            ClassicMessage::SwapUpdate(_)
            | ClassicMessage::PurifSolicit(_)
            | ClassicMessage::PurifResponse(_)
            | ClassicMessage::CutoffDiscard(_) => {
                let node = &mut self.nodes[idx];
                node.fw
                    .handle_signaling(sim, &mut node.memory, &mut outbox, &self.timing, packet);
            }
        }

        Self::flush(&self.cchannels, sim, &node_name, &mut outbox);
    }

    fn dispatch_link(&mut self, sim: &mut Simulator<NetEvent<M>>, event: LinkEvent<M>) {
        let mut outbox = Outbox::new();
        let from;
        match event {
            LinkEvent::ManageActiveChannels {
                node,
                neighbor,
                qchannel,
                path_id,
                start,
            } => {
                let idx = self.index[&node];
                let target = &mut self.nodes[idx];
                target.link.handle_manage_active_channels(
                    sim,
                    &mut target.memory,
                    &mut outbox,
                    &self.timing,
                    &neighbor,
                    &qchannel,
                    path_id,
                    start,
                );
                from = node;
            }
            LinkEvent::ArchSuccess {
                node,
                pair,
                attempts,
            } => {
                let idx = self.index[&node];
                let target = &mut self.nodes[idx];
                target
                    .link
                    .handle_arch_success(sim, &mut target.memory, pair, attempts);
                from = node;
            }
            LinkEvent::QubitEntangled {
                node,
                neighbor,
                addr,
            } => {
                let idx = self.index[&node];
                let target = &mut self.nodes[idx];
                target.fw.handle_qubit_entangled(
                    sim,
                    &mut target.memory,
                    &mut outbox,
                    &self.timing,
                    &neighbor,
                    addr,
                );
                from = node;
            }
            LinkEvent::QubitReleased { node, addr } => {
                let idx = self.index[&node];
                let target = &mut self.nodes[idx];
                target.link.handle_decoh_rel(
                    sim,
                    &mut target.memory,
                    &mut outbox,
                    &self.timing,
                    addr,
                    false,
                );
                from = node;
            }
        }
        Self::flush(&self.cchannels, sim, &from, &mut outbox);
    }

    fn dispatch_phase_signal(&mut self, sim: &mut Simulator<NetEvent<M>>) {
        let Some((phase, end_time)) = self.timing.signal_next(sim.tc()) else {
            return;
        };
        debug!("TIME_SYNC: signal {phase:?} phase");
        sim.schedule(end_time, NetEvent::PhaseSignal);

        let external = phase == TimingPhase::External;
        let timing = self.timing.clone();
        for node in &mut self.nodes {
            let mut outbox = Outbox::new();
            node.link
                .handle_sync_phase(sim, &mut node.memory, &mut outbox, external);
            node.fw
                .handle_sync_phase(sim, &mut node.memory, &mut outbox, &timing, external);
            Self::flush(&self.cchannels, sim, &node.name, &mut outbox);
        }
    }
}

impl<M: QuantumModel> EventHandler<NetEvent<M>> for Network<M> {
    fn handle_event(&mut self, event: NetEvent<M>, sim: &mut Simulator<NetEvent<M>>) {
        match event {
            NetEvent::Classic { node, packet } => self.dispatch_classic(sim, node, packet),
            NetEvent::Link(link_event) => self.dispatch_link(sim, link_event),
            NetEvent::Memory(QubitDecohered { node, addr, pair }) => {
                let idx = self.index[&node];
                let target = &mut self.nodes[idx];
                if target.memory.handle_decohered(addr, &pair) {
                    let mut outbox = Outbox::new();
                    target.link.handle_decoh_rel(
                        sim,
                        &mut target.memory,
                        &mut outbox,
                        &self.timing,
                        addr,
                        true,
                    );
                    Self::flush(&self.cchannels, sim, &node, &mut outbox);
                }
            }
            NetEvent::Fw(FwEvent::CutoffExpired {
                node,
                addr,
                pair,
                path_id,
                round,
            }) => {
                let idx = self.index[&node];
                let target = &mut self.nodes[idx];
                let mut outbox = Outbox::new();
                target.fw.handle_cutoff_expired(
                    sim,
                    &mut target.memory,
                    &mut outbox,
                    addr,
                    &pair,
                    path_id,
                    round,
                );
                Self::flush(&self.cchannels, sim, &node, &mut outbox);
            }
            NetEvent::PhaseSignal => self.dispatch_phase_signal(sim),
        }
    }
}

/// Controller-facing view over the topology: the baseline route provider
/// plus qubit-allocation facts.
struct RouterView<'a, M: QuantumModel> {
    nodes: &'a [QNode<M>],
    index: &'a HashMap<NodeName, usize>,
    qchannels: &'a [QuantumChannel],
}

impl<M: QuantumModel> RouteQuery for RouterView<'_, M> {
    fn query(&self, src: &str, dst: &str) -> Vec<Vec<NodeName>> {
        let edges: Vec<(NodeName, NodeName, f64)> = self
            .qchannels
            .iter()
            .map(|ch| (ch.nodes.0.clone(), ch.nodes.1.clone(), ch.length))
            .collect();
        match shortest_path(&edges, src, dst) {
            Some(route) => vec![route],
            None => vec![],
        }
    }
}

impl<M: QuantumModel> TopologyInfo for RouterView<'_, M> {
    fn memory_capacity(&self, node: &str) -> usize {
        self.nodes[self.index[node]].memory.capacity()
    }

    fn qchannel_name(&self, a: &str, b: &str) -> Option<String> {
        self.qchannels
            .iter()
            .find(|ch| ch.connects(a, b))
            .map(|ch| ch.name.clone())
    }

    fn qubits_assigned(&self, node: &str, qchannel: &str) -> usize {
        self.nodes[self.index[node]]
            .memory
            .channel_qubits(qchannel)
            .len()
    }
}
