//! The link-layer protocol: qubit reservation and skip-ahead generation.

use std::collections::{HashMap, VecDeque};

use epr_models::{EprPair, QuantumModel};
use qrn_01_qubit_memory::{QuantumMemory, QubitDecohered, QubitState, WriteKey};
use serde::Serialize;
use shared_types::{ClassicMessage, ClassicPacket, NodeName, Outbox, PathId, Timing};
use sim_kernel::Simulator;
use tracing::debug;

use crate::arch::{make_pair, LinkArchParams};
use crate::channel::QuantumChannel;
use crate::events::LinkEvent;

/// Memory characteristics of the peer node, needed to bound pair storage.
#[derive(Debug, Clone, Copy)]
pub struct PeerMemory {
    pub decohere_rate: f64,
    pub t_cohere: f64,
}

/// Link-layer hardware parameters.
#[derive(Debug, Clone)]
pub struct LinkLayerConfig {
    /// Source efficiency between 0 and 1.
    pub eta_s: f64,
    /// Detector efficiency between 0 and 1.
    pub eta_d: f64,
    /// Entanglement source frequency in Hz.
    pub frequency: f64,
    /// Local operation delay in seconds for emitting/absorbing a photon.
    pub tau_0: f64,
    /// Fidelity of generated entangled pairs.
    pub init_fidelity: f64,
    /// Restart the reservation handshake whenever a primary-owned qubit is
    /// released or decoheres.
    pub continuous_generation: bool,
}

impl Default for LinkLayerConfig {
    fn default() -> Self {
        LinkLayerConfig {
            eta_s: 1.0,
            eta_d: 1.0,
            frequency: 80e6,
            tau_0: 0.0,
            init_fidelity: 0.99,
            continuous_generation: true,
        }
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct LinkLayerCounters {
    /// How many entanglements were generated as the primary node.
    pub n_etg: u64,
    /// How many attempts those successful entanglements consumed.
    pub n_attempts: u64,
    /// How many qubits decohered.
    pub n_decoh: u64,
}

impl LinkLayerCounters {
    fn increment_n_etg(&mut self, attempts: u64) {
        self.n_etg += 1;
        self.n_attempts += attempts;
    }
}

/// A reservation request deferred until a qubit frees up.
#[derive(Debug, Clone)]
struct ReservationRequest {
    key: String,
    path_id: Option<PathId>,
    from_node: NodeName,
    qchannel: String,
}

/// Per-node link layer.
#[derive(Debug)]
pub struct LinkLayer {
    node: NodeName,
    config: LinkLayerConfig,
    /// Channels and paths where own node is the primary (left) side.
    /// Value is the neighbor and an insertion count: dynamic multiplexing
    /// schemes activate a channel once per path with `path_id = None`.
    active_channels: HashMap<(String, Option<PathId>), (NodeName, u32)>,
    /// Reservations for which `RESERVE_QUBIT` is sent but the OK has not
    /// arrived. Value is (qchannel, next hop, local qubit addr).
    pending_init_reservation: HashMap<String, (String, NodeName, usize)>,
    /// FIFO queue of reservation requests awaiting memory qubits.
    fifo_reservation_req: VecDeque<ReservationRequest>,
    pub cnt: LinkLayerCounters,
}

impl LinkLayer {
    pub fn new(node: impl Into<NodeName>, config: LinkLayerConfig) -> Self {
        LinkLayer {
            node: node.into(),
            config,
            active_channels: HashMap::new(),
            pending_init_reservation: HashMap::new(),
            fifo_reservation_req: VecDeque::new(),
            cnt: LinkLayerCounters::default(),
        }
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    fn arch_params<M: QuantumModel>(
        &self,
        ch: &QuantumChannel,
        memory: &QuantumMemory<M>,
        peer: PeerMemory,
    ) -> LinkArchParams {
        LinkArchParams {
            length: ch.length,
            alpha: ch.alpha,
            eta_s: self.config.eta_s,
            eta_d: self.config.eta_d,
            reset_time: 1.0 / self.config.frequency,
            tau_l: ch.tau_l(),
            tau_0: self.config.tau_0,
            init_fidelity: self.config.init_fidelity,
            mem_decohere_rate: (memory.decoherence_rate(), peer.decohere_rate),
            t_cohere_min: memory.t_cohere().min(peer.t_cohere),
        }
    }

    /// Handle a start/stop generation request from the forwarder.
    #[allow(clippy::too_many_arguments)]
    pub fn handle_manage_active_channels<M: QuantumModel, E: From<LinkEvent<M>>>(
        &mut self,
        sim: &mut Simulator<E>,
        memory: &mut QuantumMemory<M>,
        outbox: &mut Outbox<EprPair<M>>,
        timing: &Timing,
        neighbor: &NodeName,
        qchannel: &str,
        path_id: Option<PathId>,
        start: bool,
    ) {
        if start {
            self.add_active_channel(sim, memory, outbox, timing, neighbor, qchannel, path_id);
        } else {
            self.remove_active_channel(qchannel, path_id, neighbor);
        }
    }

    fn add_active_channel<M: QuantumModel, E: From<LinkEvent<M>>>(
        &mut self,
        sim: &mut Simulator<E>,
        memory: &mut QuantumMemory<M>,
        outbox: &mut Outbox<EprPair<M>>,
        timing: &Timing,
        neighbor: &NodeName,
        qchannel: &str,
        path_id: Option<PathId>,
    ) {
        let key = (qchannel.to_string(), path_id);
        let entry = self
            .active_channels
            .entry(key)
            .or_insert_with(|| (neighbor.clone(), 0));
        entry.1 += 1;
        if entry.1 > 1 {
            // multiple activations are only legal for dynamic schemes that
            // do not pin qubits to path ids
            assert!(path_id.is_none());
            return;
        }

        debug!(
            "{}: add qchannel {qchannel} with {neighbor} on path {path_id:?}",
            self.node
        );
        if timing.is_async() {
            self.run_active_channel(sim, memory, outbox, qchannel, path_id, &neighbor.clone());
        }
    }

    fn remove_active_channel(&mut self, qchannel: &str, path_id: Option<PathId>, neighbor: &str) {
        let key = (qchannel.to_string(), path_id);
        let Some(entry) = self.active_channels.get_mut(&key) else {
            return;
        };
        entry.1 -= 1;
        if entry.1 == 0 {
            self.active_channels.remove(&key);
            debug!(
                "{}: remove qchannel {qchannel} with {neighbor} on path {path_id:?}",
                self.node
            );
        }
    }

    /// Start pair generation over the given channel for qubits allocated to
    /// `path_id` (or unallocated qubits when `path_id` is `None`).
    pub fn run_active_channel<M: QuantumModel, E: From<LinkEvent<M>>>(
        &mut self,
        sim: &mut Simulator<E>,
        memory: &mut QuantumMemory<M>,
        outbox: &mut Outbox<EprPair<M>>,
        qchannel: &str,
        path_id: Option<PathId>,
        next_hop: &NodeName,
    ) {
        let addrs = memory.find_all(Some(qchannel), |q, pair| {
            q.path_id == path_id && q.state() == QubitState::Raw && pair.is_none()
        });
        for addr in addrs {
            assert!(memory.qubit(addr).active.is_none());
            self.start_reservation(sim, memory, outbox, next_hop, addr);
        }
    }

    /// Start the exchange with the neighbor for reserving a qubit.
    ///
    /// 1. Construct a random reservation key.
    /// 2. Mark the qubit ACTIVE under the key.
    /// 3. Record the reservation as pending.
    /// 4. Send `RESERVE_QUBIT` to the next hop.
    fn start_reservation<M: QuantumModel, E>(
        &mut self,
        sim: &mut Simulator<E>,
        memory: &mut QuantumMemory<M>,
        outbox: &mut Outbox<EprPair<M>>,
        next_hop: &NodeName,
        addr: usize,
    ) {
        let key = sim.rng().hex_token(16);
        assert!(!self.pending_init_reservation.contains_key(&key));

        let qubit = memory.qubit_mut(addr);
        qubit.set_state(QubitState::Active);
        qubit.active = Some(key.clone());
        let path_id = qubit.path_id;
        let qchannel = qubit.qchannel.clone().expect("qubit not assigned");

        self.pending_init_reservation
            .insert(key.clone(), (qchannel, next_hop.clone(), addr));
        debug!(
            "{}: start reservation key={key} dst={next_hop} addr={addr} path={path_id:?}",
            self.node
        );

        outbox.send(
            next_hop.clone(),
            ClassicPacket::new(
                self.node.clone(),
                next_hop.clone(),
                ClassicMessage::ReserveQubit { path_id, key },
            ),
        );
    }

    /// Handle `RESERVE_QUBIT` from the initiating node.
    ///
    /// If an available qubit is found it is reserved and confirmed;
    /// otherwise the request is enqueued for retry (FIFO).
    pub fn handle_reserve_req<M: QuantumModel>(
        &mut self,
        memory: &mut QuantumMemory<M>,
        outbox: &mut Outbox<EprPair<M>>,
        from_node: &NodeName,
        qchannel: &str,
        path_id: Option<PathId>,
        key: String,
    ) {
        let req = ReservationRequest {
            key,
            path_id,
            from_node: from_node.clone(),
            qchannel: qchannel.to_string(),
        };
        if !self.try_accept_reservation(memory, outbox, &req) {
            self.fifo_reservation_req.push_back(req);
        }
    }

    /// Accept a reservation if a qubit is available. The caller manages the
    /// FIFO queue.
    fn try_accept_reservation<M: QuantumModel>(
        &mut self,
        memory: &mut QuantumMemory<M>,
        outbox: &mut Outbox<EprPair<M>>,
        req: &ReservationRequest,
    ) -> bool {
        let found = memory.find(Some(&req.qchannel), |q, pair| {
            pair.is_none() // currently unoccupied
                && q.active.is_none() // not part of an active reservation
                && q.state() == QubitState::Raw
                && q.path_id == req.path_id // allocated to the path, if the scheme pins path ids
        });
        let Some(addr) = found else {
            return false;
        };

        debug!(
            "{}: accept reservation key={} src={} addr={addr} path={:?}",
            self.node, req.key, req.from_node, req.path_id
        );
        let qubit = memory.qubit_mut(addr);
        qubit.set_state(QubitState::Active); // cannot go directly from RAW to RESERVED
        qubit.set_state(QubitState::Reserved);
        qubit.active = Some(req.key.clone());

        outbox.send(
            req.from_node.clone(),
            ClassicPacket::new(
                self.node.clone(),
                req.from_node.clone(),
                ClassicMessage::ReserveQubitOk {
                    path_id: req.path_id,
                    key: req.key.clone(),
                },
            ),
        );
        true
    }

    /// Handle `RESERVE_QUBIT_OK`: move the local qubit to RESERVED and run
    /// the skip-ahead generation for the channel.
    pub fn handle_reserve_ok<M: QuantumModel, E: From<LinkEvent<M>>>(
        &mut self,
        sim: &mut Simulator<E>,
        memory: &mut QuantumMemory<M>,
        timing: &Timing,
        ch: &QuantumChannel,
        peer: PeerMemory,
        key: &str,
    ) {
        let Some((qchannel, next_hop, addr)) = self.pending_init_reservation.remove(key) else {
            // reservation died with a generation-window reset
            debug!("{}: dropping RESERVE_QUBIT_OK for stale key={key}", self.node);
            return;
        };
        assert_eq!(qchannel, ch.name);
        assert_eq!(memory.qubit(addr).active.as_deref(), Some(key));
        memory.qubit_mut(addr).set_state(QubitState::Reserved);

        self.generate_entanglement(sim, memory, timing, ch, peer, &next_hop, addr);
    }

    /// Schedule a successful entanglement attempt using skip-ahead sampling:
    /// draw which attempt number succeeds, compute both notification time
    /// points and schedule one arrival event per side.
    fn generate_entanglement<M: QuantumModel, E: From<LinkEvent<M>>>(
        &mut self,
        sim: &mut Simulator<E>,
        memory: &QuantumMemory<M>,
        timing: &Timing,
        ch: &QuantumChannel,
        peer: PeerMemory,
        next_hop: &NodeName,
        addr: usize,
    ) {
        let params = self.arch_params(ch, memory, peer);
        let success_prob = ch.arch.success_prob(&params);
        let k = sim.rng().geometric(success_prob);
        let key = memory.qubit(addr).active.clone();

        let now = sim.tc();
        let (pair, t_notify_a, t_notify_b) = make_pair::<M>(
            ch.arch.as_ref(),
            &params,
            k,
            now,
            key,
            &self.node,
            next_hop,
            sim.rng(),
        );

        // In SYNC timing the notification must land inside the current
        // generation window; otherwise the attempt is logically guaranteed
        // to have happened too late and is silently skipped.
        if !timing.is_external(Some(t_notify_a.max(t_notify_b))) {
            debug!(
                "{}: skip prepare EPR {} key={:?} dst={} attempts={k} reason=beyond-external-phase",
                self.node,
                pair.name(),
                pair.key,
                pair.dst
            );
            return;
        }

        debug!(
            "{}: prepare EPR {} key={:?} dst={} attempts={k} notify-times={},{}",
            self.node,
            pair.name(),
            pair.key,
            pair.dst,
            t_notify_a,
            t_notify_b
        );

        sim.schedule(
            t_notify_a,
            LinkEvent::ArchSuccess {
                node: self.node.clone(),
                pair: pair.clone(),
                attempts: k,
            }
            .into(),
        );
        sim.schedule(
            t_notify_b,
            LinkEvent::ArchSuccess {
                node: next_hop.clone(),
                pair,
                attempts: k,
            }
            .into(),
        );
    }

    /// Handle the arrival of this node's half of an elementary pair: write
    /// it into memory (ENTANGLED0) and notify the forwarder.
    pub fn handle_arch_success<M: QuantumModel, E: From<LinkEvent<M>> + From<QubitDecohered>>(
        &mut self,
        sim: &mut Simulator<E>,
        memory: &mut QuantumMemory<M>,
        pair: EprPair<M>,
        attempts: u64,
    ) {
        let is_primary = pair.src == self.node;
        let neighbor: NodeName = pair
            .partner_of(&self.node)
            .expect("half-EPR delivered to a non-endpoint")
            .to_string();
        if is_primary {
            self.cnt.increment_n_etg(attempts);
        }

        debug!(
            "{}: got half-EPR {} key={:?} {}={neighbor}",
            self.node,
            pair.name(),
            pair.key,
            if is_primary { "dst" } else { "src" }
        );
        assert!(
            pair.decoherence_time.is_sentinel() || pair.decoherence_time > sim.tc(),
            "{}: half-EPR already expired on arrival",
            self.node
        );

        let key = pair.key.clone().expect("elementary pair without key");
        let addr = memory
            .write(sim, WriteKey::ReservationKey(&key), pair)
            .unwrap_or_else(|err| panic!("{}: failed to store EPR: {err}", self.node));

        memory.qubit_mut(addr).set_state(QubitState::Entangled0);
        sim.schedule(
            sim.tc(),
            LinkEvent::QubitEntangled {
                node: self.node.clone(),
                neighbor,
                addr,
            }
            .into(),
        );
    }

    /// Handle a released or decohered qubit: recycle it to RAW and either
    /// restart generation (primary side) or retry the oldest queued
    /// reservation request (secondary side).
    pub fn handle_decoh_rel<M: QuantumModel, E: From<LinkEvent<M>>>(
        &mut self,
        sim: &mut Simulator<E>,
        memory: &mut QuantumMemory<M>,
        outbox: &mut Outbox<EprPair<M>>,
        timing: &Timing,
        addr: usize,
        is_decoh: bool,
    ) {
        let qubit = memory.qubit_mut(addr);
        let old_key = qubit.active.take();
        if is_decoh {
            self.cnt.n_decoh += 1;
            debug!("{}: qubit decohered addr={addr} old-key={old_key:?}", self.node);
        } else {
            debug!("{}: qubit released addr={addr} old-key={old_key:?}", self.node);
        }
        qubit.set_state(QubitState::Raw);

        let qchannel = qubit.qchannel.clone().expect("qubit not assigned");
        let path_id = qubit.path_id;
        match self.active_channels.get(&(qchannel, path_id)) {
            // this node is the pair initiator
            Some((next_hop, _)) => {
                let next_hop = next_hop.clone();
                if timing.is_async() {
                    if self.config.continuous_generation {
                        self.start_reservation(sim, memory, outbox, &next_hop, addr);
                    }
                } else if is_decoh {
                    panic!(
                        "{}: qubit decohered inside a SYNC window, (t_ext + t_int) too short",
                        self.node
                    );
                }
            }
            // not the initiator: attempt to fulfil the oldest deferred
            // reservation request, one per call
            None => {
                if let Some(req) = self.fifo_reservation_req.front().cloned() {
                    if self.try_accept_reservation(memory, outbox, &req) {
                        self.fifo_reservation_req.pop_front();
                    }
                }
            }
        }
    }

    /// Handle a SYNC timing phase signal. Entering EXTERNAL clears the
    /// memory and restarts every active channel; entering INTERNAL does
    /// nothing here.
    pub fn handle_sync_phase<M: QuantumModel, E: From<LinkEvent<M>>>(
        &mut self,
        sim: &mut Simulator<E>,
        memory: &mut QuantumMemory<M>,
        outbox: &mut Outbox<EprPair<M>>,
        external: bool,
    ) {
        if !external {
            return;
        }
        memory.clear(sim);
        self.pending_init_reservation.clear();
        self.fifo_reservation_req.clear();
        let channels: Vec<(String, Option<PathId>, NodeName)> = self
            .active_channels
            .iter()
            .map(|((ch, path), (neighbor, _))| (ch.clone(), *path, neighbor.clone()))
            .collect();
        for (ch, path_id, neighbor) in channels {
            self.run_active_channel(sim, memory, outbox, &ch, path_id, &neighbor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use epr_models::WernerModel;
    use shared_types::TimingMode;
    use sim_kernel::SimulatorConfig;

    type Ev = LinkEvent<WernerModel>;

    fn setup() -> (
        Simulator<Ev>,
        QuantumMemory<WernerModel>,
        Outbox<EprPair<WernerModel>>,
        LinkLayer,
        Timing,
    ) {
        let sim = Simulator::new(SimulatorConfig::default());
        let mut memory = QuantumMemory::new("n1", 2, 1.0);
        memory.assign("n1-n2", 2).unwrap();
        let link = LinkLayer::new("n1", LinkLayerConfig::default());
        let timing = Timing::new(TimingMode::Async);
        (sim, memory, Outbox::new(), link, timing)
    }

    #[test]
    fn test_start_reservation_marks_active_and_sends_request() {
        let (mut sim, mut memory, mut outbox, mut link, _) = setup();
        let next_hop = "n2".to_string();
        link.run_active_channel(&mut sim, &mut memory, &mut outbox, "n1-n2", None, &next_hop);

        // both RAW qubits get their own reservation
        for addr in [0, 1] {
            assert_eq!(memory.qubit(addr).state(), QubitState::Active);
            assert!(memory.qubit(addr).active.is_some());
        }
        let sends = outbox.drain();
        assert_eq!(sends.len(), 2);
        for send in &sends {
            assert_eq!(send.next_hop, "n2");
            assert!(matches!(
                send.packet.msg,
                ClassicMessage::ReserveQubit { path_id: None, .. }
            ));
        }
    }

    #[test]
    fn test_reserve_request_accepted_when_qubit_free() {
        let (_sim, mut memory, mut outbox, mut link, _) = setup();
        let from = "n2".to_string();
        link.handle_reserve_req(&mut memory, &mut outbox, &from, "n1-n2", None, "k1".into());

        assert_eq!(memory.qubit(0).state(), QubitState::Reserved);
        assert_eq!(memory.qubit(0).active.as_deref(), Some("k1"));
        let sends = outbox.drain();
        assert_eq!(sends.len(), 1);
        assert!(matches!(
            sends[0].packet.msg,
            ClassicMessage::ReserveQubitOk { .. }
        ));
    }

    #[test]
    fn test_reserve_request_queued_when_no_qubit_matches() {
        let (_sim, mut memory, mut outbox, mut link, _) = setup();
        // all qubits allocated to a different path
        for addr in [0, 1] {
            memory.qubit_mut(addr).allocate(9, None);
        }
        let from = "n2".to_string();
        link.handle_reserve_req(&mut memory, &mut outbox, &from, "n1-n2", Some(1), "k1".into());

        assert!(outbox.is_empty());
        assert_eq!(link.fifo_reservation_req.len(), 1);
    }

    #[test]
    fn test_released_qubit_fulfils_queued_reservation() {
        let (mut sim, mut memory, mut outbox, mut link, timing) = setup();
        // occupy every qubit with an active reservation key
        for addr in [0, 1] {
            let qubit = memory.qubit_mut(addr);
            qubit.set_state(QubitState::Active);
            qubit.active = Some(format!("busy-{addr}"));
        }
        let from = "n2".to_string();
        link.handle_reserve_req(&mut memory, &mut outbox, &from, "n1-n2", None, "k9".into());
        assert_eq!(link.fifo_reservation_req.len(), 1);

        // qubit 0 comes back: RESERVED half released by the forwarder
        let qubit = memory.qubit_mut(0);
        qubit.set_state(QubitState::Reserved);
        qubit.set_state(QubitState::Entangled0);
        qubit.set_state(QubitState::Release);
        link.handle_decoh_rel(&mut sim, &mut memory, &mut outbox, &timing, 0, false);

        assert!(link.fifo_reservation_req.is_empty());
        assert_eq!(memory.qubit(0).active.as_deref(), Some("k9"));
        assert_eq!(memory.qubit(0).state(), QubitState::Reserved);
    }
}
