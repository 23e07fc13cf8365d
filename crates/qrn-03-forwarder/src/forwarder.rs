//! The forwarder: purification, swapping, consumption, cutoff.

use std::collections::HashMap;

use epr_models::{EprPair, QuantumModel};
use qrn_01_qubit_memory::{QuantumMemory, QubitDecohered, QubitState, ReadKey};
use qrn_02_link_layer::LinkEvent;
use shared_types::{
    ClassicMessage, ClassicPacket, CutoffDiscard, NodeName, Outbox, PathDirection, PathId,
    PathInstructions, PurifResponse, PurifSolicit, SwapUpdate, Timing,
};
use sim_kernel::Simulator;
use tracing::debug;

use crate::counters::ForwarderCounters;
use crate::cutoff::CutoffScheme;
use crate::events::FwEvent;
use crate::fib::{Fib, FibEntry};
use crate::mux::{has_intersect, EntangledDecision, MuxScheme};

/// Event-payload bound for every forwarder entry point: the enclosing event
/// type must absorb link-layer, forwarder and memory events.
pub trait FwEventSet<M>: From<LinkEvent<M>> + From<FwEvent> + From<QubitDecohered> {}

impl<M, E> FwEventSet<M> for E where
    E: From<LinkEvent<M>> + From<FwEvent> + From<QubitDecohered>
{
}

/// Forwarder tunables.
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    /// Probability of successful entanglement swapping.
    pub ps: f64,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        ForwarderConfig { ps: 1.0 }
    }
}

/// Cached partial result of an own swap whose partner may be swapping in the
/// same rank wave.
#[derive(Debug, Clone)]
struct ParallelSwap<M> {
    /// The other pair this node held, anchored at the far destination.
    other: EprPair<M>,
    /// The locally produced swap result.
    my_new: EprPair<M>,
}

/// Per-node forwarder. Receives routing instructions from the controller and
/// implements the forwarding phase; the centralized routing stays at the
/// controller.
#[derive(Debug)]
pub struct Forwarder<M: QuantumModel> {
    node: NodeName,
    ps: f64,
    mux: Box<dyn MuxScheme<M>>,
    cutoff: Box<dyn CutoffScheme>,
    pub fib: Fib,
    /// Entangled notifications buffered during a SYNC EXTERNAL phase.
    waiting_etg: Vec<(NodeName, usize)>,
    /// Swap updates received before the local entangled notification, keyed
    /// by qubit addr.
    waiting_su: HashMap<usize, (SwapUpdate, Option<EprPair<M>>)>,
    /// Partial swap results keyed by old pair name, for parallel merging.
    parallel_swappings: HashMap<String, ParallelSwap<M>>,
    /// Post-purification models stashed at solicit time, applied when the
    /// response confirms success.
    pending_purif: HashMap<String, M>,
    pub cnt: ForwarderCounters,
}

impl<M: QuantumModel> Forwarder<M> {
    pub fn new(
        node: impl Into<NodeName>,
        config: ForwarderConfig,
        mux: Box<dyn MuxScheme<M>>,
        cutoff: Box<dyn CutoffScheme>,
    ) -> Self {
        assert!((0.0..=1.0).contains(&config.ps));
        Forwarder {
            node: node.into(),
            ps: config.ps,
            mux,
            cutoff,
            fib: Fib::new(),
            waiting_etg: Vec::new(),
            waiting_su: HashMap::new(),
            parallel_swappings: HashMap::new(),
            pending_purif: HashMap::new(),
            cnt: ForwarderCounters::default(),
        }
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn mux_name(&self) -> &'static str {
        self.mux.name()
    }

    // ------------------------------------------------------------------
    // Control messages
    // ------------------------------------------------------------------

    /// Process `install_path` instructions from the controller.
    ///
    /// `channel_of` resolves a neighbor name to the quantum channel
    /// connecting it. Malformed instructions escaping controller validation
    /// indicate a configuration bug and abort.
    pub fn handle_install_path<E: FwEventSet<M>>(
        &mut self,
        sim: &mut Simulator<E>,
        memory: &mut QuantumMemory<M>,
        path_id: PathId,
        ins: &PathInstructions,
        channel_of: &dyn Fn(&str) -> Option<String>,
    ) {
        self.mux
            .validate_instructions(ins)
            .unwrap_or_else(|err| panic!("{}: install_path rejected: {err}", self.node));
        let entry = FibEntry::from_instructions(path_id, ins, &self.node, sim.accuracy())
            .unwrap_or_else(|| {
                panic!("{}: install_path for a route not containing this node", self.node)
            });
        self.fib.insert_or_replace(entry.clone());

        if let Some(left) = entry.neighbor(-1).cloned() {
            let ch = channel_of(&left)
                .unwrap_or_else(|| panic!("{}: no quantum channel to {left}", self.node));
            self.mux
                .install_path_neighbor(ins, &entry, PathDirection::Left, &left, &ch, memory)
                .unwrap_or_else(|err| panic!("{}: install_path failed: {err}", self.node));
        }

        if let Some(right) = entry.neighbor(1).cloned() {
            let ch = channel_of(&right)
                .unwrap_or_else(|| panic!("{}: no quantum channel to {right}", self.node));
            self.mux
                .install_path_neighbor(ins, &entry, PathDirection::Right, &right, &ch, memory)
                .unwrap_or_else(|err| panic!("{}: install_path failed: {err}", self.node));

            // start elementary generation toward the right neighbor
            let path_id = self.mux.qubit_has_path_id().then_some(path_id);
            sim.schedule(
                sim.tc(),
                LinkEvent::ManageActiveChannels {
                    node: self.node.clone(),
                    neighbor: right,
                    qchannel: ch,
                    path_id,
                    start: true,
                }
                .into(),
            );
        }
    }

    /// Process `uninstall_path`: erase the FIB entry, deallocate resources
    /// and stop generation toward the right neighbor.
    pub fn handle_uninstall_path<E: FwEventSet<M>>(
        &mut self,
        sim: &mut Simulator<E>,
        memory: &mut QuantumMemory<M>,
        path_id: PathId,
        channel_of: &dyn Fn(&str) -> Option<String>,
    ) {
        let Some(entry) = self.fib.get(path_id).cloned() else {
            debug!("{}: uninstall_path for unknown path {path_id}", self.node);
            return;
        };
        self.fib.erase(path_id);

        if let Some(left) = entry.neighbor(-1).cloned() {
            let ch = channel_of(&left)
                .unwrap_or_else(|| panic!("{}: no quantum channel to {left}", self.node));
            self.mux
                .uninstall_path_neighbor(&entry, PathDirection::Left, &left, &ch, memory);
        }

        if let Some(right) = entry.neighbor(1).cloned() {
            let ch = channel_of(&right)
                .unwrap_or_else(|| panic!("{}: no quantum channel to {right}", self.node));
            self.mux
                .uninstall_path_neighbor(&entry, PathDirection::Right, &right, &ch, memory);

            let path_id = self.mux.qubit_has_path_id().then_some(path_id);
            sim.schedule(
                sim.tc(),
                LinkEvent::ManageActiveChannels {
                    node: self.node.clone(),
                    neighbor: right,
                    qchannel: ch,
                    path_id,
                    start: false,
                }
                .into(),
            );
        }
    }

    // ------------------------------------------------------------------
    // Signaling messages
    // ------------------------------------------------------------------

    /// Dispatch or forward a received signaling packet.
    ///
    /// Messages whose path id has no FIB entry are dropped; messages whose
    /// destination is another node are forwarded along the path.
    pub fn handle_signaling<E: FwEventSet<M>>(
        &mut self,
        sim: &mut Simulator<E>,
        memory: &mut QuantumMemory<M>,
        outbox: &mut Outbox<EprPair<M>>,
        timing: &Timing,
        packet: ClassicPacket<EprPair<M>>,
    ) {
        let path_id = packet
            .msg
            .signaling_path_id()
            .expect("handle_signaling on a non-signaling message");
        let Some(entry) = self.fib.get(path_id).cloned() else {
            debug!(
                "{}: dropping signaling message from {}, reason=no-fib-entry",
                self.node, packet.src
            );
            return;
        };

        if packet.dest != self.node {
            let dest = packet.dest.clone();
            self.send_along_path(outbox, &entry, &dest, packet.msg, packet.attachment, true);
            return;
        }

        debug!("{}: received signaling message from {}", self.node, packet.src);
        match packet.msg {
            ClassicMessage::SwapUpdate(msg) => {
                self.handle_swap_update(sim, memory, outbox, timing, &entry, msg, packet.attachment)
            }
            ClassicMessage::PurifSolicit(msg) => {
                self.handle_purif_solicit(sim, memory, outbox, timing, &entry, msg)
            }
            ClassicMessage::PurifResponse(msg) => {
                self.handle_purif_response(sim, memory, outbox, timing, &entry, msg)
            }
            ClassicMessage::CutoffDiscard(msg) => self.handle_cutoff_discard(sim, memory, &msg),
            other => panic!("{}: unexpected signaling message {other:?}", self.node),
        }
    }

    /// Send or forward a message along the path of a FIB entry.
    fn send_along_path(
        &self,
        outbox: &mut Outbox<EprPair<M>>,
        entry: &FibEntry,
        dest: &NodeName,
        msg: ClassicMessage,
        attachment: Option<EprPair<M>>,
        forward: bool,
    ) {
        let (dest_idx, _) = entry
            .find_index_and_rank(dest)
            .unwrap_or_else(|| panic!("{}: destination {dest} not on route", self.node));
        let next_idx = if dest_idx > entry.own_idx {
            entry.own_idx + 1
        } else {
            entry.own_idx - 1
        };
        let next_hop = entry.route[next_idx].clone();

        debug!(
            "{}: {} signaling message to {dest} via {next_hop}",
            self.node,
            if forward { "forwarding" } else { "sending" }
        );
        let mut packet = ClassicPacket::new(self.node.clone(), dest.clone(), msg);
        packet.attachment = attachment;
        outbox.send(next_hop, packet);
    }

    // ------------------------------------------------------------------
    // Entangled qubit lifecycle
    // ------------------------------------------------------------------

    /// Handle a qubit entering the entangled state.
    ///
    /// In SYNC timing, notifications arriving during the EXTERNAL phase are
    /// buffered and replayed at the INTERNAL transition. The actual decision
    /// is delegated to the multiplexing scheme. A buffered swap update for
    /// the qubit is replayed afterwards.
    pub fn handle_qubit_entangled<E: FwEventSet<M>>(
        &mut self,
        sim: &mut Simulator<E>,
        memory: &mut QuantumMemory<M>,
        outbox: &mut Outbox<EprPair<M>>,
        timing: &Timing,
        neighbor: &NodeName,
        addr: usize,
    ) {
        if memory.qubit(addr).state() == QubitState::Entangled0 {
            memory.qubit_mut(addr).set_state(QubitState::Entangled1);
        }
        if !timing.is_internal(None) {
            self.waiting_etg.push((neighbor.clone(), addr));
            return;
        }

        self.cnt.n_entg += 1;
        debug_assert_eq!(memory.qubit(addr).state(), QubitState::Entangled1);

        let decision = self
            .mux
            .qubit_is_entangled(addr, memory, neighbor, &self.fib, sim.rng());
        match decision {
            EntangledDecision::Release => {
                self.release_qubit(sim, memory, addr, true);
            }
            EntangledDecision::Hold => {}
            EntangledDecision::Purify { path_id } => {
                let entry = self
                    .fib
                    .get(path_id)
                    .expect("mux decision without FIB entry")
                    .clone();
                let qubit = memory.qubit_mut(addr);
                qubit.purif_rounds = 0;
                qubit.set_state(QubitState::Purif);
                self.qubit_is_purif(sim, memory, outbox, timing, &entry, addr, neighbor);
            }
            EntangledDecision::Eligible => {
                let qubit = memory.qubit_mut(addr);
                qubit.purif_rounds = 0;
                qubit.set_state(QubitState::Purif);
                qubit.set_state(QubitState::Eligible);
                self.qubit_is_eligible(sim, memory, outbox, timing, addr, None);
            }
        }

        // replay a swap update that raced ahead of the entangled event
        if let Some((su, attachment)) = self.waiting_su.remove(&addr) {
            if memory.pair(addr).is_some() {
                if let Some(entry) = self.fib.get(su.path_id).cloned() {
                    self.handle_swap_update(sim, memory, outbox, timing, &entry, su, attachment);
                }
            }
        }
    }

    /// Handle a qubit entering PURIF or completing a purification round.
    ///
    /// When the required rounds are done the qubit becomes eligible.
    /// Otherwise the primary side of the segment looks for an auxiliary
    /// qubit and solicits purification from the partner.
    fn qubit_is_purif<E: FwEventSet<M>>(
        &mut self,
        sim: &mut Simulator<E>,
        memory: &mut QuantumMemory<M>,
        outbox: &mut Outbox<EprPair<M>>,
        timing: &Timing,
        entry: &FibEntry,
        addr: usize,
        partner: &NodeName,
    ) {
        debug_assert_eq!(memory.qubit(addr).state(), QubitState::Purif);
        let (own_idx, own_rank) = (entry.own_idx, entry.own_swap_rank());
        let Some((partner_idx, partner_rank)) = entry.find_index_and_rank(partner) else {
            debug!("{}: purif partner {partner} not on route", self.node);
            return;
        };
        if own_rank > partner_rank {
            // swapping order disallows initiating purif / swap / consumption
            return;
        }

        let segment = entry.segment_name(partner).unwrap();
        let want_rounds = entry.purif.get(&segment).copied().unwrap_or(0);
        let rounds = memory.qubit(addr).purif_rounds;
        debug!(
            "{}: segment {segment} (qubit {addr}) has {rounds} and needs {want_rounds} purif rounds",
            self.node
        );

        if rounds == want_rounds {
            self.cnt.n_eligible += 1;
            let qubit = memory.qubit_mut(addr);
            qubit.purif_rounds = 0;
            qubit.set_state(QubitState::Eligible);
            self.qubit_is_eligible(sim, memory, outbox, timing, addr, Some(entry));
            return;
        }
        assert!(rounds < want_rounds);

        let is_primary = (own_rank, own_idx) < (partner_rank, partner_idx);
        if !is_primary {
            debug!("{}: is not primary node for segment {segment} purif", self.node);
            return;
        }

        let needs_path_id = self.mux.qubit_has_path_id();
        let aux = memory.find(None, |q, pair| {
            q.addr() != addr // not the same qubit
                && q.state() == QubitState::Purif // in PURIF state
                && q.purif_rounds == rounds // with the same round count
                && pair.is_some_and(|p| {
                    (p.src == *partner || p.dst == *partner) // same partner
                        && if needs_path_id {
                            q.path_id == Some(entry.path_id) // on the same path
                        } else {
                            has_intersect(p.tmp_path_ids.as_ref(), [entry.path_id])
                        }
                })
        });
        let Some(aux) = aux else {
            debug!(
                "{}: no candidate EPR for segment {segment} purif round {}",
                self.node,
                1 + rounds
            );
            return;
        };

        self.send_purif_solicit(sim, memory, outbox, entry, addr, aux, partner);
    }

    /// Initiate the purification protocol: keep `mq0`, consume `mq1`.
    fn send_purif_solicit<E: FwEventSet<M>>(
        &mut self,
        sim: &mut Simulator<E>,
        memory: &mut QuantumMemory<M>,
        outbox: &mut Outbox<EprPair<M>>,
        entry: &FibEntry,
        mq0: usize,
        mq1: usize,
        partner: &NodeName,
    ) {
        let now = sim.tc();
        let (_, measured) = memory
            .take(sim, ReadKey::Addr(mq1))
            .expect("auxiliary qubit without pair");
        let kept = memory.pair(mq0).expect("kept qubit without pair");
        let kept_name = kept.name().to_string();

        debug!(
            "{}: request purif qubit {mq0} (F={:.4}) and {mq1} (F={:.4}) with partner {partner}",
            self.node,
            kept.quality(now),
            measured.quality(now)
        );

        // both sides apply the same deterministic outcome; stash ours until
        // the partner reports whether the round succeeded
        let (_, new_model) = kept.purify_outcome(&measured, now);
        self.pending_purif.insert(kept_name.clone(), new_model);

        let round = memory.qubit(mq0).purif_rounds;
        memory.qubit_mut(mq0).set_state(QubitState::Pending);
        let measured_name = measured.name().to_string();
        self.release_qubit(sim, memory, mq1, false);

        let msg = PurifSolicit {
            path_id: entry.path_id,
            purif_node: self.node.clone(),
            partner: partner.clone(),
            epr: kept_name,
            measure_epr: measured_name,
            round,
        };
        self.send_along_path(
            outbox,
            entry,
            partner,
            ClassicMessage::PurifSolicit(msg),
            None,
            false,
        );
    }

    /// Process `PURIF_SOLICIT` as the responder: perform the purification,
    /// advance or release the kept half, release the measured half, reply
    /// with the outcome.
    fn handle_purif_solicit<E: FwEventSet<M>>(
        &mut self,
        sim: &mut Simulator<E>,
        memory: &mut QuantumMemory<M>,
        outbox: &mut Outbox<EprPair<M>>,
        timing: &Timing,
        entry: &FibEntry,
        msg: PurifSolicit,
    ) {
        assert_eq!(msg.partner, self.node);
        let now = sim.tc();
        let kept_addr = memory.find_pair(&msg.epr);
        let measured = memory.take(sim, ReadKey::PairName(&msg.measure_epr));

        // either half may have decohered during the message flight; treat as
        // not-found, release what is left and report failure
        let (kept_addr, (m_addr, measured_pair)) = match (kept_addr, measured) {
            (Some(kept_addr), Some(found)) => (kept_addr, found),
            (kept_opt, measured_opt) => {
                debug!(
                    "{}: purif solicit raced a lost pair (epr={}, measure={})",
                    self.node, msg.epr, msg.measure_epr
                );
                if let Some(addr) = kept_opt {
                    self.release_qubit(sim, memory, addr, true);
                }
                if let Some((m_addr, _)) = measured_opt {
                    self.release_qubit(sim, memory, m_addr, false);
                }
                self.reply_purif(outbox, entry, &msg, false);
                return;
            }
        };

        debug_assert_eq!(memory.qubit(kept_addr).state(), QubitState::Purif);
        debug_assert_eq!(memory.qubit(kept_addr).purif_rounds, msg.round);
        let primary = msg.purif_node.clone();

        let kept = memory.pair(kept_addr).unwrap();
        let (p_success, new_model) = kept.purify_outcome(&measured_pair, now);
        let result = sim.rng().chance(p_success);
        debug!(
            "{}: purif {} on qubit {kept_addr} for round {} with primary {primary}",
            self.node,
            if result { "succeeded" } else { "failed" },
            1 + msg.round
        );

        if result {
            memory
                .pair_mut(kept_addr)
                .unwrap()
                .apply_purified(new_model, now);
            self.cnt.increment_n_purif(msg.round as usize);
            memory.qubit_mut(kept_addr).purif_rounds += 1;
            // the qubit may become eligible before the response even arrives
            // at the primary
            self.qubit_is_purif(sim, memory, outbox, timing, entry, kept_addr, &primary);
        } else {
            self.release_qubit(sim, memory, kept_addr, true);
        }

        self.release_qubit(sim, memory, m_addr, false);
        self.reply_purif(outbox, entry, &msg, result);
    }

    fn reply_purif(
        &mut self,
        outbox: &mut Outbox<EprPair<M>>,
        entry: &FibEntry,
        msg: &PurifSolicit,
        result: bool,
    ) {
        let resp = PurifResponse {
            path_id: msg.path_id,
            purif_node: msg.purif_node.clone(),
            partner: msg.partner.clone(),
            epr: msg.epr.clone(),
            measure_epr: msg.measure_epr.clone(),
            round: msg.round,
            result,
        };
        let dest = msg.purif_node.clone();
        self.send_along_path(
            outbox,
            entry,
            &dest,
            ClassicMessage::PurifResponse(resp),
            None,
            false,
        );
    }

    /// Process `PURIF_RESPONSE` as the soliciting primary.
    fn handle_purif_response<E: FwEventSet<M>>(
        &mut self,
        sim: &mut Simulator<E>,
        memory: &mut QuantumMemory<M>,
        outbox: &mut Outbox<EprPair<M>>,
        timing: &Timing,
        entry: &FibEntry,
        msg: PurifResponse,
    ) {
        let stashed = self.pending_purif.remove(&msg.epr);
        let Some(addr) = memory.find_pair(&msg.epr) else {
            debug!(
                "{}: purif response for pair {} no longer in memory",
                self.node, msg.epr
            );
            return;
        };
        debug!(
            "{}: purif {} on qubit {addr} for round {} with partner {}",
            self.node,
            if msg.result { "succeeded" } else { "failed" },
            1 + msg.round,
            msg.partner
        );

        if !msg.result {
            self.release_qubit(sim, memory, addr, true);
            return;
        }

        let model = stashed.expect("purif response without a solicited outcome");
        let now = sim.tc();
        memory.pair_mut(addr).unwrap().apply_purified(model, now);
        self.cnt.increment_n_purif(memory.qubit(addr).purif_rounds as usize);
        let qubit = memory.qubit_mut(addr);
        qubit.purif_rounds += 1;
        qubit.set_state(QubitState::Purif);
        let partner = msg.partner.clone();
        self.qubit_is_purif(sim, memory, outbox, timing, entry, addr, &partner);
    }

    // ------------------------------------------------------------------
    // Eligibility, swapping, consumption
    // ------------------------------------------------------------------

    /// Handle a qubit entering the ELIGIBLE state: consume at path ends (or
    /// when swapping is disabled), otherwise arm the cutoff and look for a
    /// swap candidate.
    fn qubit_is_eligible<E: FwEventSet<M>>(
        &mut self,
        sim: &mut Simulator<E>,
        memory: &mut QuantumMemory<M>,
        outbox: &mut Outbox<EprPair<M>>,
        timing: &Timing,
        addr: usize,
        entry: Option<&FibEntry>,
    ) {
        debug_assert_eq!(memory.qubit(addr).state(), QubitState::Eligible);
        if !timing.is_internal(None) {
            debug!("{}: INTERNAL phase is over, stop swaps", self.node);
            return;
        }
        let now = sim.tc();

        let consumable = {
            let pair = memory.pair(addr).expect("eligible qubit without pair");
            self.can_consume(entry, pair)
        };
        if consumable {
            self.consume_and_release(sim, memory, addr);
            return;
        }

        let deadline = self.cutoff.eligible_deadline(now, entry);
        memory.qubit_mut(addr).cutoff = deadline.map(|d| (now, d));

        let candidates: Vec<usize> = memory.find_all(None, |q, pair| {
            q.addr() != addr
                && q.state() == QubitState::Eligible
                && pair.is_some()
                && self.cutoff.filter_swap_candidate(q, now)
        });

        match self
            .mux
            .find_swap_candidate(addr, memory, &self.fib, entry, &candidates, sim.rng())
        {
            Some((mq1, path_id)) => {
                // the partner qubit is about to be consumed by the swap;
                // disarm its pending discard
                let pending = {
                    let qubit = memory.qubit_mut(mq1);
                    qubit.cutoff = None;
                    qubit.cutoff_event.take()
                };
                if let Some(id) = pending {
                    sim.cancel(id);
                }
                memory.qubit_mut(addr).cutoff = None;

                let entry = self
                    .fib
                    .get(path_id)
                    .expect("swap candidate on unknown path")
                    .clone();
                self.do_swapping(sim, memory, outbox, &entry, addr, mq1);
            }
            None => {
                // stored for a future swap; arm the auto-discard
                if let (Some((_, deadline)), Some(entry)) = (memory.qubit(addr).cutoff, entry) {
                    let pair_name = memory.pair(addr).unwrap().name().to_string();
                    let event = FwEvent::CutoffExpired {
                        node: self.node.clone(),
                        addr,
                        pair: pair_name,
                        path_id: entry.path_id,
                        round: -1,
                    };
                    if let Some(id) = sim.schedule(deadline, event.into()) {
                        memory.qubit_mut(addr).cutoff_event = Some(id);
                    }
                }
            }
        }
    }

    fn can_consume(&self, entry: Option<&FibEntry>, pair: &EprPair<M>) -> bool {
        match entry {
            // statistical multiplexing binds no entry; consume when the pair
            // spans an installed request
            None => self.fib.has_request(&pair.src, &pair.dst),
            Some(entry) => entry.is_swap_disabled() || entry.is_endpoint(),
        }
    }

    fn consume_and_release<E: FwEventSet<M>>(
        &mut self,
        sim: &mut Simulator<E>,
        memory: &mut QuantumMemory<M>,
        addr: usize,
    ) {
        let (_, pair) = memory
            .take(sim, ReadKey::Addr(addr))
            .expect("consuming a qubit without pair");
        let quality = pair.quality(sim.tc());
        debug!(
            "{}: consume EPR {} -> {}-{} | F={quality:.4}",
            self.node,
            pair.name(),
            pair.src,
            pair.dst
        );
        self.cnt.n_consumed += 1;
        self.cnt.consumed_sum_fidelity += quality;
        self.release_qubit(sim, memory, addr, false);
    }

    /// Perform swapping between two eligible qubits from different channels
    /// and notify both remote partners, success or not.
    fn do_swapping<E: FwEventSet<M>>(
        &mut self,
        sim: &mut Simulator<E>,
        memory: &mut QuantumMemory<M>,
        outbox: &mut Outbox<EprPair<M>>,
        entry: &FibEntry,
        mq0: usize,
        mq1: usize,
    ) {
        assert_ne!(mq0, mq1);
        assert_eq!(memory.qubit(mq0).state(), QubitState::Eligible);
        assert_eq!(memory.qubit(mq1).state(), QubitState::Eligible);

        // Read both qubits destructively and classify them. The pair whose
        // dst is this node is entangled with a partner to the left, because
        // the link layer establishes elementary pairs left-to-right and
        // swapping maintains the orientation.
        let mut prev: Option<(EprPair<M>, usize)> = None;
        let mut next: Option<(EprPair<M>, usize)> = None;
        for addr in [mq0, mq1] {
            let (_, pair) = memory.take(sim, ReadKey::Addr(addr)).expect("pair vanished");
            if pair.dst == self.node {
                prev = Some((pair, addr));
            } else if pair.src == self.node {
                next = Some((pair, addr));
            } else {
                panic!("{}: swapping a pair not anchored at this node", self.node);
            }
        }
        let (prev_pair, prev_addr) = prev.expect("no left-side pair in swap");
        let (next_pair, next_addr) = next.expect("no right-side pair in swap");

        let now = sim.tc();
        let mut new_pair = EprPair::swap(&prev_pair, &next_pair, now, self.ps, sim.rng());
        debug!(
            "{}: SWAP {} | {prev_addr} x {next_addr}",
            self.node,
            if new_pair.is_some() { "SUCC" } else { "FAILED" }
        );

        if let Some(pair) = new_pair.as_mut() {
            self.cnt.n_swapped_s += 1;
            self.mux.swapping_succeeded(&prev_pair, &next_pair, pair);
        }

        let sides = [
            (&prev_pair, prev_addr, &next_pair),
            (&next_pair, next_addr, &prev_pair),
        ];
        for (a_pair, a_addr, b_pair) in sides {
            let a_partner = a_pair
                .partner_of(&self.node)
                .expect("swapped pair without this node")
                .to_string();
            let b_partner = b_pair
                .partner_of(&self.node)
                .expect("swapped pair without this node")
                .to_string();

            if let Some(pair) = &new_pair {
                // cache the partial result in case the partner swapped in
                // the same rank wave
                if let Some((_, a_rank)) = entry.find_index_and_rank(&a_partner) {
                    if entry.own_swap_rank() == a_rank {
                        self.parallel_swappings.insert(
                            a_pair.name().to_string(),
                            ParallelSwap {
                                other: b_pair.clone(),
                                my_new: pair.clone(),
                            },
                        );
                    }
                }
            }

            let msg = SwapUpdate {
                path_id: entry.path_id,
                swapping_node: self.node.clone(),
                partner: b_partner,
                epr: a_pair.name().to_string(),
                new_epr: new_pair.as_ref().map(|p| p.name().to_string()),
            };
            self.send_along_path(
                outbox,
                entry,
                &a_partner,
                ClassicMessage::SwapUpdate(msg),
                new_pair.clone(),
                false,
            );
            self.release_qubit(sim, memory, a_addr, false);
        }
    }

    /// Process `SWAP_UPDATE`: update the local qubit, or merge with an own
    /// parallel swap, or release a raced pair.
    #[allow(clippy::too_many_arguments)]
    fn handle_swap_update<E: FwEventSet<M>>(
        &mut self,
        sim: &mut Simulator<E>,
        memory: &mut QuantumMemory<M>,
        outbox: &mut Outbox<EprPair<M>>,
        timing: &Timing,
        entry: &FibEntry,
        msg: SwapUpdate,
        attachment: Option<EprPair<M>>,
    ) {
        if !timing.is_internal(None) {
            debug!("{}: INTERNAL phase is over, stop swaps", self.node);
            return;
        }
        let Some((_, sender_rank)) = entry.find_index_and_rank(&msg.swapping_node) else {
            debug!("{}: swap update from off-route node {}", self.node, msg.swapping_node);
            return;
        };
        if entry.own_swap_rank() < sender_rank {
            debug!("{}: dropping swap update from higher-rank node", self.node);
            return;
        }

        match memory.find_pair(&msg.epr) {
            Some(addr) => {
                if memory.qubit(addr).state() == QubitState::Entangled0 {
                    // raced ahead of the entangled notification; buffer it
                    self.waiting_su.insert(addr, (msg, attachment));
                    return;
                }
                self.parallel_swappings.remove(&msg.epr);
                let maybe_purif = entry.own_swap_rank() > sender_rank;
                self.su_sequential(sim, memory, outbox, timing, entry, addr, &msg, attachment, maybe_purif);
            }
            None if entry.own_swap_rank() == sender_rank
                && self.parallel_swappings.contains_key(&msg.epr) =>
            {
                self.su_parallel(sim, outbox, entry, &msg, attachment);
            }
            None => {
                debug!("{}: EPR {} decohered during SWAP_UPDATE transmission", self.node, msg.epr);
            }
        }
    }

    /// Sequential case: the local qubit still exists. Replace the old pair
    /// with the swapped one, or release it when the swap failed or the pair
    /// expired in flight.
    #[allow(clippy::too_many_arguments)]
    fn su_sequential<E: FwEventSet<M>>(
        &mut self,
        sim: &mut Simulator<E>,
        memory: &mut QuantumMemory<M>,
        outbox: &mut Outbox<EprPair<M>>,
        timing: &Timing,
        entry: &FibEntry,
        addr: usize,
        msg: &SwapUpdate,
        new_pair: Option<EprPair<M>>,
        maybe_purif: bool,
    ) {
        let now = sim.tc();
        let usable = match &new_pair {
            None => false, // swap failed
            Some(pair) if pair.is_expired(now) => {
                debug!("{}: new EPR {} decohered during transmission", self.node, pair.name());
                false
            }
            Some(_) => true,
        };
        if !usable {
            self.release_qubit(sim, memory, addr, true);
            return;
        }

        let new_pair = new_pair.unwrap();
        memory
            .update(sim, &msg.epr, new_pair)
            .unwrap_or_else(|err| panic!("{}: EPR update failed: {err}", self.node));

        if maybe_purif {
            // own rank is higher than the sender's: it is our turn to purify
            // toward the new partner and progress toward swapping
            let qubit = memory.qubit_mut(addr);
            qubit.purif_rounds = 0;
            qubit.set_state(QubitState::Purif);
            let partner = msg.partner.clone();
            self.qubit_is_purif(sim, memory, outbox, timing, entry, addr, &partner);
        }
    }

    /// Parallel case: own swap and the sender's swap completed in the same
    /// rank wave. Merge the two partial results, or propagate the failure.
    ///
    /// ```text
    /// destination-------own--------swapping_node----partner
    ///      |             |~~shared~~~~~~|            |
    ///      |~~other~~~~~~|              |            |
    ///      |~~~~~~~~~~my_new~~~~~~~~~~~~|            |
    ///      |             |~~~~~~~~~~remote~~~~~~~~~~~|
    ///      |~~~~~~~~~~~~~~~merged~~~~~~~~~~~~~~~~~~~~|
    /// ```
    fn su_parallel<E: FwEventSet<M>>(
        &mut self,
        sim: &mut Simulator<E>,
        outbox: &mut Outbox<EprPair<M>>,
        entry: &FibEntry,
        msg: &SwapUpdate,
        remote: Option<EprPair<M>>,
    ) {
        let record = self
            .parallel_swappings
            .remove(&msg.epr)
            .expect("su_parallel without a cached record");

        // under statistical multiplexing the two decisions may have landed
        // on different paths
        if self.mux.merge_has_conflict(&record.my_new, msg.path_id) {
            self.cnt.n_swap_conflict += 1;
            return;
        }

        let now = sim.tc();
        let other_on_left = record.other.dst == self.node;
        let destination = if other_on_left {
            record.other.src.clone()
        } else {
            record.other.dst.clone()
        };

        let failed = remote.as_ref().map_or(true, |p| p.is_expired(now));
        if failed {
            // inform the far destination that the chain broke here
            let update = SwapUpdate {
                path_id: msg.path_id,
                swapping_node: msg.swapping_node.clone(),
                partner: msg.partner.clone(),
                epr: record.my_new.name().to_string(),
                new_epr: None,
            };
            self.send_along_path(
                outbox,
                entry,
                &destination,
                ClassicMessage::SwapUpdate(update),
                None,
                false,
            );
            return;
        }
        let remote = remote.unwrap();

        // merge the two swaps; physically this already happened
        let mut merged = if other_on_left {
            EprPair::swap(&record.other, &remote, now, 1.0, sim.rng())
        } else {
            EprPair::swap(&remote, &record.other, now, 1.0, sim.rng())
        };

        if let Some(pair) = merged.as_mut() {
            self.cnt.n_swapped_p += 1;
            self.mux.merge_succeeded(pair, &remote, &record.other);
        }

        let update = SwapUpdate {
            path_id: msg.path_id,
            swapping_node: msg.swapping_node.clone(),
            partner: msg.partner.clone(),
            epr: record.my_new.name().to_string(),
            new_epr: merged.as_ref().map(|p| p.name().to_string()),
        };
        self.send_along_path(
            outbox,
            entry,
            &destination,
            ClassicMessage::SwapUpdate(update),
            merged.clone(),
            false,
        );

        // the far partner may itself be swapping in the same wave
        if let Some(merged) = merged {
            if let Some((_, partner_rank)) = entry.find_index_and_rank(&msg.partner) {
                if entry.own_swap_rank() == partner_rank {
                    self.parallel_swappings.insert(
                        remote.name().to_string(),
                        ParallelSwap {
                            other: record.other.clone(),
                            my_new: merged,
                        },
                    );
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Cutoff
    // ------------------------------------------------------------------

    /// A locally armed cutoff deadline fired: release the local half and ask
    /// the remote partner to release its half.
    pub fn handle_cutoff_expired<E: FwEventSet<M>>(
        &mut self,
        sim: &mut Simulator<E>,
        memory: &mut QuantumMemory<M>,
        outbox: &mut Outbox<EprPair<M>>,
        addr: usize,
        pair_name: &str,
        path_id: PathId,
        round: i32,
    ) {
        let still_armed = memory
            .get(ReadKey::PairName(pair_name))
            .is_some_and(|(found, _)| found == addr)
            && memory.qubit(addr).state() == QubitState::Eligible;
        if !still_armed {
            return; // the pair was consumed or released first
        }
        memory.qubit_mut(addr).cutoff_event = None;

        let (_, pair) = memory.take(sim, ReadKey::Addr(addr)).unwrap();
        let partner = pair
            .partner_of(&self.node)
            .expect("cutoff pair without this node")
            .to_string();
        debug!(
            "{}: local cutoff discard epr={} addr={addr} round={round} partner={partner}",
            self.node,
            pair.name()
        );

        self.cnt.increment_n_cutoff(round, true);
        self.release_qubit(sim, memory, addr, false);

        if let Some(entry) = self.fib.get(path_id).cloned() {
            let msg = CutoffDiscard {
                path_id,
                epr: pair.name().to_string(),
                round,
            };
            self.send_along_path(
                outbox,
                &entry,
                &partner,
                ClassicMessage::CutoffDiscard(msg),
                None,
                false,
            );
        }
    }

    /// Process `CUTOFF_DISCARD` from the initiating side: release the local
    /// half. A pair already gone is a silent no-op.
    fn handle_cutoff_discard<E: FwEventSet<M>>(
        &mut self,
        sim: &mut Simulator<E>,
        memory: &mut QuantumMemory<M>,
        msg: &CutoffDiscard,
    ) {
        let Some((addr, _)) = memory.get(ReadKey::PairName(&msg.epr)) else {
            debug!("{}: remote cutoff discard epr={} not exist", self.node, msg.epr);
            return;
        };
        debug!(
            "{}: remote cutoff discard epr={} addr={addr} round={}",
            self.node, msg.epr, msg.round
        );
        memory.take(sim, ReadKey::Addr(addr));
        self.cnt.increment_n_cutoff(msg.round, false);
        self.release_qubit(sim, memory, addr, false);
    }

    // ------------------------------------------------------------------
    // Shared plumbing
    // ------------------------------------------------------------------

    /// Release a qubit back to the link layer.
    ///
    /// With `read`, the stored pair is destructively read first (cancelling
    /// its scheduled decoherence).
    fn release_qubit<E: FwEventSet<M>>(
        &mut self,
        sim: &mut Simulator<E>,
        memory: &mut QuantumMemory<M>,
        addr: usize,
        read: bool,
    ) {
        if read {
            memory.take(sim, ReadKey::Addr(addr));
        }
        let pending = {
            let qubit = memory.qubit_mut(addr);
            qubit.cutoff = None;
            qubit.cutoff_event.take()
        };
        if let Some(id) = pending {
            sim.cancel(id);
        }
        memory.qubit_mut(addr).set_state(QubitState::Release);
        sim.schedule(
            sim.tc(),
            LinkEvent::QubitReleased {
                node: self.node.clone(),
                addr,
            }
            .into(),
        );
    }

    /// Handle a SYNC timing phase signal.
    ///
    /// Entering EXTERNAL invalidates in-flight swap state (all memory qubits
    /// are being discarded by the link layer). Entering INTERNAL drains the
    /// entangled notifications buffered during the generation window.
    pub fn handle_sync_phase<E: FwEventSet<M>>(
        &mut self,
        sim: &mut Simulator<E>,
        memory: &mut QuantumMemory<M>,
        outbox: &mut Outbox<EprPair<M>>,
        timing: &Timing,
        external: bool,
    ) {
        if external {
            self.waiting_su.clear();
            self.parallel_swappings.clear();
            self.pending_purif.clear();
            return;
        }

        let waiting = std::mem::take(&mut self.waiting_etg);
        debug!("{}: there are {} etg qubits to process", self.node, waiting.len());
        for (neighbor, addr) in waiting {
            self.handle_qubit_entangled(sim, memory, outbox, timing, &neighbor, addr);
        }
    }
}
