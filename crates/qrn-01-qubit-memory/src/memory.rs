//! Quantum memory: fixed-capacity storage for entangled pairs.

use std::collections::HashMap;

use epr_models::{EprPair, QuantumModel};
use shared_types::{NodeName, PathDirection, PathId};
use sim_kernel::{EventId, Simulator};
use thiserror::Error;
use tracing::debug;

use crate::qubit::{MemoryQubit, QubitState};

/// Memory operation failures. All are recoverable: an operation either
/// fully succeeds or changes nothing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MemoryError {
    #[error("qubit address {0} out of range")]
    AddrOutOfRange(usize),

    #[error("no free qubit matching the constraints")]
    NoFreeQubit,

    #[error("qubit {0} contains existing data")]
    Occupied(usize),

    #[error("insufficient qubits: wanted {wanted}, found {found}")]
    InsufficientQubits { wanted: usize, found: usize },

    #[error("pair {0} not found in memory")]
    PairNotFound(String),
}

/// Decoherence event payload: the pair stored at `addr` reached its
/// decoherence time.
#[derive(Debug, Clone)]
pub struct QubitDecohered {
    pub node: NodeName,
    pub addr: usize,
    pub pair: String,
}

/// Slot selector for `write`.
#[derive(Debug, Clone, Copy)]
pub enum WriteKey<'a> {
    /// A specific qubit address.
    Addr(usize),
    /// The qubit carrying this reservation key.
    ReservationKey(&'a str),
    /// Any empty slot.
    AnyFree,
}

/// Slot selector for reads.
#[derive(Debug, Clone, Copy)]
pub enum ReadKey<'a> {
    Addr(usize),
    /// Locate the slot by stored pair name.
    PairName(&'a str),
}

/// Quantity selector for `allocate`.
#[derive(Debug, Clone, Copy)]
pub enum AllocateCount {
    N(usize),
    /// All remaining unallocated qubits assigned to the channel.
    All,
}

/// Quantum memory stores entangled pairs in addressable qubit slots.
#[derive(Debug)]
pub struct QuantumMemory<M> {
    node: NodeName,
    capacity: usize,
    /// Memory dephasing time in seconds; `f64::INFINITY` disables
    /// decoherence entirely.
    t_cohere: f64,
    slots: Vec<(MemoryQubit, Option<EprPair<M>>)>,
    usage: usize,
    /// Qubit addrs assigned to each quantum channel, sorted.
    by_qchannel: HashMap<String, Vec<usize>>,
    /// Pending decoherence events keyed by pair name, so a consumed pair's
    /// expiry can be cancelled atomically.
    pending_decohere: HashMap<String, EventId>,
}

impl<M: QuantumModel> QuantumMemory<M> {
    pub fn new(node: impl Into<NodeName>, capacity: usize, t_cohere: f64) -> Self {
        assert!(capacity >= 1);
        assert!(t_cohere > 0.0);
        QuantumMemory {
            node: node.into(),
            capacity,
            t_cohere,
            slots: (0..capacity).map(|addr| (MemoryQubit::new(addr), None)).collect(),
            usage: 0,
            by_qchannel: HashMap::new(),
            pending_decohere: HashMap::new(),
        }
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Quantity of stored pairs.
    pub fn count(&self) -> usize {
        self.usage
    }

    /// Memory dephasing time in seconds.
    pub fn t_cohere(&self) -> f64 {
        self.t_cohere
    }

    /// Memory dephasing rate in Hz (inverse of the dephasing time). A pair's
    /// dephasing rate is the sum of both memories' rates.
    pub fn decoherence_rate(&self) -> f64 {
        if self.t_cohere.is_finite() {
            1.0 / self.t_cohere
        } else {
            0.0
        }
    }

    pub fn qubit(&self, addr: usize) -> &MemoryQubit {
        &self.slots[addr].0
    }

    pub fn qubit_mut(&mut self, addr: usize) -> &mut MemoryQubit {
        &mut self.slots[addr].0
    }

    pub fn pair(&self, addr: usize) -> Option<&EprPair<M>> {
        self.slots[addr].1.as_ref()
    }

    pub fn pair_mut(&mut self, addr: usize) -> Option<&mut EprPair<M>> {
        self.slots[addr].1.as_mut()
    }

    /// Locate a slot by stored pair name.
    pub fn find_pair(&self, name: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|(_, pair)| pair.as_ref().is_some_and(|p| p.name() == name))
    }

    /// Iterate over qubit addresses that satisfy a predicate, restricted to
    /// one quantum channel when given.
    pub fn find_all(
        &self,
        qchannel: Option<&str>,
        predicate: impl Fn(&MemoryQubit, Option<&EprPair<M>>) -> bool,
    ) -> Vec<usize> {
        let matches = |addr: &usize| {
            let (qubit, pair) = &self.slots[*addr];
            predicate(qubit, pair.as_ref())
        };
        match qchannel {
            Some(ch) => match self.by_qchannel.get(ch) {
                Some(addrs) => addrs.iter().copied().filter(|a| matches(a)).collect(),
                None => Vec::new(),
            },
            None => (0..self.capacity).filter(|a| matches(a)).collect(),
        }
    }

    /// First qubit address satisfying a predicate.
    pub fn find(
        &self,
        qchannel: Option<&str>,
        predicate: impl Fn(&MemoryQubit, Option<&EprPair<M>>) -> bool,
    ) -> Option<usize> {
        self.find_all(qchannel, predicate).into_iter().next()
    }

    /// Qubit addrs assigned to a quantum channel.
    pub fn channel_qubits(&self, qchannel: &str) -> &[usize] {
        self.by_qchannel.get(qchannel).map_or(&[], |v| v.as_slice())
    }

    /// Assign `n` unassigned qubits to a quantum channel (topology creation
    /// time only).
    pub fn assign(&mut self, qchannel: &str, n: usize) -> Result<Vec<usize>, MemoryError> {
        let addrs: Vec<usize> = self
            .find_all(None, |q, _| q.qchannel.is_none())
            .into_iter()
            .take(n)
            .collect();
        if addrs.len() != n {
            return Err(MemoryError::InsufficientQubits {
                wanted: n,
                found: addrs.len(),
            });
        }

        for &addr in &addrs {
            self.slots[addr].0.qchannel = Some(qchannel.to_string());
        }
        let entry = self.by_qchannel.entry(qchannel.to_string()).or_default();
        entry.extend(&addrs);
        entry.sort_unstable();
        Ok(addrs)
    }

    /// Unassign qubits from any quantum channel.
    pub fn unassign(&mut self, addrs: &[usize]) {
        for &addr in addrs {
            let Some(ch) = self.slots[addr].0.qchannel.take() else {
                continue;
            };
            if let Some(list) = self.by_qchannel.get_mut(&ch) {
                list.retain(|a| *a != addr);
                if list.is_empty() {
                    self.by_qchannel.remove(&ch);
                }
            }
        }
    }

    /// Allocate qubits assigned to `qchannel` to a path.
    pub fn allocate(
        &mut self,
        qchannel: &str,
        path_id: PathId,
        direction: PathDirection,
        count: AllocateCount,
    ) -> Result<Vec<usize>, MemoryError> {
        let free = self.find_all(Some(qchannel), |q, _| q.path_id.is_none());
        let addrs: Vec<usize> = match count {
            AllocateCount::All => free,
            AllocateCount::N(n) => {
                if free.len() < n {
                    return Err(MemoryError::InsufficientQubits {
                        wanted: n,
                        found: free.len(),
                    });
                }
                free.into_iter().take(n).collect()
            }
        };
        for &addr in &addrs {
            self.slots[addr].0.allocate(path_id, Some(direction));
        }
        Ok(addrs)
    }

    /// Clear path allocation on the given qubits. Does not modify stored
    /// pairs or FSM states.
    pub fn deallocate(&mut self, addrs: &[usize]) {
        for &addr in addrs {
            self.slots[addr].0.deallocate();
        }
    }

    /// Store a pair in memory.
    ///
    /// If the pair carries a real decoherence timestamp, a cancellable
    /// decoherence event is scheduled for it.
    pub fn write<E: From<QubitDecohered>>(
        &mut self,
        sim: &mut Simulator<E>,
        key: WriteKey<'_>,
        pair: EprPair<M>,
    ) -> Result<usize, MemoryError> {
        let addr = match key {
            WriteKey::Addr(addr) => {
                if addr >= self.capacity {
                    return Err(MemoryError::AddrOutOfRange(addr));
                }
                addr
            }
            WriteKey::ReservationKey(key) => self
                .find(None, |q, _| q.active.as_deref() == Some(key))
                .ok_or(MemoryError::NoFreeQubit)?,
            WriteKey::AnyFree => self
                .find(None, |_, pair| pair.is_none())
                .ok_or(MemoryError::NoFreeQubit)?,
        };

        if self.slots[addr].1.is_some() {
            return Err(MemoryError::Occupied(addr));
        }

        self.schedule_decohere(sim, addr, &pair);
        self.slots[addr].1 = Some(pair);
        self.usage += 1;
        Ok(addr)
    }

    /// Replace the pair stored under `old_name` with `new_pair`, migrating
    /// the scheduled decoherence event.
    pub fn update<E: From<QubitDecohered>>(
        &mut self,
        sim: &mut Simulator<E>,
        old_name: &str,
        new_pair: EprPair<M>,
    ) -> Result<usize, MemoryError> {
        let addr = self
            .find_pair(old_name)
            .ok_or_else(|| MemoryError::PairNotFound(old_name.to_string()))?;

        if let Some(id) = self.pending_decohere.remove(old_name) {
            sim.cancel(id);
        }
        self.schedule_decohere(sim, addr, &new_pair);
        self.slots[addr].1 = Some(new_pair);
        Ok(addr)
    }

    /// Destructively read a pair: the slot is freed and any pending
    /// decoherence event for the pair is cancelled.
    pub fn take<E>(
        &mut self,
        sim: &mut Simulator<E>,
        key: ReadKey<'_>,
    ) -> Option<(usize, EprPair<M>)> {
        let addr = self.locate(key)?;
        let pair = self.slots[addr].1.take()?;
        self.usage -= 1;
        if let Some(id) = self.pending_decohere.remove(pair.name()) {
            sim.cancel(id);
        }
        Some((addr, pair))
    }

    /// Non-destructive lookup.
    pub fn get(&self, key: ReadKey<'_>) -> Option<(usize, &EprPair<M>)> {
        let addr = self.locate(key)?;
        self.slots[addr].1.as_ref().map(|p| (addr, p))
    }

    fn locate(&self, key: ReadKey<'_>) -> Option<usize> {
        match key {
            ReadKey::Addr(addr) => (addr < self.capacity).then_some(addr),
            ReadKey::PairName(name) => self.find_pair(name),
        }
    }

    /// Part of the decoherence-event logic.
    ///
    /// Returns whether the link layer should be informed: the pair was still
    /// in memory and its slot moved to RELEASE. A pair already consumed via
    /// a destructive read makes the event a no-op.
    pub fn handle_decohered(&mut self, addr: usize, pair_name: &str) -> bool {
        self.pending_decohere.remove(pair_name);

        let (_, stored) = &mut self.slots[addr];
        match stored {
            Some(pair) if pair.name() == pair_name => {
                pair.mark_decohered();
            }
            // already released via swap/purify or re-entangled
            _ => return false,
        }

        self.slots[addr].1 = None;
        self.usage -= 1;
        self.slots[addr].0.set_state(QubitState::Release);
        debug!(
            "{}: qubit {addr} decohered, pair {pair_name} dropped",
            self.node
        );
        true
    }

    /// Clear all qubits, cancelling every pending decoherence event. Used
    /// when a SYNC generation window restarts.
    pub fn clear<E>(&mut self, sim: &mut Simulator<E>) {
        for (qubit, pair) in &mut self.slots {
            qubit.reset_state();
            *pair = None;
        }
        self.usage = 0;
        for (_, id) in self.pending_decohere.drain() {
            sim.cancel(id);
        }
    }

    fn schedule_decohere<E: From<QubitDecohered>>(
        &mut self,
        sim: &mut Simulator<E>,
        addr: usize,
        pair: &EprPair<M>,
    ) {
        if pair.decoherence_time.is_sentinel() {
            return;
        }
        assert!(
            pair.decoherence_time >= sim.tc(),
            "{}: pair {} already past decoherence at write",
            self.node,
            pair.name()
        );
        let event = QubitDecohered {
            node: self.node.clone(),
            addr,
            pair: pair.name().to_string(),
        };
        if let Some(id) = sim.schedule(pair.decoherence_time, event.into()) {
            self.pending_decohere.insert(pair.name().to_string(), id);
        }
    }
}
