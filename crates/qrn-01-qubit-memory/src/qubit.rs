//! An addressable qubit in memory, with a lifecycle.

use serde::{Deserialize, Serialize};
use shared_types::{PathDirection, PathId};
use sim_kernel::{EventId, Time};

/// Lifecycle state of a memory qubit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QubitState {
    /// Qubit is unused.
    Raw,
    /// The link layer has started a reservation on the qubit as the primary
    /// node. `active` contains the reservation key.
    Active,
    /// Qubit is part of a reservation and a remote qubit has been found.
    /// Set on both primary and secondary side of the reservation.
    Reserved,
    /// Half of an elementary entanglement delivered from the link layer;
    /// the entangled notification has not been processed by the forwarder.
    Entangled0,
    /// Half of an elementary entanglement; the entangled notification has
    /// been processed by the forwarder.
    Entangled1,
    /// Used by the forwarder for zero or more purification rounds. Both
    /// segment ends hold this state; only the primary initiates.
    Purif,
    /// Purification with the partner is in flight for the current round.
    Pending,
    /// Required purification rounds completed; ready for swapping or
    /// end-to-end consumption. Only set when own swap rank permits acting.
    Eligible,
    /// No longer used by the forwarder; the link layer may generate a new
    /// elementary entanglement into this qubit.
    Release,
}

impl QubitState {
    /// Legal successor states.
    pub fn allowed_transitions(self) -> &'static [QubitState] {
        use QubitState::*;
        match self {
            Raw => &[Active],
            Active => &[Reserved],
            Reserved => &[Entangled0],
            Entangled0 => &[Release, Entangled1],
            Entangled1 => &[Release, Purif],
            Purif => &[Release, Pending, Eligible],
            Pending => &[Release, Purif],
            Eligible => &[Release],
            Release => &[Raw],
        }
    }
}

/// An addressable qubit in memory.
#[derive(Debug)]
pub struct MemoryQubit {
    addr: usize,
    /// Quantum channel to which the qubit is assigned (topology creation).
    pub qchannel: Option<String>,
    /// Path to which the qubit is allocated, if any.
    pub path_id: Option<PathId>,
    /// End of the path the allocated qubit points to.
    pub path_direction: Option<PathDirection>,
    state: QubitState,
    /// Reservation key while the qubit takes part in a link-layer
    /// reservation.
    pub active: Option<String>,
    /// Purification rounds completed by the pair stored on this qubit.
    pub purif_rounds: u32,
    /// Cutoff bookkeeping: (recorded-at, deadline).
    pub cutoff: Option<(Time, Time)>,
    /// Pending cutoff auto-discard event.
    pub cutoff_event: Option<EventId>,
}

impl MemoryQubit {
    pub fn new(addr: usize) -> Self {
        MemoryQubit {
            addr,
            qchannel: None,
            path_id: None,
            path_direction: None,
            state: QubitState::Raw,
            active: None,
            purif_rounds: 0,
            cutoff: None,
            cutoff_event: None,
        }
    }

    pub fn addr(&self) -> usize {
        self.addr
    }

    pub fn state(&self) -> QubitState {
        self.state
    }

    /// Transition the lifecycle state. Repeating the current state is a
    /// no-op; any transition outside the FSM table is fatal.
    pub fn set_state(&mut self, next: QubitState) {
        if next == self.state {
            return;
        }
        if !self.state.allowed_transitions().contains(&next) {
            panic!(
                "MemoryQubit {}: unexpected state transition from <{:?}> to <{:?}>",
                self.addr, self.state, next
            );
        }
        self.state = next;
    }

    /// Attach routing metadata without changing FSM state.
    pub fn allocate(&mut self, path_id: PathId, direction: Option<PathDirection>) {
        self.path_id = Some(path_id);
        self.path_direction = direction;
    }

    /// Detach routing metadata without changing FSM state.
    pub fn deallocate(&mut self) {
        self.path_id = None;
        self.path_direction = None;
    }

    /// Force the state back to RAW and clear reservation fields. Used when a
    /// whole memory is cleared between generation windows.
    pub fn reset_state(&mut self) {
        self.state = QubitState::Raw;
        self.active = None;
        self.purif_rounds = 0;
        self.cutoff = None;
        self.cutoff_event = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_lifecycle_walk_is_legal() {
        use QubitState::*;
        let mut qubit = MemoryQubit::new(0);
        for state in [
            Active, Reserved, Entangled0, Entangled1, Purif, Pending, Purif, Eligible, Release,
            Raw,
        ] {
            qubit.set_state(state);
            assert_eq!(qubit.state(), state);
        }
    }

    #[test]
    fn test_same_state_is_a_no_op() {
        let mut qubit = MemoryQubit::new(0);
        qubit.set_state(QubitState::Active);
        qubit.set_state(QubitState::Active);
        assert_eq!(qubit.state(), QubitState::Active);
    }

    #[test]
    #[should_panic(expected = "unexpected state transition")]
    fn test_skipping_a_state_is_fatal() {
        let mut qubit = MemoryQubit::new(0);
        qubit.set_state(QubitState::Reserved); // RAW -> RESERVED skips ACTIVE
    }

    #[test]
    #[should_panic(expected = "unexpected state transition")]
    fn test_illegal_revisit_is_fatal() {
        let mut qubit = MemoryQubit::new(0);
        for s in [
            QubitState::Active,
            QubitState::Reserved,
            QubitState::Entangled0,
            QubitState::Entangled1,
        ] {
            qubit.set_state(s);
        }
        qubit.set_state(QubitState::Entangled0); // cannot go backwards
    }

    #[test]
    fn test_allocate_does_not_touch_state() {
        let mut qubit = MemoryQubit::new(3);
        qubit.set_state(QubitState::Active);
        qubit.allocate(7, Some(shared_types::PathDirection::Left));
        assert_eq!(qubit.state(), QubitState::Active);
        assert_eq!(qubit.path_id, Some(7));
        qubit.deallocate();
        assert_eq!(qubit.path_id, None);
        assert_eq!(qubit.state(), QubitState::Active);
    }
}
