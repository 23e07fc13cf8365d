//! # EPR Models
//!
//! The quality-token seam between the protocol engine and the quantum-state
//! numerics. The protocol only ever sees:
//!
//! - [`QuantumModel`] — the narrow trait the physics library implements
//!   (fidelity, storage decay, swap combination, purification outcome), and
//! - [`EprPair`] — bookkeeping for one half of an entangled pair (identity,
//!   endpoints, timestamps, candidate path ids) plus swap / purify /
//!   decohere operations expressed over any `QuantumModel`.
//!
//! Quality is a pure function of the current timestamp: storage decay is
//! computed deterministically from the creation time and the combined memory
//! decoherence rate, so the two halves of a pair held at different nodes
//! never need shared mutable state.
//!
//! [`WernerModel`] is the shipped implementation (Werner states with a
//! hidden-variable parameter, Bennett-96 purification).

mod model;
mod pair;
mod werner;

pub use model::QuantumModel;
pub use pair::EprPair;
pub use werner::WernerModel;

/// Pair specialization used across the default simulator configuration.
pub type WernerPair = EprPair<WernerModel>;
