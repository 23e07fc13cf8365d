//! # Forwarder Subsystem
//!
//! The protocol brain of each quantum node. The forwarder receives routing
//! instructions from the controller into its FIB and implements the
//! forwarding phase: purification, entanglement swapping (sequential and
//! parallel-merged), end-to-end consumption and cutoff enforcement.
//!
//! ## Decision policies
//!
//! Two policy seams alter control flow without changing the protocol
//! contract:
//!
//! - [`MuxScheme`] — how qubits/pairs are matched to paths sharing a
//!   channel: buffer-space (static per-path allocation), statistical (lazy
//!   path ownership with conflict detection), dynamic-EPR (per-pair path
//!   selection at generation time).
//! - [`CutoffScheme`] — when an eligible qubit that keeps waiting for its
//!   swap partner is discarded to bound latency and quality loss.
//!
//! ## Races handled
//!
//! - `SWAP_UPDATE` arriving before the local qubit-entangled notification is
//!   buffered and replayed.
//! - Two adjacent equal-rank swaps completing in the same wave are merged
//!   through the parallel-swapping cache, or counted as a conflict when the
//!   multiplexing scheme detects inconsistent decisions.
//! - Cutoff discards release both halves exactly once, counted per side.

mod counters;
mod cutoff;
mod events;
mod fib;
mod forwarder;
pub mod mux;

pub use counters::{CutoffTally, ForwarderCounters};
pub use cutoff::{CutoffScheme, CutoffSchemeDisabled, CutoffSchemeWaitTime};
pub use events::FwEvent;
pub use fib::{Fib, FibEntry, FibRequestGroup};
pub use forwarder::{Forwarder, ForwarderConfig, FwEventSet};
pub use mux::{
    EntangledDecision, MuxScheme, MuxSchemeBufferSpace, MuxSchemeDynamicEpr, MuxSchemeStatistical,
    PathSelect,
};
