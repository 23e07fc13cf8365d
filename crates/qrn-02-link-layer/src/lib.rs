//! # Link Layer Subsystem
//!
//! Network function for creating elementary entanglements over quantum
//! channels. It equips a node and is activated from the forwarding function.
//!
//! ## Protocol
//!
//! Per quantum channel, at most one *active* side (the primary) runs
//! generation:
//!
//! 1. The primary picks a RAW qubit, marks it ACTIVE under a random
//!    reservation key and sends `RESERVE_QUBIT`.
//! 2. The secondary reserves a matching free qubit and replies
//!    `RESERVE_QUBIT_OK`, or queues the request (FIFO) until a qubit frees
//!    up.
//! 3. On the OK, the primary samples which attempt number will succeed
//!    (geometric, per-architecture success probability), builds the pair and
//!    schedules one arrival event per side — skip-ahead sampling, no
//!    per-attempt events.
//! 4. Each arrival writes the half into memory (ENTANGLED0) and raises the
//!    qubit-entangled notification for the forwarder.
//!
//! On release or decoherence of a qubit it owns as primary, the link layer
//! immediately restarts the handshake for that channel (unless continuous
//! generation is disabled); the secondary side instead retries the oldest
//! queued reservation.
//!
//! ## Link architectures
//!
//! [`LinkArch`] models the elementary generation protocol's success
//! probability and per-attempt timing; see [`arch`] for the concrete
//! detection-in-midpoint / sender-receiver / source-in-midpoint models.

pub mod arch;
mod channel;
mod events;
mod link_layer;

pub use arch::{make_pair, Always, DimBk, DimBkSeq, DimDual, LinkArch, LinkArchParams, Sim, Sr};
pub use channel::{QuantumChannel, LIGHT_SPEED_KM_S};
pub use events::LinkEvent;
pub use link_layer::{LinkLayer, LinkLayerConfig, LinkLayerCounters, PeerMemory};
