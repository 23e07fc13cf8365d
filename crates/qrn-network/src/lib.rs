//! # Network Integration
//!
//! Composes the protocol subsystems into runnable quantum nodes and drives
//! them from the simulation kernel:
//!
//! - [`QNode`] — one quantum node: memory + link layer + forwarder.
//! - [`Network`] — owns the nodes, classical/quantum channel tables, the
//!   optional controller and the timing mode; implements the kernel's event
//!   handler with a single exhaustive dispatch, and flushes every handler's
//!   classical outbox through the per-channel delays so a message is only
//!   observable strictly after its send.
//! - [`NetEvent`] — the closed union of all event payloads.
//! - Topology builders ([`linear_topology`]) and the baseline Dijkstra
//!   shortest-path provider behind the controller's `RouteQuery` port.

mod channel;
mod event;
mod network;
mod route;
mod topology;

pub use channel::ClassicChannel;
pub use event::NetEvent;
pub use network::{Network, QNode};
pub use route::shortest_path;
pub use topology::{linear_topology, LinearTopoOptions};
