//! # Routing Controller Subsystem
//!
//! Centralized control plane. The controller computes concrete routes for a
//! request (through the external [`RouteQuery`] collaborator), builds
//! validated per-path forwarding instructions and unicasts `install_path` /
//! `uninstall_path` commands to every node on each route.
//!
//! Validation failures surface synchronously from the install call, before
//! any message is sent; the controller performs no reservation-level
//! conflict resolution between overlapping paths.

mod controller;
mod routing;
mod swap_sequence;

pub use controller::{RouteQuery, RoutingController, TopologyInfo};
pub use routing::{MvInput, QubitAllocation, RoutingError, RoutingKind, RoutingPath};
pub use swap_sequence::{parse_swap_sequence, SwapSpec};
