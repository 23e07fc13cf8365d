//! # Shared Types Crate
//!
//! This crate contains the types exchanged between protocol subsystems.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: all cross-subsystem wire shapes are defined
//!   here, as a `cmd`-tagged union of fixed payload shapes.
//! - **Validate before install**: [`PathInstructions`] are checked
//!   synchronously at path-install time, before any node state changes.
//! - **Send-then-deliver**: classical messages leave a handler through an
//!   [`Outbox`]; delivery is always a strictly later event.

pub mod errors;
pub mod ids;
pub mod message;
pub mod packet;
pub mod timing;

pub use errors::ValidationError;
pub use ids::{NodeName, PathDirection, PathId, ReqId};
pub use message::{
    make_path_instructions, validate_path_instructions, ClassicMessage, CutoffDiscard,
    MultiplexingVector, PathInstructions, PurifResponse, PurifSolicit, SwapUpdate, UNBOUNDED_CUTOFF,
};
pub use packet::{ClassicPacket, Outbox, Outgoing};
pub use timing::{Timing, TimingMode, TimingPhase};
