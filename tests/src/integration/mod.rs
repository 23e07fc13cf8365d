//! Cross-subsystem protocol scenarios.

pub mod common;

mod cutoff;
mod link_layer;
mod purification;
mod swapping;
