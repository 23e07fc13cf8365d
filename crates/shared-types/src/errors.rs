//! Validation errors surfaced synchronously at path-install time.

use thiserror::Error;

/// Malformed forwarding instructions.
///
/// These are raised before any message is sent or node state is changed,
/// never as a mid-simulation event.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A route must contain at least the two end nodes.
    #[error("route has {0} nodes, need at least 2")]
    RouteTooShort(usize),

    /// Swap sequence length must equal the route length.
    #[error("swapping order length {swap} does not match route length {route}")]
    SwapLengthMismatch { swap: usize, route: usize },

    /// Cutoff budget list length must equal the route length.
    #[error("swap_cutoff length {cutoff} does not match route length {route}")]
    CutoffLengthMismatch { cutoff: usize, route: usize },

    /// Multiplexing vector must have one entry per link.
    #[error("multiplexing vector length {m_v} does not match {links} links")]
    MvLengthMismatch { m_v: usize, links: usize },

    /// Purification segment not present (in order) in the route.
    #[error("purif segment {0} does not exist in route")]
    BadPurifSegment(String),

    /// Named swap sequence not defined for this route length.
    #[error("swap sequence {name} undefined for {nodes} nodes")]
    UnknownSwapSequence { name: String, nodes: usize },

    /// Instructions incompatible with the installed multiplexing scheme.
    #[error("instructions incompatible with {scheme}: {reason}")]
    SchemeMismatch { scheme: String, reason: String },
}
