//! # QRN-Sim Test Suite
//!
//! Unified test crate for protocol scenarios that span several subsystems.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── common.rs        # linear-network fixtures
//!     ├── link_layer.rs    # generation statistics over a single link
//!     ├── swapping.rs      # sequential and parallel swapping scenarios
//!     ├── purification.rs  # per-segment and end-to-end purification
//!     └── cutoff.rs        # wait-time cutoff discards
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p qrn-tests
//! cargo test -p qrn-tests integration::swapping::
//! ```

#![allow(dead_code)]

pub mod integration;
