//! Identifiers shared across subsystems.

use serde::{Deserialize, Serialize};

/// Node name. Nodes are addressed by name in routes and messages.
pub type NodeName = String;

/// Path identifier: identifies one end-to-end path installed by the
/// controller. Multi-path requests use consecutive path ids.
pub type PathId = u32;

/// Request identifier: identifies one source-destination pair.
pub type ReqId = u32;

/// End of the path to which an allocated qubit points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathDirection {
    /// Toward the route's first node.
    Left,
    /// Toward the route's last node.
    Right,
}

impl PathDirection {
    pub fn opposite(self) -> Self {
        match self {
            PathDirection::Left => PathDirection::Right,
            PathDirection::Right => PathDirection::Left,
        }
    }
}
