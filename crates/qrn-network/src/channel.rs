//! Classical channel entity.

use qrn_02_link_layer::LIGHT_SPEED_KM_S;
use shared_types::NodeName;

/// Point-to-point classical channel: reliable delivery after a fixed
/// propagation delay.
#[derive(Debug, Clone)]
pub struct ClassicChannel {
    pub name: String,
    pub nodes: (NodeName, NodeName),
    /// One-way propagation delay in seconds.
    pub delay: f64,
}

impl ClassicChannel {
    pub fn new(
        name: impl Into<String>,
        a: impl Into<NodeName>,
        b: impl Into<NodeName>,
        delay: f64,
    ) -> Self {
        assert!(delay >= 0.0);
        ClassicChannel {
            name: name.into(),
            nodes: (a.into(), b.into()),
            delay,
        }
    }

    /// Delay derived from fiber length at the speed of light in fiber.
    pub fn with_length(
        name: impl Into<String>,
        a: impl Into<NodeName>,
        b: impl Into<NodeName>,
        length_km: f64,
    ) -> Self {
        Self::new(name, a, b, length_km / LIGHT_SPEED_KM_S)
    }

    pub fn connects(&self, a: &str, b: &str) -> bool {
        (self.nodes.0 == a && self.nodes.1 == b) || (self.nodes.0 == b && self.nodes.1 == a)
    }
}
