//! The centralized routing controller and its outbound ports.

use shared_types::{ClassicMessage, ClassicPacket, NodeName, Outbox, PathId, PathInstructions};
use tracing::debug;

use crate::routing::{RoutingError, RoutingPath};

/// External route-computation collaborator.
pub trait RouteQuery {
    /// Routes from `src` to `dst`, best first; empty when unreachable.
    fn query(&self, src: &str, dst: &str) -> Vec<Vec<NodeName>>;
}

/// Topology facts the controller needs for qubit-allocation vectors.
pub trait TopologyInfo {
    fn memory_capacity(&self, node: &str) -> usize;
    /// Name of the quantum channel between two adjacent nodes.
    fn qchannel_name(&self, a: &str, b: &str) -> Option<String>;
    /// How many memory qubits `node` has assigned to the channel.
    fn qubits_assigned(&self, node: &str, qchannel: &str) -> usize;
}

/// Centralized control plane that works with the per-node forwarders.
#[derive(Debug)]
pub struct RoutingController {
    node: NodeName,
    next_req_id: u32,
    next_path_id: u32,
}

impl RoutingController {
    pub fn new(node: impl Into<NodeName>) -> Self {
        RoutingController {
            node: node.into(),
            next_req_id: 0,
            next_path_id: 0,
        }
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    /// Compute routing path(s) and send install commands to every node on
    /// each route. Returns the installed path ids.
    ///
    /// All instructions are computed and validated before the first command
    /// is sent, so a validation error leaves every node untouched.
    pub fn install_path<A>(
        &mut self,
        rp: &mut RoutingPath,
        router: &dyn RouteQuery,
        topo: &dyn TopologyInfo,
        accuracy: u64,
        outbox: &mut Outbox<A>,
    ) -> Result<Vec<PathId>, RoutingError> {
        let req_id = rp.req_id.unwrap_or(self.next_req_id);
        rp.req_id = Some(req_id);
        self.next_req_id = self.next_req_id.max(req_id + 1);

        let first_path_id = rp.path_id.unwrap_or(self.next_path_id);
        rp.path_id = Some(first_path_id);

        let instructions = rp.compute_paths(req_id, router, topo, accuracy)?;

        let mut installed = Vec::with_capacity(instructions.len());
        for (offset, ins) in instructions.into_iter().enumerate() {
            let path_id = first_path_id + offset as u32;
            self.next_path_id = self.next_path_id.max(path_id + 1);
            self.send_instructions(path_id, &ins, false, outbox);
            installed.push(path_id);
        }
        Ok(installed)
    }

    /// Recompute the same routes and send uninstall commands.
    pub fn uninstall_path<A>(
        &mut self,
        rp: &RoutingPath,
        router: &dyn RouteQuery,
        topo: &dyn TopologyInfo,
        accuracy: u64,
        outbox: &mut Outbox<A>,
    ) -> Result<(), RoutingError> {
        let req_id = rp.req_id.expect("uninstall_path before install_path");
        let first_path_id = rp.path_id.expect("uninstall_path before install_path");

        let instructions = rp.compute_paths(req_id, router, topo, accuracy)?;
        for (offset, ins) in instructions.into_iter().enumerate() {
            self.send_instructions(first_path_id + offset as u32, &ins, true, outbox);
        }
        Ok(())
    }

    fn send_instructions<A>(
        &self,
        path_id: PathId,
        ins: &PathInstructions,
        uninstall: bool,
        outbox: &mut Outbox<A>,
    ) {
        for node in &ins.route {
            let msg = if uninstall {
                ClassicMessage::UninstallPath { path_id }
            } else {
                ClassicMessage::InstallPath {
                    path_id,
                    instructions: ins.clone(),
                }
            };
            debug!(
                "{}: {} path #{path_id} at {node}",
                self.node,
                if uninstall { "uninstall" } else { "install" }
            );
            outbox.send(
                node.clone(),
                ClassicPacket::new(self.node.clone(), node.clone(), msg),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::RoutingPath;
    use shared_types::ValidationError;

    struct LineRouter;
    impl RouteQuery for LineRouter {
        fn query(&self, src: &str, dst: &str) -> Vec<Vec<NodeName>> {
            if src == "n1" && dst == "n3" {
                vec![vec!["n1".into(), "n2".into(), "n3".into()]]
            } else {
                vec![]
            }
        }
    }

    struct Topo;
    impl TopologyInfo for Topo {
        fn memory_capacity(&self, _: &str) -> usize {
            2
        }
        fn qchannel_name(&self, a: &str, b: &str) -> Option<String> {
            Some(format!("{a}-{b}"))
        }
        fn qubits_assigned(&self, _: &str, _: &str) -> usize {
            1
        }
    }

    #[test]
    fn test_install_assigns_ids_and_unicasts_to_route_nodes() {
        let mut ctrl = RoutingController::new("ctrl");
        let mut outbox: Outbox<()> = Outbox::new();
        let mut rp = RoutingPath::shortest("n1", "n3", vec![1, 0, 1]);

        let ids = ctrl
            .install_path(&mut rp, &LineRouter, &Topo, 1_000_000, &mut outbox)
            .unwrap();
        assert_eq!(ids, vec![0]);
        assert_eq!(rp.req_id, Some(0));
        assert_eq!(rp.path_id, Some(0));

        let sends = outbox.drain();
        assert_eq!(sends.len(), 3);
        for (send, node) in sends.iter().zip(["n1", "n2", "n3"]) {
            assert_eq!(send.next_hop, node);
            assert!(matches!(
                &send.packet.msg,
                ClassicMessage::InstallPath { path_id: 0, .. }
            ));
        }

        // the next request gets fresh ids
        let mut rp2 = RoutingPath::shortest("n1", "n3", vec![1, 0, 1]);
        let ids = ctrl
            .install_path(&mut rp2, &LineRouter, &Topo, 1_000_000, &mut outbox)
            .unwrap();
        assert_eq!(ids, vec![1]);
        assert_eq!(rp2.req_id, Some(1));
    }

    #[test]
    fn test_validation_failure_sends_nothing() {
        let mut ctrl = RoutingController::new("ctrl");
        let mut outbox: Outbox<()> = Outbox::new();
        // swap sequence too short for the route
        let mut rp = RoutingPath::shortest("n1", "n3", vec![1, 0]);

        let err = ctrl
            .install_path(&mut rp, &LineRouter, &Topo, 1_000_000, &mut outbox)
            .unwrap_err();
        assert_eq!(
            err,
            RoutingError::Validation(ValidationError::SwapLengthMismatch { swap: 2, route: 3 })
        );
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_uninstall_reuses_the_installed_ids() {
        let mut ctrl = RoutingController::new("ctrl");
        let mut outbox: Outbox<()> = Outbox::new();
        let mut rp = RoutingPath::shortest("n1", "n3", vec![1, 0, 1]);
        ctrl.install_path(&mut rp, &LineRouter, &Topo, 1_000_000, &mut outbox)
            .unwrap();
        outbox.drain();

        ctrl.uninstall_path(&rp, &LineRouter, &Topo, 1_000_000, &mut outbox)
            .unwrap();
        let sends = outbox.drain();
        assert_eq!(sends.len(), 3);
        assert!(sends
            .iter()
            .all(|s| matches!(s.packet.msg, ClassicMessage::UninstallPath { path_id: 0 })));
    }
}
