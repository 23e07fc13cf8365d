//! Routing path specifications and instruction computation.

use std::collections::{BTreeMap, HashMap};

use shared_types::{
    make_path_instructions, MultiplexingVector, NodeName, PathId, PathInstructions, ReqId,
    ValidationError,
};
use sim_kernel::Time;
use thiserror::Error;
use tracing::debug;

use crate::controller::{RouteQuery, TopologyInfo};
use crate::swap_sequence::{parse_swap_sequence, SwapSpec};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("no route from {src} to {dst}")]
    NoRoute { src: NodeName, dst: NodeName },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// How the buffer-space multiplexing vector is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QubitAllocation {
    /// No multiplexing vector, for statistical or dynamic-EPR schemes.
    Disabled,
    /// Uniform share from the bottleneck memory capacity; end nodes count
    /// double because they serve a single channel.
    MinCapacity,
    /// All-zeros vector: every qubit assigned to the channel is used.
    FollowQchannel,
}

/// Multiplexing vector input for a static route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MvInput {
    Compute(QubitAllocation),
    Explicit(MultiplexingVector),
}

/// How the concrete route(s) are obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingKind {
    /// Explicitly specified route.
    Static { route: Vec<NodeName>, m_v: MvInput },
    /// Single shortest path from the route provider.
    Single { qubit_allocation: QubitAllocation },
    /// Every path the route provider yields, with per-channel qubit shares
    /// divided among the paths sharing a channel. Buffer-space multiplexing
    /// only.
    Multi,
}

/// One path-installation request handed to the controller.
#[derive(Debug, Clone)]
pub struct RoutingPath {
    pub src: NodeName,
    pub dst: NodeName,
    /// Assigned by the controller when unset.
    pub req_id: Option<ReqId>,
    /// Path id of the first computed path; consecutive ids follow. Assigned
    /// by the controller when unset.
    pub path_id: Option<PathId>,
    pub swap: SwapSpec,
    /// Per-node cutoff budgets in seconds; negative means unbounded.
    pub swap_cutoff: Option<Vec<f64>>,
    pub purif: BTreeMap<String, u32>,
    pub kind: RoutingKind,
}

impl RoutingPath {
    /// Explicit route.
    pub fn fixed(route: Vec<NodeName>, swap: impl Into<SwapSpec>) -> Self {
        assert!(route.len() >= 2);
        RoutingPath {
            src: route.first().unwrap().clone(),
            dst: route.last().unwrap().clone(),
            req_id: None,
            path_id: None,
            swap: swap.into(),
            swap_cutoff: None,
            purif: BTreeMap::new(),
            kind: RoutingKind::Static {
                route,
                m_v: MvInput::Compute(QubitAllocation::FollowQchannel),
            },
        }
    }

    /// Single shortest path between two nodes.
    pub fn shortest(
        src: impl Into<NodeName>,
        dst: impl Into<NodeName>,
        swap: impl Into<SwapSpec>,
    ) -> Self {
        RoutingPath {
            src: src.into(),
            dst: dst.into(),
            req_id: None,
            path_id: None,
            swap: swap.into(),
            swap_cutoff: None,
            purif: BTreeMap::new(),
            kind: RoutingKind::Single {
                qubit_allocation: QubitAllocation::FollowQchannel,
            },
        }
    }

    /// All provider paths between two nodes.
    pub fn multi(
        src: impl Into<NodeName>,
        dst: impl Into<NodeName>,
        swap: impl Into<SwapSpec>,
    ) -> Self {
        RoutingPath {
            src: src.into(),
            dst: dst.into(),
            req_id: None,
            path_id: None,
            swap: swap.into(),
            swap_cutoff: None,
            purif: BTreeMap::new(),
            kind: RoutingKind::Multi,
        }
    }

    pub fn with_cutoff(mut self, budgets: Vec<f64>) -> Self {
        self.swap_cutoff = Some(budgets);
        self
    }

    pub fn with_purif(mut self, purif: BTreeMap<String, u32>) -> Self {
        self.purif = purif;
        self
    }

    pub fn with_allocation(mut self, allocation: QubitAllocation) -> Self {
        match &mut self.kind {
            RoutingKind::Static { m_v, .. } => *m_v = MvInput::Compute(allocation),
            RoutingKind::Single { qubit_allocation } => *qubit_allocation = allocation,
            RoutingKind::Multi => panic!("multi-path allocation is always derived"),
        }
        self
    }

    pub fn with_m_v(mut self, m_v: MultiplexingVector) -> Self {
        match &mut self.kind {
            RoutingKind::Static { m_v: slot, .. } => *slot = MvInput::Explicit(m_v),
            _ => panic!("explicit m_v requires a static route"),
        }
        self
    }

    /// Compute one `PathInstructions` per concrete route. All instructions
    /// are validated before the controller sends anything.
    pub fn compute_paths(
        &self,
        req_id: ReqId,
        router: &dyn RouteQuery,
        topo: &dyn TopologyInfo,
        accuracy: u64,
    ) -> Result<Vec<PathInstructions>, RoutingError> {
        match &self.kind {
            RoutingKind::Static { route, m_v } => {
                let m_v = match m_v {
                    MvInput::Explicit(v) => Some(v.clone()),
                    MvInput::Compute(allocation) => compute_mv(topo, route, *allocation),
                };
                Ok(vec![self.one_path(req_id, route.clone(), m_v, accuracy)?])
            }
            RoutingKind::Single { qubit_allocation } => {
                let route = self.query_routes(router)?.swap_remove(0);
                debug!("ROUTING: computed path: {route:?}");
                let m_v = compute_mv(topo, &route, *qubit_allocation);
                Ok(vec![self.one_path(req_id, route, m_v, accuracy)?])
            }
            RoutingKind::Multi => {
                let routes = self.query_routes(router)?;

                // count usage of each quantum channel across all paths
                let mut channel_use = HashMap::<String, u32>::new();
                for route in &routes {
                    for pair in route.windows(2) {
                        let ch = topo
                            .qchannel_name(&pair[0], &pair[1])
                            .expect("route crosses a missing channel");
                        *channel_use.entry(ch).or_insert(0) += 1;
                    }
                }

                // per path, divide each channel's qubits among its users
                routes
                    .into_iter()
                    .map(|route| {
                        debug!("ROUTING: computed path: {route:?}");
                        let mut m_v: MultiplexingVector = Vec::new();
                        for pair in route.windows(2) {
                            let ch = topo.qchannel_name(&pair[0], &pair[1]).unwrap();
                            let shared = channel_use[&ch];
                            let qubits_a = topo.qubits_assigned(&pair[0], &ch) as u32 / shared;
                            let qubits_b = topo.qubits_assigned(&pair[1], &ch) as u32 / shared;
                            m_v.push((qubits_a, qubits_b));
                        }
                        self.one_path(req_id, route, Some(m_v), accuracy)
                    })
                    .collect()
            }
        }
    }

    fn query_routes(&self, router: &dyn RouteQuery) -> Result<Vec<Vec<NodeName>>, RoutingError> {
        let routes = router.query(&self.src, &self.dst);
        if routes.is_empty() {
            return Err(RoutingError::NoRoute {
                src: self.src.clone(),
                dst: self.dst.clone(),
            });
        }
        Ok(routes)
    }

    fn one_path(
        &self,
        req_id: ReqId,
        route: Vec<NodeName>,
        m_v: Option<MultiplexingVector>,
        accuracy: u64,
    ) -> Result<PathInstructions, RoutingError> {
        let swap = parse_swap_sequence(&self.swap, route.len())?;
        let swap_cutoff = self.swap_cutoff.as_ref().map(|budgets| {
            budgets
                .iter()
                .map(|&sec| (sec >= 0.0).then(|| Time::from_sec(sec, accuracy)))
                .collect()
        });
        Ok(make_path_instructions(
            req_id,
            route,
            swap,
            swap_cutoff,
            m_v,
            self.purif.clone(),
        )?)
    }
}

fn compute_mv(
    topo: &dyn TopologyInfo,
    route: &[NodeName],
    allocation: QubitAllocation,
) -> Option<MultiplexingVector> {
    match allocation {
        QubitAllocation::Disabled => None,
        QubitAllocation::MinCapacity => {
            let mut capacities: Vec<usize> =
                route.iter().map(|n| topo.memory_capacity(n)).collect();
            *capacities.first_mut().unwrap() *= 2;
            *capacities.last_mut().unwrap() *= 2;
            let q = (capacities.into_iter().min().unwrap() / 2) as u32;
            Some(vec![(q, q); route.len() - 1])
        }
        QubitAllocation::FollowQchannel => Some(vec![(0, 0); route.len() - 1]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeTopo;
    impl TopologyInfo for FakeTopo {
        fn memory_capacity(&self, node: &str) -> usize {
            match node {
                "n1" | "n3" => 2,
                _ => 8,
            }
        }
        fn qchannel_name(&self, a: &str, b: &str) -> Option<String> {
            Some(format!("{a}-{b}"))
        }
        fn qubits_assigned(&self, _node: &str, _qchannel: &str) -> usize {
            4
        }
    }

    struct FakeRouter(Vec<Vec<NodeName>>);
    impl RouteQuery for FakeRouter {
        fn query(&self, _src: &str, _dst: &str) -> Vec<Vec<NodeName>> {
            self.0.clone()
        }
    }

    fn names(list: &[&str]) -> Vec<NodeName> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_static_path_follow_qchannel() {
        let rp = RoutingPath::fixed(names(&["n1", "n2", "n3"]), vec![1, 0, 1]);
        let paths = rp
            .compute_paths(0, &FakeRouter(vec![]), &FakeTopo, 1_000_000)
            .unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].m_v, Some(vec![(0, 0), (0, 0)]));
        assert_eq!(paths[0].swap, vec![1, 0, 1]);
    }

    #[test]
    fn test_min_capacity_allocation_uses_bottleneck() {
        let rp = RoutingPath::fixed(names(&["n1", "n2", "n3"]), vec![1, 0, 1])
            .with_allocation(QubitAllocation::MinCapacity);
        let paths = rp
            .compute_paths(0, &FakeRouter(vec![]), &FakeTopo, 1_000_000)
            .unwrap();
        // ends count double: min(4, 8, 4) / 2 = 2
        assert_eq!(paths[0].m_v, Some(vec![(2, 2), (2, 2)]));
    }

    #[test]
    fn test_single_path_queries_the_provider() {
        let router = FakeRouter(vec![names(&["n1", "n2", "n3"])]);
        let rp = RoutingPath::shortest("n1", "n3", "swap_1");
        let paths = rp.compute_paths(0, &router, &FakeTopo, 1_000_000).unwrap();
        assert_eq!(paths[0].route, names(&["n1", "n2", "n3"]));
        assert_eq!(paths[0].swap, vec![1, 0, 1]);
    }

    #[test]
    fn test_no_route_is_an_error() {
        let rp = RoutingPath::shortest("n1", "n9", "swap_1");
        assert_eq!(
            rp.compute_paths(0, &FakeRouter(vec![]), &FakeTopo, 1_000_000)
                .unwrap_err(),
            RoutingError::NoRoute {
                src: "n1".into(),
                dst: "n9".into()
            }
        );
    }

    #[test]
    fn test_multi_path_divides_shared_channels() {
        let router = FakeRouter(vec![
            names(&["n1", "n2", "n4"]),
            names(&["n1", "n3", "n4"]),
        ]);
        let rp = RoutingPath::multi("n1", "n4", SwapSpec::Explicit(vec![1, 0, 1]));
        let paths = rp.compute_paths(0, &router, &FakeTopo, 1_000_000).unwrap();
        assert_eq!(paths.len(), 2);
        // no channel is shared between the two disjoint routes
        assert_eq!(paths[0].m_v, Some(vec![(4, 4), (4, 4)]));
    }

    #[test]
    fn test_cutoff_budgets_convert_to_slots() {
        let rp = RoutingPath::fixed(names(&["n1", "n2", "n3"]), vec![1, 0, 1])
            .with_cutoff(vec![-1.0, 0.002, -1.0]);
        let paths = rp
            .compute_paths(0, &FakeRouter(vec![]), &FakeTopo, 1_000_000)
            .unwrap();
        assert_eq!(paths[0].swap_cutoff, vec![-1, 2000, -1]);
    }
}
