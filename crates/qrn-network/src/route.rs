//! Baseline shortest-path route provider.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use shared_types::NodeName;

/// Dijkstra shortest path over weighted undirected edges.
///
/// Edge weights are channel lengths; a zero-length topology degenerates to
/// hop count. Neighbor expansion is order-stable so equal-cost runs are
/// deterministic.
pub fn shortest_path(
    edges: &[(NodeName, NodeName, f64)],
    src: &str,
    dst: &str,
) -> Option<Vec<NodeName>> {
    let mut adjacency: HashMap<&str, Vec<(&str, f64)>> = HashMap::new();
    for (a, b, length) in edges {
        let weight = 1.0 + length.max(0.0);
        adjacency.entry(a).or_default().push((b, weight));
        adjacency.entry(b).or_default().push((a, weight));
    }
    for neighbors in adjacency.values_mut() {
        neighbors.sort_by(|(a, _), (b, _)| a.cmp(b));
    }

    let mut dist: HashMap<&str, f64> = HashMap::from([(src, 0.0)]);
    let mut prev: HashMap<&str, &str> = HashMap::new();
    let mut heap: BinaryHeap<Reverse<(u64, &str)>> = BinaryHeap::new();
    heap.push(Reverse((0, src)));

    // f64 costs are ordered through a fixed-point key to keep the heap total
    let as_key = |cost: f64| (cost * 1e9) as u64;

    while let Some(Reverse((key, here))) = heap.pop() {
        if here == dst {
            break;
        }
        let here_cost = dist[here];
        if key != as_key(here_cost) {
            continue; // stale heap entry
        }
        let Some(neighbors) = adjacency.get(here) else {
            continue;
        };
        for (next, weight) in neighbors {
            let cost = here_cost + weight;
            if dist.get(next).map_or(true, |&d| cost < d) {
                dist.insert(next, cost);
                prev.insert(next, here);
                heap.push(Reverse((as_key(cost), next)));
            }
        }
    }

    if src != dst && !prev.contains_key(dst) {
        return None;
    }

    let mut route = vec![dst.to_string()];
    let mut here = dst;
    while here != src {
        here = prev[here];
        route.push(here.to_string());
    }
    route.reverse();
    Some(route)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edges(list: &[(&str, &str, f64)]) -> Vec<(NodeName, NodeName, f64)> {
        list.iter()
            .map(|(a, b, w)| (a.to_string(), b.to_string(), *w))
            .collect()
    }

    #[test]
    fn test_line_route() {
        let edges = edges(&[("n1", "n2", 10.0), ("n2", "n3", 10.0)]);
        assert_eq!(
            shortest_path(&edges, "n1", "n3").unwrap(),
            vec!["n1", "n2", "n3"]
        );
    }

    #[test]
    fn test_prefers_shorter_detour() {
        let edges = edges(&[
            ("a", "b", 1.0),
            ("b", "d", 1.0),
            ("a", "c", 10.0),
            ("c", "d", 10.0),
        ]);
        assert_eq!(shortest_path(&edges, "a", "d").unwrap(), vec!["a", "b", "d"]);
    }

    #[test]
    fn test_unreachable_is_none() {
        let edges = edges(&[("a", "b", 1.0), ("c", "d", 1.0)]);
        assert_eq!(shortest_path(&edges, "a", "d"), None);
    }
}
