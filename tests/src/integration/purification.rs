//! Per-segment and end-to-end purification scenarios.

#[cfg(test)]
mod tests {
    use crate::integration::common::{build_linear, counters, Scenario};
    use qrn_04_routing_controller::RoutingPath;
    use std::collections::BTreeMap;

    fn purif(entries: &[(&str, u32)]) -> BTreeMap<String, u32> {
        entries
            .iter()
            .map(|(segment, rounds)| (segment.to_string(), *rounds))
            .collect()
    }

    /// One purification round on each elementary link before swapping.
    #[test]
    fn test_one_round_link_purification() {
        let scenario = Scenario {
            qchannel_capacity: 2,
            ..Scenario::default()
        };
        let (mut net, mut sim) = build_linear(&scenario);
        let mut rp = RoutingPath::shortest("n1", "n3", vec![1, 0, 1])
            .with_purif(purif(&[("n1-n2", 1), ("n2-n3", 1)]));
        net.install_path(&mut sim, &mut rp).unwrap();
        sim.run(&mut net);

        let (f1, f2, f3) = (counters(&net, "n1"), counters(&net, "n2"), counters(&net, "n3"));

        // rounds complete on both sides of each segment
        for f in [f1, f2, f3] {
            assert!(!f.n_purif.is_empty(), "no purification rounds completed");
            assert!(f.n_purif[0] > 0);
            // purification consumes pairs and sometimes fails
            assert!(f.n_purif[0] < f.n_entg);
        }

        // the repeater becomes eligible exactly once per completed round
        assert_eq!(f2.n_purif[0], f2.n_eligible);
        // each endpoint covers one of the repeater's two segments
        assert!(f1.n_purif[0] + f3.n_purif[0] >= f2.n_purif[0].saturating_sub(2));
        assert!(f1.n_purif[0] + f3.n_purif[0] <= f2.n_purif[0] + 2);

        // purified end-to-end deliveries still flow
        assert!(f1.n_consumed > 0);
        assert!(f3.n_consumed > 0);
        assert_eq!(f2.n_consumed, 0);
        assert!(f1.consumed_avg_fidelity() > 0.7);
    }

    /// Two purification rounds between the end nodes, after swapping.
    #[test]
    fn test_end_to_end_purification() {
        let scenario = Scenario {
            qchannel_capacity: 4,
            ..Scenario::default()
        };
        let (mut net, mut sim) = build_linear(&scenario);
        let mut rp =
            RoutingPath::shortest("n1", "n3", vec![1, 0, 1]).with_purif(purif(&[("n1-n3", 2)]));
        net.install_path(&mut sim, &mut rp).unwrap();
        sim.run(&mut net);

        let (f1, f2, f3) = (counters(&net, "n1"), counters(&net, "n2"), counters(&net, "n3"));

        // no purification happens at the repeater
        assert!(f2.n_purif.is_empty());
        // the swap enables the first end-to-end round
        assert!(!f1.n_purif.is_empty());
        assert!(f1.n_purif[0] > 0);
        // responder counts at solicit time, primary at response time; the
        // difference is bounded by concurrently soliciting pairs
        assert!(f1.n_purif[0].abs_diff(f3.n_purif[0]) <= 2);
        // consumption requires both rounds
        assert!(f1.n_consumed > 0, "no end-to-end deliveries");
        if f1.n_purif.len() > 1 {
            assert!(f1.n_purif[1] <= f1.n_purif[0]);
        }
        assert!(f1.consumed_avg_fidelity() > 0.7);
    }

    /// A purification failure releases the acted-upon qubits, never the
    /// whole run: the simulation reaches its end time with sane counters.
    #[test]
    fn test_failed_rounds_release_and_continue() {
        let scenario = Scenario {
            qchannel_capacity: 2,
            seed: 23,
            end_second: 20.0,
            ..Scenario::default()
        };
        let (mut net, mut sim) = build_linear(&scenario);
        let mut rp = RoutingPath::shortest("n1", "n3", vec![1, 0, 1])
            .with_purif(purif(&[("n1-n2", 2), ("n2-n3", 2)]));
        net.install_path(&mut sim, &mut rp).unwrap();
        sim.run(&mut net);

        let f2 = counters(&net, "n2");
        assert!(f2.n_entg > 0);
        // two-round purification is strictly harder than one round
        if f2.n_purif.len() > 1 {
            assert!(f2.n_purif[1] <= f2.n_purif[0]);
        }
        // memory never leaks: all slots end raw, released or re-reserved
        for name in ["n1", "n2", "n3"] {
            let memory = &net.node(name).memory;
            let stored = (0..memory.capacity())
                .filter(|&addr| memory.pair(addr).is_some())
                .count();
            assert_eq!(memory.count(), stored);
        }
    }
}
