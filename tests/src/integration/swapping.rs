//! Sequential and parallel swapping scenarios.

#[cfg(test)]
mod tests {
    use crate::integration::common::{build_linear, build_linear_with, counters, Scenario};
    use epr_models::WernerModel;
    use qrn_02_link_layer::{arch, LinkLayerConfig, QuantumChannel};
    use qrn_03_forwarder::{
        CutoffSchemeWaitTime, Forwarder, ForwarderConfig, MuxScheme, MuxSchemeBufferSpace,
        MuxSchemeStatistical,
    };
    use qrn_01_qubit_memory::QuantumMemory;
    use qrn_02_link_layer::LinkLayer;
    use qrn_04_routing_controller::{QubitAllocation, RoutingPath};
    use qrn_network::{ClassicChannel, Network, QNode};
    use shared_types::{make_path_instructions, TimingMode, ValidationError};
    use sim_kernel::{Simulator, SimulatorConfig};
    use std::collections::BTreeMap;

    /// 3-node path S-R-D, swap rank [1,0,1], certain generation and
    /// swapping, stopped after one wave: exactly one swap at the repeater
    /// and exactly one consumption at each endpoint.
    #[test]
    fn test_single_swap_wave() {
        let scenario = Scenario {
            nodes: 3,
            ps: 1.0,
            t_cohere: None,
            end_second: 0.0022,
            always_succeed: true,
            ..Scenario::default()
        };
        let (mut net, mut sim) = build_linear(&scenario);

        let mut rp = RoutingPath::shortest("n1", "n3", vec![1, 0, 1]);
        net.install_path(&mut sim, &mut rp).unwrap();
        sim.run(&mut net);

        let (f1, f2, f3) = (counters(&net, "n1"), counters(&net, "n2"), counters(&net, "n3"));
        assert_eq!(f2.n_entg, 2);
        assert_eq!(f2.n_eligible, 2);
        assert_eq!(f2.n_swapped_s, 1);
        assert_eq!(f2.n_swapped_p, 0);
        assert_eq!(f2.n_consumed, 0);
        assert_eq!((f1.n_swapped(), f3.n_swapped()), (0, 0));
        assert_eq!((f1.n_consumed, f3.n_consumed), (1, 1));
        assert!(f1.consumed_avg_fidelity() > 0.9);
    }

    /// Same topology with swapping disabled: zero swaps, and the repeater's
    /// consumption count equals the sum of the endpoints'.
    #[test]
    fn test_swap_disabled_consumes_per_link() {
        let scenario = Scenario {
            nodes: 3,
            ps: 1.0,
            t_cohere: None,
            end_second: 0.0022,
            always_succeed: true,
            ..Scenario::default()
        };
        let (mut net, mut sim) = build_linear(&scenario);

        let mut rp = RoutingPath::shortest("n1", "n3", vec![0, 0, 0]);
        net.install_path(&mut sim, &mut rp).unwrap();
        sim.run(&mut net);

        let (f1, f2, f3) = (counters(&net, "n1"), counters(&net, "n2"), counters(&net, "n3"));
        assert_eq!(f1.n_swapped() + f2.n_swapped() + f3.n_swapped(), 0);
        assert_eq!((f1.n_consumed, f3.n_consumed), (1, 1));
        assert_eq!(f2.n_consumed, f1.n_consumed + f3.n_consumed);
    }

    /// Stochastic 3-node run: counter relations that must hold regardless of
    /// the sampled timeline.
    #[test]
    fn test_sequential_swapping_statistics() {
        let (mut net, mut sim) = build_linear(&Scenario::default());
        let mut rp = RoutingPath::shortest("n1", "n3", vec![1, 0, 1]);
        net.install_path(&mut sim, &mut rp).unwrap();
        sim.run(&mut net);

        let (f1, f2, f3) = (counters(&net, "n1"), counters(&net, "n2"), counters(&net, "n3"));

        // the repeater holds one half of every elementary pair on either side
        assert_eq!(f2.n_entg, f1.n_entg + f3.n_entg);
        // no purification configured: every entangled qubit at the repeater
        // is immediately eligible
        assert_eq!(f2.n_eligible, f2.n_entg);
        // each swap consumes two eligible qubits
        assert!(2 * f2.n_swapped() <= f2.n_eligible);
        // no swapping at the endpoints, no consumption at the repeater
        assert_eq!((f1.n_swapped(), f3.n_swapped()), (0, 0));
        assert_eq!(f2.n_consumed, 0);
        // endpoints consume eligible qubits immediately
        assert_eq!(f1.n_eligible, f1.n_consumed);
        assert_eq!(f3.n_eligible, f3.n_consumed);
        // boundedness: only in-flight SWAP_UPDATEs separate a swap from its
        // endpoint consumption
        assert!(f2.n_swapped() >= f1.n_consumed);
        assert!(f2.n_swapped() - f1.n_consumed <= 1);
        assert!(f2.n_swapped() - f3.n_consumed <= 1);
        assert!(
            f1.n_consumed.abs_diff(f3.n_consumed) <= 1,
            "endpoint counts diverged: {} vs {}",
            f1.n_consumed,
            f3.n_consumed
        );
        assert!(f1.n_consumed >= 5, "n_consumed={}", f1.n_consumed);
        // both endpoints observe the same delivered pairs
        assert!(f1.consumed_avg_fidelity() > 0.7);
        assert!((f1.consumed_avg_fidelity() - f3.consumed_avg_fidelity()).abs() < 1e-6);
    }

    /// 4-node path with an interior rank wave [1, 0, 0, 1]: adjacent swaps
    /// complete in parallel and are merged.
    #[test]
    fn test_parallel_swapping_merges() {
        let scenario = Scenario {
            nodes: 4,
            ..Scenario::default()
        };
        let (mut net, mut sim) = build_linear(&scenario);
        let mut rp = RoutingPath::shortest("n1", "n4", vec![1, 0, 0, 1]);
        net.install_path(&mut sim, &mut rp).unwrap();
        sim.run(&mut net);

        let f1 = counters(&net, "n1");
        let f2 = counters(&net, "n2");
        let f3 = counters(&net, "n3");
        let f4 = counters(&net, "n4");

        assert_eq!(f2.n_eligible, f2.n_entg);
        assert_eq!(f3.n_eligible, f3.n_entg);
        // some swaps completed in parallel
        assert!(f2.n_swapped_p > 0, "no parallel merges at n2");
        assert!(f3.n_swapped_p > 0, "no parallel merges at n3");
        // interior nodes never consume
        assert_eq!((f2.n_consumed, f3.n_consumed), (0, 0));
        // end-to-end deliveries reach both endpoints
        assert!(f1.n_consumed > 0);
        assert!(f4.n_consumed > 0);
        assert!(
            f1.n_consumed.abs_diff(f4.n_consumed) <= 3,
            "endpoint counts diverged: {} vs {}",
            f1.n_consumed,
            f4.n_consumed
        );
        // buffer-space multiplexing can never conflict
        assert_eq!(f2.n_swap_conflict + f3.n_swap_conflict, 0);
    }

    /// Boundedness law on a longer chain: endpoint consumption counts can
    /// only differ by messages still unresolved at run end, never by more
    /// than the path's allocated qubit capacity.
    #[test]
    fn test_endpoint_boundedness_on_long_path() {
        let scenario = Scenario {
            nodes: 5,
            ..Scenario::default()
        };
        let (mut net, mut sim) = build_linear(&scenario);
        let mut rp = RoutingPath::shortest("n1", "n5", vec![1, 0, 0, 0, 1]);
        net.install_path(&mut sim, &mut rp).unwrap();
        sim.run(&mut net);

        let f1 = counters(&net, "n1");
        let f5 = counters(&net, "n5");
        assert!(f1.n_consumed >= 1, "path delivered nothing");
        let capacity = (scenario.nodes - 1) * scenario.qchannel_capacity;
        assert!(
            f1.n_consumed.abs_diff(f5.n_consumed) <= capacity as u64,
            "endpoint counts diverged: {} vs {}",
            f1.n_consumed,
            f5.n_consumed
        );
        for middle in ["n2", "n3", "n4"] {
            assert_eq!(counters(&net, middle).n_consumed, 0);
        }
    }

    /// A SWAP_UPDATE that overtakes the local entangled notification is
    /// buffered and replayed: asymmetric sender-receiver timing makes the
    /// repeater swap before the far endpoint has processed its half.
    #[test]
    fn test_swap_update_race_is_buffered() {
        let mut net: Network<WernerModel> = Network::new(TimingMode::Async);
        for name in ["s", "r", "d"] {
            net.add_node(QNode {
                name: name.to_string(),
                memory: QuantumMemory::new(name, 2, f64::INFINITY),
                link: LinkLayer::new(name, LinkLayerConfig::default()),
                fw: Forwarder::new(
                    name,
                    ForwarderConfig { ps: 1.0 },
                    Box::new(MuxSchemeBufferSpace),
                    Box::new(CutoffSchemeWaitTime),
                ),
            });
        }
        // the short left hop makes the repeater's halves arrive first
        net.add_qchannel(QuantumChannel::new(
            "s-r",
            "s",
            "r",
            50.0,
            0.2,
            Box::new(arch::Always(arch::Sr)),
        ));
        net.add_qchannel(QuantumChannel::new(
            "r-d",
            "r",
            "d",
            100.0,
            0.2,
            Box::new(arch::Always(arch::Sr)),
        ));
        net.add_cchannel(ClassicChannel::with_length("c:s-r", "s", "r", 50.0));
        net.add_cchannel(ClassicChannel::with_length("c:r-d", "r", "d", 100.0));
        net.assign_memory_qubits("s-r", 1);
        net.assign_memory_qubits("r-d", 1);
        net.connect_controller("ctrl", 0.0);

        let mut sim = Simulator::new(SimulatorConfig {
            end_second: 0.0028,
            ..SimulatorConfig::default()
        });
        let mut rp = RoutingPath::shortest("s", "d", vec![1, 0, 1]);
        net.install_path(&mut sim, &mut rp).unwrap();
        sim.run(&mut net);

        assert_eq!(counters(&net, "r").n_swapped_s, 1);
        assert_eq!(counters(&net, "s").n_consumed, 1);
        assert_eq!(counters(&net, "d").n_consumed, 1);
    }

    /// Statistical multiplexing: lazy path ownership still delivers, and the
    /// scheme's validation rejects incompatible instructions.
    #[test]
    fn test_statistical_multiplexing_delivers() {
        let scenario = Scenario::default();
        let (mut net, mut sim) = build_linear_with(
            &scenario,
            || Box::<MuxSchemeStatistical>::default(),
            || Box::new(CutoffSchemeWaitTime),
        );
        let mut rp = RoutingPath::shortest("n1", "n3", vec![1, 0, 1])
            .with_allocation(QubitAllocation::Disabled);
        net.install_path(&mut sim, &mut rp).unwrap();
        sim.run(&mut net);

        let (f1, f2, f3) = (counters(&net, "n1"), counters(&net, "n2"), counters(&net, "n3"));
        assert!(f1.n_consumed > 0);
        assert!(f3.n_consumed > 0);
        assert_eq!(f2.n_consumed, 0);
        // single path: parallel decisions can never disagree
        assert_eq!(f2.n_swap_conflict, 0);
    }

    #[test]
    fn test_statistical_validation_rejects_incompatible_instructions() {
        let scheme = MuxSchemeStatistical::default();
        let validate = |ins| MuxScheme::<WernerModel>::validate_instructions(&scheme, ins);
        let route: Vec<String> = vec!["n1".into(), "n2".into(), "n3".into()];

        let with_mv = make_path_instructions(
            0,
            route.clone(),
            vec![1, 0, 1],
            None,
            Some(vec![(1, 1), (1, 1)]),
            BTreeMap::new(),
        )
        .unwrap();
        assert!(matches!(
            validate(&with_mv),
            Err(ValidationError::SchemeMismatch { .. })
        ));

        let bad_swap =
            make_path_instructions(0, route.clone(), vec![2, 0, 1], None, None, BTreeMap::new())
                .unwrap();
        assert!(matches!(
            validate(&bad_swap),
            Err(ValidationError::SchemeMismatch { .. })
        ));

        let mut purif = BTreeMap::new();
        purif.insert("n1-n2".to_string(), 1);
        let with_purif =
            make_path_instructions(0, route, vec![1, 0, 1], None, None, purif).unwrap();
        assert!(matches!(
            validate(&with_purif),
            Err(ValidationError::SchemeMismatch { .. })
        ));
    }
}
