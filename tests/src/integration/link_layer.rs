//! Generation statistics over a single elementary link.

#[cfg(test)]
mod tests {
    use crate::integration::common::{build_linear, counters, Scenario};
    use qrn_04_routing_controller::RoutingPath;

    /// Two nodes, decoherence disabled: the long-run ratio of successful
    /// entanglements to attempts converges to the architecture's success
    /// probability (Barrett-Kok-SeQUeNCe over 100 km at 0.2 dB/km:
    /// 0.5 * (10^-1)^2 = 0.005).
    #[test]
    fn test_two_node_success_ratio_converges() {
        let scenario = Scenario {
            nodes: 2,
            t_cohere: None,
            ..Scenario::default()
        };
        let (mut net, mut sim) = build_linear(&scenario);

        let mut rp = RoutingPath::shortest("n1", "n2", vec![0, 0]);
        net.install_path(&mut sim, &mut rp).unwrap();
        sim.run(&mut net);

        let link = &net.node("n1").link.cnt;
        assert!(link.n_etg >= 50, "n_etg={}", link.n_etg);
        assert!(link.n_attempts > link.n_etg);

        let ratio = link.n_etg as f64 / link.n_attempts as f64;
        let expected = 0.005;
        assert!(
            (ratio - expected).abs() < expected * 0.3,
            "ratio={ratio}, expected={expected}"
        );

        // every delivered pair is consumed at both ends of the link
        let f1 = counters(&net, "n1");
        let f2 = counters(&net, "n2");
        assert_eq!(f1.n_consumed, f2.n_consumed);
        assert_eq!(f1.n_consumed, link.n_etg);
        assert_eq!(f1.n_swapped(), 0);
        assert_eq!(f2.n_swapped(), 0);
    }

    /// Seeded runs are reproducible end to end.
    #[test]
    fn test_seeded_runs_are_reproducible() {
        let run = || {
            let scenario = Scenario {
                nodes: 2,
                t_cohere: None,
                end_second: 5.0,
                seed: 11,
                ..Scenario::default()
            };
            let (mut net, mut sim) = build_linear(&scenario);
            let mut rp = RoutingPath::shortest("n1", "n2", vec![0, 0]);
            net.install_path(&mut sim, &mut rp).unwrap();
            sim.run(&mut net);
            (
                net.node("n1").link.cnt.n_etg,
                net.node("n1").link.cnt.n_attempts,
                counters(&net, "n2").n_consumed,
            )
        };
        assert_eq!(run(), run());
    }
}
