//! Fixtures shared by the protocol scenarios.

use epr_models::WernerModel;
use qrn_02_link_layer::{arch, LinkArch, LinkLayerConfig};
use qrn_03_forwarder::{
    CutoffScheme, CutoffSchemeWaitTime, ForwarderCounters, ForwarderConfig, MuxScheme,
    MuxSchemeBufferSpace,
};
use qrn_network::{linear_topology, LinearTopoOptions, NetEvent, Network};
use sim_kernel::{Simulator, SimulatorConfig};

pub type Net = Network<WernerModel>;
pub type Sim = Simulator<NetEvent<WernerModel>>;

/// Knobs for the linear-network fixture. The defaults mirror the stochastic
/// scenarios: 100 km hops (0.5 ms classical delay), 0.2 dB/km loss and the
/// Barrett-Kok SeQUeNCe architecture, giving a per-attempt success
/// probability of 0.005.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub nodes: usize,
    pub qchannel_capacity: usize,
    pub ps: f64,
    /// `None` disables memory decoherence.
    pub t_cohere: Option<f64>,
    pub end_second: f64,
    pub seed: u64,
    /// Force every generation attempt to succeed (deterministic runs).
    pub always_succeed: bool,
    pub continuous_generation: bool,
}

impl Default for Scenario {
    fn default() -> Self {
        Scenario {
            nodes: 3,
            qchannel_capacity: 1,
            ps: 0.5,
            t_cohere: Some(5.0),
            end_second: 60.0,
            seed: 7,
            always_succeed: false,
            continuous_generation: true,
        }
    }
}

/// Build `n1 - .. - nN` with a controller, buffer-space multiplexing and the
/// wait-time cutoff scheme.
pub fn build_linear(scenario: &Scenario) -> (Net, Sim) {
    build_linear_with(scenario, || Box::new(MuxSchemeBufferSpace), || {
        Box::new(CutoffSchemeWaitTime)
    })
}

/// Same fixture with custom policy objects.
pub fn build_linear_with(
    scenario: &Scenario,
    mux: impl FnMut() -> Box<dyn MuxScheme<WernerModel>>,
    cutoff: impl FnMut() -> Box<dyn CutoffScheme>,
) -> (Net, Sim) {
    let opts = LinearTopoOptions {
        memory_capacity: 2 * scenario.qchannel_capacity,
        t_cohere: scenario.t_cohere.unwrap_or(f64::INFINITY),
        qchannel_length: 100.0,
        alpha: 0.2,
        qchannel_capacity: scenario.qchannel_capacity,
        link: LinkLayerConfig {
            continuous_generation: scenario.continuous_generation,
            ..LinkLayerConfig::default()
        },
        fw: ForwarderConfig { ps: scenario.ps },
        timing: shared_types::TimingMode::Async,
    };

    let always = scenario.always_succeed;
    let arch_factory = move || -> Box<dyn LinkArch> {
        if always {
            Box::new(arch::Always(arch::DimDual))
        } else {
            Box::new(arch::DimBkSeq)
        }
    };

    let mut net = linear_topology(scenario.nodes, &opts, arch_factory, mux, cutoff);
    net.connect_controller("ctrl", 0.0);

    let sim = Simulator::new(SimulatorConfig {
        start_second: 0.0,
        end_second: scenario.end_second,
        accuracy: 1_000_000,
        seed: Some(scenario.seed),
    });
    (net, sim)
}

pub fn counters<'a>(net: &'a Net, node: &str) -> &'a ForwarderCounters {
    &net.node(node).fw.cnt
}

/// Total cutoff discards across all rounds, split (local, remote).
pub fn cutoff_totals(cnt: &ForwarderCounters) -> (u64, u64) {
    cnt.n_cutoff
        .values()
        .fold((0, 0), |(l, r), tally| (l + tally.local, r + tally.remote))
}
