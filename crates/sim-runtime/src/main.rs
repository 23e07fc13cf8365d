//! Entry point: load a scenario, run it, report counters.

mod config;

use std::time::Duration;

use anyhow::{bail, Context, Result};
use epr_models::WernerModel;
use qrn_02_link_layer::{arch, LinkArch};
use qrn_03_forwarder::{
    CutoffScheme, CutoffSchemeDisabled, CutoffSchemeWaitTime, MuxScheme, MuxSchemeBufferSpace,
    MuxSchemeDynamicEpr, MuxSchemeStatistical,
};
use qrn_04_routing_controller::{QubitAllocation, RoutingPath, SwapSpec};
use qrn_network::{linear_topology, LinearTopoOptions, Network};
use sim_kernel::{Simulator, SimulatorConfig, WallClockTimeout};
use sim_telemetry::{init_logging, ReportBuilder, TelemetryConfig};
use tracing::info;

use crate::config::{ScenarioConfig, SwapInput};

fn arch_factory(name: &str) -> Result<Box<dyn Fn() -> Box<dyn LinkArch>>> {
    let factory: Box<dyn Fn() -> Box<dyn LinkArch>> = match name {
        "DIM-BK" => Box::new(|| Box::new(arch::DimBk)),
        "DIM-BK-SeQUeNCe" => Box::new(|| Box::new(arch::DimBkSeq)),
        "DIM-dual" => Box::new(|| Box::new(arch::DimDual)),
        "SR" => Box::new(|| Box::new(arch::Sr)),
        "SIM" => Box::new(|| Box::new(arch::Sim)),
        other => bail!("unknown link architecture {other}"),
    };
    Ok(factory)
}

fn mux_factory(name: &str) -> Result<Box<dyn Fn() -> Box<dyn MuxScheme<WernerModel>>>> {
    let factory: Box<dyn Fn() -> Box<dyn MuxScheme<WernerModel>>> = match name {
        "buffer-space" => Box::new(|| Box::new(MuxSchemeBufferSpace)),
        "statistical" => Box::new(|| Box::<MuxSchemeStatistical>::default()),
        "dynamic-epr" => Box::new(|| Box::<MuxSchemeDynamicEpr>::default()),
        other => bail!("unknown multiplexing scheme {other}"),
    };
    Ok(factory)
}

fn cutoff_factory(name: &str) -> Result<Box<dyn Fn() -> Box<dyn CutoffScheme>>> {
    let factory: Box<dyn Fn() -> Box<dyn CutoffScheme>> = match name {
        "wait-time" => Box::new(|| Box::new(CutoffSchemeWaitTime)),
        "disabled" => Box::new(|| Box::new(CutoffSchemeDisabled)),
        other => bail!("unknown cutoff scheme {other}"),
    };
    Ok(factory)
}

fn load_scenario() -> Result<ScenarioConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading scenario {path}"))?;
            serde_json::from_str(&text).with_context(|| format!("parsing scenario {path}"))
        }
        None => Ok(ScenarioConfig::default()),
    }
}

fn main() -> Result<()> {
    init_logging(&TelemetryConfig::from_env())?;
    let scenario = load_scenario()?;
    info!("scenario: {scenario:?}");

    let arch = arch_factory(&scenario.arch)?;
    let mux = mux_factory(&scenario.mux)?;
    let cutoff = cutoff_factory(&scenario.cutoff_scheme)?;

    let opts = LinearTopoOptions {
        memory_capacity: scenario.effective_memory_capacity(),
        t_cohere: scenario.t_cohere.unwrap_or(f64::INFINITY),
        qchannel_length: scenario.qchannel_length,
        alpha: scenario.alpha,
        qchannel_capacity: scenario.qchannel_capacity,
        link: scenario.link_config(),
        fw: qrn_03_forwarder::ForwarderConfig { ps: scenario.ps },
        timing: scenario.timing_mode(),
    };
    let mut net: Network<WernerModel> =
        linear_topology(scenario.nodes, &opts, || arch(), || mux(), || cutoff());
    net.connect_controller("ctrl", 0.0);

    let mut sim = Simulator::new(SimulatorConfig {
        start_second: 0.0,
        end_second: scenario.end_second,
        accuracy: 1_000_000,
        seed: scenario.seed,
    });

    let (src, dst) = ("n1".to_string(), format!("n{}", scenario.nodes));
    let swap: SwapSpec = match &scenario.swap {
        SwapInput::Sequence(seq) => SwapSpec::Explicit(seq.clone()),
        SwapInput::Named(name) => SwapSpec::Named(name.clone()),
    };
    let mut rp = RoutingPath::shortest(src, dst, swap).with_purif(scenario.purif.clone());
    if scenario.mux != "buffer-space" {
        rp = rp.with_allocation(QubitAllocation::Disabled);
    }
    if let Some(budgets) = scenario.swap_cutoff.clone() {
        rp = rp.with_cutoff(budgets);
    }

    net.start(&mut sim);
    net.install_path(&mut sim, &mut rp)
        .context("installing the end-to-end path")?;

    let guard = scenario
        .wall_clock_limit
        .map(|limit| WallClockTimeout::start(Duration::from_secs_f64(limit), sim.stop_handle()));
    sim.run(&mut net);
    if let Some(guard) = guard {
        if guard.cancel() {
            info!("run stopped by the wall-clock guard");
        }
    }

    let mut report = ReportBuilder::new();
    for node in net.nodes() {
        report.section(format!("{}.link", node.name), &node.link.cnt)?;
        report.section(format!("{}.forwarder", node.name), &node.fw.cnt)?;
    }
    println!("{}", report.to_json_pretty());
    Ok(())
}
