//! Topology builders.

use epr_models::QuantumModel;
use qrn_01_qubit_memory::QuantumMemory;
use qrn_02_link_layer::{LinkArch, LinkLayer, LinkLayerConfig, QuantumChannel};
use qrn_03_forwarder::{CutoffScheme, Forwarder, ForwarderConfig, MuxScheme};
use shared_types::TimingMode;

use crate::channel::ClassicChannel;
use crate::network::{Network, QNode};

/// Parameters for a linear chain topology.
#[derive(Debug, Clone)]
pub struct LinearTopoOptions {
    /// Memory capacity per node (interior nodes serve two channels).
    pub memory_capacity: usize,
    /// Memory dephasing time in seconds; `f64::INFINITY` disables
    /// decoherence.
    pub t_cohere: f64,
    /// Quantum/classical fiber length between adjacent nodes, km.
    pub qchannel_length: f64,
    /// Fiber loss in dB/km.
    pub alpha: f64,
    /// Memory qubits each node assigns to each adjacent quantum channel.
    pub qchannel_capacity: usize,
    pub link: LinkLayerConfig,
    pub fw: ForwarderConfig,
    pub timing: TimingMode,
}

impl Default for LinearTopoOptions {
    fn default() -> Self {
        LinearTopoOptions {
            memory_capacity: 2,
            t_cohere: 1.0,
            qchannel_length: 100.0,
            alpha: 0.2,
            qchannel_capacity: 1,
            link: LinkLayerConfig::default(),
            fw: ForwarderConfig::default(),
            timing: TimingMode::Async,
        }
    }
}

/// Build a linear chain `n1 - n2 - .. - nN` with one quantum and one
/// classical channel per adjacent pair and qubits pre-assigned to each
/// channel. The per-node policy objects come from the factory closures
/// because every forwarder owns its own instances.
pub fn linear_topology<M: QuantumModel>(
    nodes_number: usize,
    opts: &LinearTopoOptions,
    mut arch: impl FnMut() -> Box<dyn LinkArch>,
    mut mux: impl FnMut() -> Box<dyn MuxScheme<M>>,
    mut cutoff: impl FnMut() -> Box<dyn CutoffScheme>,
) -> Network<M> {
    assert!(nodes_number >= 2);
    let mut net = Network::new(opts.timing);

    for i in 1..=nodes_number {
        let name = format!("n{i}");
        net.add_node(QNode {
            memory: QuantumMemory::new(name.clone(), opts.memory_capacity, opts.t_cohere),
            link: LinkLayer::new(name.clone(), opts.link.clone()),
            fw: Forwarder::new(name.clone(), opts.fw.clone(), mux(), cutoff()),
            name,
        });
    }

    for i in 1..nodes_number {
        let (a, b) = (format!("n{i}"), format!("n{}", i + 1));
        let ch_name = format!("{a}-{b}");
        net.add_qchannel(QuantumChannel::new(
            ch_name.clone(),
            a.clone(),
            b.clone(),
            opts.qchannel_length,
            opts.alpha,
            arch(),
        ));
        net.add_cchannel(ClassicChannel::with_length(
            format!("c:{a}-{b}"),
            a,
            b,
            opts.qchannel_length,
        ));
        net.assign_memory_qubits(&ch_name, opts.qchannel_capacity);
    }

    net
}
