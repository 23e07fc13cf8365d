//! Scenario configuration.

use std::collections::BTreeMap;

use qrn_02_link_layer::LinkLayerConfig;
use serde::Deserialize;
use shared_types::TimingMode;

/// One simulated scenario: a linear repeater chain with one end-to-end
/// request installed at start-up.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ScenarioConfig {
    /// RNG seed; omit for OS entropy (non-reproducible).
    pub seed: Option<u64>,
    /// Simulation end time in seconds.
    pub end_second: f64,
    /// Number of nodes on the chain.
    pub nodes: usize,
    /// Fiber length between adjacent nodes, km.
    pub qchannel_length: f64,
    /// Fiber loss, dB/km.
    pub alpha: f64,
    /// Qubits each node assigns to each adjacent channel.
    pub qchannel_capacity: usize,
    /// Memory slots per node; 0 sizes for two full channels.
    pub memory_capacity: usize,
    /// Memory dephasing time in seconds; null disables decoherence.
    pub t_cohere: Option<f64>,
    /// Link architecture: DIM-BK, DIM-BK-SeQUeNCe, DIM-dual, SR or SIM.
    pub arch: String,
    /// Source efficiency.
    pub eta_s: f64,
    /// Detector efficiency.
    pub eta_d: f64,
    /// Entanglement source frequency, Hz.
    pub frequency: f64,
    /// Local operation delay, seconds.
    pub tau_0: f64,
    /// Fidelity of generated pairs.
    pub init_fidelity: f64,
    /// Probability of successful swapping.
    pub ps: f64,
    /// Multiplexing scheme: buffer-space, statistical or dynamic-epr.
    pub mux: String,
    /// Cutoff scheme: wait-time or disabled.
    pub cutoff_scheme: String,
    /// Swap sequence: explicit ranks or a policy name.
    pub swap: SwapInput,
    /// Per-node cutoff budgets in seconds; negative = unbounded.
    pub swap_cutoff: Option<Vec<f64>>,
    /// Purification rounds per segment name.
    pub purif: BTreeMap<String, u32>,
    /// SYNC timing phases; omit for ASYNC.
    pub timing: Option<SyncTiming>,
    /// Wall-clock runaway guard in seconds.
    pub wall_clock_limit: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SwapInput {
    Sequence(Vec<u32>),
    Named(String),
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SyncTiming {
    pub t_ext: f64,
    pub t_int: f64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        ScenarioConfig {
            seed: Some(0),
            end_second: 10.0,
            nodes: 3,
            qchannel_length: 100.0,
            alpha: 0.2,
            qchannel_capacity: 1,
            memory_capacity: 0,
            t_cohere: Some(1.0),
            arch: "DIM-BK-SeQUeNCe".to_string(),
            eta_s: 1.0,
            eta_d: 1.0,
            frequency: 80e6,
            tau_0: 0.0,
            init_fidelity: 0.99,
            ps: 0.5,
            mux: "buffer-space".to_string(),
            cutoff_scheme: "wait-time".to_string(),
            swap: SwapInput::Named("asap".to_string()),
            swap_cutoff: None,
            purif: BTreeMap::new(),
            timing: None,
            wall_clock_limit: None,
        }
    }
}

impl ScenarioConfig {
    pub fn effective_memory_capacity(&self) -> usize {
        if self.memory_capacity == 0 {
            2 * self.qchannel_capacity
        } else {
            self.memory_capacity
        }
    }

    pub fn timing_mode(&self) -> TimingMode {
        match self.timing {
            Some(SyncTiming { t_ext, t_int }) => TimingMode::Sync { t_ext, t_int },
            None => TimingMode::Async,
        }
    }

    pub fn link_config(&self) -> LinkLayerConfig {
        LinkLayerConfig {
            eta_s: self.eta_s,
            eta_d: self.eta_d,
            frequency: self.frequency,
            tau_0: self.tau_0,
            init_fidelity: self.init_fidelity,
            continuous_generation: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_scenario_parses_with_defaults() {
        let config: ScenarioConfig = serde_json::from_str(r#"{ "nodes": 5 }"#).unwrap();
        assert_eq!(config.nodes, 5);
        assert_eq!(config.effective_memory_capacity(), 2);
        assert!(matches!(config.swap, SwapInput::Named(ref n) if n == "asap"));
    }

    #[test]
    fn test_explicit_swap_sequence_and_cutoff() {
        let config: ScenarioConfig = serde_json::from_str(
            r#"{ "swap": [1, 0, 1], "swap_cutoff": [-1.0, 0.002, -1.0] }"#,
        )
        .unwrap();
        assert!(matches!(config.swap, SwapInput::Sequence(ref s) if s == &vec![1, 0, 1]));
        assert_eq!(config.swap_cutoff, Some(vec![-1.0, 0.002, -1.0]));
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        assert!(serde_json::from_str::<ScenarioConfig>(r#"{ "nodez": 5 }"#).is_err());
    }
}
