//! Werner-state entanglement model with a hidden-variable parameter.

use serde::{Deserialize, Serialize};

use crate::model::QuantumModel;

fn fidelity_from_w(w: f64) -> f64 {
    (w * 3.0 + 1.0) / 4.0
}

fn fidelity_to_w(f: f64) -> f64 {
    (f * 4.0 - 1.0) / 3.0
}

/// A pair of entangled qubits in Werner state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WernerModel {
    /// Werner parameter.
    w: f64,
}

impl WernerModel {
    pub fn w(&self) -> f64 {
        self.w
    }
}

impl QuantumModel for WernerModel {
    fn with_fidelity(fidelity: f64) -> Self {
        assert!((0.0..=1.0).contains(&fidelity));
        WernerModel {
            w: fidelity_to_w(fidelity),
        }
    }

    fn fidelity(&self) -> f64 {
        fidelity_from_w(self.w)
    }

    /// Storage error model: `w = w * e^(-rate * t)`.
    fn decayed(&self, seconds: f64, rate: f64) -> Self {
        WernerModel {
            w: self.w * (-rate * seconds).exp(),
        }
    }

    /// Swapping multiplies the Werner parameters.
    fn swapped(left: &Self, right: &Self) -> Self {
        WernerModel {
            w: left.w * right.w,
        }
    }

    /// Distillation using the Bennett-96 protocol, lower-bound estimate.
    fn purified(kept: &Self, measured: &Self) -> (f64, Self) {
        let fmin = kept.fidelity().min(measured.fidelity());
        let p_success =
            fmin.powi(2) + 5.0 / 9.0 * (1.0 - fmin).powi(2) + 2.0 / 3.0 * fmin * (1.0 - fmin);
        let new_fidelity = (fmin.powi(2) + (1.0 - fmin).powi(2) / 9.0) / p_success;
        (p_success, WernerModel::with_fidelity(new_fidelity))
    }

    fn decohered() -> Self {
        WernerModel {
            w: fidelity_to_w(0.0),
        }
    }
}
