//! Classical control-plane messages.
//!
//! All messages are JSON objects discriminated by a `cmd` field. Control
//! messages (`install_path`, `uninstall_path`) originate at the controller;
//! signaling messages (`SWAP_UPDATE`, `PURIF_*`, `CUTOFF_DISCARD`) travel
//! between forwarders along an installed path; reservation messages travel
//! between link-layer neighbors.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sim_kernel::Time;

use crate::errors::ValidationError;
use crate::ids::{NodeName, PathId, ReqId};

/// Per-link qubit allocation: one `(left, right)` pair per quantum channel
/// on the route. A zero means "allocate every qubit assigned to the channel".
pub type MultiplexingVector = Vec<(u32, u32)>;

/// Wire value for an unbounded cutoff budget.
pub const UNBOUNDED_CUTOFF: i64 = -1;

/// Forwarding instructions installed at every node of one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathInstructions {
    /// Request identifier: identifies the src-dst pair within the network.
    pub req_id: ReqId,

    /// Path vector: node names in the order they appear on the path. There
    /// must be a quantum and a classical channel between adjacent nodes.
    pub route: Vec<NodeName>,

    /// Swap sequence: one rank per route node. A node with smaller rank
    /// swaps before a node with larger rank; equal ranks may swap in the
    /// same wave. All zeros disables swapping (entanglement is consumed
    /// after purification completes).
    pub swap: Vec<u32>,

    /// Per-node cutoff budget in time slots; [`UNBOUNDED_CUTOFF`] means no
    /// restriction. End nodes never swap, so their entries have no effect.
    pub swap_cutoff: Vec<i64>,

    /// Multiplexing vector, buffer-space multiplexing only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub m_v: Option<MultiplexingVector>,

    /// Purification scheme: segment name ("left-right" node names joined by
    /// a hyphen, in route order) to required purification rounds.
    pub purif: BTreeMap<String, u32>,
}

impl PathInstructions {
    /// Cutoff budget for the node at `idx`, or `None` when unbounded.
    pub fn cutoff_budget(&self, idx: usize, accuracy: u64) -> Option<Time> {
        match self.swap_cutoff.get(idx) {
            Some(&slots) if slots >= 0 => Some(Time::new(slots, accuracy)),
            _ => None,
        }
    }
}

/// Build validated path instructions.
///
/// `swap_cutoff` entries are durations; `None` (or an absent list) means
/// unbounded at that node.
pub fn make_path_instructions(
    req_id: ReqId,
    route: Vec<NodeName>,
    swap: Vec<u32>,
    swap_cutoff: Option<Vec<Option<Time>>>,
    m_v: Option<MultiplexingVector>,
    purif: BTreeMap<String, u32>,
) -> Result<PathInstructions, ValidationError> {
    let cutoff_slots = match swap_cutoff {
        None => vec![UNBOUNDED_CUTOFF; swap.len()],
        Some(budgets) => budgets
            .into_iter()
            .map(|b| b.map_or(UNBOUNDED_CUTOFF, |t| t.time_slot()))
            .collect(),
    };

    let instructions = PathInstructions {
        req_id,
        route,
        swap,
        swap_cutoff: cutoff_slots,
        m_v,
        purif,
    };
    validate_path_instructions(&instructions)?;
    Ok(instructions)
}

/// Validate instruction shape against the route.
pub fn validate_path_instructions(ins: &PathInstructions) -> Result<(), ValidationError> {
    let route = &ins.route;
    if route.len() < 2 {
        return Err(ValidationError::RouteTooShort(route.len()));
    }

    if ins.swap.len() != route.len() {
        return Err(ValidationError::SwapLengthMismatch {
            swap: ins.swap.len(),
            route: route.len(),
        });
    }

    if ins.swap_cutoff.len() != route.len() {
        return Err(ValidationError::CutoffLengthMismatch {
            cutoff: ins.swap_cutoff.len(),
            route: route.len(),
        });
    }

    if let Some(m_v) = &ins.m_v {
        if m_v.len() != route.len() - 1 {
            return Err(ValidationError::MvLengthMismatch {
                m_v: m_v.len(),
                links: route.len() - 1,
            });
        }
    }

    for segment in ins.purif.keys() {
        if !segment_in_route(segment, route) {
            return Err(ValidationError::BadPurifSegment(segment.clone()));
        }
    }
    Ok(())
}

fn segment_in_route(segment: &str, route: &[NodeName]) -> bool {
    let mut parts = segment.split('-');
    let (Some(a), Some(b), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    let idx0 = route.iter().position(|n| n == a);
    let idx1 = route.iter().position(|n| n == b);
    matches!((idx0, idx1), (Some(i0), Some(i1)) if i0 < i1)
}

/// `SWAP_UPDATE` payload: a swap at `swapping_node` replaced `epr` with
/// `new_epr` (or failed, when `new_epr` is null).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapUpdate {
    pub path_id: PathId,
    pub swapping_node: NodeName,
    /// The partner at the far side of the new entanglement.
    pub partner: NodeName,
    /// Old (pre-swap) pair name held by the recipient.
    pub epr: String,
    /// New pair name, or `None` when the swap failed.
    pub new_epr: Option<String>,
}

/// `PURIF_SOLICIT` payload: the primary node asks `partner` to purify `epr`
/// consuming `measure_epr` for the given zero-based round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurifSolicit {
    pub path_id: PathId,
    pub purif_node: NodeName,
    pub partner: NodeName,
    pub epr: String,
    pub measure_epr: String,
    pub round: u32,
}

/// `PURIF_RESPONSE` payload: same fields plus the outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurifResponse {
    pub path_id: PathId,
    pub purif_node: NodeName,
    pub partner: NodeName,
    pub epr: String,
    pub measure_epr: String,
    pub round: u32,
    pub result: bool,
}

/// `CUTOFF_DISCARD` payload. `round` is −1 for a swap-stage cutoff, ≥ 0 for
/// a purification-round cutoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CutoffDiscard {
    pub path_id: PathId,
    pub epr: String,
    pub round: i32,
}

/// All classical control-plane messages, discriminated by `cmd`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum ClassicMessage {
    #[serde(rename = "install_path")]
    InstallPath {
        path_id: PathId,
        instructions: PathInstructions,
    },
    #[serde(rename = "uninstall_path")]
    UninstallPath { path_id: PathId },
    #[serde(rename = "RESERVE_QUBIT")]
    ReserveQubit {
        path_id: Option<PathId>,
        key: String,
    },
    #[serde(rename = "RESERVE_QUBIT_OK")]
    ReserveQubitOk {
        path_id: Option<PathId>,
        key: String,
    },
    #[serde(rename = "SWAP_UPDATE")]
    SwapUpdate(SwapUpdate),
    #[serde(rename = "PURIF_SOLICIT")]
    PurifSolicit(PurifSolicit),
    #[serde(rename = "PURIF_RESPONSE")]
    PurifResponse(PurifResponse),
    #[serde(rename = "CUTOFF_DISCARD")]
    CutoffDiscard(CutoffDiscard),
}

impl ClassicMessage {
    /// Path id carried by signaling messages; `None` for control and
    /// reservation messages.
    pub fn signaling_path_id(&self) -> Option<PathId> {
        match self {
            ClassicMessage::SwapUpdate(m) => Some(m.path_id),
            ClassicMessage::PurifSolicit(m) => Some(m.path_id),
            ClassicMessage::PurifResponse(m) => Some(m.path_id),
            ClassicMessage::CutoffDiscard(m) => Some(m.path_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route() -> Vec<NodeName> {
        vec!["n1".into(), "n2".into(), "n3".into()]
    }

    fn instructions() -> PathInstructions {
        make_path_instructions(0, route(), vec![1, 0, 1], None, Some(vec![(1, 1), (1, 1)]), {
            let mut purif = BTreeMap::new();
            purif.insert("n1-n2".to_string(), 1);
            purif
        })
        .unwrap()
    }

    #[test]
    fn test_cmd_discriminator_on_the_wire() {
        let msg = ClassicMessage::SwapUpdate(SwapUpdate {
            path_id: 3,
            swapping_node: "n2".into(),
            partner: "n3".into(),
            epr: "abc".into(),
            new_epr: None,
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["cmd"], "SWAP_UPDATE");
        assert_eq!(value["path_id"], 3);
        assert_eq!(value["new_epr"], serde_json::Value::Null);

        let back: ClassicMessage = serde_json::from_value(value).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_install_path_round_trip() {
        let msg = ClassicMessage::InstallPath {
            path_id: 0,
            instructions: instructions(),
        };
        let text = serde_json::to_string(&msg).unwrap();
        assert!(text.contains("\"cmd\":\"install_path\""));
        let back: ClassicMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_validation_rejects_length_mismatches() {
        let err = make_path_instructions(0, route(), vec![1, 0], None, None, BTreeMap::new());
        assert_eq!(
            err.unwrap_err(),
            ValidationError::SwapLengthMismatch { swap: 2, route: 3 }
        );

        let err =
            make_path_instructions(0, route(), vec![1, 0, 1], None, Some(vec![(1, 1)]), BTreeMap::new());
        assert_eq!(
            err.unwrap_err(),
            ValidationError::MvLengthMismatch { m_v: 1, links: 2 }
        );

        let err = make_path_instructions(0, vec!["n1".into()], vec![0], None, None, BTreeMap::new());
        assert_eq!(err.unwrap_err(), ValidationError::RouteTooShort(1));
    }

    #[test]
    fn test_validation_rejects_bad_purif_segments() {
        for bad in ["r1-r2", "n1-n2-n3", "n2-n2", "n3-n1"] {
            let mut purif = BTreeMap::new();
            purif.insert(bad.to_string(), 1);
            let err = make_path_instructions(0, route(), vec![1, 0, 1], None, None, purif);
            assert_eq!(
                err.unwrap_err(),
                ValidationError::BadPurifSegment(bad.to_string()),
                "segment {bad}"
            );
        }
    }

    #[test]
    fn test_cutoff_budget_parsing() {
        let acc = 1_000_000;
        let budgets = vec![None, Some(Time::from_sec(0.002, acc)), None];
        let ins =
            make_path_instructions(0, route(), vec![1, 0, 1], Some(budgets), None, BTreeMap::new())
                .unwrap();
        assert_eq!(ins.swap_cutoff, vec![UNBOUNDED_CUTOFF, 2000, UNBOUNDED_CUTOFF]);
        assert_eq!(ins.cutoff_budget(0, acc), None);
        assert_eq!(ins.cutoff_budget(1, acc), Some(Time::from_sec(0.002, acc)));
    }
}
