//! Entangled-pair bookkeeping.

use std::collections::BTreeSet;
use std::fmt;

use sha2::{Digest, Sha256};
use shared_types::{NodeName, PathId};
use sim_kernel::{SimRng, Time};

use crate::model::QuantumModel;

/// One half of an entangled pair, as stored in a node's quantum memory.
///
/// Both end nodes hold their own copy; all state transitions are either
/// deterministic functions of shared inputs or communicated explicitly, so
/// the copies never diverge in a way the protocol can observe.
#[derive(Debug, Clone)]
pub struct EprPair<M> {
    name: String,
    /// Link-layer reservation key (elementary pairs only).
    pub key: Option<String>,
    /// Node holding the left (path-upstream) half.
    pub src: NodeName,
    /// Node holding the right (path-downstream) half.
    pub dst: NodeName,
    /// Creation time point assigned by the link layer or by swapping.
    pub creation_time: Time,
    /// Decoherence time point; storage beyond this expires the pair.
    pub decoherence_time: Time,
    /// Memory decoherence rate in Hz at src and dst.
    pub mem_decohere_rate: (f64, f64),
    /// Possible path ids, used by statistical and dynamic-EPR multiplexing
    /// while ownership of the pair is still ambiguous.
    pub tmp_path_ids: Option<BTreeSet<PathId>>,
    elem_names: Vec<String>,
    decohered: bool,
    model: M,
}

impl<M: QuantumModel> EprPair<M> {
    /// New elementary pair between two adjacent nodes. The name is drawn
    /// from the simulation RNG so runs stay reproducible.
    #[allow(clippy::too_many_arguments)]
    pub fn elementary(
        rng: &mut SimRng,
        key: Option<String>,
        src: impl Into<NodeName>,
        dst: impl Into<NodeName>,
        creation_time: Time,
        decoherence_time: Time,
        mem_decohere_rate: (f64, f64),
        init_fidelity: f64,
    ) -> Self {
        let name = rng.hex_token(16);
        EprPair {
            elem_names: vec![name.clone()],
            name,
            key,
            src: src.into(),
            dst: dst.into(),
            creation_time,
            decoherence_time,
            mem_decohere_rate,
            tmp_path_ids: None,
            decohered: false,
            model: M::with_fidelity(init_fidelity),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The partner node of the half held at `own`, or `None` when `own` is
    /// not an endpoint of this pair.
    pub fn partner_of(&self, own: &str) -> Option<&str> {
        if self.src == own {
            Some(&self.dst)
        } else if self.dst == own {
            Some(&self.src)
        } else {
            None
        }
    }

    /// Pair decoherence rate in Hz (sum of both memories).
    pub fn decoherence_rate(&self) -> f64 {
        self.mem_decohere_rate.0 + self.mem_decohere_rate.1
    }

    pub fn is_decohered(&self) -> bool {
        self.decohered
    }

    pub fn mark_decohered(&mut self) {
        self.decohered = true;
        self.model = M::decohered();
    }

    /// Whether the scheduled decoherence time has passed at `now`.
    pub fn is_expired(&self, now: Time) -> bool {
        !self.decoherence_time.is_sentinel() && self.decoherence_time <= now
    }

    /// Quality (fidelity) observed at `now`, with storage decay applied
    /// deterministically since creation.
    pub fn quality(&self, now: Time) -> f64 {
        if self.decohered {
            return M::decohered().fidelity();
        }
        self.effective_model(now).fidelity()
    }

    fn effective_model(&self, now: Time) -> M {
        if self.creation_time.is_sentinel() || now <= self.creation_time {
            return self.model.clone();
        }
        let stored = (now - self.creation_time).sec();
        self.model.decayed(stored, self.decoherence_rate())
    }

    /// Attempt entanglement swapping of `left` and `right` at the common
    /// middle node. Returns the new pair, or `None` when either input has
    /// decohered or the probabilistic swap fails.
    ///
    /// The new pair's name is a SHA-256 digest over the left-to-right
    /// elementary names, so any node that performs or merges the same swap
    /// derives the same name.
    pub fn swap(
        left: &EprPair<M>,
        right: &EprPair<M>,
        now: Time,
        ps: f64,
        rng: &mut SimRng,
    ) -> Option<EprPair<M>> {
        assert_eq!(
            left.dst, right.src,
            "EprPair: swapping pairs that do not share a middle node"
        );

        if left.decohered || right.decohered {
            return None;
        }
        if !rng.chance(ps) {
            return None;
        }

        let mut elem_names =
            Vec::with_capacity(left.elem_names.len() + right.elem_names.len());
        elem_names.extend_from_slice(&left.elem_names);
        elem_names.extend_from_slice(&right.elem_names);
        let name = hash_name(&elem_names);

        // the combined pair expires with its shortest-lived input; SENTINEL
        // (no decoherence) never wins
        let decoherence_time = match (
            left.decoherence_time.is_sentinel(),
            right.decoherence_time.is_sentinel(),
        ) {
            (true, true) => Time::SENTINEL,
            (true, false) => right.decoherence_time,
            (false, true) => left.decoherence_time,
            (false, false) => left.decoherence_time.min(right.decoherence_time),
        };

        Some(EprPair {
            name,
            key: None,
            src: left.src.clone(),
            dst: right.dst.clone(),
            creation_time: now,
            decoherence_time,
            mem_decohere_rate: (left.mem_decohere_rate.0, right.mem_decohere_rate.1),
            tmp_path_ids: None,
            elem_names,
            decohered: false,
            model: M::swapped(&left.effective_model(now), &right.effective_model(now)),
        })
    }

    /// Purification outcome at `now` for this pair consuming `measured`:
    /// success probability and the post-purification pair state. Both sides
    /// of the segment compute the same values; only the responder samples.
    pub fn purify_outcome(&self, measured: &EprPair<M>, now: Time) -> (f64, M) {
        M::purified(&self.effective_model(now), &measured.effective_model(now))
    }

    /// Apply a successful purification: quality resets to the purified model
    /// and decay restarts from `now`.
    pub fn apply_purified(&mut self, model: M, now: Time) {
        self.model = model;
        self.creation_time = now;
    }
}

fn hash_name(elem_names: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(elem_names.join("-").as_bytes());
    let digest = hasher.finalize();
    digest[..16].iter().map(|b| format!("{b:02x}")).collect()
}

impl<M: QuantumModel> fmt::Display for EprPair<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPR({}", self.name)?;
        if self.decohered {
            write!(f, ", DECOHERED")?;
        } else {
            write!(f, ", fidelity={:.4}", self.model.fidelity())?;
        }
        write!(f, ", src={}, dst={})", self.src, self.dst)
    }
}
