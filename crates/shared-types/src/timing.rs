//! Network-wide application timing.
//!
//! ASYNC timing (the default) processes everything immediately. SYNC timing
//! alternates an EXTERNAL phase (elementary entanglement generation) and an
//! INTERNAL phase (purification/swapping); the network signals each phase
//! change to every node.

use serde::{Deserialize, Serialize};
use sim_kernel::Time;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimingPhase {
    External,
    Internal,
}

/// Timing mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TimingMode {
    Async,
    /// Alternating phase windows, durations in seconds.
    Sync { t_ext: f64, t_int: f64 },
}

/// Current timing state, owned by the network and read by every handler.
#[derive(Debug, Clone)]
pub struct Timing {
    mode: TimingMode,
    phase: TimingPhase,
    /// Current phase end time (exclusive), SYNC mode only.
    end_time: Time,
}

impl Timing {
    pub fn new(mode: TimingMode) -> Self {
        Timing {
            mode,
            // the first SYNC signal flips into EXTERNAL at the start time
            phase: TimingPhase::Internal,
            end_time: Time::SENTINEL,
        }
    }

    pub fn mode(&self) -> TimingMode {
        self.mode
    }

    pub fn is_async(&self) -> bool {
        matches!(self.mode, TimingMode::Async)
    }

    pub fn phase(&self) -> TimingPhase {
        self.phase
    }

    /// Whether the network is using ASYNC timing or is in an EXTERNAL phase.
    /// With `t`, additionally require the timestamp to fall inside the
    /// current phase window.
    pub fn is_external(&self, t: Option<Time>) -> bool {
        if self.is_async() {
            return true;
        }
        self.phase == TimingPhase::External && t.map_or(true, |t| t < self.end_time)
    }

    /// Whether the network is using ASYNC timing or is in an INTERNAL phase.
    pub fn is_internal(&self, t: Option<Time>) -> bool {
        if self.is_async() {
            return true;
        }
        self.phase == TimingPhase::Internal && t.map_or(true, |t| t < self.end_time)
    }

    /// Advance to the next phase at `now`. Returns the new phase and its end
    /// time so the caller can schedule the following signal. ASYNC timing
    /// never signals.
    pub fn signal_next(&mut self, now: Time) -> Option<(TimingPhase, Time)> {
        let TimingMode::Sync { t_ext, t_int } = self.mode else {
            return None;
        };
        let (next, duration) = match self.phase {
            TimingPhase::Internal => (TimingPhase::External, t_ext),
            TimingPhase::External => (TimingPhase::Internal, t_int),
        };
        self.phase = next;
        self.end_time = now.add_sec(duration);
        Some((next, self.end_time))
    }
}
