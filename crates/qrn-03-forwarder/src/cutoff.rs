//! Pair-age cutoff schemes.
//!
//! A cutoff scheme decides how the FIB's per-node `swap_cutoff` budgets are
//! interpreted. The forwarder owns the mechanics (recording deadlines on
//! qubits, scheduling and cancelling the auto-discard event, pairing local
//! and remote discards); the scheme supplies the policy.

use qrn_01_qubit_memory::MemoryQubit;
use sim_kernel::Time;

use crate::fib::FibEntry;

/// Policy seam for pair-age cutoff.
pub trait CutoffScheme: std::fmt::Debug + Send {
    fn name(&self) -> &'static str;

    /// Deadline for a newly eligible qubit that is about to wait for a swap
    /// partner; `None` schedules no auto-discard. Statistical multiplexing
    /// passes no FIB entry, which always disables the cutoff.
    fn eligible_deadline(&self, now: Time, entry: Option<&FibEntry>) -> Option<Time>;

    /// Whether a stored qubit may still be used as a swap candidate.
    fn filter_swap_candidate(&self, qubit: &MemoryQubit, now: Time) -> bool;
}

/// Individual wait-time budget per repeater node.
///
/// Each node tracks how long an eligible pair has waited in memory; a pair
/// that exceeds the node's budget is released and the partner is told to
/// release its half.
#[derive(Debug, Default)]
pub struct CutoffSchemeWaitTime;

impl CutoffScheme for CutoffSchemeWaitTime {
    fn name(&self) -> &'static str {
        "wait-time"
    }

    fn eligible_deadline(&self, now: Time, entry: Option<&FibEntry>) -> Option<Time> {
        let budget = entry?.own_cutoff_budget()?;
        Some(now + budget)
    }

    fn filter_swap_candidate(&self, qubit: &MemoryQubit, now: Time) -> bool {
        match qubit.cutoff {
            Some((_, deadline)) => deadline >= now,
            None => true,
        }
    }
}

/// Ignore cutoff budgets entirely.
#[derive(Debug, Default)]
pub struct CutoffSchemeDisabled;

impl CutoffScheme for CutoffSchemeDisabled {
    fn name(&self) -> &'static str {
        "disabled"
    }

    fn eligible_deadline(&self, _now: Time, _entry: Option<&FibEntry>) -> Option<Time> {
        None
    }

    fn filter_swap_candidate(&self, _qubit: &MemoryQubit, _now: Time) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::make_path_instructions;
    use std::collections::BTreeMap;

    const ACC: u64 = 1_000_000;

    fn entry_with_budget(budget: Option<Time>) -> FibEntry {
        let ins = make_path_instructions(
            0,
            vec!["s".into(), "r".into(), "d".into()],
            vec![1, 0, 1],
            Some(vec![None, budget, None]),
            None,
            BTreeMap::new(),
        )
        .unwrap();
        FibEntry::from_instructions(0, &ins, "r", ACC).unwrap()
    }

    #[test]
    fn test_wait_time_deadline_from_fib_budget() {
        let scheme = CutoffSchemeWaitTime;
        let now = Time::from_sec(1.0, ACC);
        let budget = Time::from_sec(0.002, ACC);

        let entry = entry_with_budget(Some(budget));
        assert_eq!(
            scheme.eligible_deadline(now, Some(&entry)),
            Some(Time::from_sec(1.002, ACC))
        );

        // unbounded budget and missing FIB entry disable the cutoff
        assert_eq!(scheme.eligible_deadline(now, Some(&entry_with_budget(None))), None);
        assert_eq!(scheme.eligible_deadline(now, None), None);
    }

    #[test]
    fn test_wait_time_filters_expired_candidates() {
        let scheme = CutoffSchemeWaitTime;
        let mut qubit = MemoryQubit::new(0);
        let now = Time::from_sec(1.0, ACC);
        assert!(scheme.filter_swap_candidate(&qubit, now));

        qubit.cutoff = Some((Time::from_sec(0.5, ACC), Time::from_sec(0.9, ACC)));
        assert!(!scheme.filter_swap_candidate(&qubit, now));

        qubit.cutoff = Some((Time::from_sec(0.5, ACC), now));
        assert!(scheme.filter_swap_candidate(&qubit, now));
    }
}
