//! Iteration scheduling: discovery vs. implementation, and early termination.
//!
//! Everything here is a pure function of iteration counters and task counts so
//! that the loop's decisions can be tested without an agent.

use crate::core::types::{IterationKind, LoopStop};

/// Default number of consecutive empty discoveries tolerated once nothing is
/// pending.
pub const DEFAULT_EMPTY_DISCOVERY_LIMIT: u32 = 3;

/// Whether iteration `iteration` (1-indexed) should be a discovery iteration.
///
/// `last_discovery == 0` means discovery never ran in this run, so the first
/// pilot iteration always discovers.
pub fn should_run_discovery(iteration: u32, last_discovery: u32, interval: u32) -> bool {
    if last_discovery == 0 {
        return true;
    }
    iteration.saturating_sub(last_discovery) >= interval
}

/// Stop before invoking the agent when an implementation iteration has nothing
/// to work on.
pub fn stop_before_iteration(kind: IterationKind, has_pending: bool) -> Option<LoopStop> {
    match kind {
        IterationKind::Implementation if !has_pending => Some(LoopStop::AllDone),
        _ => None,
    }
}

/// Outcome of one successful discovery iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryResult {
    Added(usize),
    Empty { streak: u32 },
}

/// Per-run discovery bookkeeping. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryState {
    /// Iteration index of the last successful discovery (0 = none yet).
    pub last_discovery: u32,
    /// Consecutive successful discoveries that added no task.
    pub empty_streak: u32,
}

impl DiscoveryState {
    pub fn kind_for(&self, iteration: u32, interval: u32) -> IterationKind {
        if should_run_discovery(iteration, self.last_discovery, interval) {
            IterationKind::Discovery
        } else {
            IterationKind::Implementation
        }
    }

    /// Record a successful discovery at `iteration` that moved the task count
    /// from `before` to `after`. A shrinking list counts as empty.
    pub fn record(&mut self, iteration: u32, before: usize, after: usize) -> DiscoveryResult {
        self.last_discovery = iteration;
        let added = after.saturating_sub(before);
        if added == 0 {
            self.empty_streak += 1;
            DiscoveryResult::Empty {
                streak: self.empty_streak,
            }
        } else {
            self.empty_streak = 0;
            DiscoveryResult::Added(added)
        }
    }

    /// Stop once discovery keeps coming back empty and there is no backlog left.
    pub fn exhausted(&self, limit: u32, has_pending: bool) -> Option<LoopStop> {
        if self.empty_streak >= limit && !has_pending {
            return Some(LoopStop::NoNewTasks {
                empty_discoveries: self.empty_streak,
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_run_always_discovers() {
        for iteration in [1, 2, 7, 100] {
            for interval in [1, 3, 50] {
                assert!(should_run_discovery(iteration, 0, interval));
            }
        }
    }

    #[test]
    fn discovers_iff_interval_elapsed() {
        for last in 1..6 {
            for iteration in last..(last + 10) {
                for interval in 1..5 {
                    assert_eq!(
                        should_run_discovery(iteration, last, interval),
                        iteration - last >= interval,
                        "iteration={iteration} last={last} interval={interval}"
                    );
                }
            }
        }
    }

    #[test]
    fn kind_sequence_with_productive_first_discovery() {
        let mut state = DiscoveryState::default();
        let mut kinds = Vec::new();
        for iteration in 1..=4 {
            let kind = state.kind_for(iteration, 2);
            if kind == IterationKind::Discovery {
                state.record(iteration, 0, 2);
            }
            kinds.push(kind);
        }
        assert_eq!(
            kinds,
            vec![
                IterationKind::Discovery,
                IterationKind::Implementation,
                IterationKind::Discovery,
                IterationKind::Implementation,
            ]
        );
    }

    #[test]
    fn interval_three_spaces_discoveries() {
        let mut state = DiscoveryState::default();
        let mut kinds = Vec::new();
        for iteration in 1..=4 {
            let kind = state.kind_for(iteration, 3);
            if kind == IterationKind::Discovery {
                state.record(iteration, 0, 1);
            }
            kinds.push(kind);
        }
        assert_eq!(
            kinds,
            vec![
                IterationKind::Discovery,
                IterationKind::Implementation,
                IterationKind::Implementation,
                IterationKind::Discovery,
            ]
        );
    }

    #[test]
    fn empty_streak_resets_on_added_tasks() {
        let mut state = DiscoveryState::default();
        assert_eq!(state.record(1, 3, 3), DiscoveryResult::Empty { streak: 1 });
        assert_eq!(state.record(2, 3, 2), DiscoveryResult::Empty { streak: 2 });
        assert_eq!(state.record(3, 2, 5), DiscoveryResult::Added(3));
        assert_eq!(state.empty_streak, 0);
        assert_eq!(state.last_discovery, 3);
    }

    #[test]
    fn exhausted_requires_limit_and_empty_backlog() {
        let state = DiscoveryState {
            last_discovery: 3,
            empty_streak: 3,
        };
        assert_eq!(
            state.exhausted(3, false),
            Some(LoopStop::NoNewTasks {
                empty_discoveries: 3
            })
        );
        assert_eq!(state.exhausted(3, true), None);
        assert_eq!(state.exhausted(4, false), None);
    }

    #[test]
    fn implementation_without_pending_stops() {
        assert_eq!(
            stop_before_iteration(IterationKind::Implementation, false),
            Some(LoopStop::AllDone)
        );
        assert_eq!(
            stop_before_iteration(IterationKind::Implementation, true),
            None
        );
        assert_eq!(stop_before_iteration(IterationKind::Discovery, false), None);
    }
}
