//! Shared completion counters for one batch.
//!
//! The admitter declares each group's expected case count as soon as discovery produces it, then seals the batch once
//! resolution is over. The aggregator records results. A group is complete when `successes + failures == expected`;
//! the batch is complete when it is sealed and every declared group is complete.
//!
//! ## Notes
//!
//! - Zero-case groups are complete from the moment they are declared.
//! - [`BatchProgress::record`] reports `batch_complete` exactly once, on the call that completes the batch.
//! - All mutation goes through one mutex.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;

use super::{BatchId, GroupId};

/// Where a batch is in the pipeline. Phases only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BatchPhase {
    Idle,
    Resolving,
    Distributing,
    Executing,
    Aggregating,
    Complete,
}

impl fmt::Display for BatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BatchPhase::Idle => "idle",
            BatchPhase::Resolving => "resolving",
            BatchPhase::Distributing => "distributing",
            BatchPhase::Executing => "executing",
            BatchPhase::Aggregating => "aggregating",
            BatchPhase::Complete => "complete",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgressError {
    #[error("group `{0}` was already declared")]
    AlreadyDeclared(GroupId),

    #[error("batch is sealed; group `{0}` cannot be declared")]
    Sealed(GroupId),

    #[error("result for undeclared group `{0}`")]
    UnknownGroup(GroupId),

    #[error("group `{group}` received more than its {expected} expected result(s)")]
    GroupOverflow { group: GroupId, expected: usize },
}

/// Success/failure counts and summed case durations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub successes: usize,
    pub failures: usize,
    pub duration: Duration,
}

impl Tally {
    pub fn total(&self) -> usize {
        self.successes + self.failures
    }

    fn add(&mut self, success: bool, duration: Duration) {
        if success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
        self.duration += duration;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSummary {
    pub group: GroupId,
    pub expected: usize,
    pub tally: Tally,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub batch: BatchId,
    pub expected: usize,
    pub groups: usize,
    pub tally: Tally,
}

/// What a single [`BatchProgress::record`] call completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recorded {
    pub group_complete: bool,
    pub batch_complete: bool,
}

#[derive(Debug)]
struct GroupState {
    expected: usize,
    tally: Tally,
}

impl GroupState {
    fn is_complete(&self) -> bool {
        self.tally.total() == self.expected
    }
}

#[derive(Debug)]
struct State {
    groups: BTreeMap<GroupId, GroupState>,
    totals: Tally,
    sealed: bool,
    completion_reported: bool,
    phase: BatchPhase,
}

impl State {
    fn all_groups_complete(&self) -> bool {
        self.groups.values().all(GroupState::is_complete)
    }
}

/// Thread-safe completion tracking for one admitted batch.
#[derive(Debug)]
pub struct BatchProgress {
    id: BatchId,
    state: Mutex<State>,
}

impl BatchProgress {
    pub fn new(id: BatchId) -> Self {
        Self {
            id,
            state: Mutex::new(State {
                groups: BTreeMap::new(),
                totals: Tally::default(),
                sealed: false,
                completion_reported: false,
                phase: BatchPhase::Idle,
            }),
        }
    }

    pub fn id(&self) -> BatchId {
        self.id
    }

    /// Records how many cases `group` will produce.
    pub fn declare_group(&self, group: GroupId, expected: usize) -> Result<(), ProgressError> {
        let mut state = self.state.lock();
        if state.sealed {
            return Err(ProgressError::Sealed(group));
        }
        if state.groups.contains_key(&group) {
            return Err(ProgressError::AlreadyDeclared(group));
        }
        state.groups.insert(
            group,
            GroupState {
                expected,
                tally: Tally::default(),
            },
        );
        Ok(())
    }

    /// Marks the expectation map final. Idempotent.
    pub fn seal(&self) {
        self.state.lock().sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.state.lock().sealed
    }

    /// Counts one result against its group and the batch.
    pub fn record(&self, group: &GroupId, success: bool, duration: Duration) -> Result<Recorded, ProgressError> {
        let mut state = self.state.lock();
        let entry = state
            .groups
            .get_mut(group)
            .ok_or_else(|| ProgressError::UnknownGroup(group.clone()))?;
        if entry.is_complete() {
            return Err(ProgressError::GroupOverflow {
                group: group.clone(),
                expected: entry.expected,
            });
        }
        entry.tally.add(success, duration);
        let group_complete = entry.is_complete();
        state.totals.add(success, duration);

        let batch_complete = group_complete
            && state.sealed
            && !state.completion_reported
            && state.all_groups_complete();
        if batch_complete {
            state.completion_reported = true;
        }
        Ok(Recorded {
            group_complete,
            batch_complete,
        })
    }

    pub fn is_group_complete(&self, group: &GroupId) -> bool {
        self.state
            .lock()
            .groups
            .get(group)
            .is_some_and(GroupState::is_complete)
    }

    pub fn is_batch_complete(&self) -> bool {
        let state = self.state.lock();
        state.sealed && state.all_groups_complete()
    }

    /// Sum of every declared group's expected count.
    pub fn expected_cases(&self) -> usize {
        self.state.lock().groups.values().map(|g| g.expected).sum()
    }

    pub fn group_summary(&self, group: &GroupId) -> Option<GroupSummary> {
        let state = self.state.lock();
        state.groups.get(group).map(|g| GroupSummary {
            group: group.clone(),
            expected: g.expected,
            tally: g.tally,
        })
    }

    /// Summaries of the groups that declared zero cases, ordered by group id.
    pub fn empty_groups(&self) -> Vec<GroupSummary> {
        let state = self.state.lock();
        state
            .groups
            .iter()
            .filter(|(_, g)| g.expected == 0)
            .map(|(group, g)| GroupSummary {
                group: group.clone(),
                expected: 0,
                tally: g.tally,
            })
            .collect()
    }

    pub fn batch_summary(&self) -> BatchSummary {
        let state = self.state.lock();
        BatchSummary {
            batch: self.id,
            expected: state.groups.values().map(|g| g.expected).sum(),
            groups: state.groups.len(),
            tally: state.totals,
        }
    }

    pub fn phase(&self) -> BatchPhase {
        self.state.lock().phase
    }

    /// Advances the phase. Stages race on this (results can arrive while distribution is still running), so a
    /// request to move backwards is ignored.
    pub fn set_phase(&self, phase: BatchPhase) {
        let mut state = self.state.lock();
        if phase > state.phase {
            tracing::debug!(batch_id = %self.id, from = %state.phase, to = %phase, "batch phase");
            state.phase = phase;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
