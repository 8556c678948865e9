//! Pure status roll-up rules.
//!
//! Nothing in here touches storage: the database layer loads the child
//! statuses, asks these functions what the parent should become, and writes
//! the answer back.

use super::models::{PhaseType, StepStatus};

/// One entry of the phase status rule list.
pub struct StatusRule {
    pub status: StepStatus,
    pub applies: fn(&[StepStatus]) -> bool,
}

/// Phase status precedence, evaluated top to bottom; the first rule that
/// applies wins. A single failed step fails the phase unless every step is
/// already completed.
pub const PHASE_STATUS_RULES: [StatusRule; 4] = [
    StatusRule {
        status: StepStatus::Completed,
        applies: all_completed,
    },
    StatusRule {
        status: StepStatus::Failed,
        applies: any_failed,
    },
    StatusRule {
        status: StepStatus::InProgress,
        applies: any_in_progress,
    },
    StatusRule {
        status: StepStatus::Pending,
        applies: always,
    },
];

fn all_completed(statuses: &[StepStatus]) -> bool {
    statuses.iter().all(|s| *s == StepStatus::Completed)
}

fn any_failed(statuses: &[StepStatus]) -> bool {
    statuses.contains(&StepStatus::Failed)
}

fn any_in_progress(statuses: &[StepStatus]) -> bool {
    statuses.contains(&StepStatus::InProgress)
}

fn always(_: &[StepStatus]) -> bool {
    true
}

/// Resolve a phase status from its steps' statuses.
pub fn resolve_phase_status(statuses: &[StepStatus]) -> StepStatus {
    PHASE_STATUS_RULES
        .iter()
        .find(|rule| (rule.applies)(statuses))
        .map(|rule| rule.status)
        .unwrap_or(StepStatus::Pending)
}

/// Integer percentage of completed entries, rounded down.
pub fn completion_percent(statuses: &[StepStatus]) -> i32 {
    if statuses.is_empty() {
        return 0;
    }
    let completed = statuses
        .iter()
        .filter(|s| **s == StepStatus::Completed)
        .count();
    ((completed * 100) / statuses.len()) as i32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseRollup {
    pub status: StepStatus,
    pub progress: i32,
}

/// Roll a phase up from its steps. `None` when the phase has no steps, in
/// which case the phase must be left as it is.
pub fn rollup_phase(statuses: &[StepStatus]) -> Option<PhaseRollup> {
    if statuses.is_empty() {
        return None;
    }
    Some(PhaseRollup {
        status: resolve_phase_status(statuses),
        progress: completion_percent(statuses),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessRollup {
    pub status: StepStatus,
    pub progress: i32,
}

/// Roll the whole process up from its phases and every step underneath.
///
/// Progress counts steps across all phases. The process is completed only
/// once the final phase of the sequence exists and is completed.
pub fn rollup_process(phases: &[(PhaseType, StepStatus)], steps: &[StepStatus]) -> ProcessRollup {
    let progress = completion_percent(steps);
    let final_done = phases
        .iter()
        .any(|(t, s)| t.is_last() && *s == StepStatus::Completed);

    let status = if final_done {
        StepStatus::Completed
    } else if steps.iter().any(|s| *s != StepStatus::Pending) {
        StepStatus::InProgress
    } else {
        StepStatus::Pending
    };

    ProcessRollup { status, progress }
}
