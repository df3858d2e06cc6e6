//! Check gating: whether the check runs of a task let it proceed.

use crate::pipeline::domain::{
    TaskCheckResult, TaskCheckRun, TaskCheckRunStatus, TaskCheckStatus, TaskCheckType,
};

/// Outcome of evaluating a task's check runs against a threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckVerdict {
    /// Every planned check finished within the threshold.
    Passed,
    /// Some planned checks have no finished run yet.
    Waiting(Vec<TaskCheckType>),
    /// Some planned checks reported results above the threshold.
    Blocked(Vec<TaskCheckResult>),
}

impl CheckVerdict {
    /// Returns `true` for [`Self::Passed`].
    #[must_use]
    pub const fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

/// Evaluates `runs` (oldest first) for the `planned` check types.
///
/// Only the latest run of each planned type counts. A missing or running
/// run keeps the task waiting; a failed or canceled run, or any result more
/// severe than `threshold`, blocks it.
#[must_use]
pub fn evaluate_checks(
    planned: &[TaskCheckType],
    runs: &[TaskCheckRun],
    threshold: TaskCheckStatus,
) -> CheckVerdict {
    let mut waiting = Vec::new();
    let mut blocking = Vec::new();
    for check_type in planned {
        let latest = runs
            .iter()
            .rev()
            .find(|run| run.check_type() == *check_type);
        match latest.map(|run| (run.status(), run)) {
            None | Some((TaskCheckRunStatus::Running, _)) => waiting.push(*check_type),
            Some((TaskCheckRunStatus::Canceled, run)) => blocking.push(TaskCheckResult::error(
                format!("{} check canceled", run.check_type().as_str()),
                "the check run was canceled before it finished",
            )),
            Some((TaskCheckRunStatus::Failed, run)) => {
                if run.results().is_empty() {
                    blocking.push(TaskCheckResult::error(
                        format!("{} check failed", run.check_type().as_str()),
                        "the check run failed without reporting a result",
                    ));
                } else {
                    blocking.extend_from_slice(run.results());
                }
            }
            Some((TaskCheckRunStatus::Done, run)) => blocking.extend(
                run.results()
                    .iter()
                    .filter(|result| result.status > threshold)
                    .cloned(),
            ),
        }
    }

    if !blocking.is_empty() {
        CheckVerdict::Blocked(blocking)
    } else if !waiting.is_empty() {
        CheckVerdict::Waiting(waiting)
    } else {
        CheckVerdict::Passed
    }
}
