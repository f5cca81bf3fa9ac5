use crate::Time;
use crate::public::activity::TaskId;
use derive_more::with_trait::Error as DeriveError;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// A failure carried as a value through the simulation.
///
/// Failures never unwind across the scheduler. A failing task ends in
/// [TaskState::Failed][crate::TaskState::Failed], a failing effect merge marks one cell
/// for one instant, and a failing resource evaluation yields
/// [Dynamics::Failed][crate::Dynamics::Failed]. Any of them can be reported
/// afterwards through [SimulationResults][crate::SimulationResults].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, DeriveError)]
pub enum Failure {
    /// Model code returned an error.
    Model { reason: String },
    /// An assertion resource observed a false value.
    Assertion { description: String },
    /// Combining or applying the effects on one cell at one instant failed.
    EffectMerge { cell: usize, reason: String },
    /// The task being awaited ended in failure instead of completing.
    AwaitedTaskFailed { task: TaskId },
    /// The task being awaited does not exist in this branch.
    UnknownTask { task: TaskId },
    /// Replayed model code made a different decision than it did originally.
    ReplayDivergence { expected: String, found: String },
    /// A derived resource could not be computed.
    Evaluation { reason: String },
}

impl Failure {
    pub fn model(reason: impl Display) -> Self {
        Failure::Model {
            reason: reason.to_string(),
        }
    }

    pub fn evaluation(reason: impl Display) -> Self {
        Failure::Evaluation {
            reason: reason.to_string(),
        }
    }
}

impl Display for Failure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Failure::Model { reason } => write!(f, "model failure: {reason}"),
            Failure::Assertion { description } => write!(f, "assertion failed: {description}"),
            Failure::EffectMerge { cell, reason } => {
                write!(f, "could not merge effects on cell {cell}: {reason}")
            }
            Failure::AwaitedTaskFailed { task } => write!(f, "awaited task {task} failed"),
            Failure::UnknownTask { task } => write!(f, "awaited task {task} does not exist"),
            Failure::ReplayDivergence { expected, found } => write!(
                f,
                "replay diverged from its breadcrumbs: expected {expected}, found {found}"
            ),
            Failure::Evaluation { reason } => write!(f, "evaluation failed: {reason}"),
        }
    }
}

/// Errors from misusing the kernel API, as opposed to failures inside the simulation.
#[derive(Clone, Debug, PartialEq, DeriveError)]
pub enum KernelError {
    ScheduledInPast { requested: Time, now: Time },
    StepLimitExceeded { limit: usize },
    UnknownTask { task: TaskId },
    QueryBeforeStart { requested: Time, start: Time },
}

impl Display for KernelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            KernelError::ScheduledInPast { requested, now } => write!(
                f,
                "cannot schedule an activity at {requested}, the branch is already at {now}"
            ),
            KernelError::StepLimitExceeded { limit } => {
                write!(f, "simulation did not quiesce within {limit} steps")
            }
            KernelError::UnknownTask { task } => write!(f, "no task with id {task}"),
            KernelError::QueryBeforeStart { requested, start } => write!(
                f,
                "cannot query {requested}, the branch starts at {start}"
            ),
        }
    }
}
