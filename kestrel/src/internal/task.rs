use crate::public::activity::{Activity, TaskId, TaskState};
use hifitime::Duration;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// How an awaited task ended, as observed when the awaiter resumed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed,
    Unknown,
}

/// Why a task resumed at a recorded point.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Cause {
    Start,
    Delay(Duration),
    Completion { task: TaskId, outcome: Outcome },
}

/// One recorded decision in a task's trail.
///
/// `Advance` records a history point the task resumed at. `Spawn` records a child the task
/// spawned, so replay hands back the same id instead of spawning it again.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Breadcrumb {
    Advance {
        point: usize,
        time: Duration,
        cause: Cause,
    },
    Spawn {
        child: TaskId,
    },
}

impl Display for Breadcrumb {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Breadcrumb::Advance { cause, .. } => match cause {
                Cause::Start => write!(f, "start"),
                Cause::Delay(d) => write!(f, "defer({d})"),
                Cause::Completion { task, .. } => write!(f, "await_completion({task})"),
            },
            Breadcrumb::Spawn { child } => write!(f, "spawn({child})"),
        }
    }
}

#[derive(Clone)]
pub struct TaskRecord {
    pub activity: Arc<dyn Activity>,
    pub name: String,
    pub parent: Option<TaskId>,
    pub state: TaskState,
    pub breadcrumbs: Vec<Breadcrumb>,
}

impl TaskRecord {
    pub fn new(activity: Arc<dyn Activity>, parent: Option<TaskId>) -> Self {
        Self {
            name: activity.name().to_string(),
            activity,
            parent,
            state: TaskState::Fresh,
            breadcrumbs: vec![],
        }
    }

    /// The breadcrumb recording why the task is about to resume. `None` for terminal tasks.
    pub fn resumption(
        &self,
        point: usize,
        time: Duration,
        outcome: Option<Outcome>,
    ) -> Option<Breadcrumb> {
        let cause = match &self.state {
            TaskState::Fresh => Cause::Start,
            TaskState::Deferred(d) => Cause::Delay(*d),
            TaskState::AwaitingCompletion(task) => Cause::Completion {
                task: *task,
                outcome: outcome.unwrap_or(Outcome::Unknown),
            },
            TaskState::Running | TaskState::Complete | TaskState::Failed(_) => return None,
        };
        Some(Breadcrumb::Advance { point, time, cause })
    }
}

impl TaskState {
    pub(crate) fn outcome(&self) -> Option<Outcome> {
        match self {
            TaskState::Complete => Some(Outcome::Completed),
            TaskState::Failed(_) => Some(Outcome::Failed),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::public::activity::activity;
    use hifitime::TimeUnits;

    #[test]
    fn resumption_reflects_state() {
        let mut record = TaskRecord::new(Arc::new(activity(|_| Ok(()))), None);
        assert_eq!(
            Some(Breadcrumb::Advance {
                point: 0,
                time: Duration::ZERO,
                cause: Cause::Start
            }),
            record.resumption(0, Duration::ZERO, None)
        );

        record.state = TaskState::Deferred(3.seconds());
        assert_eq!(
            Some(Breadcrumb::Advance {
                point: 4,
                time: 3.seconds(),
                cause: Cause::Delay(3.seconds())
            }),
            record.resumption(4, 3.seconds(), None)
        );

        record.state = TaskState::Complete;
        assert_eq!(None, record.resumption(5, 3.seconds(), None));
    }
}
