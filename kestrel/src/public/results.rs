use crate::Time;
use crate::public::activity::{TaskId, TaskState};
use crate::public::failure::Failure;
use crate::public::resource::dynamics::Dynamics;
use crate::public::value::{ToValue, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A piece of a resource profile: the dynamics observed from `start` until the next segment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment<T> {
    pub start: Time,
    pub dynamics: Dynamics<T>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskReport {
    pub id: TaskId,
    pub name: String,
    pub parent: Option<TaskId>,
    pub state: TaskState,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceReport {
    pub name: String,
    pub segments: Vec<Segment<Value>>,
    /// Every failed segment of the profile.
    pub failures: Vec<(Time, Failure)>,
}

/// A modeling defect, such as effects whose result depended on their order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Defect {
    pub time: Time,
    pub cell: usize,
    pub description: String,
}

/// Everything a finished (or paused) branch reports about its run.
///
/// Failures never abort a run. They are collected here instead: per task its terminal state
/// and failure, per registered resource the failures its profile went through, and the
/// effect merge failures and defects the scheduler observed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationResults {
    pub start: Time,
    pub end: Time,
    pub tasks: Vec<TaskReport>,
    pub resources: Vec<ResourceReport>,
    pub merge_failures: Vec<(Time, Failure)>,
    pub defects: Vec<Defect>,
}

impl SimulationResults {
    /// Whether any task failed or any defect was recorded.
    pub fn failed(&self) -> bool {
        !self.defects.is_empty() || self.failed_tasks().next().is_some()
    }

    pub fn failed_tasks(&self) -> impl Iterator<Item = &TaskReport> {
        self.tasks
            .iter()
            .filter(|t| matches!(t.state, TaskState::Failed(_)))
    }

    /// Tasks that had not finished when the results were taken.
    pub fn pending_tasks(&self) -> impl Iterator<Item = &TaskReport> {
        self.tasks.iter().filter(|t| !t.state.is_terminal())
    }

    pub fn task(&self, id: TaskId) -> Option<&TaskReport> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn resource(&self, name: &str) -> Option<&ResourceReport> {
        self.resources.iter().find(|r| r.name == name)
    }

    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        Ok(bincode::serde::encode_to_vec(
            self,
            bincode::config::standard(),
        )?)
    }

    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        let (results, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        Ok(results)
    }
}

impl ToValue for SimulationResults {
    fn to_value(&self) -> Value {
        let mut map = BTreeMap::new();
        map.insert("start".to_string(), Value::Text(self.start.to_string()));
        map.insert("end".to_string(), Value::Text(self.end.to_string()));
        map.insert(
            "tasks".to_string(),
            Value::List(
                self.tasks
                    .iter()
                    .map(|t| {
                        let mut task = BTreeMap::new();
                        task.insert("id".to_string(), Value::Text(t.id.to_string()));
                        task.insert("name".to_string(), Value::Text(t.name.clone()));
                        let (state, failure) = match &t.state {
                            TaskState::Complete => ("complete", None),
                            TaskState::Failed(f) => ("failed", Some(f.to_string())),
                            _ => ("pending", None),
                        };
                        task.insert("state".to_string(), Value::Text(state.to_string()));
                        if let Some(failure) = failure {
                            task.insert("failure".to_string(), Value::Text(failure));
                        }
                        Value::Map(task)
                    })
                    .collect(),
            ),
        );
        map.insert(
            "resources".to_string(),
            Value::Map(
                self.resources
                    .iter()
                    .map(|r| {
                        let segments = r
                            .segments
                            .iter()
                            .map(|s| {
                                Value::List(vec![
                                    Value::Text(s.start.to_string()),
                                    s.dynamics.to_value(),
                                ])
                            })
                            .collect();
                        (r.name.clone(), Value::List(segments))
                    })
                    .collect(),
            ),
        );
        map.insert("failed".to_string(), Value::Bool(self.failed()));
        Value::Map(map)
    }
}
