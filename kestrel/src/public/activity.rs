//! Activities and the context they run in.
//!
//! An activity is model code the scheduler steps through simulated time. It is written as an
//! ordinary function over a [TaskContext], and suspends by returning the [Interrupt] produced
//! by [TaskContext::defer] or [TaskContext::await_completion], usually with `?`:
//!
//! ```
//! # use kestrel::*;
//! let burn = activity(|ctx| {
//!     ctx.defer(5.seconds())?;
//!     Ok(())
//! });
//! ```
//!
//! ## Replay
//!
//! Tasks are not suspended as continuations. Each time a task resumes, its code runs again from
//! the beginning against its breadcrumbs: every suspension it already passed returns
//! immediately with the recorded outcome, reads are answered from the history point that was
//! current at the time, and effects emitted before the latest resumption are dropped. Model code
//! must therefore be a pure function of what it reads through the context. Anything else
//! (randomness, wall-clock time, external I/O, interior mutability) makes replay diverge.

use crate::Time;
use crate::internal::arena::PendingEffect;
use crate::internal::clock::duration_to_epoch;
use crate::internal::history::History;
use crate::internal::task::{Breadcrumb, Cause, Outcome};
use crate::public::cell::{Cell, CellId, Effect};
use crate::public::failure::Failure;
use crate::public::resource::dynamics::{Dynamics, Expiring, Expiry};
use crate::public::resource::{Querier, Res};
use crate::public::value::Value;
use ahash::AHashMap;
use anyhow::anyhow;
use hifitime::Duration;
use serde::{Deserialize, Serialize};
use std::any::type_name;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// A branch-unique, deterministically allocated task id.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize, Debug)]
pub struct TaskId(u32);

impl TaskId {
    pub(crate) fn new(id: u32) -> Self {
        TaskId(id)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a task is in its lifecycle.
///
/// Spawning a child never suspends the parent, so a spawning task stays [TaskState::Running]
/// until it defers, awaits, or finishes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TaskState {
    Fresh,
    Running,
    Deferred(Duration),
    AwaitingCompletion(TaskId),
    Complete,
    Failed(Failure),
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Complete | TaskState::Failed(_))
    }
}

/// Why a task stopped before completing.
#[derive(Clone, Debug, PartialEq)]
pub enum Interrupt {
    Defer(Duration),
    Await(TaskId),
    Fail(Failure),
}

impl From<Failure> for Interrupt {
    fn from(failure: Failure) -> Self {
        Interrupt::Fail(failure)
    }
}

impl From<anyhow::Error> for Interrupt {
    fn from(error: anyhow::Error) -> Self {
        Interrupt::Fail(Failure::model(format!("{error:#}")))
    }
}

pub type TaskResult = Result<(), Interrupt>;

pub trait Activity: Send + Sync {
    fn run(&self, ctx: &mut TaskContext) -> TaskResult;

    fn name(&self) -> &str {
        type_name::<Self>()
    }
}

/// An [Activity] made from a closure. See [activity].
pub struct FnActivity<F> {
    name: String,
    body: F,
}

impl<F> FnActivity<F> {
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl<F> Activity for FnActivity<F>
where
    F: Fn(&mut TaskContext) -> TaskResult + Send + Sync,
{
    fn run(&self, ctx: &mut TaskContext) -> TaskResult {
        (self.body)(ctx)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Wraps a closure as an activity.
pub fn activity<F>(body: F) -> FnActivity<F>
where
    F: Fn(&mut TaskContext<'_>) -> TaskResult + Send + Sync + 'static,
{
    FnActivity {
        name: "activity".to_string(),
        body,
    }
}

/// The interface between one step of a task and the branch it runs in.
pub struct TaskContext<'a> {
    id: TaskId,
    history: &'a History,
    crumbs: &'a [Breadcrumb],
    cursor: usize,
    point: usize,
    time: Duration,
    start: Duration,
    check_replay: bool,
    next_id: &'a mut u32,
    suspension: Option<Interrupt>,
    divergence: Option<Failure>,
    effects: Vec<(usize, PendingEffect)>,
    spawned: Vec<(TaskId, Arc<dyn Activity>)>,
    recorded: Vec<Breadcrumb>,
}

/// Everything one step of a task produced.
pub(crate) struct StepOutput {
    pub result: TaskResult,
    pub effects: Vec<(usize, PendingEffect)>,
    pub spawned: Vec<(TaskId, Arc<dyn Activity>)>,
    pub recorded: Vec<Breadcrumb>,
}

impl<'a> TaskContext<'a> {
    /// The trail must begin with the task's start breadcrumb.
    pub(crate) fn new(
        id: TaskId,
        history: &'a History,
        crumbs: &'a [Breadcrumb],
        start: Duration,
        check_replay: bool,
        next_id: &'a mut u32,
    ) -> Self {
        let mut ctx = Self {
            id,
            history,
            crumbs,
            cursor: 0,
            point: 0,
            time: start,
            start,
            check_replay,
            next_id,
            suspension: None,
            divergence: None,
            effects: vec![],
            spawned: vec![],
            recorded: vec![],
        };
        match crumbs.first() {
            Some(Breadcrumb::Advance {
                point,
                time,
                cause: Cause::Start,
            }) => {
                ctx.cursor = 1;
                ctx.point = *point;
                ctx.time = *time;
            }
            other => {
                let found = other.map_or("nothing".to_string(), |c| c.to_string());
                ctx.diverge("start".to_string(), found);
            }
        }
        ctx
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// The simulated instant this part of the task runs at.
    pub fn now(&self) -> Time {
        duration_to_epoch(self.time)
    }

    /// Whether the task is re-deriving decisions it already made in an earlier step.
    pub fn is_replaying(&self) -> bool {
        self.cursor < self.crumbs.len()
    }

    /// Evaluates a resource at the current instant, against the state committed before it.
    pub fn dynamics<T>(&self, resource: &Res<T>) -> Expiring<Dynamics<T>> {
        match self.history.get(self.point) {
            Some(point) => resource.evaluate(&Querier::new(
                &point.cells,
                point.time,
                self.time,
                self.start,
            )),
            None => Expiring::new(
                Dynamics::Failed(Failure::evaluation("no committed state to read")),
                Expiry::NOW,
            ),
        }
    }

    /// The current value of a resource. A failed resource fails the task.
    pub fn get<T: Clone>(&self, resource: &Res<T>) -> Result<T, Interrupt> {
        Ok(self.dynamics(resource).data.value()?)
    }

    /// Emits an effect on a cell, to be committed with the rest of this instant's batch.
    ///
    /// Effects emitted while replaying were already committed, and are dropped.
    pub fn emit<C: Cell>(&mut self, cell: CellId<C>, effect: Effect<C>) {
        if self.is_replaying() || self.suspension.is_some() {
            return;
        }
        self.effects.push((cell.index(), Box::new(effect)));
    }

    /// Suspends the task for a duration.
    pub fn defer(&mut self, duration: Duration) -> TaskResult {
        if let Some(interrupt) = &self.suspension {
            return Err(interrupt.clone());
        }
        if duration < Duration::ZERO {
            return Err(Interrupt::Fail(Failure::model(format!(
                "cannot defer by a negative duration ({duration})"
            ))));
        }
        let requested = format!("defer({duration})");
        match self.crumbs.get(self.cursor).copied() {
            Some(Breadcrumb::Advance {
                point,
                time,
                cause: Cause::Delay(recorded),
            }) => {
                if self.check_replay && recorded != duration {
                    return Err(self.diverge(format!("defer({recorded})"), requested));
                }
                self.resume_at(point, time);
                Ok(())
            }
            Some(other) => Err(self.diverge(other.to_string(), requested)),
            None => Err(self.suspend(Interrupt::Defer(duration))),
        }
    }

    /// Suspends the task until `time`. Does nothing if `time` is not in the future.
    pub fn defer_until(&mut self, time: Time) -> TaskResult {
        let delay = time - self.now();
        if delay > Duration::ZERO {
            self.defer(delay)
        } else {
            Ok(())
        }
    }

    /// Suspends the task until another task completes.
    ///
    /// Resumes with [Failure::AwaitedTaskFailed] if the awaited task failed, or
    /// [Failure::UnknownTask] if it does not exist.
    pub fn await_completion(&mut self, task: TaskId) -> TaskResult {
        if let Some(interrupt) = &self.suspension {
            return Err(interrupt.clone());
        }
        let requested = format!("await_completion({task})");
        match self.crumbs.get(self.cursor).copied() {
            Some(Breadcrumb::Advance {
                point,
                time,
                cause:
                    Cause::Completion {
                        task: recorded,
                        outcome,
                    },
            }) => {
                if self.check_replay && recorded != task {
                    let expected = format!("await_completion({recorded})");
                    return Err(self.diverge(expected, requested));
                }
                self.resume_at(point, time);
                match outcome {
                    Outcome::Completed => Ok(()),
                    Outcome::Failed => Err(Failure::AwaitedTaskFailed { task }.into()),
                    Outcome::Unknown => Err(Failure::UnknownTask { task }.into()),
                }
            }
            Some(other) => Err(self.diverge(other.to_string(), requested)),
            None => Err(self.suspend(Interrupt::Await(task))),
        }
    }

    /// Spawns a child task that starts at the current instant. The parent keeps running.
    pub fn spawn(&mut self, activity: impl Activity + 'static) -> Result<TaskId, Interrupt> {
        if let Some(interrupt) = &self.suspension {
            return Err(interrupt.clone());
        }
        match self.crumbs.get(self.cursor).copied() {
            Some(Breadcrumb::Spawn { child }) => {
                self.cursor += 1;
                Ok(child)
            }
            Some(other) => {
                let found = format!("spawn({})", activity.name());
                Err(self.diverge(other.to_string(), found))
            }
            None => {
                let child = TaskId::new(*self.next_id);
                *self.next_id += 1;
                self.recorded.push(Breadcrumb::Spawn { child });
                self.spawned.push((child, Arc::new(activity)));
                Ok(child)
            }
        }
    }

    /// Spawns a child and suspends until it completes.
    pub fn call(&mut self, activity: impl Activity + 'static) -> TaskResult {
        let child = self.spawn(activity)?;
        self.await_completion(child)
    }

    /// Fails the task with a modeling failure.
    pub fn fail<T>(&self, reason: impl Display) -> Result<T, Interrupt> {
        Err(Interrupt::Fail(Failure::model(reason)))
    }

    fn resume_at(&mut self, point: usize, time: Duration) {
        self.cursor += 1;
        self.point = point;
        self.time = time;
    }

    fn suspend(&mut self, interrupt: Interrupt) -> Interrupt {
        self.suspension = Some(interrupt.clone());
        interrupt
    }

    fn diverge(&mut self, expected: String, found: String) -> Interrupt {
        let failure = Failure::ReplayDivergence { expected, found };
        self.divergence.get_or_insert(failure.clone());
        self.suspend(Interrupt::Fail(failure))
    }

    pub(crate) fn finish(mut self, result: TaskResult) -> StepOutput {
        if self.divergence.is_none() && self.is_replaying() {
            let expected = self.crumbs[self.cursor].to_string();
            let found = match &result {
                Ok(()) => "completion".to_string(),
                Err(Interrupt::Fail(failure)) => format!("failure ({failure})"),
                Err(other) => format!("{other:?}"),
            };
            self.diverge(expected, found);
        }
        // A suspension stands even if the model discarded the interrupt it returned.
        let result = match (self.divergence, self.suspension) {
            (Some(failure), _) => Err(Interrupt::Fail(failure)),
            (None, Some(interrupt)) => Err(interrupt),
            (None, None) => result,
        };
        StepOutput {
            result,
            effects: self.effects,
            spawned: self.spawned,
            recorded: self.recorded,
        }
    }
}

type Constructor = Arc<dyn Fn(&Value) -> anyhow::Result<Arc<dyn Activity>> + Send + Sync>;

/// A registry of activity types that can be instantiated from boundary values.
#[derive(Clone, Default)]
pub struct Catalog {
    constructors: AHashMap<String, Constructor>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a constructor for activities of type `kind`.
    pub fn register<A, F>(&mut self, kind: impl Into<String>, constructor: F) -> &mut Self
    where
        A: Activity + 'static,
        F: Fn(&Value) -> anyhow::Result<A> + Send + Sync + 'static,
    {
        let erased: Constructor =
            Arc::new(move |args: &Value| -> anyhow::Result<Arc<dyn Activity>> {
                Ok(Arc::new(constructor(args)?))
            });
        self.constructors.insert(kind.into(), erased);
        self
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    pub fn instantiate(&self, kind: &str, arguments: &Value) -> anyhow::Result<Arc<dyn Activity>> {
        let constructor = self
            .constructors
            .get(kind)
            .ok_or_else(|| anyhow!("no activity type named {kind:?} in the catalog"))?;
        constructor(arguments)
    }
}

/// An activity instance as it crosses the boundary: a type name, a start time, and arguments.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActivityDirective {
    pub kind: String,
    pub start: Time,
    pub arguments: Value,
}
