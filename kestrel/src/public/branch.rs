use crate::Time;
use crate::internal::arena::CellArena;
use crate::internal::clock::{duration_to_epoch, epoch_to_duration};
use crate::internal::debug::Diagnostics;
use crate::internal::history::History;
use crate::internal::scheduler::{Refresh, Scheduler};
use crate::internal::task::TaskRecord;
use crate::public::activity::{Activity, ActivityDirective, Catalog, TaskId, TaskState};
use crate::public::cell::{Cell, CellId};
use crate::public::config::SimulationConfig;
use crate::public::failure::{Failure, KernelError};
use crate::public::resource::dynamics::{Dynamics, Expiring, Extrapolate};
use crate::public::resource::{Querier, Res, resource_key};
use crate::public::results::{Defect, ResourceReport, Segment, SimulationResults, TaskReport};
use crate::public::value::ToValue;
use hifitime::Duration;
use rayon::prelude::*;
use std::sync::Arc;
use tracing::debug;

/// One independent simulation: a cell arena, its history, its tasks, and their wake
/// conditions.
///
/// Branches share nothing mutable. [Branch::fork] deep-copies the cells, so a fork can be
/// given more activities and run without any effect on its parent, and dropping a branch
/// (or calling [Branch::discard]) is all it takes to abandon an exploration.
pub struct Branch {
    pub(crate) config: SimulationConfig,
    pub(crate) start: Duration,
    pub(crate) now: Duration,
    pub(crate) arena: CellArena,
    pub(crate) history: History,
    pub(crate) tasks: Vec<TaskRecord>,
    pub(crate) next_task: u32,
    pub(crate) queue: Scheduler,
    pub(crate) refreshers: Vec<Arc<dyn Refresh>>,
    pub(crate) watched: Vec<(String, Arc<dyn Watch>)>,
    pub(crate) merge_failures: Vec<(Duration, Failure)>,
    pub(crate) defects: Vec<Defect>,
    pub(crate) diagnostics: Diagnostics,
}

impl Branch {
    pub fn new(start: Time, config: SimulationConfig) -> Self {
        let start = epoch_to_duration(start);
        let diagnostics = if config.diagnostics {
            Diagnostics::enabled()
        } else {
            Diagnostics::disabled()
        };
        Self {
            config,
            start,
            now: start,
            arena: CellArena::new(),
            history: History::new(),
            tasks: vec![],
            next_task: 0,
            queue: Scheduler::default(),
            refreshers: vec![],
            watched: vec![],
            merge_failures: vec![],
            defects: vec![],
            diagnostics,
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn start(&self) -> Time {
        duration_to_epoch(self.start)
    }

    pub fn now(&self) -> Time {
        duration_to_epoch(self.now)
    }

    pub fn allocate<C: Cell>(&mut self, cell: C) -> CellId<C> {
        self.arena.allocate(cell)
    }

    /// The current state of a cell.
    pub fn cell<C: Cell>(&self, id: CellId<C>) -> Option<&C> {
        self.arena.slot(id).map(|slot| &slot.cell)
    }

    /// Schedules a new top-level task. `start` must not be before [Branch::now].
    pub fn schedule_activity(
        &mut self,
        activity: impl Activity + 'static,
        start: Time,
    ) -> Result<TaskId, KernelError> {
        self.schedule_shared(Arc::new(activity), start)
    }

    pub fn schedule_shared(
        &mut self,
        activity: Arc<dyn Activity>,
        start: Time,
    ) -> Result<TaskId, KernelError> {
        let at = epoch_to_duration(start);
        if at < self.now {
            return Err(KernelError::ScheduledInPast {
                requested: start,
                now: self.now(),
            });
        }
        let id = TaskId::new(self.next_task);
        self.next_task += 1;
        debug!(task = %id, name = activity.name(), %start, "scheduled activity");
        self.tasks.push(TaskRecord::new(activity, None));
        self.queue.schedule(at, id);
        Ok(id)
    }

    /// Instantiates a directive through a catalog and schedules it.
    pub fn schedule_directive(
        &mut self,
        catalog: &Catalog,
        directive: &ActivityDirective,
    ) -> anyhow::Result<TaskId> {
        let activity = catalog.instantiate(&directive.kind, &directive.arguments)?;
        Ok(self.schedule_shared(activity, directive.start)?)
    }

    /// Runs one batch: every task woken at the earliest pending instant.
    ///
    /// Returns false if nothing was pending.
    pub fn step(&mut self) -> bool {
        self.run_batch()
    }

    /// Runs batches until no task can be woken again.
    pub fn run_to_quiescence(&mut self) -> Result<(), KernelError> {
        self.run_while(|_| true)
    }

    /// Runs every batch at or before `time`, then moves the branch's clock to `time`.
    pub fn run_until(&mut self, time: Time) -> Result<(), KernelError> {
        let until = epoch_to_duration(time);
        self.run_while(|next| next <= until)?;
        self.ensure_snapshot();
        if until > self.now {
            self.arena.advance(until - self.now);
            self.now = until;
        }
        Ok(())
    }

    fn run_while(&mut self, mut condition: impl FnMut(Duration) -> bool) -> Result<(), KernelError> {
        let mut steps = 0;
        while let Some(next) = self.queue.next_time() {
            if !condition(next) {
                break;
            }
            if let Some(limit) = self.config.step_limit {
                if steps >= limit {
                    return Err(KernelError::StepLimitExceeded { limit });
                }
            }
            self.run_batch();
            steps += 1;
        }
        Ok(())
    }

    pub fn is_quiescent(&self) -> bool {
        self.queue.is_idle()
    }

    pub fn next_event(&self) -> Option<Time> {
        self.queue.next_time().map(duration_to_epoch)
    }

    /// An independent copy of this branch. Cells are deep-copied. Committed history and
    /// activity code are immutable, and are shared.
    pub fn fork(&self) -> Branch {
        Branch {
            config: self.config.clone(),
            start: self.start,
            now: self.now,
            arena: self.arena.fork(),
            history: self.history.clone(),
            tasks: self.tasks.clone(),
            next_task: self.next_task,
            queue: self.queue.clone(),
            refreshers: self.refreshers.clone(),
            watched: self.watched.clone(),
            merge_failures: self.merge_failures.clone(),
            defects: self.defects.clone(),
            diagnostics: self.diagnostics.clone(),
        }
    }

    /// Abandons this branch. In-flight tasks are dropped with it.
    pub fn discard(self) {}

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn task_state(&self, id: TaskId) -> Result<&TaskState, KernelError> {
        self.tasks
            .get(id.index())
            .map(|r| &r.state)
            .ok_or(KernelError::UnknownTask { task: id })
    }

    pub fn tasks(&self) -> impl Iterator<Item = (TaskId, &TaskState)> {
        self.tasks
            .iter()
            .enumerate()
            .map(|(i, r)| (TaskId::new(i as u32), &r.state))
    }

    /// Evaluates a resource against the current state.
    pub fn evaluate<T>(&self, resource: &Res<T>) -> Expiring<Dynamics<T>> {
        resource.evaluate(&Querier::new(&self.arena, self.now, self.now, self.start))
    }

    /// The current value of a resource.
    pub fn read<T: Clone>(&self, resource: &Res<T>) -> Result<T, Failure> {
        self.evaluate(resource).data.value()
    }

    /// Evaluates a resource at any instant since the branch started. Instants in the past
    /// are answered from history. Instants after [Branch::now] are predictions from the
    /// current state, assuming no further effects.
    pub fn evaluate_at<T>(
        &self,
        resource: &Res<T>,
        time: Time,
    ) -> Result<Expiring<Dynamics<T>>, KernelError> {
        let at = epoch_to_duration(time);
        Ok(resource.evaluate(&self.querier_at(at)?))
    }

    pub(crate) fn querier_at(&self, at: Duration) -> Result<Querier<'_>, KernelError> {
        if at < self.start {
            return Err(KernelError::QueryBeforeStart {
                requested: duration_to_epoch(at),
                start: self.start(),
            });
        }
        if at >= self.now || self.history.is_empty() {
            return Ok(Querier::new(&self.arena, self.now, at.max(self.now), self.start));
        }
        let point = self
            .history
            .index_at(at)
            .and_then(|i| self.history.get(i))
            .ok_or(KernelError::QueryBeforeStart {
                requested: duration_to_epoch(at),
                start: self.start(),
            })?;
        Ok(Querier::new(point.cells(), point.time, at, self.start))
    }

    /// The piecewise profile of a resource over a closed window.
    ///
    /// The window is split at every history point and at every positive expiry, and adjacent
    /// pieces that agree are merged. An answer that expires immediately is treated as a
    /// sample valid until the next split.
    pub fn profile<T>(
        &self,
        resource: &Res<T>,
        from: Time,
        to: Time,
    ) -> Result<Vec<Segment<T>>, KernelError>
    where
        T: Extrapolate + PartialEq,
    {
        let end = epoch_to_duration(to);
        let mut at = epoch_to_duration(from);
        let mut segments: Vec<Segment<T>> = vec![];
        let mut last_start = at;

        while at <= end {
            let answer = resource.evaluate(&self.querier_at(at)?);
            let continues = segments
                .last()
                .is_some_and(|s| s.dynamics.step(at - last_start) == answer.data);
            if !continues {
                segments.push(Segment {
                    start: duration_to_epoch(at),
                    dynamics: answer.data,
                });
                last_start = at;
            }

            let mut next = if at < self.now {
                self.history.next_after(at)
            } else {
                None
            };
            if let Some(expiry) = answer.expiry.value() {
                if expiry > Duration::ZERO {
                    let expires = at + expiry;
                    next = Some(next.map_or(expires, |n| n.min(expires)));
                }
            }
            match next {
                Some(n) => at = n,
                None => break,
            }
        }
        Ok(segments)
    }

    /// Registers a resource to be profiled in [Branch::results].
    pub fn register<T>(&mut self, name: impl Into<String>, resource: &Res<T>)
    where
        T: Extrapolate + PartialEq + ToValue,
    {
        let name = name.into();
        self.diagnostics.name(resource_key(resource), name.clone());
        self.watched
            .push((name, Arc::new(Watched(resource.clone()))));
    }

    pub fn results(&self) -> SimulationResults {
        SimulationResults {
            start: self.start(),
            end: self.now(),
            tasks: self
                .tasks
                .iter()
                .enumerate()
                .map(|(i, r)| TaskReport {
                    id: TaskId::new(i as u32),
                    name: r.name.clone(),
                    parent: r.parent,
                    state: r.state.clone(),
                })
                .collect(),
            resources: self
                .watched
                .iter()
                .map(|(name, watched)| watched.report(name, self))
                .collect(),
            merge_failures: self
                .merge_failures
                .iter()
                .map(|(t, f)| (duration_to_epoch(*t), f.clone()))
                .collect(),
            defects: self.defects.clone(),
        }
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn name_resource<T: ?Sized>(&self, resource: &Arc<T>, name: impl Into<String>) {
        self.diagnostics.name(resource_key(resource), name);
    }

    pub fn add_dependency<A: ?Sized, B: ?Sized>(&self, dependent: &Arc<A>, dependency: &Arc<B>) {
        self.diagnostics
            .add_dependency(resource_key(dependent), resource_key(dependency));
    }

    pub fn describe<T: ?Sized>(&self, resource: &Arc<T>) -> String {
        self.diagnostics.describe(resource_key(resource))
    }

    pub(crate) fn add_refresher(&mut self, refresher: Arc<dyn Refresh>) {
        self.refreshers.push(refresher);
    }
}

pub(crate) trait Watch: Send + Sync {
    fn report(&self, name: &str, branch: &Branch) -> ResourceReport;
}

struct Watched<T>(Res<T>);

impl<T> Watch for Watched<T>
where
    T: Extrapolate + PartialEq + ToValue,
{
    fn report(&self, name: &str, branch: &Branch) -> ResourceReport {
        let segments = branch
            .profile(&self.0, branch.start(), branch.now())
            .unwrap_or_default();
        let failures = segments
            .iter()
            .filter_map(|s| s.dynamics.failure().map(|f| (s.start, f.clone())))
            .collect();
        ResourceReport {
            name: name.to_string(),
            segments: segments
                .iter()
                .map(|s| Segment {
                    start: s.start,
                    dynamics: s.dynamics.to_values(),
                })
                .collect(),
            failures,
        }
    }
}

/// Runs independent branches to quiescence in parallel.
pub fn run_branches(branches: &mut [Branch]) -> Vec<Result<(), KernelError>> {
    branches
        .par_iter_mut()
        .map(|branch| branch.run_to_quiescence())
        .collect()
}
