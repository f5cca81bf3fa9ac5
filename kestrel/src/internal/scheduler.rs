use crate::internal::arena::{CellArena, PendingEffect};
use crate::internal::clock::duration_to_epoch;
use crate::internal::task::TaskRecord;
use crate::public::activity::{Interrupt, TaskContext, TaskId, TaskState};
use crate::public::branch::Branch;
use crate::public::failure::Failure;
use crate::public::results::Defect;
use ahash::AHashMap;
use hifitime::Duration;
use smallvec::SmallVec;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error, trace, warn};

/// Kernel-owned state that is recomputed after every commit, before the commit is recorded.
pub trait Refresh: Send + Sync {
    fn refresh(&self, cells: &mut CellArena, now: Duration, start: Duration);
}

/// Pending wake conditions.
#[derive(Clone, Default)]
pub struct Scheduler {
    timed: BTreeMap<Duration, BTreeSet<TaskId>>,
    awaiting: AHashMap<TaskId, SmallVec<TaskId, 2>>,
}

impl Scheduler {
    pub fn schedule(&mut self, time: Duration, task: TaskId) {
        self.timed.entry(time).or_default().insert(task);
    }

    pub fn wait_for(&mut self, target: TaskId, waiter: TaskId) {
        self.awaiting.entry(target).or_default().push(waiter);
    }

    pub fn take_waiters(&mut self, target: TaskId) -> SmallVec<TaskId, 2> {
        self.awaiting.remove(&target).unwrap_or_default()
    }

    pub fn next_time(&self) -> Option<Duration> {
        self.timed.first_key_value().map(|(t, _)| *t)
    }

    pub fn pop(&mut self) -> Option<(Duration, BTreeSet<TaskId>)> {
        self.timed.pop_first()
    }

    /// Whether no task can ever be woken again. Tasks may still be awaiting each other.
    pub fn is_idle(&self) -> bool {
        self.timed.is_empty()
    }
}

impl Branch {
    /// Records the current cells as a history point if none covers them yet.
    pub(crate) fn ensure_snapshot(&mut self) {
        let stale = match self.history.last() {
            Some(point) => point.cells().len() < self.arena.len(),
            None => true,
        };
        if stale {
            self.history.push(self.now, self.arena.fork());
        }
    }

    /// Runs every task waiting on the earliest wake time, then commits their effects.
    ///
    /// Returns false if nothing was scheduled.
    pub(crate) fn run_batch(&mut self) -> bool {
        let Some((time, batch)) = self.queue.pop() else {
            return false;
        };
        self.ensure_snapshot();
        if time > self.now {
            self.arena.advance(time - self.now);
            self.now = time;
        }
        let Some(point) = self.history.last_index() else {
            return false;
        };

        let mut effects: BTreeMap<usize, SmallVec<PendingEffect, 2>> = BTreeMap::new();
        let mut spawned = vec![];
        let mut awaits = vec![];
        let mut finished = vec![];
        let task_count = batch.len();

        for id in batch {
            let outcome = match self.tasks.get(id.index()).map(|r| &r.state) {
                Some(TaskState::AwaitingCompletion(target)) => self
                    .tasks
                    .get(target.index())
                    .and_then(|t| t.state.outcome()),
                _ => None,
            };
            let Some(record) = self.tasks.get_mut(id.index()) else {
                continue;
            };
            let Some(crumb) = record.resumption(point, time, outcome) else {
                continue;
            };
            record.breadcrumbs.push(crumb);
            record.state = TaskState::Running;

            let activity = record.activity.clone();
            let mut ctx = TaskContext::new(
                id,
                &self.history,
                &record.breadcrumbs,
                self.start,
                self.config.check_replay,
                &mut self.next_task,
            );
            let result = activity.run(&mut ctx);
            let output = ctx.finish(result);

            record.breadcrumbs.extend(output.recorded);
            record.state = match output.result {
                Ok(()) => TaskState::Complete,
                Err(Interrupt::Defer(delay)) if delay >= Duration::ZERO => {
                    self.queue.schedule(time + delay, id);
                    TaskState::Deferred(delay)
                }
                Err(Interrupt::Defer(delay)) => TaskState::Failed(Failure::model(format!(
                    "cannot defer by a negative duration ({delay})"
                ))),
                Err(Interrupt::Await(target)) => {
                    awaits.push((id, target));
                    TaskState::AwaitingCompletion(target)
                }
                Err(Interrupt::Fail(failure)) => TaskState::Failed(failure),
            };
            trace!(task = %id, name = %record.name, state = ?record.state, "stepped task");

            if let TaskState::Failed(failure) = &record.state {
                warn!(task = %id, name = %record.name, %failure, "task failed");
            }
            if record.state.is_terminal() {
                finished.push(id);
            }
            for (cell, effect) in output.effects {
                effects.entry(cell).or_default().push(effect);
            }
            spawned.extend(output.spawned.into_iter().map(|(child, a)| (child, a, id)));
        }

        let probe = self
            .config
            .check_commutativity
            .then_some(self.config.float_tolerance);
        let effect_count: usize = effects.values().map(|e| e.len()).sum();
        for (cell, batch) in &effects {
            let report = self.arena.commit(*cell, batch, probe);
            if let Some(failure) = report.failure {
                warn!(cell, time = %duration_to_epoch(time), %failure, "effect merge failed");
                self.merge_failures.push((time, failure));
            }
            if let Some(description) = report.violation {
                error!(cell, time = %duration_to_epoch(time), %description, "effects do not commute");
                self.defects.push(Defect {
                    time: duration_to_epoch(time),
                    cell: *cell,
                    description,
                });
            }
        }

        for refresher in &self.refreshers {
            refresher.refresh(&mut self.arena, time, self.start);
        }
        self.history.push(time, self.arena.fork());

        for (child, activity, parent) in spawned {
            debug_assert_eq!(child.index(), self.tasks.len());
            trace!(task = %child, parent = %parent, "spawned task");
            self.tasks.push(TaskRecord::new(activity, Some(parent)));
            self.queue.schedule(time, child);
        }

        for (waiter, target) in awaits {
            match self.tasks.get(target.index()) {
                Some(t) if !t.state.is_terminal() => self.queue.wait_for(target, waiter),
                _ => self.queue.schedule(time, waiter),
            }
        }

        for id in finished {
            for waiter in self.queue.take_waiters(id) {
                self.queue.schedule(time, waiter);
            }
        }

        debug!(
            time = %duration_to_epoch(time),
            tasks = task_count,
            effects = effect_count,
            "committed batch"
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hifitime::TimeUnits;

    #[test]
    fn pops_earliest_time_first() {
        let mut scheduler = Scheduler::default();
        scheduler.schedule(5.seconds(), TaskId::new(2));
        scheduler.schedule(1.seconds(), TaskId::new(3));
        scheduler.schedule(5.seconds(), TaskId::new(0));
        scheduler.schedule(5.seconds(), TaskId::new(2));

        assert_eq!(Some(1.seconds()), scheduler.next_time());
        let (time, batch) = scheduler.pop().unwrap();
        assert_eq!(1.seconds(), time);
        assert_eq!(vec![TaskId::new(3)], batch.into_iter().collect::<Vec<_>>());

        let (_, batch) = scheduler.pop().unwrap();
        assert_eq!(
            vec![TaskId::new(0), TaskId::new(2)],
            batch.into_iter().collect::<Vec<_>>()
        );
        assert!(scheduler.is_idle());
    }

    #[test]
    fn waiters_are_taken_once() {
        let mut scheduler = Scheduler::default();
        scheduler.wait_for(TaskId::new(0), TaskId::new(1));
        scheduler.wait_for(TaskId::new(0), TaskId::new(2));
        assert_eq!(2, scheduler.take_waiters(TaskId::new(0)).len());
        assert!(scheduler.take_waiters(TaskId::new(0)).is_empty());
    }
}
