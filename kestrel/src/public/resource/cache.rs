//! Caching expensive derived resources.
//!
//! A cache keeps the last accepted answer of its source in a cell. After every commit the
//! scheduler re-evaluates the source and asks the update predicate whether the new value
//! differs meaningfully from the cached one; only then is the cached answer replaced. Failures
//! are always meaningful: moving between a value and a failure refreshes the cache, and so does
//! moving between two different failures.
//!
//! When the predicate rejects an update, the cached dynamics are kept but their expiry is
//! revalidated against the fresh source answer, so a cache never claims to be valid for longer
//! than its source. Between commits, a cached answer whose expiry has lapsed is checked
//! against the source again at read time.

use crate::internal::arena::CellArena;
use crate::internal::scheduler::Refresh;
use crate::public::branch::Branch;
use crate::public::cell::CellId;
use crate::public::cell::builtins::Latch;
use crate::public::resource::dynamics::{Dynamics, Expiring, Expiry, Extrapolate};
use crate::public::resource::{Querier, Res, Resource};
use hifitime::Duration;
use std::fmt::Debug;
use std::sync::Arc;

type Predicate<T> = Arc<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// Caches `source`, replacing the cached answer only when `predicate(old, new)` is true.
pub fn cache<T, P>(branch: &mut Branch, source: &Res<T>, predicate: P) -> Res<T>
where
    T: Extrapolate + PartialEq + Debug,
    P: Fn(&T, &T) -> bool + Send + Sync + 'static,
{
    let held = branch.evaluate(source);
    let latch = branch.allocate(Latch::new(held));
    let cached = Arc::new(Cached {
        latch,
        source: source.clone(),
        predicate: Arc::new(predicate),
    });
    branch.add_refresher(cached.clone());
    let resource: Res<T> = cached;
    branch.add_dependency(&resource, source);
    resource
}

/// A cache that refreshes whenever the value changes at all.
pub fn cache_on_change<T>(branch: &mut Branch, source: &Res<T>) -> Res<T>
where
    T: Extrapolate + PartialEq + Debug,
{
    cache(branch, source, |old, new| old != new)
}

struct Cached<T> {
    latch: CellId<Latch<T>>,
    source: Res<T>,
    predicate: Predicate<T>,
}

impl<T: Extrapolate> Cached<T> {
    /// Whether the fresh answer should replace the held one.
    fn should_update(&self, held: &Dynamics<T>, fresh: &Dynamics<T>) -> bool {
        match (held.value(), fresh.value()) {
            (Ok(old), Ok(new)) => (self.predicate)(&old, &new),
            (Ok(_), Err(_)) | (Err(_), Ok(_)) => true,
            (Err(old), Err(new)) => old != new,
        }
    }

    fn revalidate(
        &self,
        held: Expiring<Dynamics<T>>,
        fresh: Expiring<Dynamics<T>>,
    ) -> Expiring<Dynamics<T>> {
        if self.should_update(&held.data, &fresh.data) {
            fresh
        } else {
            Expiring::new(held.data, fresh.expiry)
        }
    }
}

impl<T: Extrapolate + PartialEq + Debug> Resource<T> for Cached<T> {
    fn evaluate(&self, q: &Querier) -> Expiring<Dynamics<T>> {
        let cell = match q.cell(self.latch) {
            Ok(cell) => cell,
            Err(failure) => return Expiring::new(Dynamics::Failed(failure), Expiry::NOW),
        };
        let held = cell.held.step(q.elapsed());
        if cell.held.expiry.covers(q.elapsed()) {
            held
        } else {
            self.revalidate(held, self.source.evaluate(q))
        }
    }
}

impl<T: Extrapolate + PartialEq + Debug> Refresh for Cached<T> {
    fn refresh(&self, cells: &mut CellArena, now: Duration, start: Duration) {
        let next = {
            let q = Querier::new(cells, now, now, start);
            let Ok(cell) = q.cell(self.latch) else {
                return;
            };
            self.revalidate(cell.held.clone(), self.source.evaluate(&q))
        };
        if let Some(slot) = cells.slot_mut(self.latch) {
            slot.cell.held = next;
        }
    }
}
