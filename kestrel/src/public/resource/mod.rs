//! Lazily evaluated, expiry-aware resources.
//!
//! A resource is a pure function of one committed state of the cells. Evaluating it yields the
//! [Dynamics] of its value at the query instant, together with an [Expiry] bounding how long
//! that answer stays valid if no further effects are committed. Combinators in [discrete],
//! [real], and [cache] build composite resources from simpler ones, always propagating the
//! tightest expiry their inputs imply.
//!
//! Failures are values. A resource that cannot be computed evaluates to [Dynamics::Failed],
//! and every combinator passes failed inputs through instead of aborting, so one failing
//! resource never prevents the evaluation of its siblings.

pub mod cache;
pub mod discrete;
pub mod dynamics;
pub mod real;

use crate::Time;
use crate::internal::arena::CellArena;
use crate::internal::clock::duration_to_epoch;
use crate::public::cell::{Cell, CellId};
use crate::public::failure::Failure;
use dynamics::{Dynamics, Expiring, Expiry, Extrapolate};
use hifitime::Duration;
use std::sync::Arc;

/// Read access to one committed state of a branch's cells, at some instant at or after the
/// commit.
pub struct Querier<'a> {
    pub(crate) cells: &'a CellArena,
    pub(crate) committed: Duration,
    pub(crate) now: Duration,
    pub(crate) start: Duration,
}

impl<'a> Querier<'a> {
    pub(crate) fn new(
        cells: &'a CellArena,
        committed: Duration,
        now: Duration,
        start: Duration,
    ) -> Self {
        debug_assert!(now >= committed);
        Self {
            cells,
            committed,
            now,
            start,
        }
    }

    /// The query instant.
    pub fn now(&self) -> Time {
        duration_to_epoch(self.now)
    }

    /// Time elapsed since the cells were committed.
    pub fn elapsed(&self) -> Duration {
        self.now - self.committed
    }

    /// Time elapsed since the branch started.
    pub fn since_start(&self) -> Duration {
        self.now - self.start
    }

    /// The committed state of a cell, *not* advanced to the query instant.
    ///
    /// Fails if the effects committed to the cell at the query instant could not be merged.
    pub fn cell<C: Cell>(&self, id: CellId<C>) -> Result<&C, Failure> {
        let slot = self.cells.slot(id).ok_or_else(|| {
            Failure::evaluation(format!("cell {} does not exist in this branch", id.index()))
        })?;
        match &slot.failure {
            Some(failure) if self.now == self.committed => Err(failure.clone()),
            _ => Ok(&slot.cell),
        }
    }

    /// A cell's primary dynamics, stepped to the query instant.
    pub fn cell_dynamics<C: Cell>(&self, id: CellId<C>) -> Dynamics<C::Value> {
        match self.cell(id) {
            Ok(cell) => cell.dynamics().step(self.elapsed()),
            Err(failure) => Dynamics::Failed(failure),
        }
    }

    pub(crate) fn cell_expiry<C: Cell>(&self, id: CellId<C>) -> Expiry {
        match self.cell(id) {
            Ok(_) => Expiry::NEVER,
            // Merge failures clear as soon as time moves on.
            Err(_) => Expiry::NOW,
        }
    }
}

/// A pull-based function of time over the cells of a branch.
///
/// Implementations must be pure: evaluating the same resource against the same committed
/// state at the same instant always yields the same answer, and re-evaluating before the
/// returned expiry yields dynamics equal to the earlier answer stepped forward.
pub trait Resource<T>: Send + Sync {
    fn evaluate(&self, querier: &Querier) -> Expiring<Dynamics<T>>;
}

/// A shared handle to a resource.
pub type Res<T> = Arc<dyn Resource<T>>;

/// Adapts a closure into a [Resource]. Use [derived] to construct one.
pub struct Derived<F>(F);

impl<T, F> Resource<T> for Derived<F>
where
    F: Fn(&Querier) -> Expiring<Dynamics<T>> + Send + Sync,
{
    fn evaluate(&self, querier: &Querier) -> Expiring<Dynamics<T>> {
        (self.0)(querier)
    }
}

/// Builds a resource from an evaluation function.
pub fn derived<T, F>(f: F) -> Res<T>
where
    T: 'static,
    F: Fn(&Querier<'_>) -> Expiring<Dynamics<T>> + Send + Sync + 'static,
{
    Arc::new(Derived(f))
}

/// The primary dynamics of a cell.
pub fn from_cell<C: Cell>(id: CellId<C>) -> Res<C::Value> {
    derived(move |q| Expiring::new(q.cell_dynamics(id), q.cell_expiry(id)))
}

/// A projection of a cell's state. The projection is evaluated at the commit instant and the
/// result is stepped to the query instant.
pub fn from_cell_with<C, T, F>(id: CellId<C>, f: F) -> Res<T>
where
    C: Cell,
    T: Extrapolate,
    F: Fn(&C) -> Dynamics<T> + Send + Sync + 'static,
{
    derived(move |q| {
        let dynamics = match q.cell(id) {
            Ok(cell) => f(cell).step(q.elapsed()),
            Err(failure) => Dynamics::Failed(failure),
        };
        Expiring::new(dynamics, q.cell_expiry(id))
    })
}

/// An identity usable as a key into the diagnostics side table.
pub fn resource_key<T: ?Sized>(resource: &Arc<T>) -> usize {
    Arc::as_ptr(resource) as *const () as usize
}
