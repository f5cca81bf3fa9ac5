//! Cells own the mutable state of a branch.
//!
//! Model code never touches a cell directly. It emits effects, and the scheduler folds each
//! instant's effects through the cell's [EffectAlgebra] and applies the result once. Between
//! events the scheduler [advances](Cell::advance) every cell across the elapsed time.

pub mod builtins;

use crate::public::effect::EffectAlgebra;
use crate::public::resource::dynamics::{Dynamics, Extrapolate};
use anyhow::Result;
use hifitime::Duration;
use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// The effect type of a cell.
pub type Effect<C> = <<C as Cell>::Algebra as EffectAlgebra>::Effect;

/// The state of one simulated resource.
pub trait Cell: Clone + Debug + Send + Sync + 'static {
    type Algebra: EffectAlgebra;

    /// The type observed through this cell's primary dynamics.
    type Value: Extrapolate;

    /// Applies one already-combined effect.
    fn apply(&mut self, effect: &Effect<Self>) -> Result<()>;

    /// Evolves the state across elapsed time with no effects.
    ///
    /// The passage of time must not alter a valid dynamics. Advancing by `a` then `b` must be
    /// equivalent to advancing by `a + b`.
    fn advance(&mut self, elapsed: Duration);

    /// The primary dynamics of this cell, relative to the instant it was last advanced to.
    fn dynamics(&self) -> Dynamics<Self::Value>;

    /// An independent copy, used when forking a branch.
    fn fork(&self) -> Self {
        self.clone()
    }

    /// Equality used by the commutativity probe. Floating point cells should compare within
    /// `tolerance`; discrete cells should compare exactly.
    fn equivalent(&self, other: &Self, tolerance: f64) -> bool;
}

/// A typed handle to a cell in a branch's arena.
///
/// Handles are plain indices. They stay valid in every fork of the branch that allocated them.
pub struct CellId<C> {
    pub(crate) index: usize,
    pub(crate) cell: PhantomData<fn() -> C>,
}

impl<C> CellId<C> {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            index,
            cell: PhantomData,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

impl<C> Clone for CellId<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for CellId<C> {}

impl<C> PartialEq for CellId<C> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<C> Eq for CellId<C> {}

impl<C> Hash for CellId<C> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<C> Debug for CellId<C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "CellId({})", self.index)
    }
}

/// Relative float comparison shared by the real-valued cells.
pub fn approximately_equal(a: f64, b: f64, tolerance: f64) -> bool {
    let scale = 1f64.max(a.abs()).max(b.abs());
    (a - b).abs() <= tolerance * scale
}
